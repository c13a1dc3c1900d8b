//! Subscriber sinks and the stream handed to connections.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use super::frames::StreamFrame;
use super::registry::SessionRegistry;

/// Identifies one subscription within the registry.
pub type SubscriberId = u64;

/// Why a frame could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscriber's buffer is full.
    Full,
    /// The receiving side is gone.
    Closed,
}

/// Write half of a subscription.
///
/// Delivery never blocks. Regular frames go through a bounded channel; the
/// terminal frame has its own slot so it always fits.
#[derive(Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<StreamFrame>,
    end: oneshot::Sender<StreamFrame>,
}

/// Read half of a subscription, turned into a [`SubscriptionStream`].
#[derive(Debug)]
pub struct FrameReceiver {
    frames: mpsc::Receiver<StreamFrame>,
    end: oneshot::Receiver<StreamFrame>,
}

impl FrameSink {
    /// Create a sink and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, FrameReceiver) {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let (end_tx, end) = oneshot::channel();
        (Self { tx, end: end_tx }, FrameReceiver { frames, end })
    }

    pub fn try_deliver(&self, frame: StreamFrame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Close the sink with a final frame.
    ///
    /// The reader sees it after every frame already buffered.
    pub fn finish(self, frame: StreamFrame) -> Result<(), DeliveryError> {
        let Self { tx, end } = self;
        let result = end.send(frame).map_err(|_| DeliveryError::Closed);
        drop(tx);
        result
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Unsubscribes when dropped.
struct SubscriptionGuard {
    registry: SessionRegistry,
    session_id: String,
    subscriber_id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.session_id, self.subscriber_id);
    }
}

/// Frames for one connection.
///
/// Yields buffered frames in order, then the final frame if the registry
/// finished the sink, then ends. A sink dropped without finishing (a lagging
/// subscriber being disconnected) ends the stream with no final frame.
/// Dropping the stream removes the subscription.
pub struct SubscriptionStream {
    inner: ReceiverStream<StreamFrame>,
    end: Option<oneshot::Receiver<StreamFrame>>,
    guard: SubscriptionGuard,
}

impl SubscriptionStream {
    pub(super) fn new(
        rx: FrameReceiver,
        registry: SessionRegistry,
        session_id: String,
        subscriber_id: SubscriberId,
    ) -> Self {
        Self {
            inner: ReceiverStream::new(rx.frames),
            end: Some(rx.end),
            guard: SubscriptionGuard {
                registry,
                session_id,
                subscriber_id,
            },
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.guard.subscriber_id
    }
}

impl Stream for SubscriptionStream {
    type Item = StreamFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(frame)) => return Poll::Ready(Some(frame)),
            Poll::Pending => return Poll::Pending,
            Poll::Ready(None) => {}
        }

        // Channel drained and closed; the final frame, if any, comes last.
        let Some(end) = self.end.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(end).poll(cx) {
            Poll::Ready(result) => {
                self.end = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
