//! Session registry.
//!
//! The registry is responsible for:
//! - Starting and stopping sessions
//! - Looking up and enumerating active sessions
//! - Fanning frames out to each session's subscribers
//! - Sweeping sessions nobody is watching

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::frames::{RiskUpdate, SessionEndReason, SessionEnded, StreamFrame};
use super::state::{Session, Subscriber};
use super::subscriber::{DeliveryError, FrameSink, SubscriberId, SubscriptionStream};
use super::types::{SessionMetadata, SessionStatus, SessionSummary, StartSession, stream_url};
use crate::geo::RoutePath;

// ============================================================================
// Constants
// ============================================================================

/// Accepted range for the speed hint, in km/h.
pub const MIN_SPEED_KMH: f64 = 1.0;
pub const MAX_SPEED_KMH: f64 = 200.0;

/// Default number of risk updates kept for stream resumption.
pub const DEFAULT_REPLAY_BUFFER: usize = 16;

/// Default per-subscriber channel capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

// ============================================================================
// Session Registry
// ============================================================================

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Risk updates retained per session for `Last-Event-ID` resumption.
    /// Zero disables replay.
    pub replay_buffer: usize,
    /// Frames buffered per subscriber. A subscriber that falls this far
    /// behind is disconnected and resumes with `Last-Event-ID`.
    pub subscriber_buffer: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            replay_buffer: DEFAULT_REPLAY_BUFFER,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Registry of active sessions.
///
/// Thread-safe and cheap to clone. Each session has its own lock, so work on
/// different sessions proceeds in parallel.
#[derive(Clone)]
pub struct SessionRegistry {
    /// Active sessions by ID.
    sessions: Arc<DashMap<String, Arc<Session>>>,
    /// Source of subscriber IDs.
    next_subscriber_id: Arc<AtomicU64>,
    options: RegistryOptions,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryOptions::default())
    }
}

impl SessionRegistry {
    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn new(options: RegistryOptions) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            options,
        }
    }

    /// End every session with reason `timeout`, closing all streams.
    pub fn shutdown(&self) {
        info!("Shutting down session registry");

        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut ended = 0;
        for id in ids {
            if self.stop_with_reason(&id, SessionEndReason::Timeout).is_ok() {
                ended += 1;
            }
        }

        info!(ended, "Session registry shutdown complete");
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Start monitoring a trip.
    ///
    /// The route is decoded once here and never changes afterwards.
    pub fn start(&self, req: StartSession) -> Result<SessionSummary, SessionError> {
        if self.sessions.contains_key(&req.session_id) {
            return Err(SessionError::DuplicateSession(req.session_id));
        }

        if !(MIN_SPEED_KMH..=MAX_SPEED_KMH).contains(&req.speed_hint_kmh) {
            return Err(SessionError::InvalidRoute(format!(
                "speed hint {} km/h is outside {MIN_SPEED_KMH}..={MAX_SPEED_KMH}",
                req.speed_hint_kmh
            )));
        }

        let route = RoutePath::from_polyline(&req.polyline)
            .map_err(|e| SessionError::InvalidRoute(e.to_string()))?;

        let session = Arc::new(Session::new(
            req.session_id.clone(),
            req.user_id,
            route,
            req.start_time,
            req.speed_hint_kmh,
        ));

        match self.sessions.entry(req.session_id.clone()) {
            Entry::Occupied(_) => return Err(SessionError::DuplicateSession(req.session_id)),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        info!(
            session_id = %req.session_id,
            user_id = %session.user_id(),
            total_distance_meters = session.total_distance_meters(),
            estimated_duration_seconds = session.estimated_duration_seconds(),
            "Session started"
        );

        Ok(SessionSummary {
            stream_url: Some(stream_url(&req.session_id)),
            session_id: req.session_id,
            status: SessionStatus::Active,
            total_distance_meters: Some(session.total_distance_meters()),
            estimated_duration_seconds: Some(session.estimated_duration_seconds()),
            duration_seconds: None,
        })
    }

    /// Stop a session at the driver's request.
    pub fn stop(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        self.stop_with_reason(session_id, SessionEndReason::UserStopped)
    }

    /// Stop a session, notify every subscriber and remove it.
    ///
    /// Subscribers receive one `session-ended` frame, then their streams end.
    pub fn stop_with_reason(
        &self,
        session_id: &str,
        reason: SessionEndReason,
    ) -> Result<SessionSummary, SessionError> {
        let session = self
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let subscribers = {
            let mut state = session.lock_state();
            if state.status == SessionStatus::Stopped {
                return Err(SessionError::AlreadyStopped(session_id.to_string()));
            }
            state.status = SessionStatus::Stopped;
            std::mem::take(&mut state.subscribers)
        };

        let frame = StreamFrame::SessionEnded(SessionEnded {
            session_id: session_id.to_string(),
            reason,
        });
        for subscriber in subscribers {
            let subscriber_id = subscriber.id;
            if let Err(e) = subscriber.sink.finish(frame.clone()) {
                debug!(session_id, subscriber_id, error = ?e, "Could not deliver end frame");
            }
        }

        self.sessions
            .remove_if(session_id, |_, s| Arc::ptr_eq(s, &session));

        let duration = session.elapsed_seconds(Utc::now());
        info!(session_id, reason = %reason, duration_seconds = duration, "Session stopped");

        Ok(SessionSummary {
            session_id: session_id.to_string(),
            status: SessionStatus::Stopped,
            stream_url: None,
            total_distance_meters: None,
            estimated_duration_seconds: None,
            duration_seconds: Some(duration),
        })
    }

    /// Look up a session.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every active session.
    pub fn active_sessions(&self) -> Vec<Arc<Session>> {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.into_iter().filter(|s| s.is_active()).collect()
    }

    /// Metadata for every active session, ordered by start time.
    pub fn list(&self) -> Vec<SessionMetadata> {
        let mut out: Vec<SessionMetadata> = self
            .active_sessions()
            .iter()
            .map(|s| s.metadata())
            .collect();
        out.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        out
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Attach a sink to a session.
    ///
    /// With `resume_from = Some(n)`, buffered updates with `seq > n` are
    /// delivered first, in order. Returns `None` if the session is missing,
    /// no longer active, or the sink cannot hold the replayed updates.
    pub fn subscribe(
        &self,
        session_id: &str,
        sink: FrameSink,
        resume_from: Option<u64>,
    ) -> Option<SubscriberId> {
        let session = self.get(session_id)?;
        let mut state = session.lock_state();
        if state.status != SessionStatus::Active {
            return None;
        }

        if let Some(cursor) = resume_from {
            for (seq, update) in state.replay.iter().filter(|(seq, _)| *seq > cursor) {
                let frame = StreamFrame::RiskUpdate {
                    seq: *seq,
                    update: update.clone(),
                };
                if let Err(e) = sink.try_deliver(frame) {
                    warn!(session_id, seq, error = ?e, "Replay does not fit subscriber buffer");
                    return None;
                }
            }
        }

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        state.subscribers.push(Subscriber {
            id,
            sink,
            connected_at: Utc::now(),
        });
        state.last_activity_at = Instant::now();

        debug!(session_id, subscriber_id = id, resume_from, "Subscriber attached");
        Some(id)
    }

    /// Open a frame stream for a session. See [`subscribe`](Self::subscribe).
    ///
    /// The stream unsubscribes itself when dropped.
    pub fn open_stream(
        &self,
        session_id: &str,
        resume_from: Option<u64>,
    ) -> Option<SubscriptionStream> {
        // Room for a full replay on top of the regular buffer.
        let capacity = self.options.subscriber_buffer.max(self.options.replay_buffer + 1);
        let (sink, rx) = FrameSink::channel(capacity);
        let id = self.subscribe(session_id, sink, resume_from)?;
        Some(SubscriptionStream::new(
            rx,
            self.clone(),
            session_id.to_string(),
            id,
        ))
    }

    /// Detach one subscriber. Other subscribers are unaffected.
    pub fn unsubscribe(&self, session_id: &str, subscriber_id: SubscriberId) {
        let Some(session) = self.get(session_id) else {
            return;
        };
        let mut state = session.lock_state();
        if let Some(pos) = state.subscribers.iter().position(|s| s.id == subscriber_id) {
            let subscriber = state.subscribers.swap_remove(pos);
            let connected_seconds = (Utc::now() - subscriber.connected_at).num_seconds();
            debug!(session_id, subscriber_id, connected_seconds, "Subscriber detached");
        }
    }

    // ------------------------------------------------------------------------
    // Fan-out
    // ------------------------------------------------------------------------

    /// Send a risk update to every subscriber of an active session.
    ///
    /// Returns the sequence number assigned to the update, or `None` if the
    /// session is missing or stopped. A subscriber whose stream is gone is
    /// pruned. A subscriber whose buffer is full is disconnected rather than
    /// silently skipped, so its stream never has a gap in the middle.
    pub fn broadcast(&self, session_id: &str, update: RiskUpdate) -> Option<u64> {
        let session = self.get(session_id)?;
        let update = Arc::new(update);

        let mut state = session.lock_state();
        if state.status != SessionStatus::Active {
            return None;
        }

        state.last_event_seq += 1;
        let seq = state.last_event_seq;

        if self.options.replay_buffer > 0 {
            state.replay.push_back((seq, update.clone()));
            while state.replay.len() > self.options.replay_buffer {
                state.replay.pop_front();
            }
        }

        state.subscribers.retain(|subscriber| {
            let frame = StreamFrame::RiskUpdate {
                seq,
                update: update.clone(),
            };
            match subscriber.sink.try_deliver(frame) {
                Ok(()) => true,
                Err(DeliveryError::Full) => {
                    warn!(session_id, subscriber_id = subscriber.id, seq, "Subscriber lagging, disconnecting");
                    false
                }
                Err(DeliveryError::Closed) => {
                    debug!(session_id, subscriber_id = subscriber.id, "Pruning closed subscriber");
                    false
                }
            }
        });
        state.last_activity_at = Instant::now();

        Some(seq)
    }

    /// Send a keep-alive to every subscriber. Returns how many received it.
    pub fn heartbeat(&self, session_id: &str) -> usize {
        let Some(session) = self.get(session_id) else {
            return 0;
        };
        let mut state = session.lock_state();
        if state.status != SessionStatus::Active {
            return 0;
        }

        let mut delivered = 0;
        state.subscribers.retain(|subscriber| {
            match subscriber.sink.try_deliver(StreamFrame::Heartbeat) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(DeliveryError::Full) => {
                    warn!(session_id, subscriber_id = subscriber.id, "Subscriber lagging, disconnecting");
                    false
                }
                Err(DeliveryError::Closed) => false,
            }
        });
        delivered
    }

    // ------------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------------

    /// Remove active sessions with no subscribers whose last activity is
    /// older than `timeout`. Returns how many were removed.
    pub fn sweep_inactive(&self, timeout: Duration, now: Instant) -> usize {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();

        let mut swept = 0;
        for session in sessions {
            let expired = {
                let mut state = session.lock_state();
                state.subscribers.retain(|s| !s.sink.is_closed());
                let idle = now.saturating_duration_since(state.last_activity_at);
                let expired = state.status == SessionStatus::Active
                    && state.subscribers.is_empty()
                    && idle > timeout;
                if expired {
                    state.status = SessionStatus::Stopped;
                }
                expired
            };

            if expired {
                self.sessions
                    .remove_if(session.id(), |_, s| Arc::ptr_eq(s, &session));
                info!(session_id = %session.id(), "Session expired after inactivity");
                swept += 1;
            }
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use futures::StreamExt;

    use super::*;
    use crate::geo::{Coordinate, encode};
    use crate::risk::{WeatherFlags, summarize};
    use crate::session::PositionEstimate;

    fn polyline() -> String {
        encode(&[
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.0, 0.02),
        ])
    }

    fn start_req(id: &str) -> StartSession {
        StartSession {
            session_id: id.to_string(),
            polyline: polyline(),
            start_time: Utc::now(),
            speed_hint_kmh: 60.0,
            user_id: "driver-1".to_string(),
        }
    }

    fn update(session_id: &str, at: DateTime<Utc>) -> RiskUpdate {
        RiskUpdate {
            session_id: session_id.to_string(),
            timestamp: at,
            current_position: PositionEstimate {
                coordinate: Coordinate::new(0.0, 0.0),
                distance_from_start: 0.0,
                remaining_distance: 2224.0,
                segment_index: 0,
            },
            risk_points: Vec::new(),
            summary: summarize(&[], WeatherFlags::default()),
        }
    }

    fn seq_of(frame: &StreamFrame) -> u64 {
        match frame {
            StreamFrame::RiskUpdate { seq, .. } => *seq,
            other => panic!("expected risk update, got {other:?}"),
        }
    }

    #[test]
    fn start_returns_summary_with_stream_url() {
        let registry = SessionRegistry::default();
        let summary = registry.start(start_req("trip-1")).unwrap();

        assert_eq!(summary.status, SessionStatus::Active);
        assert_eq!(
            summary.stream_url.as_deref(),
            Some("/api/v1/sessions/trip-1/stream")
        );
        assert_eq!(summary.total_distance_meters, Some(2224));
        assert_eq!(summary.estimated_duration_seconds, Some(133));
        assert!(registry.contains("trip-1"));
    }

    #[test]
    fn position_advances_with_time_and_clamps_at_destination() {
        let registry = SessionRegistry::default();
        let mut req = start_req("trip-1");
        req.speed_hint_kmh = 36.0; // 10 m/s
        let start = req.start_time;
        registry.start(req).unwrap();
        let session = registry.get("trip-1").unwrap();

        let at_start = session.estimate_position(start);
        assert_eq!(at_start.distance_from_start, 0.0);
        assert_eq!(at_start.segment_index, 0);

        let mut last_remaining = at_start.remaining_distance;
        for secs in [30, 60, 120, 180] {
            let pos = session.estimate_position(start + chrono::Duration::seconds(secs));
            assert!(pos.remaining_distance <= last_remaining);
            last_remaining = pos.remaining_distance;
        }
        assert_eq!(session.metadata().current_distance_from_start.round(), 1800.0);

        let past_end = session.estimate_position(start + chrono::Duration::hours(1));
        assert_eq!(past_end.distance_from_start, session.route().total_distance());
        assert!(past_end.remaining_distance.abs() < 1e-6);
        assert_eq!(past_end.segment_index, session.route().last_index());

        // Before the start time the driver has not moved.
        let early = session.estimate_position(start - chrono::Duration::seconds(30));
        assert_eq!(early.distance_from_start, 0.0);
    }

    #[test]
    fn duplicate_start_fails_and_id_is_reusable_after_stop() {
        let registry = SessionRegistry::default();
        registry.start(start_req("trip-1")).unwrap();

        let err = registry.start(start_req("trip-1")).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateSession(_)));

        registry.stop("trip-1").unwrap();
        assert!(!registry.contains("trip-1"));
        registry.start(start_req("trip-1")).unwrap();
    }

    #[test]
    fn start_rejects_bad_routes_and_speeds() {
        let registry = SessionRegistry::default();

        let mut req = start_req("a");
        req.polyline = "_p~iF".to_string();
        assert!(matches!(
            registry.start(req),
            Err(SessionError::InvalidRoute(_))
        ));

        let mut req = start_req("b");
        req.polyline = encode(&[Coordinate::new(1.0, 1.0)]);
        assert!(matches!(
            registry.start(req),
            Err(SessionError::InvalidRoute(_))
        ));

        let mut req = start_req("c");
        req.speed_hint_kmh = 250.0;
        assert!(matches!(
            registry.start(req),
            Err(SessionError::InvalidRoute(_))
        ));

        assert!(registry.is_empty());
    }

    #[test]
    fn stop_unknown_session_is_not_found() {
        let registry = SessionRegistry::default();
        assert!(matches!(
            registry.stop("nope"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn stop_reports_elapsed_duration() {
        let registry = SessionRegistry::default();
        let mut req = start_req("trip-1");
        req.start_time = Utc::now() - chrono::Duration::seconds(90);
        registry.start(req).unwrap();

        let summary = registry.stop("trip-1").unwrap();
        assert_eq!(summary.status, SessionStatus::Stopped);
        let duration = summary.duration_seconds.unwrap();
        assert!((90..=91).contains(&duration), "got {duration}");
    }

    #[tokio::test]
    async fn broadcasts_reach_every_subscriber_in_order() {
        let registry = SessionRegistry::default();
        registry.start(start_req("trip-1")).unwrap();

        let mut streams: Vec<_> = (0..3)
            .map(|_| registry.open_stream("trip-1", None).unwrap())
            .collect();

        for _ in 0..5 {
            registry.broadcast("trip-1", update("trip-1", Utc::now()));
        }

        for stream in &mut streams {
            for expected in 1..=5 {
                let frame = stream.next().await.unwrap();
                assert_eq!(seq_of(&frame), expected);
            }
        }
    }

    #[tokio::test]
    async fn dropping_one_stream_leaves_the_others() {
        let registry = SessionRegistry::default();
        registry.start(start_req("trip-1")).unwrap();

        let first = registry.open_stream("trip-1", None).unwrap();
        let mut second = registry.open_stream("trip-1", None).unwrap();
        assert_eq!(registry.get("trip-1").unwrap().subscriber_count(), 2);

        drop(first);
        assert_eq!(registry.get("trip-1").unwrap().subscriber_count(), 1);

        assert_eq!(registry.broadcast("trip-1", update("trip-1", Utc::now())), Some(1));
        assert_eq!(seq_of(&second.next().await.unwrap()), 1);
    }

    #[tokio::test]
    async fn stop_sends_end_frame_and_closes_streams() {
        let registry = SessionRegistry::default();
        registry.start(start_req("trip-1")).unwrap();
        let mut stream = registry.open_stream("trip-1", None).unwrap();

        registry.stop("trip-1").unwrap();

        match stream.next().await {
            Some(StreamFrame::SessionEnded(ended)) => {
                assert_eq!(ended.session_id, "trip-1");
                assert_eq!(ended.reason, SessionEndReason::UserStopped);
            }
            other => panic!("expected session-ended, got {other:?}"),
        }
        assert!(stream.next().await.is_none());

        // Later broadcasts and heartbeats are no-ops.
        assert_eq!(registry.broadcast("trip-1", update("trip-1", Utc::now())), None);
        assert_eq!(registry.heartbeat("trip-1"), 0);
    }

    #[tokio::test]
    async fn full_buffer_still_ends_with_session_ended() {
        let registry = SessionRegistry::new(RegistryOptions {
            replay_buffer: 0,
            subscriber_buffer: 4,
        });
        registry.start(start_req("trip-1")).unwrap();
        let stream = registry.open_stream("trip-1", None).unwrap();

        // Fill the buffer exactly, without reading.
        for _ in 0..4 {
            registry.broadcast("trip-1", update("trip-1", Utc::now()));
        }
        assert_eq!(registry.get("trip-1").unwrap().subscriber_count(), 1);

        registry.stop("trip-1").unwrap();

        let frames: Vec<StreamFrame> = stream.collect().await;
        assert_eq!(frames.len(), 5, "{frames:?}");
        let seqs: Vec<u64> = frames[..4].iter().map(seq_of).collect();
        assert_eq!(seqs, [1, 2, 3, 4]);
        assert!(matches!(
            &frames[4],
            StreamFrame::SessionEnded(ended) if ended.reason == SessionEndReason::UserStopped
        ));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_disconnected_without_gaps() {
        let registry = SessionRegistry::new(RegistryOptions {
            replay_buffer: 0,
            subscriber_buffer: 4,
        });
        registry.start(start_req("trip-1")).unwrap();
        let slow = registry.open_stream("trip-1", None).unwrap();
        let mut fast = registry.open_stream("trip-1", None).unwrap();

        for expected in 1..=6 {
            registry.broadcast("trip-1", update("trip-1", Utc::now()));
            assert_eq!(seq_of(&fast.next().await.unwrap()), expected);
        }
        // The fifth update overflowed the slow reader.
        assert_eq!(registry.get("trip-1").unwrap().subscriber_count(), 1);

        // It keeps what it had, in order, and then ends with no final frame.
        let frames: Vec<StreamFrame> = slow.collect().await;
        let seqs: Vec<u64> = frames.iter().map(seq_of).collect();
        assert_eq!(seqs, [1, 2, 3, 4]);

        registry.stop("trip-1").unwrap();
        assert!(matches!(fast.next().await, Some(StreamFrame::SessionEnded(_))));
        assert!(fast.next().await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_disconnects_a_full_subscriber() {
        let registry = SessionRegistry::new(RegistryOptions {
            replay_buffer: 0,
            subscriber_buffer: 2,
        });
        registry.start(start_req("trip-1")).unwrap();
        let _stream = registry.open_stream("trip-1", None).unwrap();

        assert_eq!(registry.heartbeat("trip-1"), 1);
        assert_eq!(registry.heartbeat("trip-1"), 1);
        assert_eq!(registry.heartbeat("trip-1"), 0);
        assert_eq!(registry.get("trip-1").unwrap().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn replay_larger_than_subscriber_buffer_is_delivered() {
        let registry = SessionRegistry::new(RegistryOptions {
            replay_buffer: 8,
            subscriber_buffer: 2,
        });
        registry.start(start_req("trip-1")).unwrap();
        for _ in 0..8 {
            registry.broadcast("trip-1", update("trip-1", Utc::now()));
        }

        let mut stream = registry.open_stream("trip-1", Some(0)).unwrap();
        for expected in 1..=8 {
            assert_eq!(seq_of(&stream.next().await.unwrap()), expected);
        }
    }

    #[tokio::test]
    async fn heartbeat_does_not_advance_sequence() {
        let registry = SessionRegistry::default();
        registry.start(start_req("trip-1")).unwrap();
        let mut stream = registry.open_stream("trip-1", None).unwrap();

        assert_eq!(registry.heartbeat("trip-1"), 1);
        assert_eq!(stream.next().await, Some(StreamFrame::Heartbeat));
        assert_eq!(registry.get("trip-1").unwrap().last_event_seq(), 0);
    }

    #[tokio::test]
    async fn resume_replays_buffered_updates_after_cursor() {
        let registry = SessionRegistry::new(RegistryOptions {
            replay_buffer: 3,
            ..RegistryOptions::default()
        });
        registry.start(start_req("trip-1")).unwrap();

        for _ in 0..5 {
            registry.broadcast("trip-1", update("trip-1", Utc::now()));
        }

        // Buffer holds 3..=5; everything after 3 is replayed.
        let mut stream = registry.open_stream("trip-1", Some(3)).unwrap();
        assert_eq!(seq_of(&stream.next().await.unwrap()), 4);
        assert_eq!(seq_of(&stream.next().await.unwrap()), 5);

        registry.broadcast("trip-1", update("trip-1", Utc::now()));
        assert_eq!(seq_of(&stream.next().await.unwrap()), 6);

        // A cursor older than the buffer only gets what is still held.
        let mut late = registry.open_stream("trip-1", Some(0)).unwrap();
        assert_eq!(seq_of(&late.next().await.unwrap()), 4);
    }

    #[tokio::test]
    async fn subscribe_to_missing_session_fails_silently() {
        let registry = SessionRegistry::default();
        assert!(registry.open_stream("ghost", None).is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_unwatched_sessions() {
        let registry = SessionRegistry::default();
        registry.start(start_req("idle")).unwrap();
        registry.start(start_req("watched")).unwrap();
        let _stream = registry.open_stream("watched", None).unwrap();

        let timeout = Duration::from_secs(60);
        assert_eq!(registry.sweep_inactive(timeout, Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.sweep_inactive(timeout, later), 1);
        assert!(!registry.contains("idle"));
        assert!(registry.contains("watched"));
    }

    #[tokio::test]
    async fn shutdown_ends_every_session_with_timeout() {
        let registry = SessionRegistry::default();
        registry.start(start_req("a")).unwrap();
        registry.start(start_req("b")).unwrap();
        let mut stream = registry.open_stream("a", None).unwrap();

        registry.shutdown();

        assert!(registry.is_empty());
        match stream.next().await {
            Some(StreamFrame::SessionEnded(ended)) => {
                assert_eq!(ended.reason, SessionEndReason::Timeout)
            }
            other => panic!("expected session-ended, got {other:?}"),
        }
    }

    #[test]
    fn list_reports_active_sessions() {
        let registry = SessionRegistry::default();
        registry.start(start_req("a")).unwrap();
        registry.start(start_req("b")).unwrap();
        registry.stop("a").unwrap();

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].session_id, "b");
        assert_eq!(list[0].user_id, "driver-1");
    }
}
