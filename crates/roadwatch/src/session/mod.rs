//! Navigation sessions.
//!
//! A session is one trip along a fixed route. The registry owns every active
//! session and the subscribers watching it; the scheduler drives updates
//! through it.

mod error;
mod frames;
mod registry;
mod state;
mod subscriber;
mod types;

pub use error::SessionError;
pub use frames::{RiskUpdate, SessionEndReason, SessionEnded, StreamFrame};
pub use registry::{
    DEFAULT_REPLAY_BUFFER, DEFAULT_SUBSCRIBER_BUFFER, MAX_SPEED_KMH, MIN_SPEED_KMH,
    RegistryOptions, SessionRegistry,
};
pub use state::Session;
pub use subscriber::{DeliveryError, FrameReceiver, FrameSink, SubscriberId, SubscriptionStream};
pub use types::{
    PositionEstimate, SessionMetadata, SessionStatus, SessionSummary, StartSession, stream_url,
};
