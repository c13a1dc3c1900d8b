//! V1 API handlers.

mod risk;
mod sessions;

pub use risk::predict_batch;
pub use sessions::{create_session, delete_session, get_session, list_sessions, stream_session};
