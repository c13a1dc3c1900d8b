//! Session error types.

use thiserror::Error;

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' is already active")]
    DuplicateSession(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("session '{0}' is already stopped")]
    AlreadyStopped(String),
}
