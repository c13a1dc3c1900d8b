//! Frames delivered to stream subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::PositionEstimate;
use crate::risk::{RiskPoint, RiskSummary};

/// Payload of a `risk-update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskUpdate {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub current_position: PositionEstimate,
    pub risk_points: Vec<RiskPoint>,
    pub summary: RiskSummary,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionEndReason {
    DestinationReached,
    UserStopped,
    Timeout,
}

impl SessionEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEndReason::DestinationReached => "destination-reached",
            SessionEndReason::UserStopped => "user-stopped",
            SessionEndReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the terminal `session-ended` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub session_id: String,
    pub reason: SessionEndReason,
}

/// One frame on a subscriber's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Sequenced risk update; `seq` is the resumption cursor.
    RiskUpdate { seq: u64, update: Arc<RiskUpdate> },
    /// Keep-alive, not sequenced.
    Heartbeat,
    /// Last frame before the stream closes.
    SessionEnded(SessionEnded),
}
