//! Session value types shared with the API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Lifecycle state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Stopped,
}

/// Input to [`SessionRegistry::start`](super::SessionRegistry::start).
#[derive(Debug, Clone)]
pub struct StartSession {
    pub session_id: String,
    pub polyline: String,
    pub start_time: DateTime<Utc>,
    pub speed_hint_kmh: f64,
    pub user_id: String,
}

/// Result of starting or stopping a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_meters: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

/// Point-in-time view of a session for listing and inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub speed_hint_kmh: f64,
    pub total_distance_meters: u64,
    pub estimated_duration_seconds: u64,
    pub current_distance_from_start: f64,
    pub last_event_seq: u64,
    pub subscriber_count: usize,
}

/// Where the driver is assumed to be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub coordinate: Coordinate,
    pub distance_from_start: f64,
    pub remaining_distance: f64,
    pub segment_index: usize,
}

/// Stream locator handed back to clients on start.
pub fn stream_url(session_id: &str) -> String {
    format!("/api/v1/sessions/{session_id}/stream")
}
