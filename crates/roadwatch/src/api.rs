//! HTTP request and response bodies for `/api/v1`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskQuery;
use crate::session::SessionMetadata;

/// SSE event names.
pub mod sse {
    pub const RISK_UPDATE: &str = "risk-update";
    pub const SESSION_ENDED: &str = "session-ended";
    /// Sent as an SSE comment, not a named event.
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Header carrying the caller's identity for rate limiting and ownership.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity used when no `x-user-id` header is sent.
pub const ANONYMOUS_USER: &str = "anonymous";

fn default_speed_hint() -> f64 {
    60.0
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub session_id: String,
    /// Encoded polyline (precision 1e5).
    pub polyline: String,
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_speed_hint")]
    pub speed_hint_kmh: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionMetadata>,
}

// ============================================================================
// Risk
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBatchRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub points: Vec<RiskQuery>,
    /// Opaque client data; accepted and ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
