//! Session management HTTP handlers.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path as PathExtract, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::api::{ListSessionsResponse, StartSessionRequest, sse};
use crate::handlers::api_auth::CallerId;
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::session::{SessionError, StartSession, StreamFrame};

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse {
        sessions: state.registry.list(),
    })
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    if req.session_id.trim().is_empty() {
        return problem_details::bad_request("session_id must not be empty").into_response();
    }

    let result = state.registry.start(StartSession {
        session_id: req.session_id,
        polyline: req.polyline,
        start_time: req.start_time,
        speed_hint_kmh: req.speed_hint_kmh,
        user_id,
    });

    match result {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.metadata())).into_response(),
        None => SessionError::NotFound(session_id).into_response(),
    }
}

/// DELETE /api/v1/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> impl IntoResponse {
    match state.registry.stop(&session_id) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/sessions/{session_id}/stream
///
/// Server-sent events:
/// - `risk-update` with `id: <seq>` and a [`RiskUpdate`](crate::session::RiskUpdate) payload
/// - `: heartbeat` comments between updates
/// - one final `session-ended` event, after which the stream closes
///
/// A `Last-Event-ID` header replays buffered updates newer than that id.
pub async fn stream_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let resume_from = last_event_id(&headers);

    let Some(stream) = state.registry.open_stream(&session_id, resume_from) else {
        return SessionError::NotFound(session_id).into_response();
    };

    debug!(
        session_id = %session_id,
        subscriber_id = stream.subscriber_id(),
        resume_from,
        "Starting SSE stream"
    );

    let events = stream.map(|frame| Ok::<_, Infallible>(frame_to_event(frame)));
    Sse::new(events).into_response()
}

// ============================================================================
// Helpers
// ============================================================================

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn frame_to_event(frame: StreamFrame) -> Event {
    match frame {
        StreamFrame::RiskUpdate { seq, update } => Event::default()
            .event(sse::RISK_UPDATE)
            .id(seq.to_string())
            .json_data(&*update)
            .unwrap_or_else(|e| {
                warn!(seq, error = %e, "Failed to serialize risk update");
                Event::default().comment("dropped risk update")
            }),
        StreamFrame::Heartbeat => Event::default().comment(sse::HEARTBEAT),
        StreamFrame::SessionEnded(ended) => Event::default()
            .event(sse::SESSION_ENDED)
            .json_data(&ended)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to serialize session-ended frame");
                Event::default().event(sse::SESSION_ENDED)
            }),
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        match self {
            Self::InvalidRoute(_) => problem_details::bad_request(detail),
            Self::NotFound(_) => problem_details::not_found(detail),
            Self::DuplicateSession(_) => problem_details::conflict(detail),
            Self::AlreadyStopped(_) => problem_details::gone(detail),
        }
        .into_response()
    }
}
