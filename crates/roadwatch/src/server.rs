use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::risk::RiskGateway;
use crate::session::SessionRegistry;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub risk_gateway: RiskGateway,
    pub api_token: Option<String>,
    pub max_connections: usize,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections.max(1);

    // SSE streaming routes - no request timeout (closed by session end)
    let streaming_routes = Router::new()
        .route(
            "/sessions/{session_id}/stream",
            get(handlers::v1::stream_session),
        )
        .with_state(state.clone());

    // Regular API routes - with request timeout
    let api_routes = Router::new()
        .route(
            "/sessions",
            get(handlers::v1::list_sessions).post(handlers::v1::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(handlers::v1::get_session).delete(handlers::v1::delete_session),
        )
        .route("/risk/batch", post(handlers::v1::predict_batch))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let api_v1 = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            handlers::api_auth::require_api_token,
        ))
        .layer(ConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
