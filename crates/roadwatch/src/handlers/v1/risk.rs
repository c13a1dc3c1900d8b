//! Batch risk prediction handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::api::RiskBatchRequest;
use crate::handlers::api_auth::CallerId;
use crate::handlers::problem_details;
use crate::risk::{RiskBatchResult, RiskError};
use crate::server::AppState;

/// POST /api/v1/risk/batch
///
/// Repeating a `request_id` within the idempotency window returns the
/// original result without calling any dependency.
pub async fn predict_batch(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<RiskBatchRequest>,
) -> impl IntoResponse {
    let points = req.points.len();
    match state
        .risk_gateway
        .batch_predict_for_clients(&user_id, req.points, req.request_id)
        .await
    {
        Ok(result) => {
            debug!(user_id = %user_id, points, "Risk batch served");
            (StatusCode::OK, Json(RiskBatchResult::clone(&result))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for RiskError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        match self {
            Self::EmptyBatch | Self::BatchTooLarge { .. } => problem_details::bad_request(detail),
            Self::RateLimited { retry_after } => {
                problem_details::too_many_requests(detail, retry_after)
            }
        }
        .into_response()
    }
}
