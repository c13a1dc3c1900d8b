//! Risk prediction gateway.
//!
//! Sits between callers (the scheduler and the batch API) and the weather
//! and inference collaborators. Owns batching, per-item fallback, rate
//! limiting, idempotency and result normalisation.

mod gateway;
mod limits;
mod summary;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::PredictionSource;

pub use gateway::{RiskGateway, RiskLimits};
pub use limits::{IdempotencyCache, RateLimiter};
pub use summary::{HIGH_RISK_THRESHOLD, RiskSummary, Urgency, WeatherFlags, summarize};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("points must be a non-empty array")]
    EmptyBatch,

    #[error("batch of {got} points exceeds the maximum of {max}")]
    BatchTooLarge { max: usize, got: usize },

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },
}

// ============================================================================
// Types
// ============================================================================

/// One point to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_index: Option<usize>,
    /// Sample time as `YYYY-MM-DD HH:MM:SS`; defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_start: Option<f64>,
}

/// A predicted point with its normalised weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    pub lat: f64,
    pub lon: f64,
    pub tier: u8,
    pub severity_probability: f64,
    /// Severity clamped to `[0, 1]`.
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub source: PredictionSource,
}

/// Range of weights in a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    pub fn of(weights: &[f64]) -> Self {
        if weights.is_empty() {
            return Self { min: 0.0, max: 0.0 };
        }
        let (min, max) = weights
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), w| (lo.min(*w), hi.max(*w)));
        Self { min, max }
    }
}

/// Result of a client batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBatchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub results: Vec<RiskPoint>,
    pub scale: Scale,
    pub summary: RiskSummary,
}
