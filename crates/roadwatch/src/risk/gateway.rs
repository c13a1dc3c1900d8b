//! The gateway that turns points into normalised risk.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::limits::{IdempotencyCache, RateLimiter};
use super::summary::{WeatherFlags, summarize};
use super::{RiskBatchResult, RiskError, RiskPoint, RiskQuery, Scale};
use crate::config::RiskConfig;
use crate::geo::Coordinate;
use crate::inference::{FeatureVector, InferenceClient, Prediction};
use crate::weather::{WeatherFeatures, WeatherProvider};

/// Sliding window used for per-caller rate limiting.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Tunables for the client-facing batch path.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub batch_max: usize,
    pub rate_per_minute: usize,
    pub idempotency_ttl: Duration,
    pub fallback_concurrency: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            batch_max: 12,
            rate_per_minute: 60,
            idempotency_ttl: Duration::from_secs(60),
            fallback_concurrency: 4,
        }
    }
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            batch_max: config.batch_max,
            rate_per_minute: config.rate_per_minute,
            idempotency_ttl: Duration::from_secs(config.idempotency_ttl_seconds),
            fallback_concurrency: config.fallback_concurrency.max(1),
        }
    }
}

type IdempotencyKey = (String, String);

/// Risk prediction front door.
///
/// Cheap to clone; clones share the rate-limit windows and idempotency cache.
#[derive(Clone)]
pub struct RiskGateway {
    inference: Arc<dyn InferenceClient>,
    weather: Arc<dyn WeatherProvider>,
    limits: RiskLimits,
    rate_limiter: RateLimiter,
    idempotency: IdempotencyCache<IdempotencyKey, RiskBatchResult>,
}

impl RiskGateway {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        weather: Arc<dyn WeatherProvider>,
        limits: RiskLimits,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(limits.rate_per_minute, RATE_WINDOW),
            idempotency: IdempotencyCache::new(limits.idempotency_ttl),
            inference,
            weather,
            limits,
        }
    }

    pub fn weather(&self) -> &Arc<dyn WeatherProvider> {
        &self.weather
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    /// Predict every row, in input order.
    ///
    /// Tries the batch endpoint first. If it fails or answers with the wrong
    /// number of rows, falls back to one call per row with bounded
    /// concurrency. Rows that still fail get [`Prediction::zero`].
    pub async fn predict_batch(&self, features: &[FeatureVector]) -> Vec<Prediction> {
        if features.is_empty() {
            return Vec::new();
        }

        match self.inference.predict_batch(features).await {
            Ok(predictions) if predictions.len() == features.len() => return predictions,
            Ok(predictions) => warn!(
                expected = features.len(),
                got = predictions.len(),
                "Inference batch returned wrong row count, falling back to per-item predictions"
            ),
            Err(e) => warn!(
                error = %e,
                "Inference batch failed, falling back to per-item predictions"
            ),
        }

        let inference = self.inference.clone();
        stream::iter(features.to_vec())
            .map(move |row| {
                let inference = inference.clone();
                async move {
                    match inference.predict_one(&row).await {
                        Ok(prediction) => prediction,
                        Err(e) => {
                            warn!(error = %e, "Single inference call failed");
                            Prediction::zero()
                        }
                    }
                }
            })
            .buffered(self.limits.fallback_concurrency)
            .collect()
            .await
    }

    /// Predict already-resolved corridor points.
    ///
    /// `weather[i]` belongs to `queries[i]`. Rows without a timestamp are
    /// stamped with `now`.
    pub async fn predict_points(
        &self,
        queries: &[RiskQuery],
        weather: &[WeatherFeatures],
        now: DateTime<Utc>,
    ) -> Vec<RiskPoint> {
        let rows: Vec<FeatureVector> = queries
            .iter()
            .zip(weather)
            .map(|(query, w)| {
                let mut row = FeatureVector::from_weather(w, now);
                if let Some(ref ts) = query.timestamp {
                    row.start_time.clone_from(ts);
                }
                row
            })
            .collect();

        let predictions = self.predict_batch(&rows).await;
        queries
            .iter()
            .zip(rows)
            .zip(predictions)
            .enumerate()
            .map(|(i, ((query, row), prediction))| {
                to_risk_point(i, query, row.start_time, prediction)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Client batch
    // ------------------------------------------------------------------------

    /// Evaluate a client-supplied batch.
    ///
    /// Order: validate, rate-limit, idempotency lookup, weather, predict,
    /// summarise, cache. A cached hit skips every dependency call.
    pub async fn batch_predict_for_clients(
        &self,
        user_id: &str,
        points: Vec<RiskQuery>,
        request_id: Option<String>,
    ) -> Result<Arc<RiskBatchResult>, RiskError> {
        if points.is_empty() {
            return Err(RiskError::EmptyBatch);
        }
        if points.len() > self.limits.batch_max {
            return Err(RiskError::BatchTooLarge {
                max: self.limits.batch_max,
                got: points.len(),
            });
        }

        let now = Instant::now();
        self.rate_limiter
            .check(user_id, now)
            .map_err(|retry_after| RiskError::RateLimited { retry_after })?;

        let key = request_id
            .as_ref()
            .map(|id| (user_id.to_string(), id.clone()));
        if let Some(ref key) = key
            && let Some(cached) = self.idempotency.get(key, now)
        {
            debug!(user_id, request_id = %key.1, "Idempotent batch hit");
            return Ok(cached);
        }

        let wall_now = Utc::now();
        let resolved = join_all(
            points
                .iter()
                .map(|p| self.weather.resolve(Coordinate::new(p.lat, p.lon))),
        )
        .await;

        let mut observed = Vec::with_capacity(points.len());
        let rows: Vec<FeatureVector> = points
            .iter()
            .zip(resolved)
            .map(|(point, weather)| {
                let mut row = match weather {
                    Ok(w) => {
                        let row = FeatureVector::from_weather(&w, wall_now);
                        observed.push(w);
                        row
                    }
                    Err(e) => {
                        warn!(lat = point.lat, lon = point.lon, error = %e, "Weather lookup failed, using defaults");
                        FeatureVector::conservative(wall_now)
                    }
                };
                if let Some(ref ts) = point.timestamp {
                    row.start_time.clone_from(ts);
                }
                row
            })
            .collect();

        let predictions = self.predict_batch(&rows).await;
        let results: Vec<RiskPoint> = points
            .iter()
            .zip(rows)
            .zip(predictions)
            .enumerate()
            .map(|(i, ((query, row), prediction))| {
                to_risk_point(i, query, row.start_time, prediction)
            })
            .collect();

        let weights: Vec<f64> = results.iter().map(|p| p.weight).collect();
        let result = Arc::new(RiskBatchResult {
            request_id,
            scale: Scale::of(&weights),
            summary: summarize(&weights, WeatherFlags::from_conditions(&observed)),
            results,
        });

        if let Some(key) = key {
            self.idempotency.insert(key, result.clone(), now);
        }
        Ok(result)
    }

    /// Drop expired idempotency entries, drained rate windows and stale
    /// weather lookups.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.idempotency.purge_expired(now);
        self.rate_limiter.purge_idle(now);
        self.weather.purge_expired();
    }
}

fn to_risk_point(
    index: usize,
    query: &RiskQuery,
    timestamp: String,
    prediction: Prediction,
) -> RiskPoint {
    RiskPoint {
        lat: query.lat,
        lon: query.lon,
        tier: prediction.tier,
        severity_probability: prediction.severity_probability,
        weight: prediction.severity_probability.clamp(0.0, 1.0),
        point_index: Some(query.point_index.unwrap_or(index)),
        distance_from_start: query.distance_from_start,
        timestamp: Some(timestamp),
        source: prediction.source,
    }
}
