//! Inference collaborator.
//!
//! The risk model is served elsewhere; this module only knows its request
//! shape ([`FeatureVector`]) and its two operations.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::weather::WeatherFeatures;

pub use http::HttpInferenceClient;

/// Timestamp layout the model was trained on.
pub const FEATURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Wire Types
// ============================================================================

/// One model input row, serialized with the model server's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Start_Time")]
    pub start_time: String,
    #[serde(rename = "Visibility_mi")]
    pub visibility_mi: f64,
    #[serde(rename = "Wind_Speed_mph")]
    pub wind_speed_mph: f64,
    #[serde(rename = "Precipitation_in")]
    pub precipitation_in: f64,
    #[serde(rename = "Temperature_F")]
    pub temperature_f: f64,
    #[serde(rename = "Wind_Chill_F")]
    pub wind_chill_f: f64,
    #[serde(rename = "Humidity_percent")]
    pub humidity_percent: f64,
    #[serde(rename = "Pressure_in")]
    pub pressure_in: f64,
}

impl FeatureVector {
    pub fn from_weather(weather: &WeatherFeatures, start_time: DateTime<Utc>) -> Self {
        Self {
            start_time: format_feature_time(start_time),
            visibility_mi: weather.visibility_mi,
            wind_speed_mph: weather.wind_speed_mph,
            precipitation_in: weather.precipitation_in,
            temperature_f: weather.temperature_f,
            wind_chill_f: weather.wind_chill_f,
            humidity_percent: weather.humidity_percent,
            pressure_in: weather.pressure_in,
        }
    }

    /// Mild-weather row used when the real conditions are unknown.
    pub fn conservative(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time: format_feature_time(start_time),
            visibility_mi: 10.0,
            wind_speed_mph: 5.0,
            precipitation_in: 0.0,
            temperature_f: 70.0,
            wind_chill_f: 70.0,
            humidity_percent: 50.0,
            pressure_in: 29.92,
        }
    }
}

pub fn format_feature_time(at: DateTime<Utc>) -> String {
    at.format(FEATURE_TIME_FORMAT).to_string()
}

/// Where a prediction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    /// Returned by the model.
    Ai,
    /// Substituted after the model failed for this item.
    Default,
}

/// Model output for one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "P_Severity_3")]
    pub severity_probability: f64,
    #[serde(rename = "predicted_risk_tier")]
    pub tier: u8,
    #[serde(skip, default = "default_source")]
    pub source: PredictionSource,
}

fn default_source() -> PredictionSource {
    PredictionSource::Ai
}

impl Prediction {
    /// Zero-risk stand-in for a failed prediction.
    pub const fn zero() -> Self {
        Self {
            severity_probability: 0.0,
            tier: 0,
            source: PredictionSource::Default,
        }
    }
}

// ============================================================================
// Client Trait
// ============================================================================

/// Errors from the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inference api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed inference response: {0}")]
    Malformed(String),
}

/// Access to the risk model.
///
/// `predict_batch` returns one prediction per input in the same order, or
/// fails as a whole.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn predict_one(&self, features: &FeatureVector) -> Result<Prediction, InferenceError>;

    async fn predict_batch(
        &self,
        features: &[FeatureVector],
    ) -> Result<Vec<Prediction>, InferenceError>;
}
