//! Weather collaborator.
//!
//! Turns a coordinate into the feature set the risk model consumes. The
//! provider trait is the seam; [`HttpWeatherClient`] is the production
//! implementation.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

pub use http::HttpWeatherClient;

/// Weather features at one location, in the units the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherFeatures {
    pub temperature_f: f64,
    pub wind_chill_f: f64,
    pub wind_speed_mph: f64,
    pub visibility_mi: f64,
    pub pressure_in: f64,
    pub precipitation_in: f64,
    pub humidity_percent: f64,
    /// Free-text condition such as "Light Rain" or "Thunderstorm".
    #[serde(default)]
    pub condition_label: String,
}

/// Errors resolving weather for a location.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("weather api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("weather provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves weather features for a coordinate.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn resolve(&self, at: Coordinate) -> Result<WeatherFeatures, WeatherError>;

    /// Drop any cached lookups that have outlived their TTL.
    fn purge_expired(&self) {}
}
