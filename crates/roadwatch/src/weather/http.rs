//! HTTP weather client with a short-lived per-location cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use tokio::time::Instant;
use tracing::debug;

use super::{WeatherError, WeatherFeatures, WeatherProvider};
use crate::geo::Coordinate;

/// Cache key resolution: coordinates are bucketed at 1e-5 degrees (~1 m).
const CACHE_KEY_SCALE: f64 = 1e5;

type CacheKey = (i64, i64);

/// Weather client for a features endpoint of the form
/// `GET {base_url}?lat={lat}&lon={lon}` returning [`WeatherFeatures`] as JSON.
#[derive(Clone)]
pub struct HttpWeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    cache_ttl: Duration,
    cache: Arc<DashMap<CacheKey, (Instant, WeatherFeatures)>>,
}

impl HttpWeatherClient {
    #[must_use]
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            cache_ttl,
            cache: Arc::new(DashMap::new()),
        }
    }

    fn cache_key(at: Coordinate) -> CacheKey {
        (
            (at.lat * CACHE_KEY_SCALE).round() as i64,
            (at.lon * CACHE_KEY_SCALE).round() as i64,
        )
    }

    fn cached(&self, key: &CacheKey) -> Option<WeatherFeatures> {
        let entry = self.cache.get(key)?;
        let (at, features) = entry.value();
        (at.elapsed() < self.cache_ttl).then(|| features.clone())
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherClient {
    async fn resolve(&self, at: Coordinate) -> Result<WeatherFeatures, WeatherError> {
        let key = Self::cache_key(at);
        if let Some(features) = self.cached(&key) {
            return Ok(features);
        }

        let mut req = self
            .client
            .get(&self.base_url)
            .query(&[("lat", at.lat), ("lon", at.lon)]);

        if let Some(ref key) = self.api_key {
            req = req.header("x-api-key", key);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Api { status, message });
        }

        let features: WeatherFeatures = response.json().await?;
        debug!(lat = at.lat, lon = at.lon, "Fetched weather features");

        if !self.cache_ttl.is_zero() {
            self.cache.insert(key, (Instant::now(), features.clone()));
        }
        Ok(features)
    }

    fn purge_expired(&self) {
        let ttl = self.cache_ttl;
        self.cache.retain(|_, (at, _)| at.elapsed() < ttl);
    }
}
