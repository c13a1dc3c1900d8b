//! In-process collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::geo::Coordinate;
use crate::inference::{FeatureVector, InferenceClient, InferenceError, Prediction};
use crate::weather::{WeatherError, WeatherFeatures, WeatherProvider};

pub fn rainy() -> WeatherFeatures {
    WeatherFeatures {
        temperature_f: 52.0,
        wind_chill_f: 50.0,
        wind_speed_mph: 8.0,
        visibility_mi: 6.0,
        pressure_in: 29.7,
        precipitation_in: 0.2,
        humidity_percent: 90.0,
        condition_label: "Rain".to_string(),
    }
}

// ============================================================================
// Weather
// ============================================================================

/// Returns canned features, cycling through the list in call order.
pub struct FixedWeather {
    features: Vec<WeatherFeatures>,
    pub calls: AtomicUsize,
}

impl FixedWeather {
    pub fn new(features: WeatherFeatures) -> Self {
        Self::sequence(vec![features])
    }

    pub fn sequence(features: Vec<WeatherFeatures>) -> Self {
        Self {
            features,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn resolve(&self, _at: Coordinate) -> Result<WeatherFeatures, WeatherError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.features[n % self.features.len()].clone())
    }
}

#[derive(Default)]
pub struct FailingWeather {
    pub calls: AtomicUsize,
}

#[async_trait]
impl WeatherProvider for FailingWeather {
    async fn resolve(&self, _at: Coordinate) -> Result<WeatherFeatures, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WeatherError::Unavailable("weather offline".to_string()))
    }
}

/// Answers only after `delay`; use with paused time.
pub struct SlowWeather {
    delay: Duration,
    features: WeatherFeatures,
}

impl SlowWeather {
    pub fn new(delay: Duration, features: WeatherFeatures) -> Self {
        Self { delay, features }
    }
}

#[async_trait]
impl WeatherProvider for SlowWeather {
    async fn resolve(&self, _at: Coordinate) -> Result<WeatherFeatures, WeatherError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.features.clone())
    }
}

// ============================================================================
// Inference
// ============================================================================

enum Script {
    Constant { severity: f64, tier: u8 },
    /// Severity is a tenth of visibility; zero visibility fails.
    ByVisibility,
}

pub struct ScriptedInference {
    script: Script,
    fail_batch: bool,
    short_batch: bool,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl ScriptedInference {
    fn with(script: Script) -> Self {
        Self {
            script,
            fail_batch: false,
            short_batch: false,
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(severity: f64, tier: u8) -> Self {
        Self::with(Script::Constant { severity, tier })
    }

    pub fn by_visibility() -> Self {
        Self::with(Script::ByVisibility)
    }

    pub fn failing_batch(mut self) -> Self {
        self.fail_batch = true;
        self
    }

    pub fn short_batch(mut self) -> Self {
        self.short_batch = true;
        self
    }

    fn score(&self, row: &FeatureVector) -> Result<Prediction, InferenceError> {
        let (severity, tier) = match self.script {
            Script::Constant { severity, tier } => (severity, tier),
            Script::ByVisibility => {
                if row.visibility_mi == 0.0 {
                    return Err(InferenceError::Api {
                        status: 500,
                        message: "model exploded".to_string(),
                    });
                }
                (row.visibility_mi * 0.1, 1)
            }
        };
        Ok(Prediction {
            severity_probability: severity,
            tier,
            source: crate::inference::PredictionSource::Ai,
        })
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn predict_one(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.score(features)
    }

    async fn predict_batch(
        &self,
        features: &[FeatureVector],
    ) -> Result<Vec<Prediction>, InferenceError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch {
            return Err(InferenceError::Api {
                status: 503,
                message: "batch unavailable".to_string(),
            });
        }
        let mut out = features
            .iter()
            .map(|row| self.score(row))
            .collect::<Result<Vec<_>, _>>()?;
        if self.short_batch {
            out.pop();
        }
        Ok(out)
    }
}
