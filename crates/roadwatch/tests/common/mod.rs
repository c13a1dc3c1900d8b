//! Common test utilities.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::extract::connect_info::MockConnectInfo;

use roadwatch::geo::{Coordinate, encode};
use roadwatch::inference::{
    FeatureVector, InferenceClient, InferenceError, Prediction, PredictionSource,
};
use roadwatch::risk::{RiskGateway, RiskLimits};
use roadwatch::scheduler::{SchedulerOptions, SessionScheduler};
use roadwatch::server::{self, AppState};
use roadwatch::session::SessionRegistry;
use roadwatch::weather::{WeatherError, WeatherFeatures, WeatherProvider};

// ============================================================================
// Fake Collaborators
// ============================================================================

pub fn clear_sky() -> WeatherFeatures {
    WeatherFeatures {
        temperature_f: 68.0,
        wind_chill_f: 68.0,
        wind_speed_mph: 5.0,
        visibility_mi: 10.0,
        pressure_in: 30.0,
        precipitation_in: 0.0,
        humidity_percent: 40.0,
        condition_label: "Clear".to_string(),
    }
}

pub struct FixedWeather(pub WeatherFeatures);

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn resolve(&self, _at: Coordinate) -> Result<WeatherFeatures, WeatherError> {
        Ok(self.0.clone())
    }
}

/// Returns the same prediction for every row and counts calls.
pub struct ConstantInference {
    pub severity: f64,
    pub tier: u8,
    pub batch_calls: AtomicUsize,
}

impl ConstantInference {
    pub fn new(severity: f64, tier: u8) -> Self {
        Self {
            severity,
            tier,
            batch_calls: AtomicUsize::new(0),
        }
    }

    fn prediction(&self) -> Prediction {
        Prediction {
            severity_probability: self.severity,
            tier: self.tier,
            source: PredictionSource::Ai,
        }
    }
}

#[async_trait]
impl InferenceClient for ConstantInference {
    async fn predict_one(&self, _features: &FeatureVector) -> Result<Prediction, InferenceError> {
        Ok(self.prediction())
    }

    async fn predict_batch(
        &self,
        features: &[FeatureVector],
    ) -> Result<Vec<Prediction>, InferenceError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(features.iter().map(|_| self.prediction()).collect())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An app wired to in-process collaborators, plus handles for driving ticks.
pub struct TestHarness {
    pub app: Router,
    pub registry: SessionRegistry,
    pub scheduler: SessionScheduler,
    pub inference: Arc<ConstantInference>,
}

pub struct HarnessOptions {
    pub limits: RiskLimits,
    pub api_token: Option<String>,
    pub peer: SocketAddr,
    pub severity: f64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            limits: RiskLimits::default(),
            api_token: None,
            peer: SocketAddr::from(([127, 0, 0, 1], 40000)),
            severity: 0.2,
        }
    }
}

pub fn harness(options: HarnessOptions) -> TestHarness {
    let registry = SessionRegistry::default();
    let inference = Arc::new(ConstantInference::new(options.severity, 1));
    let gateway = RiskGateway::new(
        inference.clone(),
        Arc::new(FixedWeather(clear_sky())),
        options.limits,
    );
    let scheduler = SessionScheduler::new(
        registry.clone(),
        gateway.clone(),
        SchedulerOptions::default(),
    );

    let state = AppState {
        registry: registry.clone(),
        risk_gateway: gateway,
        api_token: options.api_token,
        max_connections: 64,
    };
    let app = server::build_app(state, 300).layer(MockConnectInfo(options.peer));

    TestHarness {
        app,
        registry,
        scheduler,
        inference,
    }
}

/// Create a test app with default state, seen from loopback.
pub fn test_app() -> Router {
    harness(HarnessOptions::default()).app
}

/// Straight route along the equator with `hops` segments of ~`hop_meters`.
pub fn equator_polyline(hops: usize, hop_meters: f64) -> String {
    let step = hop_meters / 111_194.93;
    let points: Vec<Coordinate> = (0..=hops)
        .map(|i| Coordinate::new(0.0, i as f64 * step))
        .collect();
    encode(&points)
}

/// Parse `(event, id, data)` triples from an SSE body. Comment lines are
/// reported as event `:` with the comment text as data.
pub fn parse_sse(body: &str) -> Vec<(String, Option<String>, String)> {
    let mut out = Vec::new();
    let mut event = String::new();
    let mut id = None;
    let mut data = String::new();

    for line in body.lines() {
        if let Some(comment) = line.strip_prefix(':') {
            out.push((":".to_string(), None, comment.trim().to_string()));
        } else if let Some(v) = line.strip_prefix("event:") {
            event = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("id:") {
            id = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("data:") {
            data = v.trim().to_string();
        } else if line.is_empty() && !event.is_empty() {
            out.push((std::mem::take(&mut event), id.take(), std::mem::take(&mut data)));
        }
    }
    if !event.is_empty() {
        out.push((event, id, data));
    }
    out
}
