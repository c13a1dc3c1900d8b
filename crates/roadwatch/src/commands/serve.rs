//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use roadwatch::config::Config;
use roadwatch::inference::HttpInferenceClient;
use roadwatch::risk::{RiskGateway, RiskLimits};
use roadwatch::scheduler::{SchedulerOptions, SessionScheduler};
use roadwatch::server::{self, AppState};
use roadwatch::session::{RegistryOptions, SessionRegistry};
use roadwatch::weather::HttpWeatherClient;

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path).await?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    // Collaborators enforce their own request timeouts
    let weather_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.services.weather.timeout_seconds))
        .build()
        .context("Failed to build weather HTTP client")?;
    let weather = HttpWeatherClient::new(
        weather_http,
        config.services.weather.base_url.clone(),
        config.services.weather.api_key.clone(),
        Duration::from_secs(config.services.weather.cache_ttl_seconds),
    );

    let inference_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.services.inference.timeout_seconds))
        .build()
        .context("Failed to build inference HTTP client")?;
    let inference =
        HttpInferenceClient::new(inference_http, config.services.inference.base_url.clone());

    info!(
        weather_url = %config.services.weather.base_url,
        inference_url = %config.services.inference.base_url,
        "Collaborators configured"
    );

    let registry = SessionRegistry::new(RegistryOptions {
        replay_buffer: config.navigation.replay_buffer,
        ..RegistryOptions::default()
    });
    let risk_gateway = RiskGateway::new(
        Arc::new(inference),
        Arc::new(weather),
        RiskLimits::from(&config.risk),
    );

    let scheduler = SessionScheduler::new(
        registry.clone(),
        risk_gateway.clone(),
        SchedulerOptions::from(&config.navigation),
    );
    let scheduler_handle = scheduler.start();

    let state = AppState {
        registry: registry.clone(),
        risk_gateway,
        api_token: config.server.api_token.clone(),
        max_connections: config.server.max_connections,
    };
    if state.api_token.is_none() {
        warn!("No api_token configured, API accepts loopback connections only");
    }

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Starting server");
    let shutdown_registry = registry.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Open SSE streams only close once their session ends
        shutdown_registry.shutdown();
    })
    .await?;

    scheduler_handle.shutdown().await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
