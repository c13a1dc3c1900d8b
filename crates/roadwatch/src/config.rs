use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_connections() -> usize {
    1024
}

fn default_service_timeout() -> u64 {
    10
}

fn default_weather_cache_ttl() -> u64 {
    600
}

fn default_inference_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_weather_url() -> String {
    "http://127.0.0.1:8001/weather".to_string()
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// Nested expansion (`${VAR:-${DEFAULT}}`) is not supported.
///
/// ```yaml
/// services:
///   weather:
///     api_key: ${WEATHER_API_KEY}
///     base_url: ${WEATHER_URL:-http://weather.internal/features}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&parse_var_reference(&mut chars)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse a variable reference after seeing `${`, up to and including `}`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut closed = false;

    while let Some(c) = chars.next() {
        match c {
            '}' => {
                closed = true;
                break;
            }
            ':' if default_value.is_none() && chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            _ => match default_value.as_mut() {
                Some(default) => default.push(c),
                None => var_name.push(c),
            },
        }
    }

    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Optional API token. If set, `/api/v1` requires `Authorization: Bearer <token>`.
    /// If not set, `/api/v1` only accepts requests from localhost.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            api_token: None,
            max_connections: default_max_connections(),
        }
    }
}

// ============================================================================
// NavigationConfig
// ============================================================================

/// Session engine timing and geometry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub risk_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Idle time after which an unwatched session is removed.
    pub session_timeout_seconds: u64,
    /// Remaining distance at which a trip counts as arrived.
    pub arrival_threshold_meters: f64,
    pub look_ahead_meters: f64,
    pub max_corridor_points: usize,
    /// Risk updates kept per session for stream resumption; 0 disables.
    pub replay_buffer: usize,
    pub max_concurrent_sessions: usize,
    /// Upper bound on one session's work within a risk tick.
    pub session_update_timeout_seconds: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            risk_interval_seconds: 30,
            heartbeat_interval_seconds: 30,
            cleanup_interval_seconds: 60,
            session_timeout_seconds: 60,
            arrival_threshold_meters: 100.0,
            look_ahead_meters: 5000.0,
            max_corridor_points: 10,
            replay_buffer: 16,
            max_concurrent_sessions: 16,
            session_update_timeout_seconds: 20,
        }
    }
}

// ============================================================================
// RiskConfig
// ============================================================================

/// Client batch limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub batch_max: usize,
    pub rate_per_minute: usize,
    pub idempotency_ttl_seconds: u64,
    pub fallback_concurrency: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            batch_max: 12,
            rate_per_minute: 60,
            idempotency_ttl_seconds: 60,
            fallback_concurrency: 4,
        }
    }
}

// ============================================================================
// ServicesConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub weather: WeatherServiceConfig,
    #[serde(default)]
    pub inference: InferenceServiceConfig,
}

#[derive(Debug, Deserialize)]
pub struct WeatherServiceConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_service_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_weather_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for WeatherServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            api_key: None,
            timeout_seconds: default_service_timeout(),
            cache_ttl_seconds: default_weather_cache_ttl(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InferenceServiceConfig {
    #[serde(default = "default_inference_url")]
    pub base_url: String,
    #[serde(default = "default_service_timeout")]
    pub timeout_seconds: u64,
}

impl Default for InferenceServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            timeout_seconds: default_service_timeout(),
        }
    }
}
