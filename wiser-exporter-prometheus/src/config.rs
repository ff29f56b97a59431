//! Configuration for the Wiser exporter.
//!
//! Values come from an optional JSON5 file, then environment variables and
//! CLI flags (see [`crate::args::ExporterArgs`]), which take precedence.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Hub connection settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Polling settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hub connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub address (`WISER_HUBHOST`).
    #[serde(default)]
    pub host: Option<String>,

    /// Hub secret (`WISER_HUBSECRET`).
    #[serde(default)]
    pub secret: Option<String>,

    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: None,
            secret: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8000").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between the end of one cycle and the start of the next (`WISER_DELAY`).
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
}

fn default_delay() -> u64 {
    60
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,

    /// Log hub identity and every room's derived values (`WISER_DEBUG`).
    #[serde(default)]
    pub debug: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Level actually used: the debug flag raises anything coarser than `debug`.
    pub fn effective_level(&self) -> &str {
        if self.debug && !self.level.eq_ignore_ascii_case("trace") {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings supplied by environment variables or CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub hub_host: Option<String>,
    pub hub_secret: Option<String>,
    pub debug: bool,
    pub delay_secs: Option<u64>,
    pub listen: Option<String>,
    pub log_level: Option<String>,
}

/// Hub connection settings after validation.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub host: String,
    pub secret: String,
    pub timeout: Duration,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// Required settings are not checked here since they may still come
    /// from the environment; call [`validate`](Self::validate) after
    /// applying overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        Ok(config)
    }

    /// Apply environment and CLI settings on top of the file values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.hub_host {
            self.hub.host = Some(host);
        }
        if let Some(secret) = overrides.hub_secret {
            self.hub.secret = Some(secret);
        }
        if overrides.debug {
            self.logging.debug = true;
        }
        if let Some(delay) = overrides.delay_secs {
            self.poll.delay_secs = delay;
        }
        if let Some(listen) = overrides.listen {
            self.prometheus.listen = listen;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hub_settings()?;

        if self.hub.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "hub timeout_secs must be > 0".to_string(),
            ));
        }

        if self.poll.delay_secs == 0 {
            return Err(ConfigError::Validation(
                "poll delay_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        self.listen_addr()?;

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated hub settings; fails if host or secret is missing.
    pub fn hub_settings(&self) -> Result<HubSettings, ConfigError> {
        let host = non_empty(self.hub.host.as_deref()).ok_or(ConfigError::Missing(
            "hub host (set WISER_HUBHOST or --hub-host)",
        ))?;
        let secret = non_empty(self.hub.secret.as_deref()).ok_or(ConfigError::Missing(
            "hub secret (set WISER_HUBSECRET or --hub-secret)",
        ))?;

        Ok(HubSettings {
            host: host.to_string(),
            secret: secret.to_string(),
            timeout: Duration::from_secs(self.hub.timeout_secs),
        })
    }

    /// Parsed listen address of the metrics endpoint.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.prometheus.listen.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            ))
        })
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll.delay_secs)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
