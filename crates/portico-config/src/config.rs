//! The Portico configuration schema.

use std::net::SocketAddr;
use std::time::Duration;

use portico_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Everything the pipeline and the server read at startup.
///
/// Every field has a default, so a file only names what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PorticoConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// Largest accepted JSON body, in bytes.
    pub max_body_bytes: usize,

    /// Sustained requests per second per client; also the burst size.
    pub rate_limit_rps: u32,

    /// Value of `access-control-allow-origin`.
    pub cors_origin: String,

    /// Per-request deadline in milliseconds.
    pub request_timeout_ms: u64,

    /// Supported API versions, default first.
    pub api_versions: Vec<String>,

    /// Shared secret for the API-key stage. Unset disables the stage.
    pub api_key: Option<String>,

    /// Serve `/metrics` without a key.
    pub public_metrics: bool,

    /// Serve `/events` routes without a key.
    pub public_events: bool,

    /// Log filter directives.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Grace period for in-flight connections on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Put internal error messages into envelopes instead of the generic text.
    pub expose_internal_errors: bool,
}

impl Default for PorticoConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 1_048_576,
            rate_limit_rps: 50,
            cors_origin: "*".to_string(),
            request_timeout_ms: 15_000,
            api_versions: vec!["1".to_string()],
            api_key: None,
            public_metrics: false,
            public_events: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            shutdown_timeout_ms: 30_000,
            expose_internal_errors: false,
        }
    }
}

impl PorticoConfig {
    /// Checks the values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::validation_error(
                "rate_limit_rps must be greater than zero",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::validation_error(
                "max_body_bytes must be greater than zero",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::validation_error(
                "request_timeout_ms must be greater than zero",
            ));
        }
        if self.api_versions.iter().all(|v| v.trim().is_empty()) {
            return Err(ConfigError::validation_error(
                "api_versions must name at least one version",
            ));
        }
        if matches!(&self.api_key, Some(key) if key.is_empty()) {
            return Err(ConfigError::validation_error("api_key must not be empty"));
        }
        Ok(())
    }

    /// The socket address built from `host` and `port`.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::invalid_value("host", format!("{}: {e}", self.host)))
    }

    /// The per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The shutdown grace period.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Logging settings derived from `log_level` and `log_format`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = match self.log_format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        base.with_level(self.log_level.clone())
    }
}
