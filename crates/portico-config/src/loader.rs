//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//!
//! 1. Defaults
//! 2. A configuration file (TOML, or JSON by extension)
//! 3. A `.env` file
//! 4. The process environment, or an injected map

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use portico_telemetry::LogFormat;

use crate::{ConfigError, PorticoConfig};

/// Keys read from the environment, without prefix.
pub const ENV_KEYS: &[&str] = &[
    "HOST",
    "PORT",
    "MAX_BODY_BYTES",
    "RATE_LIMIT_RPS",
    "CORS_ORIGIN",
    "REQUEST_TIMEOUT_MS",
    "API_VERSIONS",
    "API_KEY",
    "PUBLIC_METRICS",
    "PUBLIC_EVENTS",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "SHUTDOWN_TIMEOUT_MS",
    "EXPOSE_INTERNAL_ERRORS",
];

#[derive(Debug)]
enum EnvSource {
    Process,
    Map(HashMap<String, String>),
}

/// Builds a [`PorticoConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use portico_config::ConfigLoader;
///
/// # fn main() -> Result<(), portico_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("portico.toml")?
///     .with_optional_dotenv(".env")?
///     .with_env_prefix("PORTICO")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PorticoConfig,
    env_prefix: Option<String>,
    dotenv: HashMap<String, String>,
    env: EnvSource,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from the defaults, reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PorticoConfig::default(),
            env_prefix: None,
            dotenv: HashMap::new(),
            env: EnvSource::Process,
            file_loaded: false,
        }
    }

    /// Resets the file layer to the defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PorticoConfig::default();
        self.file_loaded = false;
        self
    }

    /// Loads a configuration file, which must exist.
    ///
    /// `.json` files are parsed as JSON, everything else as TOML.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        self.config = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        self.file_loaded = true;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(self)
    }

    /// Loads a configuration file if it exists.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `"toml"` or `"json"` format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        self.file_loaded = true;
        Ok(self)
    }

    /// Reads a `.env` file, which must exist.
    ///
    /// Its entries sit below the environment layer and are not exported to the
    /// process.
    pub fn with_dotenv(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let entries =
            dotenvy::from_path_iter(path).map_err(|e| ConfigError::dotenv_error(path, e))?;
        for entry in entries {
            let (key, value) = entry.map_err(|e| ConfigError::dotenv_error(path, e))?;
            self.dotenv.insert(key, value);
        }
        tracing::debug!(path = %path.display(), "loaded env file");
        Ok(self)
    }

    /// Reads a `.env` file if it exists.
    pub fn with_optional_dotenv(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_dotenv(path)
        } else {
            Ok(self)
        }
    }

    /// Reads `{PREFIX}_{KEY}` instead of bare keys, e.g. `PORTICO_PORT`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('_').to_ascii_uppercase();
        self.env_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Replaces the process environment with `vars`.
    #[must_use]
    pub fn with_env_map<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = EnvSource::Map(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Whether a file or string layer was applied.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Applies the environment layers and validates the result.
    pub fn load(self) -> Result<PorticoConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment layers without validating.
    pub fn load_unvalidated(mut self) -> Result<PorticoConfig, ConfigError> {
        for key in ENV_KEYS {
            let var = self.var_name(key);
            if let Some(value) = self.lookup(&var) {
                apply_env_var(&mut self.config, key, &var, &value)?;
            }
        }
        Ok(self.config)
    }

    fn var_name(&self, key: &str) -> String {
        match &self.env_prefix {
            Some(prefix) => format!("{prefix}_{key}"),
            None => key.to_string(),
        }
    }

    fn lookup(&self, var: &str) -> Option<String> {
        let from_env = match &self.env {
            EnvSource::Process => env::var(var).ok(),
            EnvSource::Map(map) => map.get(var).cloned(),
        };
        from_env.or_else(|| self.dotenv.get(var).cloned())
    }
}

fn apply_env_var(
    config: &mut PorticoConfig,
    key: &str,
    var: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let value = value.trim();
    match key {
        "HOST" => config.host = value.to_string(),
        "PORT" => config.port = parse_number(var, value)?,
        "MAX_BODY_BYTES" => config.max_body_bytes = parse_number(var, value)?,
        "RATE_LIMIT_RPS" => config.rate_limit_rps = parse_number(var, value)?,
        "CORS_ORIGIN" => config.cors_origin = value.to_string(),
        "REQUEST_TIMEOUT_MS" => config.request_timeout_ms = parse_number(var, value)?,
        "API_VERSIONS" => {
            config.api_versions = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }
        "API_KEY" => config.api_key = (!value.is_empty()).then(|| value.to_string()),
        "PUBLIC_METRICS" => config.public_metrics = parse_flag(var, value)?,
        "PUBLIC_EVENTS" => config.public_events = parse_flag(var, value)?,
        "LOG_LEVEL" => config.log_level = value.to_string(),
        "LOG_FORMAT" => {
            config.log_format = LogFormat::from_str(value)
                .map_err(|e| ConfigError::env_parse_error(var, e.to_string()))?;
        }
        "SHUTDOWN_TIMEOUT_MS" => config.shutdown_timeout_ms = parse_number(var, value)?,
        "EXPOSE_INTERNAL_ERRORS" => config.expose_internal_errors = parse_flag(var, value)?,
        _ => tracing::warn!(var, "ignoring unknown configuration key"),
    }
    Ok(())
}

fn parse_number<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::env_parse_error(var, e.to_string()))
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(var, "expected boolean"))
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
