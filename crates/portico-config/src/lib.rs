//! Configuration for Portico.
//!
//! [`PorticoConfig`] is a flat set of settings with a default for each one.
//! [`ConfigLoader`] layers sources over those defaults, later layers winning:
//!
//! 1. Defaults
//! 2. A TOML (or JSON) file
//! 3. A `.env` file
//! 4. The process environment, or a map injected by tests
//!
//! # Configuration File
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! max_body_bytes = 1048576
//! rate_limit_rps = 50
//! cors_origin = "*"
//! request_timeout_ms = 15000
//! api_versions = ["1", "2"]
//! public_metrics = false
//! log_level = "info"
//! log_format = "json"
//! shutdown_timeout_ms = 30000
//! ```
//!
//! # Environment Variables
//!
//! Each field maps to its upper-case name, optionally prefixed:
//! `PORTICO_PORT=9090`, `PORTICO_API_VERSIONS=1,2`, `PORTICO_API_KEY=...`.
//! Booleans accept `true/false`, `1/0`, `yes/no` and `on/off`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::PorticoConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_KEYS};
