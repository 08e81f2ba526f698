//! Observability plumbing for Portico.
//!
//! - **Logging**: a `tracing-subscriber` registry with an `EnvFilter` and a
//!   JSON or pretty fmt layer, see [`logging`].
//! - **Metrics**: the names and descriptions of the metrics Portico emits
//!   through the `metrics` facade, see [`metrics`].
//!
//! Request and correlation ids are recorded on a span opened by the request-id
//! stage, so every event inside a request carries them when the JSON format is
//! selected.
//!
//! # Example
//!
//! ```rust,no_run
//! use portico_telemetry::{init_logging, LogConfig};
//!
//! let config = LogConfig::production().with_level("info,portico=debug");
//! init_logging(&config)?;
//! portico_telemetry::metrics::describe_metrics();
//! # Ok::<(), portico_telemetry::TelemetryError>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
