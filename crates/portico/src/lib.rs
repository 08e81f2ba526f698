//! # Portico
//!
//! A request pipeline for HTTP services that sit behind an authenticating
//! gateway. Portico resolves a route, runs an onion of cross-cutting stages
//! around the handler, and answers every failure with the same JSON envelope.
//!
//! ```text
//! Request → ErrorHandler → RequestId → AccessLog → Counters → SecurityHeaders → Cors
//!         → [ApiKey] → Identity → RateLimit → Version → Timeout → JsonBody
//!         → [route stages: RoleGuard, Validation] → Handler
//! ```
//!
//! This crate re-exports the workspace crates and assembles the reference
//! application served by the `portico` binary; see [`App`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portico::config::ConfigLoader;
//! use portico::App;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConfigLoader::new().with_env_prefix("PORTICO").load()?;
//! portico::telemetry::init_logging(&config.log_config())?;
//! App::from_config(config)?.into_server()?.run().await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod handlers;

pub use app::App;

// Re-export the workspace crates
pub use portico_config as config;
pub use portico_core as core;
pub use portico_middleware as middleware;
pub use portico_router as router;
pub use portico_server as server;
pub use portico_telemetry as telemetry;

/// Common imports for writing handlers and assembling pipelines.
pub mod prelude {
    pub use portico_core::{ApiError, ApiResult, ErrorCode, Identity, Schema};
    pub use portico_middleware::stages::*;
    pub use portico_middleware::{
        BoxFuture, Context, Handler, Middleware, Next, Pipeline, Request, Response, Routes,
    };
    pub use portico_server::{Server, ShutdownSignal};
}
