//! # Portico Server
//!
//! The process shell around a [`Pipeline`](portico_middleware::Pipeline):
//!
//! - [`Server`]: a hyper HTTP/1.1 accept loop, one task per connection, each
//!   request body boxed into the streaming pipeline body
//! - [`ShutdownSignal`]: SIGTERM/ctrl-c handling shared by every task
//! - [`HealthCheck`] and [`ReadinessCheck`]: liveness and readiness bodies
//!
//! Shutdown runs in this order: stop accepting, mark not ready, ask open
//! connections to finish their current request, wait up to the grace period.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;

pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use server::{Server, ServerBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use shutdown::{ConnectionGuard, ConnectionTracker, ShutdownSignal};
