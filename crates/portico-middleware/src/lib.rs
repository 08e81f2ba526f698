//! # Portico Middleware
//!
//! The onion pipeline that runs around every Portico handler.
//!
//! ```text
//! Request → ErrorHandler → RequestId → … → JsonBody → [route stages] → Handler
//!                                                                         ↓
//! Response ← ErrorHandler ← RequestId ← … ← JsonBody ← [route stages] ←───┘
//! ```
//!
//! Each stage gets the per-request [`Context`], the request and a [`Next`]
//! continuation. Calling `next.run(..)` hands control inward; returning without
//! calling it short-circuits. Errors travel outward as
//! [`ApiError`](portico_core::ApiError) values until the error handler renders
//! them.
//!
//! Shared state (the rate limiter table, the request counters) is owned by the
//! stages that use it and handed out through `Arc`, never kept in globals.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use portico_middleware::limiter::TokenBucketLimiter;
//! use portico_middleware::stages::{
//!     ErrorHandlerMiddleware, RateLimitMiddleware, RequestIdMiddleware, TimeoutMiddleware,
//! };
//! use portico_middleware::{BoxFuture, Context, Pipeline, Request, Response, Routes};
//! use portico_core::ApiResult;
//! use http::StatusCode;
//!
//! fn hello(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
//!     Box::pin(async move { Ok(ctx.text(StatusCode::OK, "hello")) })
//! }
//!
//! let mut routes = Routes::new();
//! routes.get("/hello", hello).unwrap();
//!
//! let pipeline = Pipeline::builder()
//!     .stage(ErrorHandlerMiddleware::new())
//!     .stage(RequestIdMiddleware::new())
//!     .stage(RateLimitMiddleware::new(Arc::new(TokenBucketLimiter::per_second(50))))
//!     .stage(TimeoutMiddleware::new(Duration::from_secs(15)))
//!     .routes(routes)
//!     .build();
//!
//! assert_eq!(pipeline.stage_count(), 4);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod counters;
pub mod limiter;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod stages;

pub use context::Context;
pub use counters::{CounterSnapshot, RequestCounters};
pub use limiter::{RateDecision, TokenBucketLimiter};
pub use middleware::{BoxFuture, BoxedMiddleware, FnMiddleware, Handler, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use portico_core::{Request, Response};
pub use routes::{Endpoint, RouteBuilder, Routes};
