//! The middleware and handler traits, and the continuation that links them.
//!
//! Every stage wraps the rest of the chain: code before `next.run(..)` runs on
//! the way in, code after it on the way out. A stage short-circuits by
//! returning without calling `next`, either with a response or with an
//! [`ApiError`].
//!
//! # Example
//!
//! ```
//! use portico_middleware::{BoxFuture, Context, Middleware, Next, Request, Response};
//! use portico_core::ApiResult;
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut Context,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ApiResult<Response>> {
//!         Box::pin(async move {
//!             let result = next.run(ctx, request).await;
//!             tracing::debug!(elapsed_ms = ctx.elapsed().as_millis() as u64, "chain finished");
//!             result
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use portico_core::{ApiError, ApiResult, Request, Response};

use crate::context::Context;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shareable middleware stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A stage in the onion chain.
pub trait Middleware: Send + Sync + 'static {
    /// Stage name used in logs and cursor diagnostics.
    fn name(&self) -> &'static str;

    /// Runs the stage.
    ///
    /// `next` is consumed by `run`, so a stage can continue the chain at most
    /// once.
    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>>;
}

/// The business handler at the end of the chain.
///
/// Implemented for plain functions of the shape
/// `fn(&mut Context, Request) -> BoxFuture<'_, ApiResult<Response>>`.
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    fn call<'a>(&'a self, ctx: &'a mut Context, request: Request)
        -> BoxFuture<'a, ApiResult<Response>>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, Request) -> BoxFuture<'a, ApiResult<Response>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        self(ctx, request)
    }
}

/// Everything one dispatch walks through.
#[derive(Clone, Copy)]
pub(crate) struct Chain<'a> {
    pub(crate) global: &'a [BoxedMiddleware],
    pub(crate) route: &'a [BoxedMiddleware],
    pub(crate) handler: Option<&'a dyn Handler>,
}

impl<'a> Chain<'a> {
    fn len(&self) -> usize {
        self.global.len() + self.route.len()
    }

    fn stage(&self, index: usize) -> Option<&'a dyn Middleware> {
        if index < self.global.len() {
            Some(self.global[index].as_ref())
        } else {
            self.route
                .get(index - self.global.len())
                .map(AsRef::as_ref)
        }
    }
}

/// Continuation to the rest of the chain.
///
/// Consumed by [`Next::run`]. Each run also advances the context's stage
/// cursor, which panics if a stage index is entered out of order.
pub struct Next<'a> {
    chain: Chain<'a>,
    index: usize,
}

impl<'a> Next<'a> {
    pub(crate) fn start(chain: Chain<'a>) -> Self {
        Self { chain, index: 0 }
    }

    /// Index of the stage this continuation enters.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` when this continuation invokes the handler.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.index >= self.chain.len()
    }

    /// Runs the next stage, or the handler once every stage has been entered.
    ///
    /// With no matched route the terminal stage signals `NOT_FOUND`.
    pub async fn run(self, ctx: &mut Context, request: Request) -> ApiResult<Response> {
        let Self { chain, index } = self;
        match chain.stage(index) {
            Some(stage) => {
                ctx.advance_cursor(index, stage.name());
                let next = Self {
                    chain,
                    index: index + 1,
                };
                stage.process(ctx, request, next).await
            }
            None => {
                ctx.advance_cursor(index, "handler");
                match chain.handler {
                    Some(handler) => handler.call(ctx, request).await,
                    None => Err(ApiError::not_found(format!(
                        "No route for {} {}",
                        ctx.method(),
                        ctx.path()
                    ))),
                }
            }
        }
    }
}

/// A middleware built from a function.
///
/// ```
/// use portico_middleware::{BoxFuture, Context, FnMiddleware, Next, Request, Response};
/// use portico_core::ApiResult;
///
/// fn tag<'a>(
///     ctx: &'a mut Context,
///     request: Request,
///     next: Next<'a>,
/// ) -> BoxFuture<'a, ApiResult<Response>> {
///     Box::pin(async move {
///         ctx.set_extension("tagged");
///         next.run(ctx, request).await
///     })
/// }
///
/// let stage = FnMiddleware::new("tag", tag);
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Wraps `func` as a stage called `name`.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Request, Next<'a>) -> BoxFuture<'a, ApiResult<Response>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        (self.func)(ctx, request, next)
    }
}
