//! Request deadline and cooperative cancellation.
//!
//! The stage installs a fresh [`CancellationToken`] in the context and runs
//! the rest of the chain under [`tokio::time::timeout`]. Whichever finishes
//! first decides the response:
//!
//! - the chain: its result is passed through and the token stays live
//! - the deadline: the chain future is dropped, the token is cancelled and a
//!   `504 GATEWAY_TIMEOUT` envelope is returned from here
//!
//! Dropping the chain future means a late handler can never produce a second
//! response. Work that outlives the chain, such as a spawned task holding a
//! clone of the token, observes the cancellation instead.
//!
//! If the whole request future is dropped (client went away), the token's
//! drop guard cancels it as well.

use std::time::Duration;

use portico_core::{ApiError, ApiResult, Request, Response};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Aborts requests that run past a deadline.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    deadline: Duration,
}

impl TimeoutMiddleware {
    /// Sets the deadline for the rest of the chain.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// The configured deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let token = CancellationToken::new();
            ctx.set_cancellation(token.clone());
            let guard = token.clone().drop_guard();

            let outcome = tokio::time::timeout(self.deadline, next.run(ctx, request)).await;
            match outcome {
                Ok(result) => {
                    let _ = guard.disarm();
                    result
                }
                Err(_elapsed) => {
                    ctx.mark_timed_out();
                    token.cancel();
                    drop(guard);
                    tracing::warn!(
                        correlation_id = ctx.correlation_id(),
                        deadline_ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX),
                        "request deadline exceeded"
                    );
                    Ok(ctx.error(&ApiError::gateway_timeout("Request timed out")))
                }
            }
        })
    }
}
