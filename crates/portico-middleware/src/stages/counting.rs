//! Request counting.

use std::sync::Arc;

use portico_core::{ApiResult, Request, Response};
use portico_telemetry::metrics::REQUESTS_TOTAL;

use crate::context::Context;
use crate::counters::{RequestCounters, UNMATCHED_PATH};
use crate::middleware::{BoxFuture, Middleware, Next};

/// Updates [`RequestCounters`] and the `portico_requests_total` metric.
///
/// Requests are keyed by route pattern so that path parameters do not blow up
/// the key space.
#[derive(Debug, Clone)]
pub struct CountersMiddleware {
    counters: Arc<RequestCounters>,
}

impl CountersMiddleware {
    /// Counts into `counters`.
    #[must_use]
    pub fn new(counters: Arc<RequestCounters>) -> Self {
        Self { counters }
    }

    /// The shared counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<RequestCounters> {
        &self.counters
    }
}

impl Middleware for CountersMiddleware {
    fn name(&self) -> &'static str {
        "counters"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let result = next.run(ctx, request).await;

            let status = match &result {
                Ok(response) => response.status(),
                Err(error) => error.status(),
            };
            let path = ctx.route_pattern().unwrap_or(UNMATCHED_PATH).to_string();
            self.counters.record(&path, status.as_u16());
            metrics::counter!(
                REQUESTS_TOTAL,
                "path" => path,
                "status" => status.as_u16().to_string()
            )
            .increment(1);

            result
        })
    }
}
