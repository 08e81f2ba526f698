//! One structured access record per request.

use http::header::{HeaderName, HeaderValue};
use portico_core::{ApiResult, Request, Response};
use portico_telemetry::metrics::REQUEST_DURATION_SECONDS;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Log target for access records.
pub const ACCESS_TARGET: &str = "portico::access";

/// Response header carrying the handling time.
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Emits an `info` record on [`ACCESS_TARGET`] once the chain completes.
///
/// The status of a signaled error is the status its envelope will carry.
#[derive(Debug, Clone, Default)]
pub struct AccessLogMiddleware;

impl AccessLogMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &'static str {
        "access-log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let result = next.run(ctx, request).await;

            let elapsed = ctx.elapsed();
            let status = match &result {
                Ok(response) => response.status(),
                Err(error) => error.status(),
            };
            let duration_ms = elapsed.as_secs_f64() * 1000.0;

            tracing::info!(
                target: ACCESS_TARGET,
                timestamp = %chrono::Utc::now().to_rfc3339(),
                request_id = ctx.request_id(),
                correlation_id = ctx.correlation_id(),
                method = %ctx.method(),
                path = ctx.path(),
                status = status.as_u16(),
                duration_ms,
                "request completed"
            );
            metrics::histogram!(REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());

            if let Ok(value) = HeaderValue::from_str(&format!("{duration_ms:.3}ms")) {
                ctx.stage_header(HeaderName::from_static(RESPONSE_TIME_HEADER), value);
            }
            result
        })
    }
}
