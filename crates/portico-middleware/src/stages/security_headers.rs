//! Hardening headers for API responses.

use http::header::{HeaderName, HeaderValue};
use portico_core::{ApiResult, Request, Response};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// The fixed header set, in staging order.
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

/// Stages [`SECURITY_HEADERS`] on every response, error envelopes included.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeadersMiddleware;

impl SecurityHeadersMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        "security-headers"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            for (name, value) in SECURITY_HEADERS {
                ctx.stage_header(HeaderName::from_static(name), HeaderValue::from_static(value));
            }
            next.run(ctx, request).await
        })
    }
}
