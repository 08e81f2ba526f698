//! Per-client rate limiting.
//!
//! Clients are keyed by the first `x-forwarded-for` entry, falling back to
//! the peer address and finally to `"unknown"`. Each key draws from a
//! [`TokenBucketLimiter`] shared by every request.
//!
//! An admitted request gets `x-ratelimit-limit` and `x-ratelimit-remaining`.
//! A throttled one is signaled as `TOO_MANY_REQUESTS` with a `retry-after`
//! hint in whole seconds; the error handler renders it.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use portico_core::{ApiError, ApiResult, Request, Response};
use portico_telemetry::metrics::RATE_LIMITED_TOTAL;

use crate::context::Context;
use crate::limiter::{RateDecision, TokenBucketLimiter};
use crate::middleware::{BoxFuture, Middleware, Next};

/// Rate limit header names.
pub mod headers {
    /// Bucket capacity.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Whole tokens left after this request.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Proxy chain, first entry is the client.
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
}

/// Key used when no client address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Throttles clients through a shared token bucket table.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<TokenBucketLimiter>,
}

impl RateLimitMiddleware {
    /// Draws from `limiter`.
    #[must_use]
    pub fn new(limiter: Arc<TokenBucketLimiter>) -> Self {
        Self { limiter }
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    /// Client key for `request`.
    #[must_use]
    pub fn client_key(ctx: &Context, request: &Request) -> String {
        request
            .headers()
            .get(headers::FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(ToString::to_string)
            .or_else(|| ctx.remote_addr().map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Whole seconds to wait, rounded up and never below one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn retry_after_secs(wait: std::time::Duration) -> u64 {
    (wait.as_secs_f64().ceil() as u64).max(1)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn limit_header(capacity: f64) -> HeaderValue {
    HeaderValue::from(capacity.floor() as u64)
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let key = Self::client_key(ctx, &request);
            match self.limiter.allow(&key) {
                RateDecision::Allowed { remaining } => {
                    ctx.stage_header(
                        HeaderName::from_static(headers::LIMIT),
                        limit_header(self.limiter.capacity()),
                    );
                    ctx.stage_header(
                        HeaderName::from_static(headers::REMAINING),
                        HeaderValue::from(remaining),
                    );
                    next.run(ctx, request).await
                }
                RateDecision::Limited { retry_after } => {
                    tracing::debug!(client = %key, ?retry_after, "rate limited");
                    metrics::counter!(RATE_LIMITED_TOTAL).increment(1);
                    Err(ApiError::too_many_requests(
                        "Too many requests",
                        retry_after_secs(retry_after),
                    ))
                }
            }
        })
    }
}
