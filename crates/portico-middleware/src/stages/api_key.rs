//! Shared-secret authentication.
//!
//! Only installed when an API key is configured. A request is accepted if it
//! carries the key in `x-api-key` or as `authorization: Bearer <key>`. The
//! comparison is constant time over the key bytes.
//!
//! Health probes are always exempt. The metrics path and the events prefix
//! can be opened up separately.

use portico_core::{ApiError, ApiResult, Request, Response};
use subtle::ConstantTimeEq;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Header carrying the key directly.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Liveness probe path.
pub const LIVENESS_PATH: &str = "/health/live";

/// Readiness probe path.
pub const READINESS_PATH: &str = "/health/ready";

/// Counter snapshot path.
pub const METRICS_PATH: &str = "/metrics";

/// Prefix of event stream paths.
pub const EVENTS_PREFIX: &str = "/events";

/// Rejects requests without the configured key.
pub struct ApiKeyMiddleware {
    key: Vec<u8>,
    exempt_paths: Vec<String>,
    exempt_prefixes: Vec<String>,
}

impl std::fmt::Debug for ApiKeyMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyMiddleware")
            .field("key", &"<redacted>")
            .field("exempt_paths", &self.exempt_paths)
            .field("exempt_prefixes", &self.exempt_prefixes)
            .finish()
    }
}

impl ApiKeyMiddleware {
    /// Requires `key` everywhere except the health probes.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into().into_bytes(),
            exempt_paths: vec![LIVENESS_PATH.to_string(), READINESS_PATH.to_string()],
            exempt_prefixes: Vec::new(),
        }
    }

    /// Lets [`METRICS_PATH`] through without a key.
    #[must_use]
    pub fn public_metrics(self, public: bool) -> Self {
        if public {
            self.exempt_path(METRICS_PATH)
        } else {
            self
        }
    }

    /// Lets everything under [`EVENTS_PREFIX`] through without a key.
    #[must_use]
    pub fn public_events(self, public: bool) -> Self {
        if public {
            self.exempt_prefix(EVENTS_PREFIX)
        } else {
            self
        }
    }

    /// Exempts an exact path.
    #[must_use]
    pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
        self.exempt_paths.push(path.into());
        self
    }

    /// Exempts a path prefix, matched on segment boundaries.
    #[must_use]
    pub fn exempt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exempt_prefixes
            .push(prefix.into().trim_end_matches('/').to_string());
        self
    }

    /// Returns `true` if `path` needs no key.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
            || self.exempt_prefixes.iter().any(|prefix| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }

    fn presented(request: &Request) -> Option<&str> {
        let headers = request.headers();
        if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            return Some(key.trim());
        }
        headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                let (scheme, token) = v.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            })
    }

    fn matches(&self, presented: &str) -> bool {
        bool::from(presented.as_bytes().ct_eq(&self.key))
    }
}

impl Middleware for ApiKeyMiddleware {
    fn name(&self) -> &'static str {
        "api-key"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            if self.is_exempt(ctx.path()) {
                return next.run(ctx, request).await;
            }

            match Self::presented(&request) {
                Some(key) if self.matches(key) => {}
                Some(_) => return Err(ApiError::unauthorized("Invalid API key")),
                None => return Err(ApiError::unauthorized("Missing API key")),
            }
            next.run(ctx, request).await
        })
    }
}
