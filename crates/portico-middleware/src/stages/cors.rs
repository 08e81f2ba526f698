//! CORS headers and preflight handling.
//!
//! Every response gets `access-control-allow-origin` with the configured
//! origin and the list of headers browsers may read. A specific origin also
//! adds `vary: origin`.
//!
//! An `OPTIONS` request carrying `access-control-request-method` is a
//! preflight: it is answered here with `204 No Content` and never reaches
//! later stages or the handler.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use portico_core::{ApiResult, Request, Response};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin`.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods`.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers`.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Max-Age`.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers`.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method`, sent on preflight.
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Vary`.
    pub const VARY: &str = "vary";
}

/// Headers readable by browser clients.
pub const EXPOSED_HEADERS: &str =
    "x-request-id, x-correlation-id, x-api-version, x-ratelimit-limit, x-ratelimit-remaining, retry-after";

const DEFAULT_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str =
    "content-type, authorization, x-api-key, x-api-version, x-request-id, x-correlation-id, x-user-id, x-user-roles";

/// Adds CORS headers and answers preflight requests.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: Duration,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::any_origin()
    }
}

impl CorsMiddleware {
    /// Allows any origin (`*`).
    #[must_use]
    pub fn any_origin() -> Self {
        Self {
            origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static(DEFAULT_ALLOW_METHODS),
            allow_headers: HeaderValue::from_static(DEFAULT_ALLOW_HEADERS),
            max_age: Duration::from_secs(600),
        }
    }

    /// Allows a single configured origin.
    ///
    /// An origin that is not a valid header value falls back to `*`.
    #[must_use]
    pub fn with_origin(origin: &str) -> Self {
        let mut cors = Self::any_origin();
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) if !value.is_empty() => cors.origin = value,
            _ => tracing::warn!(origin, "invalid CORS origin, allowing any origin"),
        }
        cors
    }

    /// Sets how long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Returns `true` unless a specific origin is configured.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.origin == "*"
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    fn stage_common(&self, ctx: &mut Context) {
        ctx.stage_header(HeaderName::from_static(headers::ALLOW_ORIGIN), self.origin.clone());
        if !self.allows_any_origin() {
            ctx.stage_header(
                HeaderName::from_static(headers::VARY),
                HeaderValue::from_static("origin"),
            );
        }
        ctx.stage_header(
            HeaderName::from_static(headers::EXPOSE_HEADERS),
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
    }

    fn preflight(&self, ctx: &mut Context) -> Response {
        ctx.stage_header(
            HeaderName::from_static(headers::ALLOW_METHODS),
            self.allow_methods.clone(),
        );
        ctx.stage_header(
            HeaderName::from_static(headers::ALLOW_HEADERS),
            self.allow_headers.clone(),
        );
        ctx.stage_header(
            HeaderName::from_static(headers::MAX_AGE),
            HeaderValue::from(self.max_age.as_secs()),
        );

        let mut response = Response::new(http_body_util::Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            self.stage_common(ctx);
            if Self::is_preflight(&request) {
                return Ok(self.preflight(ctx));
            }
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::routes::Routes;
    use portico_core::{body, ApiError};

    fn ok(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async move { Ok(ctx.text(StatusCode::OK, "ok")) })
    }

    fn options(_ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async { Err::<Response, _>(ApiError::internal("preflight reached the handler")) })
    }

    fn pipeline(cors: CorsMiddleware) -> Pipeline {
        let mut routes = Routes::new();
        routes.get("/res", ok).unwrap();
        routes.route(Method::OPTIONS, "/res", options).unwrap();
        Pipeline::builder().stage(cors).routes(routes).build()
    }

    #[tokio::test]
    async fn test_any_origin_headers() {
        let request = http::Request::builder()
            .uri("/res")
            .header("origin", "https://app.example.com")
            .body(body::empty())
            .unwrap();
        let response = pipeline(CorsMiddleware::any_origin()).handle(request, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[headers::EXPOSE_HEADERS], EXPOSED_HEADERS);
        assert!(!response.headers().contains_key(headers::VARY));
    }

    #[tokio::test]
    async fn test_specific_origin_adds_vary() {
        let request = http::Request::builder().uri("/res").body(body::empty()).unwrap();
        let response = pipeline(CorsMiddleware::with_origin("https://app.example.com"))
            .handle(request, None)
            .await;

        assert_eq!(
            response.headers()[headers::ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(response.headers()[headers::VARY], "origin");
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let request = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/res")
            .header("origin", "https://app.example.com")
            .header(headers::REQUEST_METHOD, "POST")
            .body(body::empty())
            .unwrap();
        let response = pipeline(CorsMiddleware::any_origin().max_age(Duration::from_secs(60)))
            .handle(request, None)
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[headers::MAX_AGE], "60");
        assert!(response.headers().contains_key(headers::ALLOW_METHODS));
        assert!(response.headers().contains_key(headers::ALLOW_HEADERS));
    }

    #[tokio::test]
    async fn test_preflight_allows_identity_headers() {
        let request = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/res")
            .header("origin", "https://app.example.com")
            .header(headers::REQUEST_METHOD, "GET")
            .header("access-control-request-headers", "x-user-id, x-user-roles")
            .body(body::empty())
            .unwrap();
        let response = pipeline(CorsMiddleware::any_origin()).handle(request, None).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let allowed = response.headers()[headers::ALLOW_HEADERS].to_str().unwrap();
        for name in ["x-user-id", "x-user-roles", "x-api-key", "authorization"] {
            assert!(allowed.split(", ").any(|h| h == name), "{name} not in {allowed}");
        }
    }

    #[test]
    fn test_invalid_origin_falls_back_to_any() {
        assert!(CorsMiddleware::with_origin("bad\norigin").allows_any_origin());
        assert!(!CorsMiddleware::with_origin("https://a.example").allows_any_origin());
    }
}
