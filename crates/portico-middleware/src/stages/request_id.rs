//! Request and correlation ids.
//!
//! Inbound `x-request-id` and `x-correlation-id` values are reused when they
//! look like ids: 1 to 128 characters from `[A-Za-z0-9._:-]`. Anything else
//! is replaced by a fresh UUID v7. Without an inbound correlation id the
//! request id doubles as one.
//!
//! Both ids are staged on the response and recorded on a `request` span that
//! wraps the rest of the chain, so every log line emitted further in carries
//! them.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use portico_core::{ApiResult, Request, Response};
use tracing::Instrument;
use uuid::Uuid;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Request id header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id header.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const MAX_ID_LEN: usize = 128;

/// Assigns request and correlation ids.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Returns `true` if `value` can be reused as an id.
#[must_use]
pub fn is_well_formed(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

fn inbound(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| is_well_formed(v))
        .map(ToString::to_string)
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request-id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let request_id = inbound(request.headers(), REQUEST_ID_HEADER)
                .unwrap_or_else(|| Uuid::now_v7().to_string());
            let correlation_id = inbound(request.headers(), CORRELATION_ID_HEADER)
                .unwrap_or_else(|| request_id.clone());

            // Well-formed ids are always valid header values.
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                ctx.stage_header(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                ctx.stage_header(HeaderName::from_static(CORRELATION_ID_HEADER), value);
            }

            let span = tracing::info_span!(
                "request",
                request_id = %request_id,
                correlation_id = %correlation_id,
                method = %ctx.method(),
                path = ctx.path(),
            );
            ctx.set_request_id(request_id);
            ctx.set_correlation_id(correlation_id);

            next.run(ctx, request).instrument(span).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::routes::Routes;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use portico_core::body;

    fn ids(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async move {
            ctx.json(
                StatusCode::OK,
                &serde_json::json!({
                    "requestId": ctx.request_id(),
                    "correlationId": ctx.correlation_id(),
                }),
            )
        })
    }

    fn pipeline() -> Pipeline {
        let mut routes = Routes::new();
        routes.get("/ids", ids).unwrap();
        Pipeline::builder()
            .stage(RequestIdMiddleware::new())
            .routes(routes)
            .build()
    }

    async fn call(headers: &[(&str, &str)]) -> (Response, serde_json::Value) {
        let mut builder = http::Request::builder().uri("/ids");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = pipeline()
            .handle(builder.body(body::empty()).unwrap(), None)
            .await;
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (Response::from_parts(parts, http_body_util::Full::new(bytes)), json)
    }

    #[test]
    fn test_well_formed_ids() {
        assert!(is_well_formed("abc-123"));
        assert!(is_well_formed("svc.a:req_9"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("has space"));
        assert!(!is_well_formed("semi;colon"));
        assert!(!is_well_formed(&"a".repeat(129)));
        assert!(is_well_formed(&"a".repeat(128)));
    }

    #[tokio::test]
    async fn test_generates_ids_when_absent() {
        let (response, json) = call(&[]).await;
        let request_id = json["requestId"].as_str().unwrap();
        assert!(Uuid::parse_str(request_id).is_ok());
        assert_eq!(json["correlationId"], request_id);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], request_id);
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], request_id);
    }

    #[tokio::test]
    async fn test_reuses_inbound_ids() {
        let (response, json) = call(&[
            (REQUEST_ID_HEADER, "req-42"),
            (CORRELATION_ID_HEADER, "trace-7"),
        ])
        .await;
        assert_eq!(json["requestId"], "req-42");
        assert_eq!(json["correlationId"], "trace-7");
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], "trace-7");
    }

    #[tokio::test]
    async fn test_correlation_defaults_to_inbound_request_id() {
        let (_, json) = call(&[(REQUEST_ID_HEADER, "req-42")]).await;
        assert_eq!(json["correlationId"], "req-42");
    }

    #[tokio::test]
    async fn test_malformed_inbound_id_is_replaced() {
        let (_, json) = call(&[(REQUEST_ID_HEADER, "bad id!")]).await;
        let request_id = json["requestId"].as_str().unwrap();
        assert_ne!(request_id, "bad id!");
        assert!(Uuid::parse_str(request_id).is_ok());
    }
}
