//! End-to-end tests driving the full stage stack.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use portico_core::{body, ApiResult, Schema};
use portico_middleware::limiter::TokenBucketLimiter;
use portico_middleware::stages::{
    AccessLogMiddleware, CorsMiddleware, CountersMiddleware, ErrorHandlerMiddleware,
    IdentityMiddleware, JsonBodyMiddleware, RateLimitMiddleware, RequestIdMiddleware,
    RoleGuardMiddleware, SecurityHeadersMiddleware, TimeoutMiddleware, ValidationMiddleware,
    VersionMiddleware,
};
use portico_middleware::{
    BoxFuture, Context, Pipeline, Request, RequestCounters, Response, Routes,
};

const BODY_LIMIT: usize = 1_000;

fn user(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        ctx.json(
            StatusCode::OK,
            &serde_json::json!({
                "params": ctx.params(),
                "version": ctx.api_version(),
            }),
        )
    })
}

fn echo(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let body = ctx.take_body().unwrap_or(serde_json::Value::Null);
        ctx.json(StatusCode::OK, &body)
    })
}

fn secure(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let id = ctx.identity().map(|i| i.id().to_string()).unwrap_or_default();
        Ok(ctx.text(StatusCode::OK, format!("welcome {id}")))
    })
}

fn slow(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(251)).await;
        Ok(ctx.text(StatusCode::OK, "late"))
    })
}

struct Harness {
    pipeline: Pipeline,
    counters: Arc<RequestCounters>,
}

fn harness(rps: u32) -> Harness {
    let counters = Arc::new(RequestCounters::new());

    let mut routes = Routes::new();
    routes.get("/api/:version/users/:id", user).unwrap();
    routes
        .post("/api/:version/echo", echo)
        .unwrap()
        .layer(ValidationMiddleware::new(Schema::object([
            ("name", Schema::string().required()),
            ("age", Schema::number().minimum(0.0)),
        ])));
    routes
        .get("/api/:version/secure", secure)
        .unwrap()
        .layer(RoleGuardMiddleware::new("admin"));
    routes.get("/api/:version/slow", slow).unwrap();

    let pipeline = Pipeline::builder()
        .stage(ErrorHandlerMiddleware::new())
        .stage(RequestIdMiddleware::new())
        .stage(AccessLogMiddleware::new())
        .stage(CountersMiddleware::new(Arc::clone(&counters)))
        .stage(SecurityHeadersMiddleware::new())
        .stage(CorsMiddleware::any_origin())
        .stage(IdentityMiddleware::new())
        .stage(RateLimitMiddleware::new(Arc::new(TokenBucketLimiter::per_second(rps))))
        .stage(VersionMiddleware::new(["1", "2"]))
        .stage(TimeoutMiddleware::new(Duration::from_millis(250)))
        .stage(JsonBodyMiddleware::new(BODY_LIMIT))
        .routes(routes)
        .build();

    Harness { pipeline, counters }
}

fn peer() -> Option<SocketAddr> {
    Some("203.0.113.5:40000".parse().unwrap())
}

fn get(uri: &str) -> Request {
    http::Request::builder().uri(uri).body(body::empty()).unwrap()
}

fn post_json(uri: &str, payload: impl Into<Bytes>) -> Request {
    http::Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(body::full(payload))
        .unwrap()
}

async fn read_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_params_reach_handler() {
    let h = harness(100);
    let response = h.pipeline.handle(get("/api/1/users/42"), peer()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert!(headers.contains_key("x-correlation-id"));
    assert_eq!(headers["x-api-version"], "1");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.contains_key("x-response-time"));

    let json = read_json(response).await;
    assert_eq!(json["params"], serde_json::json!({"version": "1", "id": "42"}));
    assert_eq!(json["version"], "1");
}

#[tokio::test(start_paused = true)]
async fn test_eleventh_call_in_same_instant_is_throttled() {
    let h = harness(10);
    for _ in 0..10 {
        let response = h.pipeline.handle(get("/api/1/users/1"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = h.pipeline.handle(get("/api/1/users/1"), peer()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    // Headers staged before the throttle still apply to the envelope.
    assert!(response.headers().contains_key("x-correlation-id"));

    let correlation = response.headers()["x-correlation-id"].clone();
    let json = read_json(response).await;
    assert_eq!(json["error"]["code"], "TOO_MANY_REQUESTS");
    assert_eq!(json["correlationId"], correlation.to_str().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_sustained_rate_is_never_throttled() {
    let h = harness(10);
    for i in 0..50 {
        let response = h.pipeline.handle(get("/api/1/users/1"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK, "call {i}");
        tokio::time::advance(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_body_over_ceiling_never_reaches_handler() {
    let h = harness(100);
    // 1001 bytes of valid JSON: a string literal padded to size.
    let payload = format!("\"{}\"", "a".repeat(BODY_LIMIT - 1));
    assert_eq!(payload.len(), BODY_LIMIT + 1);

    let response = h
        .pipeline
        .handle(post_json("/api/1/echo", payload), peer())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["error"]["message"], "Payload too large");
}

#[tokio::test]
async fn test_body_at_ceiling_is_parsed() {
    let h = harness(100);
    let prefix = r#"{"name":""#;
    let suffix = r#""}"#;
    let name = "n".repeat(BODY_LIMIT - prefix.len() - suffix.len());
    let payload = format!("{prefix}{name}{suffix}");
    assert_eq!(payload.len(), BODY_LIMIT);

    let response = h
        .pipeline
        .handle(post_json("/api/1/echo", payload), peer())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["name"].as_str().unwrap().len(), name.len());
}

#[tokio::test]
async fn test_validation_reports_every_violation() {
    let h = harness(100);
    let response = h
        .pipeline
        .handle(post_json("/api/1/echo", r#"{"age":-1}"#), peer())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = read_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert_eq!(json["error"]["message"], "Validation failed");
    let paths: Vec<&str> = json["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, ["$.name", "$.age"]);
}

#[tokio::test]
async fn test_role_guard() {
    let h = harness(100);

    let admin = http::Request::builder()
        .uri("/api/1/secure")
        .header("x-user-id", "ada")
        .header("x-user-roles", "user, admin")
        .body(body::empty())
        .unwrap();
    let response = h.pipeline.handle(admin, peer()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let plain = http::Request::builder()
        .uri("/api/1/secure")
        .header("x-user-id", "bob")
        .header("x-user-roles", "user")
        .body(body::empty())
        .unwrap();
    let response = h.pipeline.handle(plain, peer()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = h.pipeline.handle(get("/api/1/secure"), peer()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_version_negotiation() {
    let h = harness(100);

    let mut request = get("/api/1/users/7");
    request
        .headers_mut()
        .insert("x-api-version", http::HeaderValue::from_static("v2"));
    let response = h.pipeline.handle(request, peer()).await;
    assert_eq!(response.headers()["x-api-version"], "2");

    let response = h.pipeline.handle(get("/api/9/users/7"), peer()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["error"]["details"]["requested"], "9");
}

#[tokio::test(start_paused = true)]
async fn test_late_handler_gets_exactly_one_timeout_response() {
    let h = harness(100);
    let response = h.pipeline.handle(get("/api/1/slow"), peer()).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let json = read_json(response).await;
    assert_eq!(json["error"]["code"], "GATEWAY_TIMEOUT");
    assert_eq!(h.counters.for_status(504), 1);
    assert_eq!(h.counters.for_status(200), 0);
}

#[tokio::test]
async fn test_unknown_route_is_counted_as_unmatched() {
    let h = harness(100);
    let response = h.pipeline.handle(get("/nope"), peer()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-frame-options"], "DENY");

    let snapshot = h.counters.snapshot();
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.by_path.get("<unmatched>"), Some(&1));
}

#[tokio::test]
async fn test_repeated_dispatch_is_deterministic() {
    let h = harness(1_000);
    for _ in 0..5 {
        let response = h.pipeline.handle(get("/api/2/users/abc"), peer()).await;
        let json = read_json(response).await;
        assert_eq!(json["params"]["id"], "abc");
        assert_eq!(json["version"], "2");
    }
}
