//! Handlers served by the reference binary.
//!
//! Stateless handlers are plain functions; the probes and the metrics snapshot
//! hold shared state and implement [`Handler`] directly.

use std::sync::Arc;

use http::StatusCode;
use portico_core::{ApiError, ApiResult, Schema};
use portico_middleware::{BoxFuture, Context, Handler, Request, RequestCounters, Response};
use portico_server::{HealthCheck, ReadinessCheck};
use serde_json::json;

/// `GET /health/live`.
#[derive(Debug, Clone)]
pub struct Liveness {
    health: HealthCheck,
}

impl Liveness {
    /// Reports `health`.
    #[must_use]
    pub fn new(health: HealthCheck) -> Self {
        Self { health }
    }
}

impl Handler for Liveness {
    fn call<'a>(&'a self, ctx: &'a mut Context, _request: Request) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move { ctx.json(StatusCode::OK, &self.health.status()) })
    }
}

/// `GET /health/ready`. Answers 503 while not ready.
#[derive(Debug, Clone)]
pub struct Readiness {
    readiness: ReadinessCheck,
}

impl Readiness {
    /// Reports `readiness`.
    #[must_use]
    pub fn new(readiness: ReadinessCheck) -> Self {
        Self { readiness }
    }
}

impl Handler for Readiness {
    fn call<'a>(&'a self, ctx: &'a mut Context, _request: Request) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let status = self.readiness.status();
            let code = if status.is_ready() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            ctx.json(code, &status)
        })
    }
}

/// `GET /metrics`: the request counter snapshot as JSON.
#[derive(Debug, Clone)]
pub struct Metrics {
    counters: Arc<RequestCounters>,
}

impl Metrics {
    /// Reports `counters`.
    #[must_use]
    pub fn new(counters: Arc<RequestCounters>) -> Self {
        Self { counters }
    }
}

impl Handler for Metrics {
    fn call<'a>(&'a self, ctx: &'a mut Context, _request: Request) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move { ctx.json(StatusCode::OK, &self.counters.snapshot()) })
    }
}

/// `GET /api/:version/echo`: echoes the query string.
pub fn echo_query(ctx: &mut Context, _request: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let query: serde_json::Map<String, serde_json::Value> = ctx
            .query_pairs()
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        ctx.json(
            StatusCode::OK,
            &json!({
                "query": query,
                "version": ctx.api_version(),
                "requestId": ctx.request_id(),
            }),
        )
    })
}

/// Schema enforced on `POST /api/:version/echo`.
#[must_use]
pub fn echo_schema() -> Schema {
    Schema::object([
        ("message", Schema::string().required().min_length(1).max_length(1_000)),
        ("tags", Schema::array(Schema::string().min_length(1)).items_between(None, Some(10))),
    ])
    .required()
}

/// `POST /api/:version/echo`: echoes the validated body.
pub fn echo_body(ctx: &mut Context, _request: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let body = ctx.take_body().unwrap_or(serde_json::Value::Null);
        ctx.json(
            StatusCode::OK,
            &json!({
                "echo": body,
                "version": ctx.api_version(),
            }),
        )
    })
}

/// `GET /api/:version/users/:id`.
pub fn get_user(ctx: &mut Context, _request: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let id = ctx
            .param("id")
            .ok_or_else(|| ApiError::bad_request("Missing user id"))?
            .to_string();
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ApiError::bad_request("Invalid user id").with_details(json!({ "id": id })));
        }
        ctx.json(
            StatusCode::OK,
            &json!({
                "id": id,
                "name": format!("User {id}"),
                "version": ctx.api_version(),
            }),
        )
    })
}

/// `GET /api/:version/secure`: only reached by callers holding `admin`.
pub fn secure(ctx: &mut Context, _request: Request) -> BoxFuture<'_, ApiResult<Response>> {
    Box::pin(async move {
        let identity = ctx
            .identity()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        ctx.json(
            StatusCode::OK,
            &json!({
                "user": identity.id(),
                "roles": identity.roles(),
            }),
        )
    })
}
