//! Route-scoped body validation.

use std::sync::Arc;

use portico_core::{validate, ApiError, ApiResult, Request, Response, Schema};
use serde_json::Value;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

static NULL: Value = Value::Null;

/// Checks the decoded body against a [`Schema`] before the handler runs.
///
/// A request without a decoded body is validated as `null`. Every violation
/// is reported, as `[{ "path", "message" }]` in the error details.
#[derive(Debug, Clone)]
pub struct ValidationMiddleware {
    schema: Arc<Schema>,
}

impl ValidationMiddleware {
    /// Validates against `schema`.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    /// The schema being enforced.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let violations = validate(ctx.body().unwrap_or(&NULL), &self.schema);
            if !violations.is_empty() {
                tracing::debug!(count = violations.len(), "request body failed validation");
                let details = serde_json::to_value(&violations)?;
                return Err(ApiError::bad_request("Validation failed").with_details(details));
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
    use crate::stages::{ErrorHandlerMiddleware, JsonBodyMiddleware};
    use http::header::CONTENT_TYPE;
    use http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use portico_core::body;

    fn created(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async move { ctx.json(StatusCode::CREATED, &ctx.body()) })
    }

    fn pipeline() -> Pipeline {
        let schema = Schema::object([
            ("name", Schema::string().required().min_length(1)),
            ("age", Schema::number().minimum(0.0)),
        ])
        .required();

        let mut routes = Routes::new();
        routes
            .post("/people", created)
            .unwrap()
            .layer(ValidationMiddleware::new(schema));
        Pipeline::builder()
            .stage(ErrorHandlerMiddleware::new())
            .stage(JsonBodyMiddleware::new(1_024))
            .routes(routes)
            .build()
    }

    async fn post(body: Option<&'static str>) -> (StatusCode, serde_json::Value) {
        let mut builder = http::Request::builder().method(Method::POST).uri("/people");
        let body = match body {
            Some(text) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                body::full(text)
            }
            None => body::empty(),
        };
        let response = pipeline().handle(builder.body(body).unwrap(), None).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_body_reaches_handler() {
        let (status, json) = post(Some(r#"{"name":"Ada","age":36}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "Ada");
    }

    #[tokio::test]
    async fn test_all_violations_reported() {
        let (status, json) = post(Some(r#"{"age":-1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "Validation failed");

        let details = json["error"]["details"].as_array().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0]["path"], "$.name");
        assert_eq!(details[1]["path"], "$.age");
    }

    #[tokio::test]
    async fn test_missing_body_validates_as_null() {
        let (status, json) = post(None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["details"][0]["path"], "$");
    }
}
