//! Error translation.
//!
//! Installed first, so it wraps everything else. Any [`ApiError`] signaled
//! further in comes back out here and is rendered as the uniform envelope:
//!
//! ```json
//! {
//!   "error": { "code": "BAD_REQUEST", "message": "Validation failed", "details": [] },
//!   "correlationId": "0190c1f2-..."
//! }
//! ```
//!
//! Each error is logged exactly once: `warn` for 4xx, `error` for 5xx. For
//! `INTERNAL` errors the client sees a generic message unless
//! [`ErrorHandlerMiddleware::expose_internal_errors`] is enabled; the log always
//! gets the original source.

use std::error::Error as _;

use portico_core::{envelope, ApiError, ApiResult, Request, Response};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Converts signaled errors into envelope responses.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandlerMiddleware {
    expose_internal_errors: bool,
}

impl ErrorHandlerMiddleware {
    /// Creates the stage with internal details hidden.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows the source message of `INTERNAL` errors to clients.
    ///
    /// Meant for development only.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    fn log(ctx: &Context, error: &ApiError) {
        let source = error.source().map(ToString::to_string);
        if error.is_server_error() {
            tracing::error!(
                correlation_id = ctx.correlation_id(),
                request_id = ctx.request_id(),
                code = %error.code(),
                status = error.status().as_u16(),
                source = source.as_deref(),
                "{}",
                error.message()
            );
        } else {
            tracing::warn!(
                correlation_id = ctx.correlation_id(),
                request_id = ctx.request_id(),
                code = %error.code(),
                status = error.status().as_u16(),
                "{}",
                error.message()
            );
        }
    }
}

impl Middleware for ErrorHandlerMiddleware {
    fn name(&self) -> &'static str {
        "error-handler"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            match next.run(ctx, request).await {
                Ok(response) => Ok(response),
                Err(error) => {
                    Self::log(ctx, &error);
                    Ok(envelope::error_response(
                        &error,
                        ctx.correlation_id(),
                        self.expose_internal_errors,
                    ))
                }
            }
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

    fn request(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(body::empty()).unwrap()
    }

    fn limited(_ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async { Err::<Response, _>(ApiError::too_many_requests("slow down", 3)) })
    }

    fn broken(_ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async {
            let err: serde_json::Error = serde_json::from_str::<u8>("nope").unwrap_err();
            Err::<Response, _>(ApiError::from(err))
        })
    }

    fn pipeline(expose: bool) -> Pipeline {
        let mut routes = Routes::new();
        routes.get("/limited", limited).unwrap();
        routes.get("/broken", broken).unwrap();
        Pipeline::builder()
            .stage(ErrorHandlerMiddleware::new().expose_internal_errors(expose))
            .routes(routes)
            .build()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_renders_envelope_with_retry_after() {
        let mut ctx = Context::new();
        ctx.set_correlation_id("corr-1");
        let response = pipeline(false)
            .dispatch(&mut ctx, request("/limited"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "3");
        assert_eq!(response.headers()["content-type"], "application/json");

        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "TOO_MANY_REQUESTS");
        assert_eq!(json["error"]["message"], "slow down");
        assert_eq!(json["correlationId"], "corr-1");
    }

    #[tokio::test]
    async fn test_unmatched_route_becomes_not_found_envelope() {
        let mut ctx = Context::new();
        let response = pipeline(false)
            .dispatch(&mut ctx, request("/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "No route for GET /missing");
    }

    #[tokio::test]
    async fn test_internal_message_hidden_by_default() {
        let mut ctx = Context::new();
        let response = pipeline(false)
            .dispatch(&mut ctx, request("/broken"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], envelope::INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_internal_message_exposed_when_enabled() {
        let mut ctx = Context::new();
        let response = pipeline(true)
            .dispatch(&mut ctx, request("/broken"))
            .await
            .unwrap();

        let json = body_json(response).await;
        let message = json["error"]["message"].as_str().unwrap();
        assert_ne!(message, envelope::INTERNAL_ERROR_MESSAGE);
        assert!(message.contains("expected"), "{message}");
    }
}
