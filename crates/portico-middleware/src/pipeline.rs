//! The dispatcher.
//!
//! A [`Pipeline`] owns the global stage list and the immutable route table.
//! For each request it matches the route, then walks:
//!
//! ```text
//! global stages (in order) → route stages (in order) → handler | NOT_FOUND
//! ```
//!
//! The dispatcher never catches errors itself; converting them into the
//! envelope is the job of an [`ErrorHandlerMiddleware`] installed first.
//! [`Pipeline::handle`] only renders an error that escapes the whole chain,
//! so a request never ends without a response.
//!
//! [`ErrorHandlerMiddleware`]: crate::stages::ErrorHandlerMiddleware

use std::net::SocketAddr;
use std::sync::Arc;

use portico_core::{envelope, ApiResult, Request, Response};
use portico_router::Router;

use crate::context::Context;
use crate::middleware::{BoxedMiddleware, Chain, Handler, Middleware, Next};
use crate::routes::{Endpoint, Routes};

/// The request dispatcher.
///
/// ```
/// use portico_middleware::{BoxFuture, Context, Pipeline, Request, Response, Routes};
/// use portico_middleware::stages::{ErrorHandlerMiddleware, RequestIdMiddleware};
/// use portico_core::ApiResult;
/// use http::StatusCode;
///
/// fn ping(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
///     Box::pin(async move { Ok(ctx.text(StatusCode::OK, "pong")) })
/// }
///
/// let mut routes = Routes::new();
/// routes.get("/ping", ping).unwrap();
///
/// let pipeline = Pipeline::builder()
///     .stage(ErrorHandlerMiddleware::new())
///     .stage(RequestIdMiddleware::new())
///     .routes(routes)
///     .build();
///
/// assert_eq!(pipeline.stage_names(), ["error-handler", "request-id"]);
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    router: Arc<Router<Endpoint>>,
    expose_internal_errors: bool,
}

impl Pipeline {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs one request through the chain using an existing context.
    ///
    /// The context must be fresh: reusing one that already went through a
    /// dispatch trips the stage cursor and panics. Its method, path and query
    /// are taken from `request`.
    pub async fn dispatch(&self, ctx: &mut Context, request: Request) -> ApiResult<Response> {
        ctx.sync_from(&request);
        let (handler, route_stages): (Option<&dyn Handler>, &[BoxedMiddleware]) =
            match self.router.match_route(ctx.method(), ctx.path()) {
                Some(matched) => {
                    ctx.set_route(matched.route.pattern(), matched.params);
                    let endpoint = matched.route.target();
                    (Some(endpoint.handler.as_ref()), endpoint.stages.as_slice())
                }
                None => (None, &[]),
            };

        let chain = Chain {
            global: &self.stages,
            route: route_stages,
            handler,
        };
        Next::start(chain).run(ctx, request).await
    }

    /// Runs one request and always produces a response.
    ///
    /// Headers staged in the context are applied to the final response unless
    /// the response already carries them.
    pub async fn handle(&self, request: Request, remote_addr: Option<SocketAddr>) -> Response {
        let mut ctx = Context::for_request(&request, remote_addr);
        let mut response = match self.dispatch(&mut ctx, request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    correlation_id = ctx.correlation_id(),
                    code = %err.code(),
                    "error escaped the middleware chain; no error handler installed"
                );
                envelope::error_response(&err, ctx.correlation_id(), self.expose_internal_errors)
            }
        };

        let headers = response.headers_mut();
        for (name, value) in ctx.response_headers() {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        response
    }

    /// Names of the global stages, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of global stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Number of routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.router.len()
    }
}

/// Builder for a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
    routes: Routes,
    expose_internal_errors: bool,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a global stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared global stage.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Sets the route table.
    #[must_use]
    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    /// Shows `INTERNAL` messages in envelopes rendered by [`Pipeline::handle`].
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Builds the pipeline. The route table is frozen from here on.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            router: Arc::new(self.routes.into_router()),
            expose_internal_errors: self.expose_internal_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{BoxFuture, FnMiddleware};
    use http::header::{HeaderName, HeaderValue};
    use http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use portico_core::{body, ApiError};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Trace {
        name: &'static str,
        log: Log,
    }

    impl Middleware for Trace {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut Context,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, ApiResult<Response>> {
            Box::pin(async move {
                self.log.lock().push(format!("in:{}", self.name));
                let result = next.run(ctx, request).await;
                self.log.lock().push(format!("out:{}", self.name));
                result
            })
        }
    }

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(body::empty())
            .unwrap()
    }

    fn show_params(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async move { ctx.json(StatusCode::OK, ctx.params()) })
    }

    fn fail(_ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async { Err::<Response, _>(ApiError::forbidden("no")) })
    }

    fn stage_version<'a>(
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            ctx.stage_header(
                HeaderName::from_static("x-api-version"),
                HeaderValue::from_static("1"),
            );
            next.run(ctx, request).await
        })
    }

    fn traced_pipeline(log: &Log) -> Pipeline {
        let mut routes = Routes::new();
        routes
            .get("/api/:version/users/:id", show_params)
            .unwrap()
            .layer(Trace {
                name: "route",
                log: log.clone(),
            });

        Pipeline::builder()
            .stage(Trace {
                name: "first",
                log: log.clone(),
            })
            .stage(Trace {
                name: "second",
                log: log.clone(),
            })
            .routes(routes)
            .build()
    }

    #[tokio::test]
    async fn test_onion_order_and_params() {
        let log = Log::default();
        let pipeline = traced_pipeline(&log);

        let response = pipeline
            .handle(request(Method::GET, "/api/1/users/42"), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let params: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(params, serde_json::json!({"version": "1", "id": "42"}));

        assert_eq!(
            *log.lock(),
            ["in:first", "in:second", "in:route", "out:route", "out:second", "out:first"]
        );
    }

    #[tokio::test]
    async fn test_unmatched_route_is_not_found_after_global_stages() {
        let log = Log::default();
        let pipeline = traced_pipeline(&log);

        let mut ctx = Context::new();
        let err = pipeline
            .dispatch(&mut ctx, request(Method::GET, "/nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(ctx.route_pattern().is_none());
        assert_eq!(*log.lock(), ["in:first", "in:second", "out:second", "out:first"]);
    }

    #[tokio::test]
    async fn test_escaped_error_still_gets_envelope_and_staged_headers() {
        let mut routes = Routes::new();
        routes.get("/fail", fail).unwrap();
        let pipeline = Pipeline::builder()
            .stage(FnMiddleware::new("version", stage_version))
            .routes(routes)
            .build();

        let response = pipeline.handle(request(Method::GET, "/fail"), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-api-version"], "1");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "FORBIDDEN");
        assert!(json["correlationId"].is_string());
    }

    #[tokio::test]
    async fn test_dispatch_is_deterministic() {
        let pipeline = traced_pipeline(&Log::default());
        for _ in 0..3 {
            let mut ctx = Context::new();
            pipeline
                .dispatch(&mut ctx, request(Method::GET, "/api/2/users/abc"))
                .await
                .unwrap();
            assert_eq!(ctx.route_pattern(), Some("/api/:version/users/:id"));
            assert_eq!(ctx.param("id"), Some("abc"));
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_on_the_given_request() {
        let pipeline = traced_pipeline(&Log::default());
        let mut ctx = Context::new();
        let response = pipeline
            .dispatch(&mut ctx, request(Method::GET, "/api/1/users/42?expand=roles"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.path(), "/api/1/users/42");
        assert_eq!(ctx.query("expand"), Some("roles"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let params: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(params, serde_json::json!({"version": "1", "id": "42"}));
    }

    #[tokio::test]
    async fn test_dispatch_uses_request_method() {
        let pipeline = traced_pipeline(&Log::default());
        let mut ctx = Context::new();
        let err = pipeline
            .dispatch(&mut ctx, request(Method::POST, "/api/1/users/42"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(*ctx.method(), Method::POST);
    }

    #[tokio::test]
    #[should_panic(expected = "stage cursor violation")]
    async fn test_reusing_context_panics() {
        let pipeline = traced_pipeline(&Log::default());
        let mut ctx = Context::new();
        let _ = pipeline
            .dispatch(&mut ctx, request(Method::GET, "/api/1/users/1"))
            .await;
        let _ = pipeline
            .dispatch(&mut ctx, request(Method::GET, "/api/1/users/1"))
            .await;
    }

    #[test]
    fn test_stage_introspection() {
        let pipeline = traced_pipeline(&Log::default());
        assert_eq!(pipeline.stage_names(), ["first", "second"]);
        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(pipeline.route_count(), 1);
    }
}
