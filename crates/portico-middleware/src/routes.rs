//! Route table construction.
//!
//! Each route carries its handler plus any route-scoped stages (a role guard,
//! a body schema) that run after the global chain and before the handler.

use std::fmt;
use std::sync::Arc;

use http::Method;
use portico_router::{Route, Router, RouterError};

use crate::middleware::{BoxedMiddleware, Handler, Middleware};

/// Dispatch target stored in the route table.
pub struct Endpoint {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) stages: Vec<BoxedMiddleware>,
}

impl Endpoint {
    /// Names of the route-scoped stages, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for the immutable route table.
///
/// ```
/// use portico_middleware::{BoxFuture, Context, Request, Response, Routes};
/// use portico_middleware::stages::RoleGuardMiddleware;
/// use portico_core::ApiResult;
/// use http::StatusCode;
///
/// fn secure(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
///     Box::pin(async move { Ok(ctx.text(StatusCode::OK, "welcome")) })
/// }
///
/// let mut routes = Routes::new();
/// routes
///     .get("/api/:version/secure", secure)
///     .unwrap()
///     .layer(RoleGuardMiddleware::new("admin"));
/// assert_eq!(routes.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Routes {
    router: Router<Endpoint>,
}

impl Routes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` and `pattern`.
    pub fn route<H: Handler>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<RouteBuilder<'_>, RouterError> {
        let endpoint = Endpoint {
            handler: Arc::new(handler),
            stages: Vec::new(),
        };
        let route = self.router.register(method, pattern, endpoint)?;
        Ok(RouteBuilder { route })
    }

    /// Registers a `GET` route.
    pub fn get<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<RouteBuilder<'_>, RouterError> {
        self.route(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<RouteBuilder<'_>, RouterError> {
        self.route(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<RouteBuilder<'_>, RouterError> {
        self.route(Method::PUT, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<RouteBuilder<'_>, RouterError> {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.router.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.router.is_empty()
    }

    pub(crate) fn into_router(self) -> Router<Endpoint> {
        self.router
    }
}

/// Handle to a freshly registered route.
pub struct RouteBuilder<'r> {
    route: &'r mut Route<Endpoint>,
}

impl RouteBuilder<'_> {
    /// Appends a route-scoped stage.
    pub fn layer<M: Middleware>(self, middleware: M) -> Self {
        self.route.target_mut().stages.push(Arc::new(middleware));
        self
    }
}
