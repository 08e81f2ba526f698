//! Caller identity from gateway headers.
//!
//! The upstream gateway authenticates callers and forwards who they are in
//! `x-user-id` and `x-user-roles`. This stage trusts those headers as-is; it
//! never verifies credentials itself.

use portico_core::{ApiResult, Identity, Request, Response};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Installs an [`Identity`] when `x-user-id` is present and non-empty.
///
/// Requests without it continue anonymously.
#[derive(Debug, Clone, Default)]
pub struct IdentityMiddleware;

impl IdentityMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for IdentityMiddleware {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            if let Some(identity) = Identity::from_headers(request.headers()) {
                tracing::debug!(user_id = identity.id(), roles = ?identity.roles(), "caller identified");
                ctx.install_identity(identity);
            }
            next.run(ctx, request).await
        })
    }
}
