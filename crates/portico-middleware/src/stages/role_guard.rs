//! Route-scoped role check.

use portico_core::{ApiError, ApiResult, Request, Response};

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Lets a request through only if its identity holds `role`.
///
/// Anonymous requests and identities without the role get `FORBIDDEN`, and
/// nothing downstream runs.
#[derive(Debug, Clone)]
pub struct RoleGuardMiddleware {
    role: String,
}

impl RoleGuardMiddleware {
    /// Requires `role`.
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }

    /// The required role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }
}

impl Middleware for RoleGuardMiddleware {
    fn name(&self) -> &'static str {
        "role-guard"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            match ctx.identity() {
                Some(identity) if identity.has_role(&self.role) => {}
                Some(identity) => {
                    tracing::debug!(user_id = identity.id(), role = %self.role, "role missing");
                    return Err(ApiError::forbidden(format!("Requires role '{}'", self.role)));
                }
                None => return Err(ApiError::forbidden("Authentication required")),
            }
            next.run(ctx, request).await
        })
    }
}
