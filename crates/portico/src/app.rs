//! Wiring a [`Pipeline`] from a [`PorticoConfig`].
//!
//! The global stages run in this order, outermost first:
//!
//! ```text
//! ErrorHandler → RequestId → AccessLog → Counters → SecurityHeaders → Cors
//!   → ApiKey (only with a key) → Identity → RateLimit → Version → Timeout → JsonBody
//! ```
//!
//! The error handler sits outside everything else so every failure, including
//! a rate-limit or version rejection, leaves as one envelope that still carries
//! the ids and the CORS and security headers.

use std::sync::Arc;

use portico_config::PorticoConfig;
use portico_middleware::limiter::TokenBucketLimiter;
use portico_middleware::stages::{
    AccessLogMiddleware, ApiKeyMiddleware, CorsMiddleware, CountersMiddleware,
    ErrorHandlerMiddleware, IdentityMiddleware, JsonBodyMiddleware, RateLimitMiddleware,
    RequestIdMiddleware, RoleGuardMiddleware, SecurityHeadersMiddleware, TimeoutMiddleware,
    ValidationMiddleware, VersionMiddleware,
};
use portico_middleware::{Pipeline, RequestCounters, Routes};
use portico_router::RouterError;
use portico_server::{HealthCheck, ReadinessCheck, Server};

use crate::handlers;

/// Service name reported by the liveness probe.
pub const SERVICE_NAME: &str = "portico";

/// Role required by `/api/:version/secure`.
pub const ADMIN_ROLE: &str = "admin";

/// A configured pipeline plus the shared state around it.
pub struct App {
    pipeline: Pipeline,
    limiter: Arc<TokenBucketLimiter>,
    counters: Arc<RequestCounters>,
    readiness: ReadinessCheck,
    config: PorticoConfig,
}

impl App {
    /// Builds the reference routes and the global stages from `config`.
    pub fn from_config(config: PorticoConfig) -> Result<Self, RouterError> {
        let limiter = Arc::new(TokenBucketLimiter::per_second(config.rate_limit_rps));
        let counters = Arc::new(RequestCounters::new());
        let readiness = ReadinessCheck::new().add_check("api", || true);
        let health = HealthCheck::new(SERVICE_NAME, env!("CARGO_PKG_VERSION"));

        let mut routes = Routes::new();
        routes.get("/health/live", handlers::Liveness::new(health))?;
        routes.get("/health/ready", handlers::Readiness::new(readiness.clone()))?;
        routes.get("/metrics", handlers::Metrics::new(Arc::clone(&counters)))?;
        routes.get("/api/:version/echo", handlers::echo_query)?;
        routes
            .post("/api/:version/echo", handlers::echo_body)?
            .layer(ValidationMiddleware::new(handlers::echo_schema()));
        routes.get("/api/:version/users/:id", handlers::get_user)?;
        routes
            .get("/api/:version/secure", handlers::secure)?
            .layer(RoleGuardMiddleware::new(ADMIN_ROLE));

        let mut builder = Pipeline::builder()
            .stage(ErrorHandlerMiddleware::new().expose_internal_errors(config.expose_internal_errors))
            .stage(RequestIdMiddleware::new())
            .stage(AccessLogMiddleware::new())
            .stage(CountersMiddleware::new(Arc::clone(&counters)))
            .stage(SecurityHeadersMiddleware::new())
            .stage(CorsMiddleware::with_origin(&config.cors_origin));
        if let Some(key) = &config.api_key {
            builder = builder.stage(
                ApiKeyMiddleware::new(key.clone())
                    .public_metrics(config.public_metrics)
                    .public_events(config.public_events),
            );
        }
        let pipeline = builder
            .stage(IdentityMiddleware::new())
            .stage(RateLimitMiddleware::new(Arc::clone(&limiter)))
            .stage(VersionMiddleware::new(&config.api_versions))
            .stage(TimeoutMiddleware::new(config.request_timeout()))
            .stage(JsonBodyMiddleware::new(config.max_body_bytes))
            .routes(routes)
            .expose_internal_errors(config.expose_internal_errors)
            .build();

        tracing::debug!(
            stages = ?pipeline.stage_names(),
            routes = pipeline.route_count(),
            "pipeline assembled"
        );

        Ok(Self {
            pipeline,
            limiter,
            counters,
            readiness,
            config,
        })
    }

    /// The assembled pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The per-client limiter shared with the rate-limit stage.
    #[must_use]
    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    /// Counters served by `/metrics`.
    #[must_use]
    pub fn counters(&self) -> &Arc<RequestCounters> {
        &self.counters
    }

    /// The readiness probe served by `/health/ready`.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Turns the app into a server bound to the configured address.
    pub fn into_server(self) -> Result<Server, portico_config::ConfigError> {
        let addr = self.config.listen_addr()?;
        Ok(Server::builder(self.pipeline)
            .addr(addr)
            .shutdown_timeout(self.config.shutdown_timeout())
            .readiness(self.readiness)
            .sweep_limiter(self.limiter)
            .build())
    }
}
