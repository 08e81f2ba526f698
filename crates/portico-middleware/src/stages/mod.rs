//! Built-in stages.
//!
//! The usual global order, outermost first:
//!
//! 1. [`ErrorHandlerMiddleware`] - errors to envelopes
//! 2. [`RequestIdMiddleware`] - request and correlation ids
//! 3. [`AccessLogMiddleware`] - one access record per request
//! 4. [`CountersMiddleware`] - request counters and metrics
//! 5. [`SecurityHeadersMiddleware`] - hardening headers
//! 6. [`CorsMiddleware`] - CORS headers and preflight
//! 7. [`ApiKeyMiddleware`] - shared-secret auth, when configured
//! 8. [`IdentityMiddleware`] - caller identity from gateway headers
//! 9. [`RateLimitMiddleware`] - per-client token buckets
//! 10. [`VersionMiddleware`] - API version negotiation
//! 11. [`TimeoutMiddleware`] - deadline and cancellation
//! 12. [`JsonBodyMiddleware`] - bounded JSON body decoding
//!
//! Route-scoped: [`RoleGuardMiddleware`] and [`ValidationMiddleware`], attached
//! with [`RouteBuilder::layer`](crate::RouteBuilder::layer).

pub mod access_log;
pub mod api_key;
pub mod cors;
pub mod counting;
pub mod error_handler;
pub mod identity;
pub mod json_body;
pub mod rate_limit;
pub mod request_id;
pub mod role_guard;
pub mod security_headers;
pub mod timeout;
pub mod validation;
pub mod versioning;

pub use access_log::AccessLogMiddleware;
pub use api_key::ApiKeyMiddleware;
pub use cors::CorsMiddleware;
pub use counting::CountersMiddleware;
pub use error_handler::ErrorHandlerMiddleware;
pub use identity::IdentityMiddleware;
pub use json_body::JsonBodyMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use request_id::RequestIdMiddleware;
pub use role_guard::RoleGuardMiddleware;
pub use security_headers::SecurityHeadersMiddleware;
pub use timeout::TimeoutMiddleware;
pub use validation::ValidationMiddleware;
pub use versioning::VersionMiddleware;
