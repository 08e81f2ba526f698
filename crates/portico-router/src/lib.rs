//! Ordered path router for Portico.
//!
//! Patterns are compiled to anchored regular expressions. Segments prefixed
//! with `:` capture a named parameter; all other segments match literally.
//! Routes are tried in registration order and the first match wins.
//!
//! ```rust
//! use portico_router::Router;
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.register(Method::GET, "/users/me", "current_user").unwrap();
//! router.register(Method::GET, "/users/:id", "user_by_id").unwrap();
//!
//! let matched = router.match_route(&Method::GET, "/users/me").unwrap();
//! assert_eq!(*matched.route.target(), "current_user");
//!
//! let matched = router.match_route(&Method::GET, "/users/7").unwrap();
//! assert_eq!(matched.params.get("id"), Some("7"));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod router;

pub use error::RouterError;
pub use params::Params;
pub use router::{Route, RouteMatch, Router, PARAM_MARKER};
