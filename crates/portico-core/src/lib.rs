//! # Portico Core
//!
//! Core types shared by every Portico crate:
//!
//! - [`ApiError`] / [`ErrorCode`] - the fixed error taxonomy
//! - [`envelope`] - the uniform JSON envelope and response builders
//! - [`Identity`] - caller identity forwarded by the upstream gateway
//! - [`schema`] - declarative structural schemas and [`validate`]
//! - [`Request`], [`Response`], [`Body`] - the HTTP types flowing through the pipeline

#![doc(html_root_url = "https://docs.rs/portico-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod envelope;
mod error;
mod identity;
pub mod schema;

pub use body::{Body, Request, Response};
pub use envelope::{ErrorBody, ErrorEnvelope};
pub use error::{ApiError, ApiResult, BoxError, ErrorCode};
pub use identity::{Identity, USER_ID_HEADER, USER_ROLES_HEADER};
pub use schema::{validate, Schema, Violation};
