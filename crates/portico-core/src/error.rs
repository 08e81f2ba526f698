//! The error taxonomy.
//!
//! Every failure signaled through the pipeline is an [`ApiError`]. Its status is
//! always one of the fixed [`ErrorCode`] set:
//!
//! | `ErrorCode` | Status |
//! |---|---|
//! | `BadRequest` | 400 |
//! | `Unauthorized` | 401 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `TooManyRequests` | 429 |
//! | `Internal` | 500 |
//! | `GatewayTimeout` | 504 |
//!
//! Errors that do not belong to the taxonomy (I/O, serialization, `anyhow`) fold
//! into [`ErrorCode::Internal`] through the `From` impls below. Their original
//! message is kept as the error source so it can be logged.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;

/// Boxed source error kept for logging.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or semantically invalid input.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Caller lacks a required role.
    Forbidden,
    /// No route or resource.
    NotFound,
    /// Rate limit exceeded.
    TooManyRequests,
    /// Unexpected failure.
    Internal,
    /// The request deadline expired.
    GatewayTimeout,
}

impl ErrorCode {
    /// Every code in the taxonomy.
    pub const ALL: [Self; 7] = [
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::TooManyRequests,
        Self::Internal,
        Self::GatewayTimeout,
    ];

    /// Returns the HTTP status for this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns the wire name (`BAD_REQUEST`, `TOO_MANY_REQUESTS`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::Internal => "INTERNAL",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure signaled through the pipeline's error channel.
///
/// Built with the factory functions and never mutated once handed to the
/// chain, apart from the `with_*` builders used at construction time.
///
/// # Example
///
/// ```
/// use portico_core::{ApiError, ErrorCode};
///
/// fn parse_id(raw: &str) -> Result<u64, ApiError> {
///     raw.parse()
///         .map_err(|_| ApiError::bad_request(format!("'{raw}' is not a numeric id")))
/// }
///
/// let err = parse_id("abc").unwrap_err();
/// assert_eq!(err.code(), ErrorCode::BadRequest);
/// assert_eq!(err.status().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
    retry_after_seconds: Option<u64>,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    /// Creates an error with an explicit code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_seconds: None,
            source: None,
        }
    }

    /// 400 `BAD_REQUEST`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// 401 `UNAUTHORIZED`.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// 403 `FORBIDDEN`.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 `NOT_FOUND`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 429 `TOO_MANY_REQUESTS` with a retry hint in whole seconds.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::new(ErrorCode::TooManyRequests, message).with_retry_after(retry_after_seconds)
    }

    /// 500 `INTERNAL`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// 500 `INTERNAL` wrapping an underlying error.
    ///
    /// The source's message becomes the error message; whether clients get to
    /// see it is decided when the envelope is rendered.
    pub fn internal_with_source(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            source: Some(source),
            ..Self::internal(String::new())
        }
    }

    /// 504 `GATEWAY_TIMEOUT`.
    #[must_use]
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GatewayTimeout, message)
    }

    /// Attaches structured details rendered under `error.details`.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches a `retry-after` hint.
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    /// Returns the taxonomy code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the structured details, if any.
    #[must_use]
    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    /// Returns the retry hint in seconds, if any.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        self.retry_after_seconds
    }

    /// Returns `true` for 5xx codes.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_with_source(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_with_source(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::internal_with_source(err)
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        Self::internal_with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_codes_map_to_fixed_statuses() {
        let expected = [400, 401, 403, 404, 429, 500, 504];
        for (code, status) in ErrorCode::ALL.iter().zip(expected) {
            assert_eq!(code.status().as_u16(), status, "{code}");
        }
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::TooManyRequests).unwrap();
        assert_eq!(json, "\"TOO_MANY_REQUESTS\"");
        assert_eq!(ErrorCode::GatewayTimeout.as_str(), "GATEWAY_TIMEOUT");
    }

    #[test]
    fn test_rate_limit_error_carries_hint() {
        let err = ApiError::too_many_requests("slow down", 3);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after_seconds(), Some(3));
    }

    #[test]
    fn test_foreign_errors_fold_into_internal() {
        let err: ApiError = anyhow::anyhow!("database unreachable").into();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.message(), "database unreachable");
        assert!(err.source().is_some());

        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ApiError::from(parse);
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_display_includes_code_and_message() {
        let err = ApiError::forbidden("missing role 'admin'");
        assert_eq!(err.to_string(), "FORBIDDEN: missing role 'admin'");
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_details_attached() {
        let err = ApiError::bad_request("bad").with_details(serde_json::json!({"field": "name"}));
        assert_eq!(err.details().unwrap()["field"], "name");
    }
}
