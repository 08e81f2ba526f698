//! The uniform response envelope.
//!
//! Successful responses are plain JSON or text built with [`json_response`],
//! [`text_response`] and [`bytes_response`]. Failures are always rendered as:
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "...", "details": {} }, "correlationId": "..." }
//! ```

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};

use crate::body::Response;
use crate::error::{ApiError, ApiResult, ErrorCode};

/// Message shown to clients for `INTERNAL` errors when internals are hidden.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Wire form of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error body.
    pub error: ErrorBody,
    /// Correlation id of the failed request.
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
}

/// The `error` member of an [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable taxonomy code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Builds the envelope for `error`.
    ///
    /// With `expose_internal` unset, `INTERNAL` errors surface
    /// [`INTERNAL_ERROR_MESSAGE`] and drop their details.
    #[must_use]
    pub fn from_error(error: &ApiError, correlation_id: &str, expose_internal: bool) -> Self {
        let hide = error.code() == ErrorCode::Internal && !expose_internal;
        Self {
            error: ErrorBody {
                code: error.code(),
                message: if hide {
                    INTERNAL_ERROR_MESSAGE.to_string()
                } else {
                    error.message().to_string()
                },
                details: if hide { None } else { error.details().cloned() },
            },
            correlation_id: correlation_id.to_string(),
        }
    }
}

/// Renders `error` as an envelope response with the matching status.
///
/// A `retry-after` header is added when the error carries a hint.
#[must_use]
pub fn error_response(error: &ApiError, correlation_id: &str, expose_internal: bool) -> Response {
    let envelope = ErrorEnvelope::from_error(error, correlation_id, expose_internal);
    // The envelope holds only strings and JSON values, so this cannot fail in practice.
    let body = serde_json::to_vec(&envelope).unwrap_or_else(|_| {
        format!(
            r#"{{"error":{{"code":"{}","message":"{}"}},"correlationId":""}}"#,
            error.code(),
            INTERNAL_ERROR_MESSAGE
        )
        .into_bytes()
    });

    let mut response = bytes_response(error.status(), APPLICATION_JSON, body);
    if let Some(seconds) = error.retry_after_seconds() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

/// Serializes `value` as a JSON response.
pub fn json_response<T>(status: StatusCode, value: &T) -> ApiResult<Response>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(value)?;
    Ok(bytes_response(status, APPLICATION_JSON, body))
}

/// Builds a `text/plain` response.
#[must_use]
pub fn text_response(status: StatusCode, text: impl Into<String>) -> Response {
    bytes_response(status, TEXT_PLAIN, text.into())
}

/// Builds a response with an explicit content type.
#[must_use]
pub fn bytes_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
