//! Size-bounded streaming JSON body decoding.
//!
//! Applies to `POST`, `PUT` and `PATCH` requests whose content type is
//! `application/json` or any `+json` type. Other requests pass through with
//! their body untouched.
//!
//! The body is read one frame at a time. As soon as the accumulated size would
//! exceed the ceiling, the body is dropped without reading further and the
//! request fails with `BAD_REQUEST`. A declared `content-length` above the
//! ceiling fails before anything is read.
//!
//! A body that ends early (frame error) or whose request is cancelled while
//! waiting for frames is treated as empty: nothing is attached and the chain
//! continues, since nobody is left to read the answer.

use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use portico_core::{body, ApiError, ApiResult, Body, Request, Response};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Default body ceiling (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Decodes JSON request bodies into [`Context::body`].
#[derive(Debug, Clone)]
pub struct JsonBodyMiddleware {
    max_bytes: usize,
}

impl Default for JsonBodyMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_BYTES)
    }
}

enum ReadOutcome {
    Complete(BytesMut),
    TooLarge,
    Aborted(String),
}

impl JsonBodyMiddleware {
    /// Accepts bodies up to `max_bytes`, inclusive.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// The body ceiling.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn applies(method: &Method, headers: &HeaderMap) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH)
            && headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(is_json_content_type)
    }

    fn too_large(&self) -> ApiError {
        ApiError::bad_request("Payload too large").with_details(json!({ "limit": self.max_bytes }))
    }

    async fn read(
        &self,
        body: &mut Body,
        cancellation: Option<CancellationToken>,
    ) -> ReadOutcome {
        let mut buf = BytesMut::new();
        loop {
            let frame = match &cancellation {
                Some(token) => tokio::select! {
                    biased;
                    () = token.cancelled() => return ReadOutcome::Aborted("request cancelled".into()),
                    frame = body.frame() => frame,
                },
                None => body.frame().await,
            };

            match frame {
                None => return ReadOutcome::Complete(buf),
                Some(Err(err)) => return ReadOutcome::Aborted(err.to_string()),
                Some(Ok(frame)) => {
                    // Trailers carry no payload.
                    if let Ok(data) = frame.into_data() {
                        if buf.len() + data.len() > self.max_bytes {
                            return ReadOutcome::TooLarge;
                        }
                        buf.extend_from_slice(&data);
                    }
                }
            }
        }
    }
}

/// Returns `true` for `application/json` and `*/*+json`, ignoring parameters.
#[must_use]
pub fn is_json_content_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim();
    let Some((kind, subtype)) = essence.split_once('/') else {
        return false;
    };
    !kind.is_empty()
        && (essence.eq_ignore_ascii_case("application/json")
            || subtype.to_ascii_lowercase().ends_with("+json"))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl Middleware for JsonBodyMiddleware {
    fn name(&self) -> &'static str {
        "json-body"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            if !Self::applies(request.method(), request.headers()) {
                return next.run(ctx, request).await;
            }

            if declared_length(request.headers())
                .is_some_and(|len| len > self.max_bytes as u64)
            {
                return Err(self.too_large());
            }

            let (parts, mut raw) = request.into_parts();
            match self.read(&mut raw, ctx.cancellation().cloned()).await {
                ReadOutcome::Complete(bytes) if bytes.is_empty() => {}
                ReadOutcome::Complete(bytes) => {
                    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                        ApiError::bad_request("Invalid body")
                            .with_details(json!({ "reason": e.to_string() }))
                    })?;
                    ctx.set_body(value);
                }
                ReadOutcome::TooLarge => {
                    drop(raw);
                    return Err(self.too_large());
                }
                ReadOutcome::Aborted(reason) => {
                    tracing::debug!(
                        correlation_id = ctx.correlation_id(),
                        reason = %reason,
                        "request body aborted"
                    );
                }
            }

            let request = Request::from_parts(parts, body::empty());
            next.run(ctx, request).await
        })
    }
}
