//! API version negotiation.
//!
//! The requested version comes from, in order:
//!
//! 1. the `x-api-version` header
//! 2. the `version` path parameter
//! 3. a `/v<N>/` path segment
//! 4. the first supported version
//!
//! A leading `v` is ignored, so `v2` and `2` are the same version.

use http::header::{HeaderName, HeaderValue};
use portico_core::{ApiError, ApiResult, Request, Response};
use serde_json::json;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Version header, read on requests and staged on responses.
pub const API_VERSION_HEADER: &str = "x-api-version";

/// Path parameter consulted when the header is absent.
pub const VERSION_PARAM: &str = "version";

/// Resolves and enforces the API version.
#[derive(Debug, Clone)]
pub struct VersionMiddleware {
    supported: Vec<String>,
}

impl VersionMiddleware {
    /// Accepts `supported`; the first entry is the default.
    ///
    /// An empty list falls back to `["1"]`.
    #[must_use]
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut versions: Vec<String> = supported
            .into_iter()
            .map(|v| normalize(v.as_ref()).to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if versions.is_empty() {
            versions.push("1".to_string());
        }
        Self {
            supported: versions,
        }
    }

    /// Supported versions, default first.
    #[must_use]
    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// The version used when the request names none.
    #[must_use]
    pub fn default_version(&self) -> &str {
        &self.supported[0]
    }

    /// The version `request` asks for, before checking support.
    #[must_use]
    pub fn requested(&self, ctx: &Context, request: &Request) -> String {
        request
            .headers()
            .get(API_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| ctx.param(VERSION_PARAM))
            .or_else(|| path_version(ctx.path()))
            .map_or_else(|| self.default_version().to_string(), |v| normalize(v).to_string())
    }
}

fn normalize(version: &str) -> &str {
    let version = version.trim();
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

/// Finds a `v<digits>` segment that is followed by more path.
fn path_version(path: &str) -> Option<&str> {
    let mut segments = path.split('/').skip(1).peekable();
    while let Some(segment) = segments.next() {
        segments.peek()?;
        let is_version = segment.len() > 1
            && segment.starts_with(['v', 'V'])
            && segment[1..].bytes().all(|b| b.is_ascii_digit());
        if is_version {
            return Some(segment);
        }
    }
    None
}

impl Middleware for VersionMiddleware {
    fn name(&self) -> &'static str {
        "version"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut Context,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, ApiResult<Response>> {
        Box::pin(async move {
            let requested = self.requested(ctx, &request);
            if !self.supported.iter().any(|v| *v == requested) {
                return Err(ApiError::bad_request("Unsupported API version").with_details(json!({
                    "requested": requested,
                    "supported": self.supported,
                })));
            }

            if let Ok(value) = HeaderValue::from_str(&requested) {
                ctx.stage_header(HeaderName::from_static(API_VERSION_HEADER), value);
            }
            ctx.set_api_version(requested);
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::routes::Routes;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use portico_core::body;

    fn version(ctx: &mut Context, _req: Request) -> BoxFuture<'_, ApiResult<Response>> {
        Box::pin(async move { Ok(ctx.text(StatusCode::OK, ctx.api_version().unwrap_or("-"))) })
    }

    fn pipeline() -> Pipeline {
        let mut routes = Routes::new();
        routes.get("/api/:version/echo", version).unwrap();
        routes.get("/v2/things", version).unwrap();
        routes.get("/plain", version).unwrap();
        Pipeline::builder()
            .stage(VersionMiddleware::new(["1", "v2"]))
            .routes(routes)
            .build()
    }

    async fn call(uri: &str, header: Option<&str>) -> (StatusCode, String, Option<String>) {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(value) = header {
            builder = builder.header(API_VERSION_HEADER, value);
        }
        let response = pipeline()
            .handle(builder.body(body::empty()).unwrap(), None)
            .await;
        let status = response.status();
        let staged = response
            .headers()
            .get(API_VERSION_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), staged)
    }

    #[test]
    fn test_supported_versions_normalized() {
        let stage = VersionMiddleware::new(["v1", "2", " "]);
        assert_eq!(stage.supported(), ["1", "2"]);
        assert_eq!(stage.default_version(), "1");
        assert_eq!(VersionMiddleware::new(Vec::<String>::new()).supported(), ["1"]);
    }

    #[test]
    fn test_path_version_segment() {
        assert_eq!(path_version("/v2/things"), Some("v2"));
        assert_eq!(path_version("/api/v10/x"), Some("v10"));
        assert_eq!(path_version("/v2"), None);
        assert_eq!(path_version("/vx/things"), None);
        assert_eq!(path_version("/plain"), None);
    }

    #[tokio::test]
    async fn test_header_wins_over_param() {
        let (status, body, staged) = call("/api/1/echo", Some("v2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "2");
        assert_eq!(staged.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_param_then_segment_then_default() {
        assert_eq!(call("/api/v2/echo", None).await.1, "2");
        assert_eq!(call("/v2/things", None).await.1, "2");
        assert_eq!(call("/plain", None).await.1, "1");
    }

    #[tokio::test]
    async fn test_unsupported_version_is_rejected() {
        let (status, body, _) = call("/api/3/echo", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["message"], "Unsupported API version");
        assert_eq!(json["error"]["details"]["requested"], "3");
        assert_eq!(json["error"]["details"]["supported"], serde_json::json!(["1", "2"]));
    }
}
