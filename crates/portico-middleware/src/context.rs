//! Per-request state carried through the chain.
//!
//! A [`Context`] is created for one request, threaded by `&mut` through every
//! stage and the handler, and dropped when the response is produced. It is
//! never shared between requests.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use portico_core::{envelope, ApiError, ApiResult, Identity, Request, Response};
use portico_router::Params;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable state for one request.
///
/// # Example
///
/// ```
/// use portico_core::Identity;
/// use portico_middleware::Context;
///
/// let mut ctx = Context::new();
/// assert!(ctx.install_identity(Identity::new("user-1", ["admin"])));
///
/// // Identity is set once per request.
/// assert!(!ctx.install_identity(Identity::new("user-2", Vec::<String>::new())));
/// assert_eq!(ctx.identity().unwrap().id(), "user-1");
/// ```
#[derive(Debug)]
pub struct Context {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    params: Params,
    route_pattern: Option<String>,
    remote_addr: Option<SocketAddr>,
    started_at: Instant,
    request_id: String,
    correlation_id: String,
    api_version: Option<String>,
    identity: Option<Identity>,
    cancellation: Option<CancellationToken>,
    timed_out: bool,
    body: Option<serde_json::Value>,
    response_headers: HeaderMap,
    /// Highest stage index entered so far.
    cursor: Option<usize>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Creates a context for `GET /` with fresh ids.
    ///
    /// [`Pipeline::dispatch`](crate::Pipeline::dispatch) overwrites the
    /// method, path and query with those of the request it runs.
    #[must_use]
    pub fn new() -> Self {
        let id = Uuid::now_v7().to_string();
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query: Vec::new(),
            params: Params::new(),
            route_pattern: None,
            remote_addr: None,
            started_at: Instant::now(),
            correlation_id: id.clone(),
            request_id: id,
            api_version: None,
            identity: None,
            cancellation: None,
            timed_out: false,
            body: None,
            response_headers: HeaderMap::new(),
            cursor: None,
            extensions: HashMap::new(),
        }
    }

    /// Creates a context describing `request`.
    ///
    /// A malformed query string yields no query parameters.
    #[must_use]
    pub fn for_request(request: &Request, remote_addr: Option<SocketAddr>) -> Self {
        let mut ctx = Self {
            remote_addr,
            ..Self::new()
        };
        ctx.sync_from(request);
        ctx
    }

    /// Records the method, path and query of `request`.
    pub(crate) fn sync_from(&mut self, request: &Request) {
        let uri = request.uri();
        self.method = request.method().clone();
        self.path = uri.path().to_string();
        self.query = uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of query parameter `name`.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All query pairs in order.
    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Path parameters of the matched route.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// A single path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Pattern of the matched route, if any.
    #[must_use]
    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    pub(crate) fn set_route(&mut self, pattern: &str, params: Params) {
        self.route_pattern = Some(pattern.to_string());
        self.params = params;
    }

    /// Address of the connected peer.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// When the context was created.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Replaces the request id.
    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = id.into();
    }

    /// Correlation id, used in every envelope.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Replaces the correlation id.
    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = id.into();
    }

    /// Negotiated API version.
    #[must_use]
    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// Records the negotiated API version.
    pub fn set_api_version(&mut self, version: impl Into<String>) {
        self.api_version = Some(version.into());
    }

    /// Caller identity, or `None` for anonymous requests.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Installs the caller identity.
    ///
    /// Returns `false` and keeps the existing identity if one is already set.
    pub fn install_identity(&mut self, identity: Identity) -> bool {
        if let Some(existing) = &self.identity {
            tracing::warn!(
                existing = existing.id(),
                rejected = identity.id(),
                "identity already installed for this request"
            );
            return false;
        }
        self.identity = Some(identity);
        true
    }

    /// Cancellation token for this request, once a timeout guard has set one.
    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Installs the cancellation token.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = Some(token);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Returns `true` if the deadline expired before the chain finished.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub(crate) fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    /// Decoded JSON body, if the body decoder attached one.
    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Attaches a decoded body.
    pub fn set_body(&mut self, value: serde_json::Value) {
        self.body = Some(value);
    }

    /// Removes the decoded body.
    pub fn take_body(&mut self) -> Option<serde_json::Value> {
        self.body.take()
    }

    /// Headers staged for the final response.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Stages a header for the final response, replacing any earlier value.
    ///
    /// Staged headers are applied whether the chain ends in a response or an
    /// error envelope.
    pub fn stage_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    /// Moves the stage cursor forward.
    ///
    /// # Panics
    ///
    /// If `index` is not strictly greater than the last stage entered.
    pub(crate) fn advance_cursor(&mut self, index: usize, stage: &str) {
        if let Some(last) = self.cursor {
            assert!(
                index > last,
                "stage cursor violation: '{stage}' (stage {index}) entered after stage {last}"
            );
        }
        self.cursor = Some(index);
    }

    /// Stores a typed extension value, replacing one of the same type.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Returns `true` if an extension of type `T` is stored.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// JSON response helper.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> ApiResult<Response> {
        envelope::json_response(status, value)
    }

    /// Plain-text response helper.
    #[must_use]
    pub fn text(&self, status: StatusCode, text: impl Into<String>) -> Response {
        envelope::text_response(status, text)
    }

    /// Raw response helper.
    #[must_use]
    pub fn send(
        &self,
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> Response {
        envelope::bytes_response(status, content_type, body)
    }

    /// Renders `error` as an envelope carrying this request's correlation id.
    ///
    /// Internal messages are hidden.
    #[must_use]
    pub fn error(&self, error: &ApiError) -> Response {
        envelope::error_response(error, &self.correlation_id, false)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::body;

    #[test]
    fn test_new_context_has_matching_ids() {
        let ctx = Context::new();
        assert_eq!(ctx.request_id(), ctx.correlation_id());
        assert!(Uuid::parse_str(ctx.request_id()).is_ok());
        assert!(ctx.identity().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_for_request_parses_path_and_query() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/api/1/echo?limit=10&tag=a&tag=b")
            .body(body::empty())
            .unwrap();
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let ctx = Context::for_request(&request, Some(addr));

        assert_eq!(*ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/api/1/echo");
        assert_eq!(ctx.query("limit"), Some("10"));
        assert_eq!(ctx.query("tag"), Some("a"));
        assert_eq!(ctx.query_pairs().len(), 3);
        assert_eq!(ctx.remote_addr(), Some(addr));
    }

    #[test]
    fn test_identity_is_set_once() {
        let mut ctx = Context::new();
        assert!(ctx.install_identity(Identity::new("a", ["admin"])));
        assert!(!ctx.install_identity(Identity::new("b", ["root"])));
        assert_eq!(ctx.identity().unwrap().id(), "a");
    }

    #[test]
    fn test_cursor_advances_forward() {
        let mut ctx = Context::new();
        ctx.advance_cursor(0, "a");
        ctx.advance_cursor(1, "b");
        ctx.advance_cursor(5, "handler");
    }

    #[test]
    #[should_panic(expected = "stage cursor violation")]
    fn test_cursor_rejects_same_stage() {
        let mut ctx = Context::new();
        ctx.advance_cursor(0, "a");
        ctx.advance_cursor(1, "b");
        ctx.advance_cursor(1, "b");
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Tenant(&'static str);

        let mut ctx = Context::new();
        assert!(!ctx.has_extension::<Tenant>());
        ctx.set_extension(Tenant("acme"));
        assert_eq!(ctx.get_extension::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(ctx.remove_extension::<Tenant>(), Some(Tenant("acme")));
        assert!(!ctx.has_extension::<Tenant>());
    }

    #[test]
    fn test_staged_headers_replace() {
        let mut ctx = Context::new();
        ctx.stage_header(
            HeaderName::from_static("x-api-version"),
            HeaderValue::from_static("1"),
        );
        ctx.stage_header(
            HeaderName::from_static("x-api-version"),
            HeaderValue::from_static("2"),
        );
        assert_eq!(ctx.response_headers()["x-api-version"], "2");
    }

    #[test]
    fn test_error_helper_uses_correlation_id() {
        let mut ctx = Context::new();
        ctx.set_correlation_id("corr-9");
        let response = ctx.error(&ApiError::forbidden("nope"));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
