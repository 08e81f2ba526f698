//! Ordered route table.

use http::Method;
use regex::Regex;

use crate::error::RouterError;
use crate::params::Params;

/// Marker that turns a pattern segment into a named parameter.
pub const PARAM_MARKER: char = ':';

/// A registered route.
///
/// `T` is whatever the caller dispatches to (a handler plus route-scoped
/// middleware in `portico-middleware`).
#[derive(Debug, Clone)]
pub struct Route<T> {
    method: Method,
    pattern: String,
    param_names: Vec<String>,
    matcher: Regex,
    target: T,
}

impl<T> Route<T> {
    /// Compiles `pattern` into an anchored matcher.
    ///
    /// Segments starting with `:` capture one non-empty path segment; every
    /// other segment is escaped and must match literally.
    pub fn compile(method: Method, pattern: &str, target: T) -> Result<Self, RouterError> {
        if pattern.is_empty() {
            return Err(RouterError::EmptyPattern);
        }
        if !pattern.starts_with('/') {
            return Err(RouterError::MissingLeadingSlash(pattern.to_string()));
        }

        let mut param_names: Vec<String> = Vec::new();
        let mut source = String::from("^");
        for segment in pattern[1..].split('/') {
            source.push('/');
            if let Some(name) = segment.strip_prefix(PARAM_MARKER) {
                if !is_valid_param_name(name) {
                    return Err(RouterError::InvalidParamName {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                if param_names.iter().any(|n| n == name) {
                    return Err(RouterError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                param_names.push(name.to_string());
                source.push_str("([^/]+)");
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        source.push('$');

        let matcher = Regex::new(&source).map_err(|e| RouterError::Compile {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        debug_assert_eq!(matcher.captures_len() - 1, param_names.len());

        Ok(Self {
            method,
            pattern: pattern.to_string(),
            param_names,
            matcher,
            target,
        })
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the pattern as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the parameter names in capture order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Returns the number of capture groups in the compiled matcher.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.matcher.captures_len() - 1
    }

    /// Returns the dispatch target.
    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns the dispatch target mutably, for use while the table is built.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    fn matches(&self, method: &Method, path: &str) -> Option<Params> {
        if self.method != *method {
            return None;
        }
        let captures = self.matcher.captures(path)?;
        let params = self
            .param_names
            .iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, capture)| {
                let raw = capture?.as_str();
                let value = urlencoding::decode(raw)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                Some((name.clone(), value))
            })
            .collect();
        Some(params)
    }
}

fn is_valid_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A successful match.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// The matched route.
    pub route: &'a Route<T>,
    /// Values captured from the path.
    pub params: Params,
}

/// Routes tried in registration order; the first match wins.
///
/// Overlapping patterns are not disambiguated, so register the most specific
/// ones first.
///
/// # Example
///
/// ```rust
/// use portico_router::Router;
/// use http::Method;
///
/// let mut router = Router::new();
/// router.register(Method::GET, "/api/:version/users/:id", "get_user").unwrap();
///
/// let matched = router.match_route(&Method::GET, "/api/1/users/42").unwrap();
/// assert_eq!(*matched.route.target(), "get_user");
/// assert_eq!(matched.params.get("version"), Some("1"));
/// assert_eq!(matched.params.get("id"), Some("42"));
/// ```
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a route and returns it for further configuration.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        target: T,
    ) -> Result<&mut Route<T>, RouterError> {
        let route = Route::compile(method, pattern, target)?;
        self.routes.push(route);
        let last = self.routes.len() - 1;
        Ok(&mut self.routes[last])
    }

    /// Finds the first route matching `method` and `path`.
    ///
    /// Anything after `?` in `path` is ignored.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, T>> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        self.routes.iter().find_map(|route| {
            route
                .matches(method, path)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// Iterates over routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route<T>> {
        self.routes.iter()
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn router() -> Router<&'static str> {
        let mut router = Router::new();
        router.register(Method::GET, "/health/live", "live").unwrap();
        router.register(Method::GET, "/users/me", "me").unwrap();
        router.register(Method::GET, "/users/:id", "user").unwrap();
        router.register(Method::POST, "/users/:id", "update").unwrap();
        router
            .register(Method::GET, "/api/:version/users/:id", "versioned")
            .unwrap();
        router
    }

    #[test]
    fn test_versioned_user_params() {
        let router = router();
        let matched = router.match_route(&Method::GET, "/api/1/users/42").unwrap();

        assert_eq!(*matched.route.target(), "versioned");
        assert_eq!(matched.params.get("version"), Some("1"));
        assert_eq!(matched.params.get("id"), Some("42"));
        assert_eq!(matched.params.len(), 2);
    }

    #[test]
    fn test_first_registered_wins() {
        let router = router();
        let matched = router.match_route(&Method::GET, "/users/me").unwrap();
        assert_eq!(*matched.route.target(), "me");

        let mut reversed = Router::new();
        reversed.register(Method::GET, "/users/:id", "user").unwrap();
        reversed.register(Method::GET, "/users/me", "me").unwrap();
        let matched = reversed.match_route(&Method::GET, "/users/me").unwrap();
        assert_eq!(*matched.route.target(), "user");
    }

    #[test]
    fn test_method_must_match() {
        let router = router();
        assert_eq!(
            *router.match_route(&Method::POST, "/users/7").unwrap().route.target(),
            "update"
        );
        assert!(router.match_route(&Method::DELETE, "/users/7").is_none());
        assert!(router.match_route(&Method::HEAD, "/health/live").is_none());
    }

    #[test]
    fn test_match_is_anchored() {
        let router = router();
        assert!(router.match_route(&Method::GET, "/health/live/extra").is_none());
        assert!(router.match_route(&Method::GET, "/prefix/health/live").is_none());
        assert!(router.match_route(&Method::GET, "/users/").is_none());
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let mut router = Router::new();
        router.register(Method::GET, "/files/a.b+c", "file").unwrap();

        assert!(router.match_route(&Method::GET, "/files/a.b+c").is_some());
        assert!(router.match_route(&Method::GET, "/files/aXb+c").is_none());
        assert!(router.match_route(&Method::GET, "/files/a.bbc").is_none());
    }

    #[test]
    fn test_query_string_ignored_and_params_decoded() {
        let router = router();
        let matched = router
            .match_route(&Method::GET, "/users/jane%20doe?expand=true")
            .unwrap();
        assert_eq!(matched.params.get("id"), Some("jane doe"));
    }

    #[test]
    fn test_root_pattern() {
        let mut router = Router::new();
        router.register(Method::GET, "/", "root").unwrap();
        assert!(router.match_route(&Method::GET, "/").is_some());
        assert!(router.match_route(&Method::GET, "/x").is_none());
    }

    #[test]
    fn test_registration_errors() {
        let mut router: Router<()> = Router::new();
        assert!(matches!(
            router.register(Method::GET, "", ()),
            Err(RouterError::EmptyPattern)
        ));
        assert!(matches!(
            router.register(Method::GET, "users", ()),
            Err(RouterError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            router.register(Method::GET, "/a/:id/b/:id", ()),
            Err(RouterError::DuplicateParam { .. })
        ));
        assert!(matches!(
            router.register(Method::GET, "/a/:", ()),
            Err(RouterError::InvalidParamName { .. })
        ));
        assert!(router.is_empty());
    }

    #[test]
    fn test_param_count_equals_capture_count() {
        let router = router();
        for route in router.routes() {
            assert_eq!(route.param_names().len(), route.capture_count(), "{}", route.pattern());
        }
    }

    proptest! {
        #[test]
        fn prop_matching_is_deterministic(
            version in "[a-z0-9]{1,6}",
            id in "[A-Za-z0-9_-]{1,12}",
        ) {
            let router = router();
            let path = format!("/api/{version}/users/{id}");
            let first = router.match_route(&Method::GET, &path).map(|m| (m.route.pattern().to_string(), m.params));
            let second = router.match_route(&Method::GET, &path).map(|m| (m.route.pattern().to_string(), m.params));
            prop_assert_eq!(&first, &second);
            let (_, params) = first.unwrap();
            prop_assert_eq!(params.get("id"), Some(id.as_str()));
        }
    }
}
