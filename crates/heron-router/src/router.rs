//! The ordered route table.

use http::Method;

use crate::{MethodFilter, Params, PathPattern, RouteError};

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route<T> {
    method: MethodFilter,
    pattern: PathPattern,
    value: T,
}

impl<T> Route<T> {
    /// Returns the method filter.
    #[must_use]
    pub const fn method(&self) -> &MethodFilter {
        &self.method
    }

    /// Returns the path pattern.
    #[must_use]
    pub const fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Returns the value bound to this route.
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    fn accepts(&self, method: &Method, path: &str) -> Option<Params> {
        if self.method.accepts(method) {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// A successful route match.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    route: &'a Route<T>,
    params: Params,
}

impl<'a, T> RouteMatch<'a, T> {
    /// Returns the matched route.
    #[must_use]
    pub const fn route(&self) -> &'a Route<T> {
        self.route
    }

    /// Returns the value bound to the matched route.
    #[must_use]
    pub const fn value(&self) -> &'a T {
        &self.route.value
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Consumes the match, returning its parameters.
    #[must_use]
    pub fn into_params(self) -> Params {
        self.params
    }
}

/// The outcome of [`Router::dispatch`].
#[derive(Debug)]
pub enum Dispatch<'a, T> {
    /// A registered route matched.
    Matched(RouteMatch<'a, T>),
    /// Nothing matched and a fallback is registered.
    Fallback(&'a T),
    /// Nothing matched and there is no fallback.
    NotFound,
}

/// Ordered, first-match route table.
///
/// `T` is whatever the caller binds to a route, typically a handler plus its
/// route-specific middleware.
///
/// # Example
///
/// ```rust
/// use heron_router::{Dispatch, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// router.add_route("GET", "/health", 1).unwrap();
/// router.add_route("*", "/echo", 2).unwrap();
///
/// assert!(matches!(router.dispatch(&Method::GET, "/health"), Dispatch::Matched(_)));
/// assert!(matches!(router.dispatch(&Method::PATCH, "/echo"), Dispatch::Matched(_)));
/// assert!(matches!(router.dispatch(&Method::GET, "/missing"), Dispatch::NotFound));
/// ```
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
    fallback: Option<T>,
}

impl<T> Router<T> {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fallback: None,
        }
    }

    /// Appends a route to the table.
    ///
    /// `method` is an HTTP method or `*`. Registering `("*", "*")` installs
    /// the fallback route; the `*` path with any other method is rejected.
    pub fn add_route(&mut self, method: &str, pattern: &str, value: T) -> Result<(), RouteError> {
        let method = MethodFilter::parse(method)?;

        if pattern == "*" {
            if method != MethodFilter::Any {
                return Err(RouteError::ReservedPattern);
            }
            if self.fallback.is_some() {
                return Err(RouteError::FallbackAlreadySet);
            }
            self.fallback = Some(value);
            return Ok(());
        }

        let pattern = PathPattern::parse(pattern)?;
        self.routes.push(Route {
            method,
            pattern,
            value,
        });
        Ok(())
    }

    /// Returns the number of registered routes, not counting the fallback.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns true if a fallback route is registered.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Returns the registered routes in match order.
    pub fn routes(&self) -> impl Iterator<Item = &Route<T>> {
        self.routes.iter()
    }

    /// Finds the route for a request.
    ///
    /// Routes are checked in registration order; the first one whose method
    /// filter accepts `method` and whose pattern matches `path` wins.
    #[must_use]
    pub fn dispatch(&self, method: &Method, path: &str) -> Dispatch<'_, T> {
        for route in &self.routes {
            if let Some(params) = route.accepts(method, path) {
                return Dispatch::Matched(RouteMatch { route, params });
            }
        }

        match &self.fallback {
            Some(value) => Dispatch::Fallback(value),
            None => Dispatch::NotFound,
        }
    }

    /// Extracts the parameters a route would bind for `path`.
    ///
    /// Returns an empty set when the path does not fit the route's pattern.
    #[must_use]
    pub fn extract_params(route: &Route<T>, path: &str) -> Params {
        route.pattern.matches(path).unwrap_or_default()
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matched<'a, T>(dispatch: Dispatch<'a, T>) -> RouteMatch<'a, T> {
        match dispatch {
            Dispatch::Matched(m) => m,
            Dispatch::Fallback(_) => panic!("expected a match, got the fallback"),
            Dispatch::NotFound => panic!("expected a match, got not found"),
        }
    }

    #[test]
    fn test_first_registered_route_wins() {
        let mut router = Router::new();
        router.add_route("GET", "/users/{id}", "R1").unwrap();
        router.add_route("GET", "/users/admin", "R2").unwrap();

        let m = matched(router.dispatch(&Method::GET, "/users/admin"));
        assert_eq!(*m.value(), "R1");
        assert_eq!(m.params().get("id"), Some("admin"));
    }

    #[test]
    fn test_literal_registered_first_wins() {
        let mut router = Router::new();
        router.add_route("GET", "/users/admin", "R1").unwrap();
        router.add_route("GET", "/users/{id}", "R2").unwrap();

        assert_eq!(*matched(router.dispatch(&Method::GET, "/users/admin")).value(), "R1");
        assert_eq!(*matched(router.dispatch(&Method::GET, "/users/7")).value(), "R2");
    }

    #[test]
    fn test_method_must_match_unless_wildcard() {
        let mut router = Router::new();
        router.add_route("POST", "/items", "create").unwrap();
        router.add_route("*", "/items", "any").unwrap();

        assert_eq!(*matched(router.dispatch(&Method::POST, "/items")).value(), "create");
        assert_eq!(*matched(router.dispatch(&Method::GET, "/items")).value(), "any");
    }

    #[test]
    fn test_fallback_and_not_found() {
        let mut router: Router<&str> = Router::new();
        router.add_route("GET", "/a", "a").unwrap();
        assert!(matches!(router.dispatch(&Method::GET, "/b"), Dispatch::NotFound));

        router.add_route("*", "*", "fallback").unwrap();
        assert!(router.has_fallback());
        assert!(matches!(
            router.dispatch(&Method::GET, "/b"),
            Dispatch::Fallback(&"fallback")
        ));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_star_path_is_reserved() {
        let mut router = Router::new();
        assert_eq!(
            router.add_route("GET", "*", ()),
            Err(RouteError::ReservedPattern)
        );
        router.add_route("*", "*", ()).unwrap();
        assert_eq!(
            router.add_route("*", "*", ()),
            Err(RouteError::FallbackAlreadySet)
        );
    }

    #[test]
    fn test_segment_count_mismatch_does_not_match() {
        let mut router = Router::new();
        router.add_route("GET", "/users/{id}", ()).unwrap();

        assert!(matches!(router.dispatch(&Method::GET, "/users"), Dispatch::NotFound));
        assert!(matches!(
            router.dispatch(&Method::GET, "/users/1/posts"),
            Dispatch::NotFound
        ));
    }

    #[test]
    fn test_extract_params() {
        let mut router = Router::new();
        router.add_route("GET", "/orgs/{org}/repos/{repo}", ()).unwrap();
        let route = router.routes().next().unwrap();

        let params = Router::extract_params(route, "/orgs/rust-lang/repos/cargo");
        assert_eq!(params.get("org"), Some("rust-lang"));
        assert_eq!(params.get("repo"), Some("cargo"));

        assert!(Router::extract_params(route, "/orgs/rust-lang").is_empty());
    }

    proptest! {
        #[test]
        fn prop_extract_params_is_repeatable(
            a in "[a-z0-9]{1,12}",
            b in "[a-z0-9]{1,12}",
        ) {
            let mut router = Router::new();
            router.add_route("GET", "/x/{a}/y/{b}", ()).unwrap();
            let route = router.routes().next().unwrap();
            let path = format!("/x/{a}/y/{b}");

            let first = Router::extract_params(route, &path);
            let second = Router::extract_params(route, &path);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.get("a"), Some(a.as_str()));
            prop_assert_eq!(first.get("b"), Some(b.as_str()));
        }
    }
}
