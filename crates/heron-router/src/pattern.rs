//! Path patterns and method filters.

use http::Method;

use crate::{Params, RouteError};

/// A single segment of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal segment (e.g., "users")
    Literal(String),

    /// A parameter segment (e.g., "{userId}")
    Param(String),
}

/// A parsed path pattern such as `/users/{id}/posts`.
///
/// Splitting ignores one leading and one trailing `/`. Empty segments in the
/// middle of a path are kept, so `/users//posts` has three segments and the
/// middle one never satisfies a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PathPattern {
    /// Parses a path pattern.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heron_router::{PathPattern, PathSegment};
    ///
    /// let pattern = PathPattern::parse("/users/{id}").unwrap();
    /// assert_eq!(pattern.segments()[1], PathSegment::Param("id".to_string()));
    /// assert!(PathPattern::parse("/users/{}").is_err());
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        if pattern == "*" {
            return Err(RouteError::ReservedPattern);
        }

        let invalid = |reason| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        for raw in split_path(pattern) {
            let segment = if let Some(inner) = raw.strip_prefix('{') {
                let name = inner.strip_suffix('}').ok_or_else(|| invalid("unclosed '{'"))?;
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                if name.contains(['{', '}', '/']) {
                    return Err(invalid("malformed parameter name"));
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, PathSegment::Param(existing) if existing == name))
                {
                    return Err(invalid("duplicate parameter name"));
                }
                PathSegment::Param(name.to_string())
            } else {
                if raw.contains(['{', '}']) {
                    return Err(invalid("parameters must span a whole segment"));
                }
                PathSegment::Literal(raw.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Returns the pattern as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Matches a request path, returning the extracted parameters.
    ///
    /// The path must have the same number of segments; literal segments
    /// must be equal and parameter segments must be non-empty.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut actual = split_path(path);
        let mut params = Params::new();

        for expected in &self.segments {
            let segment = actual.next()?;
            match expected {
                PathSegment::Literal(literal) => {
                    if literal != segment {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    if segment.is_empty() {
                        return None;
                    }
                    params.push(name.as_str(), segment);
                }
            }
        }

        if actual.next().is_some() {
            return None;
        }
        Some(params)
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a path into segments, ignoring one leading and one trailing `/`.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let empty = trimmed.is_empty();
    trimmed.split('/').filter(move |_| !empty)
}

/// The method a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Any method (registered as `*`).
    Any,
    /// Exactly this method.
    Exact(Method),
}

impl MethodFilter {
    /// Parses `*` or an HTTP method token.
    pub fn parse(method: &str) -> Result<Self, RouteError> {
        if method == "*" {
            return Ok(Self::Any);
        }
        Method::from_bytes(method.as_bytes())
            .map(Self::Exact)
            .map_err(|_| RouteError::InvalidMethod(method.to_string()))
    }

    /// Returns true if this filter accepts the method.
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == method,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        Self::Exact(method)
    }
}

impl std::fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(method) => f.write_str(method.as_str()),
        }
    }
}
