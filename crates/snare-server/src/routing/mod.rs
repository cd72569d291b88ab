//! Handler matching for captured HTTP requests.
//!
//! Patterns are `/`-separated and mount-style: literal segments match
//! exactly, `:name` segments match any non-empty segment and bind a named
//! parameter, and a trailing `*` (or simply extra path segments beyond the
//! pattern) matches the remainder of the path. `/foo` therefore matches
//! both `/foo` and `/foo/bar`. Matching is pure: it never mutates the
//! registry snapshot or the exchange.

use crate::model::HandlerDefinition;
use std::collections::HashMap;

/// Bound path parameters from a successful match.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let mut raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        // A trailing `*` spells out what mount-style matching already does.
        if raw.last() == Some(&"*") {
            raw.pop();
        }

        let segments = raw
            .into_iter()
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();

        Self { segments }
    }

    /// Match a request path, binding `:name` parameters on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if parts.len() < self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(expected) if expected == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

fn method_matches(handler_method: &str, request_method: &str) -> bool {
    handler_method == "*" || handler_method.eq_ignore_ascii_case(request_method)
}

/// Select and order the handlers matching a request.
///
/// Output is sorted ascending by `order`; ties keep registry order (the
/// input slice order). The registry snapshot is read fresh per exchange by
/// the caller, so definition updates apply without a restart.
pub fn match_handlers(
    registry: &[HandlerDefinition],
    method: &str,
    path: &str,
) -> Vec<(HandlerDefinition, PathParams)> {
    let mut matched: Vec<(HandlerDefinition, PathParams)> = registry
        .iter()
        .filter(|h| method_matches(&h.method, method))
        .filter_map(|h| {
            PathPattern::parse(&h.path)
                .matches(path)
                .map(|params| (h.clone(), params))
        })
        .collect();
    matched.sort_by_key(|(h, _)| h.order);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn handler(name: &str, method: &str, path: &str, order: i64) -> HandlerDefinition {
        HandlerDefinition {
            id: Uuid::new_v4(),
            version: 0,
            name: name.to_string(),
            code: String::new(),
            method: method.to_string(),
            path: path.to_string(),
            order,
            jwks: None,
        }
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::parse("/foo/bar");
        assert!(pattern.matches("/foo/bar").is_some());
        assert!(pattern.matches("/foo").is_none());
        assert!(pattern.matches("/foo/other").is_none());
        // Mount-style: deeper paths under the pattern still match
        assert!(pattern.matches("/foo/bar/baz").is_some());
    }

    #[test]
    fn test_shorter_pattern_matches_deeper_path() {
        let pattern = PathPattern::parse("/foo");
        assert!(pattern.matches("/foo/bar").is_some());
    }

    #[test]
    fn test_param_binding() {
        let pattern = PathPattern::parse("/foo/:id");
        let params = pattern.matches("/foo/bar").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("bar"));
        // :id requires a non-empty segment
        assert!(pattern.matches("/foo").is_none());
        assert!(pattern.matches("/foo/").is_none());
    }

    #[test]
    fn test_trailing_wildcard() {
        let pattern = PathPattern::parse("/api/*");
        assert!(pattern.matches("/api").is_some());
        assert!(pattern.matches("/api/v1").is_some());
        assert!(pattern.matches("/api/v1/users/42").is_some());
        assert!(pattern.matches("/other").is_none());
    }

    #[test]
    fn test_wildcard_with_params() {
        let pattern = PathPattern::parse("/users/:id/*");
        let params = pattern.matches("/users/7/posts/3").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let pattern = PathPattern::parse("/foo/bar");
        assert!(pattern.matches("/foo/bar/").is_some());
    }

    #[test]
    fn test_method_filter() {
        let registry = vec![
            handler("any", "*", "/x", 0),
            handler("get", "GET", "/x", 0),
            handler("post", "POST", "/x", 0),
        ];
        let matched = match_handlers(&registry, "GET", "/x");
        let names: Vec<&str> = matched.iter().map(|(h, _)| h.name.as_str()).collect();
        assert_eq!(names, vec!["any", "get"]);
    }

    #[test]
    fn test_order_ascending_with_stable_ties() {
        let registry = vec![
            handler("c", "*", "/x", 5),
            handler("a", "*", "/x", 1),
            handler("b1", "*", "/x", 3),
            handler("b2", "*", "/x", 3),
        ];
        let matched = match_handlers(&registry, "GET", "/x");
        let names: Vec<&str> = matched.iter().map(|(h, _)| h.name.as_str()).collect();
        // Ties (b1, b2) keep registry order
        assert_eq!(names, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn test_overlapping_patterns_both_match() {
        let registry = vec![
            handler("h1", "*", "/foo/*", 1),
            handler("h2", "GET", "/foo/bar", 2),
        ];
        let matched = match_handlers(&registry, "GET", "/foo/bar");
        let names: Vec<&str> = matched.iter().map(|(h, _)| h.name.as_str()).collect();
        assert_eq!(names, vec!["h1", "h2"]);
    }

    #[test]
    fn test_no_match_yields_empty_list() {
        let registry = vec![handler("h", "GET", "/foo", 0)];
        assert!(match_handlers(&registry, "DELETE", "/nope").is_empty());
    }
}
