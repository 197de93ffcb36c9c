//! Scope filter
//!
//! Decides which load balancers an operation may touch. An include list wins
//! outright; otherwise exclude patterns (literal names or `/regex/`) reject
//! matches; with neither configured every name is in scope.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{AlbError, Result};

/// One compiled exclude entry.
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    Literal(String),
    Regex(Regex),
}

impl ExcludePattern {
    /// Parse an entry; text wrapped in slashes is a regular expression
    pub fn parse(pattern: &str) -> Result<Self> {
        match pattern.strip_prefix('/').and_then(|p| p.strip_suffix('/')) {
            Some(expr) if pattern.len() >= 2 => Regex::new(expr).map(Self::Regex).map_err(|e| {
                AlbError::config_with_source(
                    format!("Invalid exclude pattern '{}'", pattern),
                    Box::new(e),
                )
            }),
            _ => Ok(Self::Literal(pattern.to_string())),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == name,
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Raw scope settings as written in configuration or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    include: Vec<String>,
    exclude: Vec<ExcludePattern>,
}

impl ScopeFilter {
    /// Compile a filter; an invalid regex fails here, before any gateway call
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let exclude = exclude.iter().map(|p| ExcludePattern::parse(p)).collect::<Result<_>>()?;
        Ok(Self { include: include.to_vec(), exclude })
    }

    pub fn from_settings(settings: &ScopeSettings) -> Result<Self> {
        Self::new(&settings.include, &settings.exclude)
    }

    /// A filter that accepts every name
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_scope(&self, name: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|n| n == name);
        }
        !self.exclude.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_include_list_ignores_excludes() {
        let filter = ScopeFilter::new(&strings(&["a", "b"]), &strings(&["a", "/.*/"])).unwrap();
        assert!(filter.in_scope("a"));
        assert!(filter.in_scope("b"));
        assert!(!filter.in_scope("c"));
    }

    #[test]
    fn test_regex_exclude() {
        let filter = ScopeFilter::new(&[], &strings(&["/^tmp-/"])).unwrap();
        assert!(!filter.in_scope("tmp-x"));
        assert!(filter.in_scope("prod-x"));
    }

    #[test]
    fn test_literal_exclude_is_exact() {
        let filter = ScopeFilter::new(&[], &strings(&["tmp"])).unwrap();
        assert!(!filter.in_scope("tmp"));
        assert!(filter.in_scope("tmp-x"));
        assert!(filter.in_scope("/tmp/"));
    }

    #[test]
    fn test_lone_slash_is_literal() {
        let filter = ScopeFilter::new(&[], &strings(&["/"])).unwrap();
        assert!(!filter.in_scope("/"));
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let error = ScopeFilter::new(&[], &strings(&["/([/"])).unwrap_err();
        assert!(matches!(error, AlbError::Config { .. }));
    }

    proptest! {
        #[test]
        fn prop_empty_filter_accepts_everything(name in ".*") {
            prop_assert!(ScopeFilter::all().in_scope(&name));
        }

        #[test]
        fn prop_include_list_is_membership(
            include in prop::collection::vec("[a-z]{1,5}", 1..5),
            name in "[a-z]{1,5}",
        ) {
            let filter = ScopeFilter::new(&include, &[]).unwrap();
            prop_assert_eq!(filter.in_scope(&name), include.contains(&name));
        }
    }
}
