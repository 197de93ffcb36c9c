//! Target group domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use validator::Validate;

/// Application protocol spoken by listeners, target groups and health checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check parameters. Every field has a provider default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthCheck {
    pub protocol: Protocol,
    /// Numeric port or `traffic-port`
    pub port: String,
    pub path: String,
    #[validate(range(min = 5, max = 300))]
    pub interval_seconds: u32,
    #[validate(range(min = 2, max = 120))]
    pub timeout_seconds: u32,
    #[validate(range(min = 2, max = 10))]
    pub healthy_threshold_count: u32,
    #[validate(range(min = 2, max = 10))]
    pub unhealthy_threshold_count: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            port: "traffic-port".to_string(),
            path: "/".to_string(),
            interval_seconds: 30,
            timeout_seconds: 5,
            healthy_threshold_count: 5,
            unhealthy_threshold_count: 2,
        }
    }
}

/// HTTP codes a healthy target answers with, e.g. `200` or `200-299`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub http_code: String,
}

impl Default for Matcher {
    fn default() -> Self {
        Self { http_code: "200".to_string() }
    }
}

/// Desired target group.
///
/// `vpc_id` may be left empty in a document; the loader fills it from the
/// enclosing network before validation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TargetGroupSpec {
    #[serde(default)]
    #[validate(length(min = 1, message = "`name' is required"))]
    pub name: String,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    #[validate(range(min = 1, max = 65535, message = "`port' is required"))]
    pub port: u32,

    #[serde(default)]
    #[validate(length(min = 1, message = "`vpc_id' is required"))]
    pub vpc_id: String,

    #[serde(default)]
    #[validate(nested)]
    pub health_check: HealthCheck,

    #[serde(default)]
    pub matcher: Matcher,

    /// Member instance ids
    #[serde(default)]
    pub instances: BTreeSet<String>,
}

impl TargetGroupSpec {
    /// Create a target group with default health checking and no members
    pub fn new(
        name: impl Into<String>,
        protocol: Protocol,
        port: u32,
        vpc_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            port,
            vpc_id: vpc_id.into(),
            health_check: HealthCheck::default(),
            matcher: Matcher::default(),
            instances: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_document() {
        let spec: TargetGroupSpec =
            serde_yaml::from_str("name: web\nport: 80\nvpc_id: vpc-1\n").unwrap();
        assert_eq!(spec.protocol, Protocol::Http);
        assert_eq!(spec.health_check, HealthCheck::default());
        assert_eq!(spec.health_check.port, "traffic-port");
        assert_eq!(spec.matcher.http_code, "200");
        assert!(spec.instances.is_empty());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_required_fields() {
        let spec = TargetGroupSpec::new("", Protocol::Http, 0, "");
        let errors = spec.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("port"));
        assert!(fields.contains_key("vpc_id"));
    }

    #[test]
    fn test_protocol_serialization() {
        assert_eq!(serde_json::to_string(&Protocol::Https).unwrap(), "\"HTTPS\"");
    }
}
