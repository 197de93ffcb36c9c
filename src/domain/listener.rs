//! Listener domain types
//!
//! A listener is identified by its port within a load balancer. Its default
//! action and the actions of its rules reference target groups, usually by
//! name.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::action::{validate_actions, Action};
use super::rule::RuleSpec;
use super::target_group::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_arn: String,
}

/// Desired listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ListenerSpec {
    #[serde(default)]
    #[validate(range(min = 1, max = 65535, message = "`port' is required"))]
    pub port: u32,

    #[serde(default)]
    pub protocol: Protocol,

    /// Order is significant; the first certificate is the default one
    #[serde(default)]
    pub certificates: Vec<Certificate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,

    #[serde(default)]
    #[validate(
        length(equal = 1, message = "exactly one default action is required"),
        custom(function = "validate_actions")
    )]
    pub default_actions: Vec<Action>,

    #[serde(default)]
    #[validate(nested)]
    pub rules: Vec<RuleSpec>,
}

impl ListenerSpec {
    /// Whether a TLS policy is configured; without one certificates are not compared.
    pub fn has_ssl_policy(&self) -> bool {
        self.ssl_policy.as_deref().is_some_and(|p| !p.is_empty())
    }
}
