//! Listener rule domain types

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::action::{validate_actions, Action};
use super::id::RuleArn;

/// A match condition such as `path-pattern` or `host-header`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Condition {
    pub fn new(field: impl Into<String>, values: &[&str]) -> Self {
        Self { field: field.into(), values: values.iter().map(|v| v.to_string()).collect() }
    }
}

/// Desired listener rule.
///
/// A rule is matched to a live rule only through `rule_arn`; rules without one
/// are always new. Priority is an ordering value, not identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_arn: Option<RuleArn>,

    #[serde(default)]
    #[validate(range(min = 1, max = 50000, message = "`priority' is required"))]
    pub priority: u32,

    #[serde(default)]
    #[validate(length(min = 1, message = "`conditions' is required"))]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    #[validate(
        length(min = 1, message = "`actions' is required"),
        custom(function = "validate_actions")
    )]
    pub actions: Vec<Action>,
}

impl RuleSpec {
    /// Short description used in log lines, e.g. the first condition value
    pub fn label(&self) -> String {
        self.conditions
            .first()
            .and_then(|c| c.values.first())
            .cloned()
            .unwrap_or_else(|| format!("priority {}", self.priority))
    }
}
