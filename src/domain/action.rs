//! Listener and rule actions
//!
//! An action targets a target group either by runtime identifier or by name.
//! Names are symbolic: they are resolved against the target groups known at
//! the point of use and never reach the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::ValidationError;

use super::id::TargetGroupArn;

/// Kind of routing action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    #[default]
    Forward,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Forward => "forward",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type", default)]
    pub action_type: ActionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<TargetGroupArn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_name: Option<String>,
}

impl Action {
    /// Create a forward action pointing at a target group by name
    pub fn forward_to_name(name: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Forward,
            target_group_arn: None,
            target_group_name: Some(name.into()),
        }
    }

    /// Create a forward action pointing at a target group by identifier
    pub fn forward_to_arn(arn: TargetGroupArn) -> Self {
        Self {
            action_type: ActionType::Forward,
            target_group_arn: Some(arn),
            target_group_name: None,
        }
    }

    /// The action as sent to the gateway: the symbolic name is stripped.
    pub fn payload(&self) -> Self {
        Self {
            action_type: self.action_type,
            target_group_arn: self.target_group_arn.clone(),
            target_group_name: None,
        }
    }

    /// Human-readable target for log lines and error messages.
    pub fn target_label(&self) -> String {
        match (&self.target_group_name, &self.target_group_arn) {
            (Some(name), _) => name.clone(),
            (None, Some(arn)) => arn.to_string(),
            (None, None) => "<none>".to_string(),
        }
    }
}

/// Strip symbolic names from a list of actions.
pub fn payload_actions(actions: &[Action]) -> Vec<Action> {
    actions.iter().map(Action::payload).collect()
}

/// Every action must name its target group or carry its identifier.
pub fn validate_actions(actions: &[Action]) -> Result<(), ValidationError> {
    if actions.iter().all(|a| a.target_group_name.is_some() || a.target_group_arn.is_some()) {
        return Ok(());
    }
    let mut error = ValidationError::new("action_target");
    error.message = Some("target_group_name or target_group_arn is required".into());
    Err(error)
}
