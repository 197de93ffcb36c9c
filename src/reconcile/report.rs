//! Apply report
//!
//! Every decision the topology reconciler takes is recorded as a [`Change`],
//! whether or not the corresponding call was issued (dry runs record the
//! same changes as live runs).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::canonical::FieldChange;
use crate::domain::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
    SetSubnets,
    SetSecurityGroups,
    SetIpAddressType,
    SetAttributes,
    RegisterTargets,
    DeregisterTargets,
    SetPriority,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::SetSubnets => "set_subnets",
            Self::SetSecurityGroups => "set_security_groups",
            Self::SetIpAddressType => "set_ip_address_type",
            Self::SetAttributes => "set_attributes",
            Self::RegisterTargets => "register_targets",
            Self::DeregisterTargets => "deregister_targets",
            Self::SetPriority => "set_priority",
        }
    }

    fn sigil(&self) -> char {
        match self {
            Self::Create => '+',
            Self::Delete => '-',
            _ => '~',
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intended or applied change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    pub kind: ResourceKind,
    pub network: String,
    /// Human readable location, e.g. `web/listener:80/rule:/api/*`
    pub path: String,
    /// Creation payload or the new value of a dedicated update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<FieldChange>,
    pub dry_run: bool,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} [{}]",
            self.action.sigil(),
            self.action,
            self.kind,
            self.path,
            self.network
        )
    }
}

/// A load balancer whose reconciliation failed inside an isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub network: String,
    pub load_balancer: String,
    pub error: String,
}

/// Outcome of one apply (or plan) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
}

impl ApplyReport {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run, ..Default::default() }
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn count(&self, kind: ResourceKind, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.kind == kind && c.action == action).count()
    }

    /// Number of changes with the given action across all kinds
    pub fn count_action(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn changes_for(&self, kind: ResourceKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One-line totals, e.g. `2 to create, 1 to modify, 0 to delete`
    pub fn summary(&self) -> String {
        let created = self.count_action(ChangeAction::Create);
        let deleted = self.count_action(ChangeAction::Delete);
        let modified = self.changes.len() - created - deleted;
        let verb = if self.dry_run { "to " } else { "" };
        let (c, m, d) = if self.dry_run {
            ("create", "modify", "delete")
        } else {
            ("created", "modified", "deleted")
        };
        format!(
            "{created} {verb}{c}, {modified} {verb}{m}, {deleted} {verb}{d}, {} failed",
            self.failures.len()
        )
    }
}
