//! Domain layer
//!
//! Desired-state model for the reconciler: identifier newtypes, the
//! load balancer tree and its value objects. These types carry no gateway or
//! I/O concerns; they are built by the loader and read by the reconciler.
//!
//! ## Module Organization
//!
//! - `id`: runtime identifiers, including dry-run placeholders
//! - `attributes`: the fixed load balancer attribute map
//! - `action`: listener/rule actions with symbolic target group references
//! - `load_balancer`, `target_group`, `listener`, `rule`: the entity specs
//! - `network`: the document root keyed by network id

pub mod action;
pub mod attributes;
pub mod id;
pub mod listener;
pub mod load_balancer;
pub mod network;
pub mod rule;
pub mod target_group;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use action::{payload_actions, Action, ActionType};
pub use attributes::{AccessLogs, Attribute, LoadBalancerAttributes};
pub use id::{ListenerArn, LoadBalancerArn, RuleArn, TargetGroupArn};
pub use listener::{Certificate, ListenerSpec};
pub use load_balancer::{IpAddressType, LoadBalancerSpec, Scheme};
pub use network::{DesiredState, VirtualNetwork};
pub use rule::{Condition, RuleSpec};
pub use target_group::{HealthCheck, Matcher, Protocol, TargetGroupSpec};

/// The four entity kinds of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    LoadBalancer,
    TargetGroup,
    Listener,
    Rule,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::TargetGroup => "target group",
            ResourceKind::Listener => "listener",
            ResourceKind::Rule => "rule",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
