//! Desired-state validation
//!
//! Two layers, both run before any gateway call:
//! 1. Field rules declared with the `validator` derive on the domain types
//!    (required fields, ranges, action targets)
//! 2. Cross-entity rules the derive cannot express: naming, and uniqueness of
//!    load balancer names, target group names, listener ports and rule
//!    priorities within their scope

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use validator::Validate;

use crate::domain::{DesiredState, ListenerSpec, LoadBalancerSpec, VirtualNetwork};
use crate::errors::{AlbError, Result};

lazy_static! {
    /// Load balancer and target group names: up to 32 alphanumerics or
    /// hyphens, not starting or ending with a hyphen
    static ref RESOURCE_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,30}[A-Za-z0-9])?$").unwrap();
}

/// Validate the whole tree
pub fn validate_desired_state(state: &DesiredState) -> Result<()> {
    for (network, declared) in &state.networks {
        if network.trim().is_empty() {
            return Err(AlbError::validation_field("network id cannot be empty", "networks"));
        }
        validate_network(network, declared).map_err(|e| in_network(network, e))?;
    }
    Ok(())
}

/// Validate one network's load balancers
pub fn validate_network(network: &str, declared: &VirtualNetwork) -> Result<()> {
    Validate::validate(declared).map_err(AlbError::from)?;

    let mut names = BTreeSet::new();
    for lb in &declared.load_balancers {
        if !names.insert(lb.name.as_str()) {
            return Err(AlbError::validation_field(
                format!("load balancer `{}' is already defined in {}", lb.name, network),
                "load_balancers",
            ));
        }
        validate_load_balancer(lb)?;
    }
    Ok(())
}

pub fn validate_load_balancer(lb: &LoadBalancerSpec) -> Result<()> {
    validate_resource_name(&lb.name, "load balancer")?;

    let mut target_groups = BTreeSet::new();
    for tg in &lb.target_groups {
        validate_resource_name(&tg.name, "target group")?;
        if !target_groups.insert(tg.name.as_str()) {
            return Err(AlbError::validation_field(
                format!("target group `{}' is already defined for `{}'", tg.name, lb.name),
                "target_groups",
            ));
        }
    }

    let mut ports = BTreeSet::new();
    for listener in &lb.listeners {
        if !ports.insert(listener.port) {
            return Err(AlbError::validation_field(
                format!("listener port {} is already defined for `{}'", listener.port, lb.name),
                "listeners",
            ));
        }
        validate_listener(&lb.name, listener)?;
    }
    Ok(())
}

/// Rule priorities and identifiers are unique within a listener
pub fn validate_listener(lb_name: &str, listener: &ListenerSpec) -> Result<()> {
    let mut priorities = BTreeSet::new();
    let mut identifiers = BTreeSet::new();
    for rule in &listener.rules {
        if !priorities.insert(rule.priority) {
            return Err(AlbError::validation_field(
                format!(
                    "rule priority {} is used twice on listener {} of `{}'",
                    rule.priority, listener.port, lb_name
                ),
                "priority",
            ));
        }
        if let Some(arn) = &rule.rule_arn {
            if !identifiers.insert(arn) {
                return Err(AlbError::validation_field(
                    format!(
                        "rule {} appears twice on listener {} of `{}'",
                        arn, listener.port, lb_name
                    ),
                    "rule_arn",
                ));
            }
        }
    }
    Ok(())
}

fn validate_resource_name(name: &str, kind: &str) -> Result<()> {
    if !RESOURCE_NAME_REGEX.is_match(name) {
        return Err(AlbError::validation_field(
            format!(
                "{} name `{}' must be 1-32 alphanumerics or hyphens and cannot start or end \
                 with a hyphen",
                kind, name
            ),
            "name",
        ));
    }
    Ok(())
}

fn in_network(network: &str, error: AlbError) -> AlbError {
    match error {
        AlbError::Validation { message, field } => {
            AlbError::Validation { message: format!("network {}: {}", network, message), field }
        }
        other => other,
    }
}
