//! Live entity and request types exchanged with a [`CloudGateway`](super::CloudGateway).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{
    Action, Certificate, Condition, HealthCheck, IpAddressType, ListenerArn, LoadBalancerArn,
    Matcher, Protocol, RuleArn, Scheme, TargetGroupArn,
};

/// One page of a listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    /// Create a final page with no continuation marker
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next_marker: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerState {
    pub code: String,
}

/// A load balancer as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    #[serde(rename = "load_balancer_arn")]
    pub arn: LoadBalancerArn,
    pub name: String,
    pub vpc_id: String,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub ip_address_type: IpAddressType,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZone>,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub canonical_hosted_zone_id: String,
    #[serde(default)]
    pub state: LoadBalancerState,
    #[serde(default = "default_load_balancer_type", rename = "type")]
    pub load_balancer_type: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

fn default_load_balancer_type() -> String {
    "application".to_string()
}

impl LoadBalancer {
    /// Subnet ids derived from the availability zones, sorted
    pub fn subnet_ids(&self) -> Vec<String> {
        let mut subnets: Vec<String> =
            self.availability_zones.iter().map(|az| az.subnet_id.clone()).collect();
        subnets.sort();
        subnets
    }

    pub fn sorted_security_groups(&self) -> Vec<String> {
        let mut groups = self.security_groups.clone();
        groups.sort();
        groups
    }
}

/// A target group as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    #[serde(rename = "target_group_arn")]
    pub arn: TargetGroupArn,
    pub name: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub port: u32,
    pub vpc_id: String,
    #[serde(default)]
    pub health_check: HealthCheck,
    #[serde(default)]
    pub matcher: Matcher,
    /// Load balancers currently routing to this target group
    #[serde(default)]
    pub load_balancer_arns: Vec<LoadBalancerArn>,
}

/// A listener as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "listener_arn")]
    pub arn: ListenerArn,
    pub load_balancer_arn: LoadBalancerArn,
    pub port: u32,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    #[serde(default)]
    pub default_actions: Vec<Action>,
}

impl Listener {
    pub fn has_ssl_policy(&self) -> bool {
        self.ssl_policy.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// A listener rule as reported by the provider. The default rule mirrors the
/// listener's default actions and is never reconciled directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "rule_arn")]
    pub arn: RuleArn,
    pub priority: u32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub scheme: Scheme,
    pub tags: BTreeMap<String, String>,
    pub ip_address_type: IpAddressType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTargetGroupRequest {
    pub name: String,
    pub protocol: Protocol,
    pub port: u32,
    pub vpc_id: String,
    pub health_check: HealthCheck,
    pub matcher: Matcher,
}

/// Only the fields the provider can change in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyTargetGroupRequest {
    pub health_check: HealthCheck,
    pub matcher: Matcher,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateListenerRequest {
    pub load_balancer_arn: LoadBalancerArn,
    pub port: u32,
    pub protocol: Protocol,
    pub certificates: Vec<Certificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    pub default_actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyListenerRequest {
    pub port: u32,
    pub protocol: Protocol,
    pub certificates: Vec<Certificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    pub default_actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRuleRequest {
    pub listener_arn: ListenerArn,
    pub priority: u32,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

/// Content-only rule update; priority has its own call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRuleRequest {
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePriority {
    pub rule_arn: RuleArn,
    pub priority: u32,
}

/// Narrows a target group listing. Empty fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupFilter {
    pub load_balancer_arn: Option<LoadBalancerArn>,
    pub names: Vec<String>,
    pub arns: Vec<TargetGroupArn>,
}

impl TargetGroupFilter {
    /// Target groups associated with a load balancer
    pub fn for_load_balancer(arn: &LoadBalancerArn) -> Self {
        Self { load_balancer_arn: Some(arn.clone()), ..Default::default() }
    }

    /// Target groups with the given identifiers
    pub fn for_arns(arns: Vec<TargetGroupArn>) -> Self {
        Self { arns, ..Default::default() }
    }

    pub fn matches(&self, target_group: &TargetGroup) -> bool {
        let lb_ok = self
            .load_balancer_arn
            .as_ref()
            .map_or(true, |arn| target_group.load_balancer_arns.contains(arn));
        let names_ok = self.names.is_empty() || self.names.contains(&target_group.name);
        let arns_ok = self.arns.is_empty() || self.arns.contains(&target_group.arn);
        lb_ok && names_ok && arns_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_group(name: &str, lbs: &[&str]) -> TargetGroup {
        TargetGroup {
            arn: TargetGroupArn::new(format!("arn:tg/{}", name)),
            name: name.to_string(),
            protocol: Protocol::Http,
            port: 80,
            vpc_id: "vpc-1".to_string(),
            health_check: HealthCheck::default(),
            matcher: Matcher::default(),
            load_balancer_arns: lbs.iter().map(|a| LoadBalancerArn::new(*a)).collect(),
        }
    }

    #[test]
    fn test_filter_by_load_balancer() {
        let filter = TargetGroupFilter::for_load_balancer(&LoadBalancerArn::new("arn:lb/a"));
        assert!(filter.matches(&target_group("web", &["arn:lb/a"])));
        assert!(!filter.matches(&target_group("web", &["arn:lb/b"])));
        assert!(!filter.matches(&target_group("web", &[])));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(TargetGroupFilter::default().matches(&target_group("web", &[])));
    }

    #[test]
    fn test_live_load_balancer_wire_names() {
        let json = serde_json::json!({
            "load_balancer_arn": "arn:lb/a",
            "name": "a",
            "vpc_id": "vpc-1",
            "availability_zones": [
                {"zone_name": "az-b", "subnet_id": "subnet-2"},
                {"zone_name": "az-a", "subnet_id": "subnet-1"}
            ]
        });
        let lb: LoadBalancer = serde_json::from_value(json).unwrap();
        assert_eq!(lb.subnet_ids(), vec!["subnet-1", "subnet-2"]);
        assert_eq!(lb.load_balancer_type, "application");
        assert_eq!(lb.scheme, Scheme::InternetFacing);
    }
}
