//! # Cloud Gateway
//!
//! The seam between the reconciler and the provider API. The reconciler only
//! talks to [`CloudGateway`]; production adapters wrap a provider SDK while
//! [`MemoryGateway`] keeps an in-process, optionally file-backed topology.
//!
//! Listing calls return one [`Page`] at a time. Callers that need the full
//! result set go through the helpers in [`pagination`], which drive the
//! continuation marker to exhaustion.

pub mod memory;
pub mod pagination;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{
    Attribute, IpAddressType, ListenerArn, LoadBalancerArn, RuleArn, TargetGroupArn,
};
use crate::errors::GatewayResult;

pub use memory::{MemoryGateway, RecordedCall};
pub use pagination::{
    all_listeners, all_load_balancers, all_rules, all_target_groups, collect_pages,
};
pub use types::*;

/// Every call a gateway can receive, used for error context and call recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListLoadBalancers,
    CreateLoadBalancer,
    DeleteLoadBalancer,
    SetSubnets,
    SetSecurityGroups,
    SetIpAddressType,
    GetLoadBalancerAttributes,
    SetLoadBalancerAttributes,
    ListTargetGroups,
    CreateTargetGroup,
    ModifyTargetGroup,
    DeleteTargetGroup,
    ListTargets,
    RegisterTargets,
    DeregisterTargets,
    ListListeners,
    CreateListener,
    ModifyListener,
    DeleteListener,
    ListRules,
    CreateRule,
    ModifyRule,
    DeleteRule,
    SetRulePriorities,
    DescribeTags,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListLoadBalancers => "list_load_balancers",
            Self::CreateLoadBalancer => "create_load_balancer",
            Self::DeleteLoadBalancer => "delete_load_balancer",
            Self::SetSubnets => "set_subnets",
            Self::SetSecurityGroups => "set_security_groups",
            Self::SetIpAddressType => "set_ip_address_type",
            Self::GetLoadBalancerAttributes => "get_load_balancer_attributes",
            Self::SetLoadBalancerAttributes => "set_load_balancer_attributes",
            Self::ListTargetGroups => "list_target_groups",
            Self::CreateTargetGroup => "create_target_group",
            Self::ModifyTargetGroup => "modify_target_group",
            Self::DeleteTargetGroup => "delete_target_group",
            Self::ListTargets => "list_targets",
            Self::RegisterTargets => "register_targets",
            Self::DeregisterTargets => "deregister_targets",
            Self::ListListeners => "list_listeners",
            Self::CreateListener => "create_listener",
            Self::ModifyListener => "modify_listener",
            Self::DeleteListener => "delete_listener",
            Self::ListRules => "list_rules",
            Self::CreateRule => "create_rule",
            Self::ModifyRule => "modify_rule",
            Self::DeleteRule => "delete_rule",
            Self::SetRulePriorities => "set_rule_priorities",
            Self::DescribeTags => "describe_tags",
        }
    }

    /// Whether the call changes provider state. Dry runs never issue these.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::ListLoadBalancers
                | Self::GetLoadBalancerAttributes
                | Self::ListTargetGroups
                | Self::ListTargets
                | Self::ListListeners
                | Self::ListRules
                | Self::DescribeTags
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider operations for load balancers, target groups, listeners and rules.
///
/// Implementations map provider failures onto
/// [`GatewayError`](crate::errors::GatewayError) codes and apply their own
/// timeout and retry policy; the reconciler never retries.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    async fn list_load_balancers(&self, marker: Option<String>)
        -> GatewayResult<Page<LoadBalancer>>;

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> GatewayResult<LoadBalancer>;

    async fn delete_load_balancer(&self, arn: &LoadBalancerArn) -> GatewayResult<()>;

    /// Replace the subnets; returns the applied subnet ids.
    async fn set_subnets(
        &self,
        arn: &LoadBalancerArn,
        subnets: &[String],
    ) -> GatewayResult<Vec<String>>;

    /// Replace the security groups; returns the applied group ids.
    async fn set_security_groups(
        &self,
        arn: &LoadBalancerArn,
        security_groups: &[String],
    ) -> GatewayResult<Vec<String>>;

    async fn set_ip_address_type(
        &self,
        arn: &LoadBalancerArn,
        ip_address_type: IpAddressType,
    ) -> GatewayResult<IpAddressType>;

    async fn get_load_balancer_attributes(
        &self,
        arn: &LoadBalancerArn,
    ) -> GatewayResult<Vec<Attribute>>;

    async fn set_load_balancer_attributes(
        &self,
        arn: &LoadBalancerArn,
        attributes: &[Attribute],
    ) -> GatewayResult<Vec<Attribute>>;

    async fn list_target_groups(
        &self,
        filter: &TargetGroupFilter,
        marker: Option<String>,
    ) -> GatewayResult<Page<TargetGroup>>;

    async fn create_target_group(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> GatewayResult<TargetGroup>;

    async fn modify_target_group(
        &self,
        arn: &TargetGroupArn,
        request: &ModifyTargetGroupRequest,
    ) -> GatewayResult<TargetGroup>;

    async fn delete_target_group(&self, arn: &TargetGroupArn) -> GatewayResult<()>;

    /// Registered instance ids of a target group.
    async fn list_targets(&self, arn: &TargetGroupArn) -> GatewayResult<Vec<String>>;

    async fn register_targets(&self, arn: &TargetGroupArn, targets: &[String])
        -> GatewayResult<()>;

    async fn deregister_targets(
        &self,
        arn: &TargetGroupArn,
        targets: &[String],
    ) -> GatewayResult<()>;

    async fn list_listeners(
        &self,
        load_balancer_arn: &LoadBalancerArn,
        marker: Option<String>,
    ) -> GatewayResult<Page<Listener>>;

    async fn create_listener(&self, request: &CreateListenerRequest) -> GatewayResult<Listener>;

    async fn modify_listener(
        &self,
        arn: &ListenerArn,
        request: &ModifyListenerRequest,
    ) -> GatewayResult<Listener>;

    /// Deleting a listener also removes its rules.
    async fn delete_listener(&self, arn: &ListenerArn) -> GatewayResult<()>;

    async fn list_rules(
        &self,
        listener_arn: &ListenerArn,
        marker: Option<String>,
    ) -> GatewayResult<Page<Rule>>;

    async fn create_rule(&self, request: &CreateRuleRequest) -> GatewayResult<Rule>;

    async fn modify_rule(&self, arn: &RuleArn, request: &ModifyRuleRequest)
        -> GatewayResult<Rule>;

    async fn delete_rule(&self, arn: &RuleArn) -> GatewayResult<()>;

    /// Apply several priority changes atomically.
    async fn set_rule_priorities(&self, priorities: &[RulePriority]) -> GatewayResult<Vec<Rule>>;

    async fn describe_tags(
        &self,
        arns: &[LoadBalancerArn],
    ) -> GatewayResult<BTreeMap<LoadBalancerArn, BTreeMap<String, String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::DeleteTargetGroup.to_string(), "delete_target_group");
        assert_eq!(
            serde_json::to_string(&Operation::SetRulePriorities).unwrap(),
            "\"set_rule_priorities\""
        );
    }

    #[test]
    fn test_mutating_operations() {
        assert!(Operation::CreateLoadBalancer.is_mutating());
        assert!(Operation::SetRulePriorities.is_mutating());
        assert!(!Operation::ListRules.is_mutating());
        assert!(!Operation::GetLoadBalancerAttributes.is_mutating());
    }
}
