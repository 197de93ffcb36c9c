//! # State Capture
//!
//! Walks the live topology into the same shape the desired-state loader reads,
//! plus read-only fields the provider owns (identifiers, DNS name, zones,
//! state, creation time). Attribute pairs are decoded the same way the
//! reconciler compares them, so a captured document loads back as a desired
//! state that applies as a no-op.
//!
//! Actions are captured with both the target group name and identifier.
//! Rules keep their identifier so they match on the next apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use crate::domain::{
    Action, IpAddressType, ListenerArn, ListenerSpec, LoadBalancerArn, LoadBalancerAttributes,
    LoadBalancerSpec, ResourceKind, RuleSpec, Scheme, TargetGroupArn, TargetGroupSpec,
};
use crate::errors::{GatewayContext, Result};
use crate::gateway::{
    all_listeners, all_load_balancers, all_rules, all_target_groups, AvailabilityZone,
    CloudGateway, Listener, LoadBalancer, Operation, TargetGroup, TargetGroupFilter,
};
use crate::reconcile::{ScopeFilter, TargetGroupIndex};

/// Upper bound on identifiers per tag lookup.
pub const TAG_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedTargetGroup {
    pub target_group_arn: TargetGroupArn,
    #[serde(flatten)]
    pub spec: TargetGroupSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedListener {
    pub listener_arn: ListenerArn,
    #[serde(flatten)]
    pub spec: ListenerSpec,
}

/// One live load balancer with everything beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedLoadBalancer {
    pub name: String,
    pub load_balancer_arn: LoadBalancerArn,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub attributes: LoadBalancerAttributes,
    /// Provider attributes outside the managed set
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub target_groups: Vec<CapturedTargetGroup>,
    #[serde(default)]
    pub listeners: Vec<CapturedListener>,

    // Read-only
    pub dns_name: String,
    pub canonical_hosted_zone_id: String,
    pub availability_zones: Vec<AvailabilityZone>,
    pub state: String,
    #[serde(rename = "type")]
    pub load_balancer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
}

impl CapturedLoadBalancer {
    /// The desired-state view of this record
    pub fn to_spec(&self) -> LoadBalancerSpec {
        LoadBalancerSpec {
            name: self.name.clone(),
            subnets: self.subnets.clone(),
            security_groups: self.security_groups.clone(),
            scheme: self.scheme,
            ip_address_type: self.ip_address_type,
            tags: self.tags.clone(),
            attributes: self.attributes.clone(),
            target_groups: self.target_groups.iter().map(|tg| tg.spec.clone()).collect(),
            listeners: self.listeners.iter().map(|l| l.spec.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedNetwork {
    #[serde(default)]
    pub load_balancers: Vec<CapturedLoadBalancer>,
}

/// Captured records grouped by network id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedState {
    #[serde(default)]
    pub networks: BTreeMap<String, CapturedNetwork>,
}

/// How captured records are split across documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportLayout {
    /// Everything in one document
    #[default]
    Single,
    /// One document per network
    PerNetwork,
    /// One document per load balancer, grouped in a directory per network
    PerLoadBalancer,
}

impl CapturedState {
    pub fn insert(&mut self, network: impl Into<String>, record: CapturedLoadBalancer) {
        let network = self.networks.entry(network.into()).or_default();
        network.load_balancers.push(record);
        network.load_balancers.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn load_balancer_count(&self) -> usize {
        self.networks.values().map(|n| n.load_balancers.len()).sum()
    }

    /// Split into documents keyed by a relative path without extension
    pub fn documents(&self, layout: ExportLayout, stem: &str) -> Vec<(PathBuf, CapturedState)> {
        match layout {
            ExportLayout::Single => vec![(PathBuf::from(stem), self.clone())],
            ExportLayout::PerNetwork => self
                .networks
                .iter()
                .map(|(id, network)| (PathBuf::from(id), Self::single(id, network.clone())))
                .collect(),
            ExportLayout::PerLoadBalancer => self
                .networks
                .iter()
                .flat_map(|(id, network)| {
                    network.load_balancers.iter().map(move |lb| {
                        let network =
                            CapturedNetwork { load_balancers: vec![lb.clone()] };
                        (PathBuf::from(id).join(&lb.name), Self::single(id, network))
                    })
                })
                .collect(),
        }
    }

    fn single(id: &str, network: CapturedNetwork) -> Self {
        Self { networks: BTreeMap::from([(id.to_string(), network)]) }
    }
}

/// Capture every in-scope load balancer the gateway reports
#[instrument(skip(gateway, scope), name = "capture")]
pub async fn capture(gateway: &dyn CloudGateway, scope: &ScopeFilter) -> Result<CapturedState> {
    let load_balancers: Vec<LoadBalancer> = all_load_balancers(gateway)
        .await?
        .into_iter()
        .filter(|lb| scope.in_scope(&lb.name))
        .collect();

    let mut captured = CapturedState::default();
    if load_balancers.is_empty() {
        info!("No load balancers in scope");
        return Ok(captured);
    }

    let tags = describe_tags(gateway, &load_balancers).await?;
    let index: TargetGroupIndex = all_target_groups(gateway, &TargetGroupFilter::default())
        .await?
        .into_iter()
        .map(|tg| (tg.name, tg.arn))
        .collect();

    for lb in &load_balancers {
        let lb_tags = tags.get(&lb.arn).cloned().unwrap_or_default();
        let record = capture_load_balancer(gateway, lb, lb_tags, &index).await?;
        captured.insert(lb.vpc_id.clone(), record);
    }

    info!(
        networks = captured.networks.len(),
        load_balancers = captured.load_balancer_count(),
        "Captured live state"
    );
    Ok(captured)
}

/// Assemble one load balancer's record
pub async fn capture_load_balancer(
    gateway: &dyn CloudGateway,
    lb: &LoadBalancer,
    tags: BTreeMap<String, String>,
    index: &TargetGroupIndex,
) -> Result<CapturedLoadBalancer> {
    debug!(load_balancer = %lb.name, "Capturing load balancer");

    let pairs = gateway
        .get_load_balancer_attributes(&lb.arn)
        .await
        .context(ResourceKind::LoadBalancer, &lb.name, Operation::GetLoadBalancerAttributes)?;
    let (attributes, extra_attributes) = LoadBalancerAttributes::from_pairs(&pairs);

    let mut target_groups = Vec::new();
    for tg in all_target_groups(gateway, &TargetGroupFilter::for_load_balancer(&lb.arn)).await? {
        target_groups.push(capture_target_group(gateway, tg).await?);
    }
    target_groups.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));

    let mut listeners = Vec::new();
    for listener in all_listeners(gateway, &lb.arn).await? {
        listeners.push(capture_listener(gateway, listener, index).await?);
    }
    listeners.sort_by_key(|l| l.spec.port);

    Ok(CapturedLoadBalancer {
        name: lb.name.clone(),
        load_balancer_arn: lb.arn.clone(),
        subnets: lb.subnet_ids(),
        security_groups: lb.sorted_security_groups(),
        scheme: lb.scheme,
        ip_address_type: lb.ip_address_type,
        tags,
        attributes,
        extra_attributes,
        target_groups,
        listeners,
        dns_name: lb.dns_name.clone(),
        canonical_hosted_zone_id: lb.canonical_hosted_zone_id.clone(),
        availability_zones: lb.availability_zones.clone(),
        state: lb.state.code.clone(),
        load_balancer_type: lb.load_balancer_type.clone(),
        created_time: lb.created_time,
    })
}

async fn capture_target_group(
    gateway: &dyn CloudGateway,
    tg: TargetGroup,
) -> Result<CapturedTargetGroup> {
    let instances = gateway
        .list_targets(&tg.arn)
        .await
        .context(ResourceKind::TargetGroup, &tg.name, Operation::ListTargets)?;

    Ok(CapturedTargetGroup {
        target_group_arn: tg.arn,
        spec: TargetGroupSpec {
            name: tg.name,
            protocol: tg.protocol,
            port: tg.port,
            vpc_id: tg.vpc_id,
            health_check: tg.health_check,
            matcher: tg.matcher,
            instances: instances.into_iter().collect(),
        },
    })
}

async fn capture_listener(
    gateway: &dyn CloudGateway,
    listener: Listener,
    index: &TargetGroupIndex,
) -> Result<CapturedListener> {
    let mut rules: Vec<RuleSpec> = all_rules(gateway, &listener.arn)
        .await?
        .into_iter()
        .filter(|rule| !rule.is_default)
        .map(|rule| RuleSpec {
            rule_arn: Some(rule.arn),
            priority: rule.priority,
            conditions: rule.conditions,
            actions: named_actions(&rule.actions, index),
        })
        .collect();
    rules.sort_by_key(|r| r.priority);

    Ok(CapturedListener {
        listener_arn: listener.arn,
        spec: ListenerSpec {
            port: listener.port,
            protocol: listener.protocol,
            certificates: listener.certificates,
            ssl_policy: listener.ssl_policy,
            default_actions: named_actions(&listener.default_actions, index),
            rules,
        },
    })
}

/// Fill in target group names next to identifiers
fn named_actions(actions: &[Action], index: &TargetGroupIndex) -> Vec<Action> {
    actions
        .iter()
        .map(|action| {
            let mut named = action.clone();
            if named.target_group_name.is_none() {
                named.target_group_name = named
                    .target_group_arn
                    .as_ref()
                    .and_then(|arn| index.name_of(arn))
                    .map(str::to_string);
            }
            named
        })
        .collect()
}

async fn describe_tags(
    gateway: &dyn CloudGateway,
    load_balancers: &[LoadBalancer],
) -> Result<BTreeMap<LoadBalancerArn, BTreeMap<String, String>>> {
    let arns: Vec<LoadBalancerArn> = load_balancers.iter().map(|lb| lb.arn.clone()).collect();
    let mut tags = BTreeMap::new();
    for batch in arns.chunks(TAG_BATCH_SIZE) {
        let described = gateway.describe_tags(batch).await.context(
            ResourceKind::LoadBalancer,
            &batch[0],
            Operation::DescribeTags,
        )?;
        tags.extend(described);
    }
    Ok(tags)
}
