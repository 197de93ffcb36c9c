//! In-memory gateway
//!
//! Holds a whole provider topology in process and behaves like the provider
//! where the reconciler depends on it: generated identifiers, default
//! attributes on create, paginated listings, conflicts on duplicate names,
//! ports and priorities, and `ResourceInUse` when a target group is still
//! associated with a load balancer. Associations held by a deleted load
//! balancer are released only after a configurable number of target group
//! listings, which exercises the settle wait.
//!
//! The topology can be loaded from and saved to a YAML/JSON snapshot, which
//! is what the CLI's `--state` option uses. Every call is recorded.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::types::*;
use super::{CloudGateway, Operation};
use crate::domain::{
    Action, Attribute, IpAddressType, ListenerArn, LoadBalancerArn, LoadBalancerAttributes,
    Protocol, RuleArn, TargetGroupArn,
};
use crate::errors::{GatewayError, GatewayErrorCode, GatewayResult, Result};
use crate::utils::{generate_short_id, read_document, write_document};

const DEFAULT_PAGE_SIZE: usize = 20;
const ARN_PREFIX: &str = "arn:memory:elasticloadbalancing:local:000000000000";
const DELETION_PROTECTION: &str = "deletion_protection.enabled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLoadBalancer {
    #[serde(flatten)]
    pub load_balancer: LoadBalancer,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTargetGroup {
    #[serde(flatten)]
    pub target_group: TargetGroup,
    #[serde(default)]
    pub targets: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    pub listener_arn: ListenerArn,
    #[serde(flatten)]
    pub rule: Rule,
}

/// Association still held by a deleted load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRelease {
    pub load_balancer_arn: LoadBalancerArn,
    pub target_group_arn: TargetGroupArn,
    pub polls_left: u32,
}

/// Serializable topology held by a [`MemoryGateway`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Known subnets and the network each belongs to
    #[serde(default)]
    pub subnets: BTreeMap<String, String>,
    #[serde(default)]
    pub load_balancers: Vec<StoredLoadBalancer>,
    #[serde(default)]
    pub target_groups: Vec<StoredTargetGroup>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub rules: Vec<StoredRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_releases: Vec<PendingRelease>,
}

/// A call received by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub operation: Operation,
    pub resource: String,
}

#[derive(Debug)]
struct InjectedFailure {
    operation: Operation,
    resource: Option<String>,
    error: GatewayError,
}

#[derive(Debug, Default)]
struct Inner {
    state: Snapshot,
    calls: Vec<RecordedCall>,
    failures: Vec<InjectedFailure>,
}

impl Inner {
    fn record(&mut self, operation: Operation, resource: impl Display) -> GatewayResult<()> {
        let resource = resource.to_string();
        debug!(operation = %operation, resource = %resource, "memory gateway call");
        let injected = self.failures.iter().find(|f| {
            f.operation == operation && f.resource.as_ref().map_or(true, |r| *r == resource)
        });
        let result = match injected {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        };
        self.calls.push(RecordedCall { operation, resource });
        result
    }

    /// Network of a subnet set; every subnet must be known and share one network.
    fn network_of(&self, subnets: &[String]) -> GatewayResult<String> {
        let mut networks = BTreeSet::new();
        for subnet in subnets {
            let vpc = self.state.subnets.get(subnet).ok_or_else(|| {
                GatewayError::invalid(format!("InvalidSubnet: subnet {} not found", subnet))
            })?;
            networks.insert(vpc.clone());
        }
        match networks.len() {
            0 => Err(GatewayError::invalid("at least one subnet is required")),
            1 => Ok(networks.into_iter().next().unwrap_or_default()),
            _ => Err(GatewayError::invalid("subnets belong to more than one network")),
        }
    }

    fn load_balancer_mut(
        &mut self,
        arn: &LoadBalancerArn,
    ) -> GatewayResult<&mut StoredLoadBalancer> {
        self.state
            .load_balancers
            .iter_mut()
            .find(|lb| &lb.load_balancer.arn == arn)
            .ok_or_else(|| GatewayError::not_found(format!("load balancer {} not found", arn)))
    }

    fn target_group_mut(
        &mut self,
        arn: &TargetGroupArn,
    ) -> GatewayResult<&mut StoredTargetGroup> {
        self.state
            .target_groups
            .iter_mut()
            .find(|tg| &tg.target_group.arn == arn)
            .ok_or_else(|| GatewayError::not_found(format!("target group {} not found", arn)))
    }

    fn listener_mut(&mut self, arn: &ListenerArn) -> GatewayResult<&mut Listener> {
        self.state
            .listeners
            .iter_mut()
            .find(|l| &l.arn == arn)
            .ok_or_else(|| GatewayError::not_found(format!("listener {} not found", arn)))
    }

    fn listener_owner(&self, arn: &ListenerArn) -> Option<LoadBalancerArn> {
        self.state.listeners.iter().find(|l| &l.arn == arn).map(|l| l.load_balancer_arn.clone())
    }

    fn check_targets_exist(&self, actions: &[Action]) -> GatewayResult<()> {
        for action in actions {
            let arn = action.target_group_arn.as_ref().ok_or_else(|| {
                GatewayError::invalid("action requires a target group identifier")
            })?;
            if !self.state.target_groups.iter().any(|tg| &tg.target_group.arn == arn) {
                return Err(GatewayError::not_found(format!("target group {} not found", arn)));
            }
        }
        Ok(())
    }

    /// Recompute which load balancers route to each target group.
    fn refresh_associations(&mut self) {
        let mut associations: BTreeMap<TargetGroupArn, BTreeSet<LoadBalancerArn>> =
            BTreeMap::new();

        for listener in &self.state.listeners {
            for action in &listener.default_actions {
                if let Some(arn) = &action.target_group_arn {
                    associations
                        .entry(arn.clone())
                        .or_default()
                        .insert(listener.load_balancer_arn.clone());
                }
            }
        }
        for stored in &self.state.rules {
            let Some(owner) = self.listener_owner(&stored.listener_arn) else { continue };
            for action in &stored.rule.actions {
                if let Some(arn) = &action.target_group_arn {
                    associations.entry(arn.clone()).or_default().insert(owner.clone());
                }
            }
        }
        for pending in &self.state.pending_releases {
            associations
                .entry(pending.target_group_arn.clone())
                .or_default()
                .insert(pending.load_balancer_arn.clone());
        }

        for stored in &mut self.state.target_groups {
            stored.target_group.load_balancer_arns = associations
                .remove(&stored.target_group.arn)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default();
        }
    }

    fn tick_pending_releases(&mut self) {
        if self.state.pending_releases.is_empty() {
            return;
        }
        for pending in &mut self.state.pending_releases {
            pending.polls_left = pending.polls_left.saturating_sub(1);
        }
        self.state.pending_releases.retain(|p| p.polls_left > 0);
        self.refresh_associations();
    }

    fn listener_rules(&self, listener_arn: &ListenerArn) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .state
            .rules
            .iter()
            .filter(|r| &r.listener_arn == listener_arn)
            .map(|r| r.rule.clone())
            .collect();
        rules.sort_by_key(|r| (r.is_default, r.priority));
        rules
    }
}

/// In-process [`CloudGateway`] implementation.
#[derive(Debug)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
    page_size: usize,
    release_polls: u32,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Create a gateway holding the given topology
    pub fn from_snapshot(state: Snapshot) -> Self {
        let mut inner = Inner { state, ..Default::default() };
        inner.refresh_associations();
        Self { inner: Mutex::new(inner), page_size: DEFAULT_PAGE_SIZE, release_polls: 0 }
    }

    /// Load a topology snapshot; a missing file yields an empty topology
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No state snapshot, starting empty");
            return Ok(Self::new());
        }
        let state: Snapshot = read_document(path)?;
        Ok(Self::from_snapshot(state))
    }

    /// Persist the current topology
    pub fn save(&self, path: &Path) -> Result<()> {
        write_document(path, &self.snapshot())
    }

    /// Register a subnet of a network; load balancers take their network from their subnets
    pub fn with_subnet(self, subnet: &str, vpc_id: &str) -> Self {
        self.lock().state.subnets.insert(subnet.to_string(), vpc_id.to_string());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of target group listings a deleted load balancer keeps its associations for
    pub fn with_release_polls(mut self, polls: u32) -> Self {
        self.release_polls = polls;
        self
    }

    /// Fail every call of `operation` (optionally only for `resource`) with `error`
    pub fn fail_on(&self, operation: Operation, resource: Option<&str>, error: GatewayError) {
        self.lock().failures.push(InjectedFailure {
            operation,
            resource: resource.map(str::to_string),
            error,
        });
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().state.clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls that changed (or tried to change) provider state
    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.iter().filter(|c| c.operation.is_mutating()).cloned().collect()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<RecordedCall> {
        self.lock().calls.iter().filter(|c| c.operation == operation).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn paginate<T: Clone>(
        &self,
        items: Vec<T>,
        marker: Option<String>,
    ) -> GatewayResult<Page<T>> {
        let start = match marker {
            Some(marker) => marker
                .parse::<usize>()
                .map_err(|_| GatewayError::invalid(format!("invalid marker '{}'", marker)))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next_marker = (end < items.len()).then(|| end.to_string());
        Ok(Page { items: page, next_marker })
    }
}

fn arn(kind: &str, path: &str) -> String {
    format!("{}:{}/{}/{}", ARN_PREFIX, kind, path, generate_short_id())
}

fn availability_zones(subnets: &[String]) -> Vec<AvailabilityZone> {
    subnets
        .iter()
        .map(|subnet| AvailabilityZone {
            zone_name: format!("{}-zone", subnet),
            subnet_id: subnet.clone(),
        })
        .collect()
}

fn ensure_certificates(protocol: Protocol, certificates_present: bool) -> GatewayResult<()> {
    if protocol == Protocol::Https && !certificates_present {
        return Err(GatewayError::invalid("an HTTPS listener requires a certificate"));
    }
    Ok(())
}

#[async_trait]
impl CloudGateway for MemoryGateway {
    async fn list_load_balancers(
        &self,
        marker: Option<String>,
    ) -> GatewayResult<Page<LoadBalancer>> {
        let mut inner = self.lock();
        inner.record(Operation::ListLoadBalancers, "*")?;
        let items = inner.state.load_balancers.iter().map(|lb| lb.load_balancer.clone()).collect();
        self.paginate(items, marker)
    }

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> GatewayResult<LoadBalancer> {
        let mut inner = self.lock();
        inner.record(Operation::CreateLoadBalancer, &request.name)?;

        if request.name.is_empty() {
            return Err(GatewayError::invalid("a load balancer name is required"));
        }
        let vpc_id = inner.network_of(&request.subnets)?;
        if inner.state.load_balancers.iter().any(|lb| lb.load_balancer.name == request.name) {
            return Err(GatewayError::new(
                GatewayErrorCode::Conflict,
                format!("DuplicateLoadBalancerName: {}", request.name),
            ));
        }

        let load_balancer = LoadBalancer {
            arn: LoadBalancerArn::new(arn("loadbalancer", &format!("app/{}", request.name))),
            name: request.name.clone(),
            vpc_id,
            scheme: request.scheme,
            ip_address_type: request.ip_address_type,
            security_groups: request.security_groups.clone(),
            availability_zones: availability_zones(&request.subnets),
            dns_name: format!("{}-{}.elb.memory.local", request.name, generate_short_id()),
            canonical_hosted_zone_id: "ZMEMORY0000000".to_string(),
            state: LoadBalancerState { code: "active".to_string() },
            load_balancer_type: "application".to_string(),
            created_time: Some(Utc::now()),
        };
        inner.state.load_balancers.push(StoredLoadBalancer {
            load_balancer: load_balancer.clone(),
            attributes: LoadBalancerAttributes::default().to_pairs(),
            tags: request.tags.clone(),
        });
        Ok(load_balancer)
    }

    async fn delete_load_balancer(&self, arn: &LoadBalancerArn) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::DeleteLoadBalancer, arn)?;

        let stored = inner.load_balancer_mut(arn)?;
        if stored.attributes.iter().any(|a| a.key == DELETION_PROTECTION && a.value == "true") {
            return Err(GatewayError::invalid(format!(
                "OperationNotPermitted: deletion protection is enabled for {}",
                arn
            )));
        }

        let held: Vec<TargetGroupArn> = inner
            .state
            .target_groups
            .iter()
            .filter(|tg| tg.target_group.load_balancer_arns.contains(arn))
            .map(|tg| tg.target_group.arn.clone())
            .collect();

        let listener_arns: Vec<ListenerArn> = inner
            .state
            .listeners
            .iter()
            .filter(|l| &l.load_balancer_arn == arn)
            .map(|l| l.arn.clone())
            .collect();
        inner.state.rules.retain(|r| !listener_arns.contains(&r.listener_arn));
        inner.state.listeners.retain(|l| &l.load_balancer_arn != arn);
        inner.state.load_balancers.retain(|lb| &lb.load_balancer.arn != arn);

        if self.release_polls > 0 {
            for target_group_arn in held {
                inner.state.pending_releases.push(PendingRelease {
                    load_balancer_arn: arn.clone(),
                    target_group_arn,
                    polls_left: self.release_polls,
                });
            }
        }
        inner.refresh_associations();
        Ok(())
    }

    async fn set_subnets(
        &self,
        arn: &LoadBalancerArn,
        subnets: &[String],
    ) -> GatewayResult<Vec<String>> {
        let mut inner = self.lock();
        inner.record(Operation::SetSubnets, arn)?;
        let vpc_id = inner.network_of(subnets)?;
        let stored = inner.load_balancer_mut(arn)?;
        if stored.load_balancer.vpc_id != vpc_id {
            return Err(GatewayError::invalid(format!(
                "subnets belong to {}, not {}",
                vpc_id, stored.load_balancer.vpc_id
            )));
        }
        stored.load_balancer.availability_zones = availability_zones(subnets);
        Ok(stored.load_balancer.subnet_ids())
    }

    async fn set_security_groups(
        &self,
        arn: &LoadBalancerArn,
        security_groups: &[String],
    ) -> GatewayResult<Vec<String>> {
        let mut inner = self.lock();
        inner.record(Operation::SetSecurityGroups, arn)?;
        let stored = inner.load_balancer_mut(arn)?;
        stored.load_balancer.security_groups = security_groups.to_vec();
        Ok(stored.load_balancer.security_groups.clone())
    }

    async fn set_ip_address_type(
        &self,
        arn: &LoadBalancerArn,
        ip_address_type: IpAddressType,
    ) -> GatewayResult<IpAddressType> {
        let mut inner = self.lock();
        inner.record(Operation::SetIpAddressType, arn)?;
        let stored = inner.load_balancer_mut(arn)?;
        stored.load_balancer.ip_address_type = ip_address_type;
        Ok(ip_address_type)
    }

    async fn get_load_balancer_attributes(
        &self,
        arn: &LoadBalancerArn,
    ) -> GatewayResult<Vec<Attribute>> {
        let mut inner = self.lock();
        inner.record(Operation::GetLoadBalancerAttributes, arn)?;
        Ok(inner.load_balancer_mut(arn)?.attributes.clone())
    }

    async fn set_load_balancer_attributes(
        &self,
        arn: &LoadBalancerArn,
        attributes: &[Attribute],
    ) -> GatewayResult<Vec<Attribute>> {
        let mut inner = self.lock();
        inner.record(Operation::SetLoadBalancerAttributes, arn)?;
        let stored = inner.load_balancer_mut(arn)?;
        for attribute in attributes {
            match stored.attributes.iter_mut().find(|a| a.key == attribute.key) {
                Some(existing) => existing.value = attribute.value.clone(),
                None => stored.attributes.push(attribute.clone()),
            }
        }
        Ok(stored.attributes.clone())
    }

    async fn list_target_groups(
        &self,
        filter: &TargetGroupFilter,
        marker: Option<String>,
    ) -> GatewayResult<Page<TargetGroup>> {
        let mut inner = self.lock();
        let resource = filter.load_balancer_arn.as_ref().map_or("*", |arn| arn.as_str());
        inner.record(Operation::ListTargetGroups, resource)?;
        if marker.is_none() {
            inner.tick_pending_releases();
        }
        let items = inner
            .state
            .target_groups
            .iter()
            .map(|tg| tg.target_group.clone())
            .filter(|tg| filter.matches(tg))
            .collect();
        self.paginate(items, marker)
    }

    async fn create_target_group(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> GatewayResult<TargetGroup> {
        let mut inner = self.lock();
        inner.record(Operation::CreateTargetGroup, &request.name)?;

        if request.port == 0 || request.port > 65535 {
            return Err(GatewayError::invalid(format!("invalid port {}", request.port)));
        }
        if inner.state.target_groups.iter().any(|tg| tg.target_group.name == request.name) {
            return Err(GatewayError::new(
                GatewayErrorCode::Conflict,
                format!("DuplicateTargetGroupName: {}", request.name),
            ));
        }

        let target_group = TargetGroup {
            arn: TargetGroupArn::new(arn("targetgroup", &request.name)),
            name: request.name.clone(),
            protocol: request.protocol,
            port: request.port,
            vpc_id: request.vpc_id.clone(),
            health_check: request.health_check.clone(),
            matcher: request.matcher.clone(),
            load_balancer_arns: Vec::new(),
        };
        inner.state.target_groups.push(StoredTargetGroup {
            target_group: target_group.clone(),
            targets: BTreeSet::new(),
        });
        Ok(target_group)
    }

    async fn modify_target_group(
        &self,
        arn: &TargetGroupArn,
        request: &ModifyTargetGroupRequest,
    ) -> GatewayResult<TargetGroup> {
        let mut inner = self.lock();
        inner.record(Operation::ModifyTargetGroup, arn)?;
        let stored = inner.target_group_mut(arn)?;
        stored.target_group.health_check = request.health_check.clone();
        stored.target_group.matcher = request.matcher.clone();
        Ok(stored.target_group.clone())
    }

    async fn delete_target_group(&self, arn: &TargetGroupArn) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::DeleteTargetGroup, arn)?;
        let stored = inner.target_group_mut(arn)?;
        if !stored.target_group.load_balancer_arns.is_empty() {
            return Err(GatewayError::conflict(format!(
                "ResourceInUse: target group {} is currently in use by a listener or a rule",
                arn
            )));
        }
        inner.state.target_groups.retain(|tg| &tg.target_group.arn != arn);
        Ok(())
    }

    async fn list_targets(&self, arn: &TargetGroupArn) -> GatewayResult<Vec<String>> {
        let mut inner = self.lock();
        inner.record(Operation::ListTargets, arn)?;
        Ok(inner.target_group_mut(arn)?.targets.iter().cloned().collect())
    }

    async fn register_targets(
        &self,
        arn: &TargetGroupArn,
        targets: &[String],
    ) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::RegisterTargets, arn)?;
        inner.target_group_mut(arn)?.targets.extend(targets.iter().cloned());
        Ok(())
    }

    async fn deregister_targets(
        &self,
        arn: &TargetGroupArn,
        targets: &[String],
    ) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::DeregisterTargets, arn)?;
        let stored = inner.target_group_mut(arn)?;
        for target in targets {
            stored.targets.remove(target);
        }
        Ok(())
    }

    async fn list_listeners(
        &self,
        load_balancer_arn: &LoadBalancerArn,
        marker: Option<String>,
    ) -> GatewayResult<Page<Listener>> {
        let mut inner = self.lock();
        inner.record(Operation::ListListeners, load_balancer_arn)?;
        inner.load_balancer_mut(load_balancer_arn)?;
        let mut items: Vec<Listener> = inner
            .state
            .listeners
            .iter()
            .filter(|l| &l.load_balancer_arn == load_balancer_arn)
            .cloned()
            .collect();
        items.sort_by_key(|l| l.port);
        self.paginate(items, marker)
    }

    async fn create_listener(&self, request: &CreateListenerRequest) -> GatewayResult<Listener> {
        let mut inner = self.lock();
        let resource = format!("{}:{}", request.load_balancer_arn, request.port);
        inner.record(Operation::CreateListener, resource)?;

        let lb_name =
            inner.load_balancer_mut(&request.load_balancer_arn)?.load_balancer.name.clone();
        if inner
            .state
            .listeners
            .iter()
            .any(|l| l.load_balancer_arn == request.load_balancer_arn && l.port == request.port)
        {
            return Err(GatewayError::new(
                GatewayErrorCode::Conflict,
                format!("DuplicateListener: port {} is already in use", request.port),
            ));
        }
        ensure_certificates(request.protocol, !request.certificates.is_empty())?;
        inner.check_targets_exist(&request.default_actions)?;

        let listener = Listener {
            arn: ListenerArn::new(arn("listener", &format!("app/{}", lb_name))),
            load_balancer_arn: request.load_balancer_arn.clone(),
            port: request.port,
            protocol: request.protocol,
            certificates: request.certificates.clone(),
            ssl_policy: request.ssl_policy.clone().filter(|p| !p.is_empty()),
            default_actions: request.default_actions.clone(),
        };
        inner.state.rules.push(StoredRule {
            listener_arn: listener.arn.clone(),
            rule: Rule {
                arn: RuleArn::new(arn("listener-rule", &format!("app/{}", lb_name))),
                priority: 0,
                conditions: Vec::new(),
                actions: listener.default_actions.clone(),
                is_default: true,
            },
        });
        inner.state.listeners.push(listener.clone());
        inner.refresh_associations();
        Ok(listener)
    }

    async fn modify_listener(
        &self,
        arn: &ListenerArn,
        request: &ModifyListenerRequest,
    ) -> GatewayResult<Listener> {
        let mut inner = self.lock();
        inner.record(Operation::ModifyListener, arn)?;
        ensure_certificates(request.protocol, !request.certificates.is_empty())?;
        inner.check_targets_exist(&request.default_actions)?;

        let owner = inner.listener_mut(arn)?.load_balancer_arn.clone();
        if inner
            .state
            .listeners
            .iter()
            .any(|l| l.load_balancer_arn == owner && l.port == request.port && &l.arn != arn)
        {
            return Err(GatewayError::conflict(format!("port {} is already in use", request.port)));
        }

        let listener = inner.listener_mut(arn)?;
        listener.port = request.port;
        listener.protocol = request.protocol;
        listener.certificates = request.certificates.clone();
        listener.ssl_policy = request.ssl_policy.clone().filter(|p| !p.is_empty());
        listener.default_actions = request.default_actions.clone();
        let updated = listener.clone();

        for stored in inner.state.rules.iter_mut() {
            if &stored.listener_arn == arn && stored.rule.is_default {
                stored.rule.actions = updated.default_actions.clone();
            }
        }
        inner.refresh_associations();
        Ok(updated)
    }

    async fn delete_listener(&self, arn: &ListenerArn) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::DeleteListener, arn)?;
        inner.listener_mut(arn)?;
        inner.state.rules.retain(|r| &r.listener_arn != arn);
        inner.state.listeners.retain(|l| &l.arn != arn);
        inner.refresh_associations();
        Ok(())
    }

    async fn list_rules(
        &self,
        listener_arn: &ListenerArn,
        marker: Option<String>,
    ) -> GatewayResult<Page<Rule>> {
        let mut inner = self.lock();
        inner.record(Operation::ListRules, listener_arn)?;
        inner.listener_mut(listener_arn)?;
        let items = inner.listener_rules(listener_arn);
        self.paginate(items, marker)
    }

    async fn create_rule(&self, request: &CreateRuleRequest) -> GatewayResult<Rule> {
        let mut inner = self.lock();
        let resource = format!("{}:{}", request.listener_arn, request.priority);
        inner.record(Operation::CreateRule, resource)?;

        let owner = inner.listener_mut(&request.listener_arn)?.load_balancer_arn.clone();
        if request.priority == 0 || request.priority > 50000 {
            return Err(GatewayError::invalid(format!("invalid priority {}", request.priority)));
        }
        if inner
            .listener_rules(&request.listener_arn)
            .iter()
            .any(|r| !r.is_default && r.priority == request.priority)
        {
            return Err(GatewayError::conflict(format!(
                "PriorityInUse: priority {} is already in use",
                request.priority
            )));
        }
        inner.check_targets_exist(&request.actions)?;

        let lb_name = inner
            .state
            .load_balancers
            .iter()
            .find(|lb| lb.load_balancer.arn == owner)
            .map(|lb| lb.load_balancer.name.clone())
            .unwrap_or_default();
        let rule = Rule {
            arn: RuleArn::new(arn("listener-rule", &format!("app/{}", lb_name))),
            priority: request.priority,
            conditions: request.conditions.clone(),
            actions: request.actions.clone(),
            is_default: false,
        };
        inner
            .state
            .rules
            .push(StoredRule { listener_arn: request.listener_arn.clone(), rule: rule.clone() });
        inner.refresh_associations();
        Ok(rule)
    }

    async fn modify_rule(
        &self,
        arn: &RuleArn,
        request: &ModifyRuleRequest,
    ) -> GatewayResult<Rule> {
        let mut inner = self.lock();
        inner.record(Operation::ModifyRule, arn)?;
        inner.check_targets_exist(&request.actions)?;
        let stored = inner
            .state
            .rules
            .iter_mut()
            .find(|r| &r.rule.arn == arn)
            .ok_or_else(|| GatewayError::not_found(format!("rule {} not found", arn)))?;
        stored.rule.conditions = request.conditions.clone();
        stored.rule.actions = request.actions.clone();
        let updated = stored.rule.clone();
        inner.refresh_associations();
        Ok(updated)
    }

    async fn delete_rule(&self, arn: &RuleArn) -> GatewayResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::DeleteRule, arn)?;
        let stored = inner
            .state
            .rules
            .iter()
            .find(|r| &r.rule.arn == arn)
            .ok_or_else(|| GatewayError::not_found(format!("rule {} not found", arn)))?;
        if stored.rule.is_default {
            return Err(GatewayError::invalid(
                "OperationNotPermitted: a default rule cannot be deleted",
            ));
        }
        inner.state.rules.retain(|r| &r.rule.arn != arn);
        inner.refresh_associations();
        Ok(())
    }

    async fn set_rule_priorities(
        &self,
        priorities: &[RulePriority],
    ) -> GatewayResult<Vec<Rule>> {
        let mut inner = self.lock();
        let resource =
            priorities.iter().map(|p| p.rule_arn.to_string()).collect::<Vec<_>>().join(",");
        inner.record(Operation::SetRulePriorities, resource)?;

        let mut rules = inner.state.rules.clone();
        for change in priorities {
            let stored = rules.iter_mut().find(|r| r.rule.arn == change.rule_arn).ok_or_else(|| {
                GatewayError::not_found(format!("rule {} not found", change.rule_arn))
            })?;
            if stored.rule.is_default {
                return Err(GatewayError::invalid(
                    "the priority of a default rule cannot be changed",
                ));
            }
            stored.rule.priority = change.priority;
        }

        let mut seen: BTreeSet<(ListenerArn, u32)> = BTreeSet::new();
        for stored in rules.iter().filter(|r| !r.rule.is_default) {
            if !seen.insert((stored.listener_arn.clone(), stored.rule.priority)) {
                return Err(GatewayError::conflict(format!(
                    "PriorityInUse: priority {} is already in use",
                    stored.rule.priority
                )));
            }
        }

        inner.state.rules = rules;
        Ok(priorities
            .iter()
            .filter_map(|p| inner.state.rules.iter().find(|r| r.rule.arn == p.rule_arn))
            .map(|r| r.rule.clone())
            .collect())
    }

    async fn describe_tags(
        &self,
        arns: &[LoadBalancerArn],
    ) -> GatewayResult<BTreeMap<LoadBalancerArn, BTreeMap<String, String>>> {
        let mut inner = self.lock();
        let resource = arns.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(",");
        inner.record(Operation::DescribeTags, resource)?;
        let mut tags = BTreeMap::new();
        for arn in arns {
            let stored = inner.load_balancer_mut(arn)?;
            tags.insert(arn.clone(), stored.tags.clone());
        }
        Ok(tags)
    }
}
