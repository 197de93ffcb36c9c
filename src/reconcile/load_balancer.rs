//! Load balancer reconciler
//!
//! A load balancer is never modified through a generic call. Subnets,
//! security groups, ip-address type and the attribute map each have a
//! dedicated update, gated by its own equality check.

use std::time::Instant;
use tracing::{debug, info, warn};

use super::report::ChangeAction;
use super::session::{payload, ApplySession};
use crate::domain::attributes::comparable_pairs;
use crate::domain::{
    Attribute, IpAddressType, LoadBalancerArn, LoadBalancerAttributes, LoadBalancerSpec,
    ResourceKind,
};
use crate::errors::{AlbError, Result};
use crate::gateway::{
    all_target_groups, CreateLoadBalancerRequest, LoadBalancer, Operation, TargetGroup,
    TargetGroupFilter,
};

const KIND: ResourceKind = ResourceKind::LoadBalancer;

/// One dedicated update a live load balancer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerUpdate {
    Subnets(Vec<String>),
    SecurityGroups(Vec<String>),
    IpAddressType(IpAddressType),
    Attributes(Vec<Attribute>),
}

impl LoadBalancerUpdate {
    fn action(&self) -> ChangeAction {
        match self {
            Self::Subnets(_) => ChangeAction::SetSubnets,
            Self::SecurityGroups(_) => ChangeAction::SetSecurityGroups,
            Self::IpAddressType(_) => ChangeAction::SetIpAddressType,
            Self::Attributes(_) => ChangeAction::SetAttributes,
        }
    }

    fn operation(&self) -> Operation {
        match self {
            Self::Subnets(_) => Operation::SetSubnets,
            Self::SecurityGroups(_) => Operation::SetSecurityGroups,
            Self::IpAddressType(_) => Operation::SetIpAddressType,
            Self::Attributes(_) => Operation::SetLoadBalancerAttributes,
        }
    }
}

pub fn create_request(spec: &LoadBalancerSpec) -> CreateLoadBalancerRequest {
    CreateLoadBalancerRequest {
        name: spec.name.clone(),
        subnets: spec.subnets.clone(),
        security_groups: spec.security_groups.clone(),
        scheme: spec.scheme,
        tags: spec.tags.clone(),
        ip_address_type: spec.ip_address_type,
    }
}

/// The attribute update needed to turn `live_pairs` into the desired map, if any
pub fn attribute_update(
    spec: &LoadBalancerSpec,
    live_pairs: &[Attribute],
) -> Option<LoadBalancerUpdate> {
    let desired = spec.attributes.to_pairs();
    (comparable_pairs(&desired) != comparable_pairs(live_pairs))
        .then(|| LoadBalancerUpdate::Attributes(desired))
}

/// Every dedicated update `live` needs, in the order they are applied
pub fn pending_updates(
    spec: &LoadBalancerSpec,
    live: &LoadBalancer,
    live_pairs: &[Attribute],
) -> Vec<LoadBalancerUpdate> {
    let mut updates = Vec::new();
    if spec.sorted_subnets() != live.subnet_ids() {
        updates.push(LoadBalancerUpdate::Subnets(spec.sorted_subnets()));
    }
    if spec.sorted_security_groups() != live.sorted_security_groups() {
        updates.push(LoadBalancerUpdate::SecurityGroups(spec.sorted_security_groups()));
    }
    if spec.ip_address_type != live.ip_address_type {
        updates.push(LoadBalancerUpdate::IpAddressType(spec.ip_address_type));
    }
    updates.extend(attribute_update(spec, live_pairs));
    updates
}

pub fn needs_modify(
    spec: &LoadBalancerSpec,
    live: &LoadBalancer,
    live_pairs: &[Attribute],
) -> bool {
    !pending_updates(spec, live, live_pairs).is_empty()
}

/// Create the load balancer; a dry run returns a planned identifier
pub async fn create(
    session: &mut ApplySession<'_>,
    spec: &LoadBalancerSpec,
) -> Result<LoadBalancerArn> {
    let request = create_request(spec);
    let detail = payload(&request)?;
    info!(
        load_balancer = %spec.name,
        dry_run = session.dry_run(),
        payload = %detail,
        "Creating load balancer"
    );
    session.record(ChangeAction::Create, KIND, &spec.name, Some(detail), Vec::new());

    if session.dry_run() {
        return Ok(LoadBalancerArn::planned(&spec.name));
    }
    let created = session
        .call(
            KIND,
            &spec.name,
            Operation::CreateLoadBalancer,
            session.gateway.create_load_balancer(&request),
        )
        .await?;
    Ok(created.arn)
}

/// Bring a freshly created load balancer's attribute map in line.
///
/// Creation applies the provider defaults, so only the attributes can differ.
pub async fn sync_created_attributes(
    session: &mut ApplySession<'_>,
    spec: &LoadBalancerSpec,
    arn: &LoadBalancerArn,
) -> Result<()> {
    let live_pairs = if arn.is_planned() {
        LoadBalancerAttributes::default().to_pairs()
    } else {
        session
            .call(
                KIND,
                &spec.name,
                Operation::GetLoadBalancerAttributes,
                session.gateway.get_load_balancer_attributes(arn),
            )
            .await?
    };
    if let Some(update) = attribute_update(spec, &live_pairs) {
        apply_update(session, spec, arn, update).await?;
    }
    Ok(())
}

/// Issue the dedicated updates a matched load balancer needs
pub async fn modify(
    session: &mut ApplySession<'_>,
    spec: &LoadBalancerSpec,
    live: &LoadBalancer,
) -> Result<()> {
    if spec.scheme != live.scheme {
        warn!(
            load_balancer = %spec.name,
            desired = %spec.scheme,
            live = %live.scheme,
            "Scheme cannot be changed in place; recreate the load balancer to apply it"
        );
    }

    let live_pairs = session
        .call(
            KIND,
            &spec.name,
            Operation::GetLoadBalancerAttributes,
            session.gateway.get_load_balancer_attributes(&live.arn),
        )
        .await?;

    let updates = pending_updates(spec, live, &live_pairs);
    if updates.is_empty() {
        debug!(load_balancer = %spec.name, "Load balancer unchanged");
        return Ok(());
    }
    for update in updates {
        apply_update(session, spec, &live.arn, update).await?;
    }
    Ok(())
}

async fn apply_update(
    session: &mut ApplySession<'_>,
    spec: &LoadBalancerSpec,
    arn: &LoadBalancerArn,
    update: LoadBalancerUpdate,
) -> Result<()> {
    let detail = match &update {
        LoadBalancerUpdate::Subnets(v) | LoadBalancerUpdate::SecurityGroups(v) => payload(v)?,
        LoadBalancerUpdate::IpAddressType(t) => payload(t)?,
        LoadBalancerUpdate::Attributes(pairs) => payload(pairs)?,
    };
    info!(
        load_balancer = %spec.name,
        dry_run = session.dry_run(),
        update = %update.action(),
        value = %detail,
        "Updating load balancer"
    );
    session.record(update.action(), KIND, &spec.name, Some(detail), Vec::new());
    if session.dry_run() {
        return Ok(());
    }

    let gateway = session.gateway;
    let operation = update.operation();
    match update {
        LoadBalancerUpdate::Subnets(subnets) => {
            let applied = session
                .call(KIND, &spec.name, operation, gateway.set_subnets(arn, &subnets))
                .await?;
            debug!(load_balancer = %spec.name, ?applied, "Subnets applied");
        }
        LoadBalancerUpdate::SecurityGroups(groups) => {
            let applied = session
                .call(KIND, &spec.name, operation, gateway.set_security_groups(arn, &groups))
                .await?;
            debug!(load_balancer = %spec.name, ?applied, "Security groups applied");
        }
        LoadBalancerUpdate::IpAddressType(ip_type) => {
            let applied = session
                .call(KIND, &spec.name, operation, gateway.set_ip_address_type(arn, ip_type))
                .await?;
            debug!(load_balancer = %spec.name, applied = %applied, "Ip address type applied");
        }
        LoadBalancerUpdate::Attributes(pairs) => {
            let applied = session
                .call(
                    KIND,
                    &spec.name,
                    operation,
                    gateway.set_load_balancer_attributes(arn, &pairs),
                )
                .await?;
            debug!(load_balancer = %spec.name, count = applied.len(), "Attributes applied");
        }
    }
    Ok(())
}

/// Delete a live load balancer, then the target groups it released.
///
/// The target groups are listed before the delete call. Afterwards the
/// provider is polled until none of them is associated with the load
/// balancer any more; only groups left with no association at all are
/// deleted.
pub async fn delete(session: &mut ApplySession<'_>, live: &LoadBalancer) -> Result<()> {
    let filter = TargetGroupFilter::for_load_balancer(&live.arn);
    let held = all_target_groups(session.gateway, &filter).await?;

    info!(
        load_balancer = %live.name,
        dry_run = session.dry_run(),
        target_groups = held.len(),
        "Deleting load balancer"
    );
    session.record(ChangeAction::Delete, KIND, &live.name, None, Vec::new());

    if session.dry_run() {
        for target_group in held.iter().filter(|tg| only_held_by(tg, &live.arn)) {
            info!(
                load_balancer = %live.name,
                target_group = %target_group.name,
                dry_run = true,
                "Deleting target group"
            );
            let path = format!("{}/target_group:{}", live.name, target_group.name);
            session.record(ChangeAction::Delete, ResourceKind::TargetGroup, path, None, Vec::new());
        }
        return Ok(());
    }

    let started = Instant::now();
    session
        .call(
            KIND,
            &live.name,
            Operation::DeleteLoadBalancer,
            session.gateway.delete_load_balancer(&live.arn),
        )
        .await?;
    if held.is_empty() {
        return Ok(());
    }

    let released = settle(session, live, &held, started).await?;
    for target_group in released {
        if !target_group.load_balancer_arns.is_empty() {
            warn!(
                load_balancer = %live.name,
                target_group = %target_group.name,
                "Target group is still used by another load balancer, keeping it"
            );
            continue;
        }
        super::target_group::delete(session, &live.name, &target_group.arn, &target_group.name)
            .await?;
    }
    Ok(())
}

fn only_held_by(target_group: &TargetGroup, arn: &LoadBalancerArn) -> bool {
    target_group.load_balancer_arns.iter().all(|a| a == arn)
}

/// Poll until no listed target group is still associated with `live`.
async fn settle(
    session: &ApplySession<'_>,
    live: &LoadBalancer,
    held: &[TargetGroup],
    started: Instant,
) -> Result<Vec<TargetGroup>> {
    let policy = session.options.settle;
    let filter = TargetGroupFilter::for_arns(held.iter().map(|tg| tg.arn.clone()).collect());

    tokio::time::sleep(policy.initial_delay).await;
    loop {
        let current = all_target_groups(session.gateway, &filter).await?;
        let pending = current.iter().filter(|tg| tg.load_balancer_arns.contains(&live.arn)).count();
        if pending == 0 {
            debug!(
                load_balancer = %live.name,
                waited_ms = started.elapsed().as_millis() as u64,
                "Associations released"
            );
            return Ok(current);
        }
        if started.elapsed() >= policy.timeout {
            return Err(AlbError::Settle {
                load_balancer: live.name.clone(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        debug!(load_balancer = %live.name, pending, "Waiting for target groups to be released");
        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attributes::IDLE_TIMEOUT;
    use crate::gateway::{AvailabilityZone, LoadBalancerState};
    use crate::domain::Scheme;

    fn live(subnets: &[&str], groups: &[&str]) -> LoadBalancer {
        LoadBalancer {
            arn: LoadBalancerArn::new("arn:lb/a"),
            name: "a".to_string(),
            vpc_id: "vpc-1".to_string(),
            scheme: Scheme::InternetFacing,
            ip_address_type: IpAddressType::Ipv4,
            security_groups: groups.iter().map(|g| g.to_string()).collect(),
            availability_zones: subnets
                .iter()
                .map(|s| AvailabilityZone {
                    zone_name: format!("{}-az", s),
                    subnet_id: s.to_string(),
                })
                .collect(),
            dns_name: String::new(),
            canonical_hosted_zone_id: String::new(),
            state: LoadBalancerState::default(),
            load_balancer_type: "application".to_string(),
            created_time: None,
        }
    }

    #[test]
    fn test_unchanged_load_balancer_needs_nothing() {
        let spec = LoadBalancerSpec::new("a", &["s2", "s1"], &["sg-1"]);
        let defaults = LoadBalancerAttributes::default().to_pairs();
        assert!(!needs_modify(&spec, &live(&["s1", "s2"], &["sg-1"]), &defaults));
    }

    #[test]
    fn test_security_groups_only() {
        let spec = LoadBalancerSpec::new("a", &["s1", "s2"], &["sg-2", "sg-1"]);
        let defaults = LoadBalancerAttributes::default().to_pairs();
        let updates = pending_updates(&spec, &live(&["s2", "s1"], &["sg-1"]), &defaults);
        assert_eq!(
            updates,
            vec![LoadBalancerUpdate::SecurityGroups(vec!["sg-1".to_string(), "sg-2".to_string()])]
        );
    }

    #[test]
    fn test_attribute_difference() {
        let mut spec = LoadBalancerSpec::new("a", &["s1"], &["sg-1"]);
        spec.attributes.idle_timeout_seconds = 120;
        let defaults = LoadBalancerAttributes::default().to_pairs();
        let updates = pending_updates(&spec, &live(&["s1"], &["sg-1"]), &defaults);
        match updates.as_slice() {
            [LoadBalancerUpdate::Attributes(pairs)] => {
                assert!(pairs.contains(&Attribute::new(IDLE_TIMEOUT, "120")));
                assert_eq!(pairs.len(), 5);
            }
            other => panic!("unexpected updates: {other:?}"),
        }
    }

    #[test]
    fn test_ip_address_type_difference() {
        let mut spec = LoadBalancerSpec::new("a", &["s1"], &["sg-1"]);
        spec.ip_address_type = IpAddressType::Dualstack;
        let defaults = LoadBalancerAttributes::default().to_pairs();
        let updates = pending_updates(&spec, &live(&["s1"], &["sg-1"]), &defaults);
        assert_eq!(updates, vec![LoadBalancerUpdate::IpAddressType(IpAddressType::Dualstack)]);
    }

    #[test]
    fn test_create_request_carries_tags() {
        let mut spec = LoadBalancerSpec::new("a", &["s1"], &["sg-1"]);
        spec.tags.insert("team".to_string(), "edge".to_string());
        let request = create_request(&spec);
        assert_eq!(request.tags.get("team").map(String::as_str), Some("edge"));
        assert_eq!(request.subnets, vec!["s1"]);
    }
}
