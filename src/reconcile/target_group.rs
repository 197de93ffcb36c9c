//! Target group reconciler
//!
//! Compared through the canonical form of the desired group against the live group
//! plus its registered instances. The identifier and the load balancer
//! association list are not part of the comparison.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::canonical::{format_changes, CanonicalForm};
use super::report::ChangeAction;
use super::session::{payload, ApplySession};
use crate::domain::{ResourceKind, TargetGroupArn, TargetGroupSpec};
use crate::errors::Result;
use crate::gateway::{
    CreateTargetGroupRequest, ModifyTargetGroupRequest, Operation, TargetGroup,
};

const KIND: ResourceKind = ResourceKind::TargetGroup;

/// Live fields never compared
pub const EXCLUDED_LIVE_FIELDS: [&str; 2] = ["target_group_arn", "load_balancer_arns"];

/// Fields the provider cannot change on an existing group
const IMMUTABLE_FIELDS: [&str; 4] = ["name", "port", "protocol", "vpc_id"];

pub fn create_request(spec: &TargetGroupSpec) -> CreateTargetGroupRequest {
    CreateTargetGroupRequest {
        name: spec.name.clone(),
        protocol: spec.protocol,
        port: spec.port,
        vpc_id: spec.vpc_id.clone(),
        health_check: spec.health_check.clone(),
        matcher: spec.matcher.clone(),
    }
}

pub fn modify_request(spec: &TargetGroupSpec) -> ModifyTargetGroupRequest {
    ModifyTargetGroupRequest {
        health_check: spec.health_check.clone(),
        matcher: spec.matcher.clone(),
    }
}

pub fn canonical_desired(spec: &TargetGroupSpec) -> Result<CanonicalForm> {
    CanonicalForm::of(spec)
}

pub fn canonical_live(live: &TargetGroup, instances: &BTreeSet<String>) -> Result<CanonicalForm> {
    CanonicalForm::of(live)?.without(&EXCLUDED_LIVE_FIELDS).with("instances", instances)
}

pub fn needs_modify(
    spec: &TargetGroupSpec,
    live: &TargetGroup,
    instances: &BTreeSet<String>,
) -> Result<bool> {
    Ok(canonical_desired(spec)? != canonical_live(live, instances)?)
}

/// Create the group and register its instances; a dry run returns a planned identifier
pub async fn create(
    session: &mut ApplySession<'_>,
    lb_name: &str,
    spec: &TargetGroupSpec,
) -> Result<TargetGroupArn> {
    let request = create_request(spec);
    let detail = payload(&request)?;
    let path = format!("{}/target_group:{}", lb_name, spec.name);
    info!(
        load_balancer = %lb_name,
        target_group = %spec.name,
        dry_run = session.dry_run(),
        payload = %detail,
        "Creating target group"
    );
    session.record(ChangeAction::Create, KIND, &path, Some(detail), Vec::new());

    let arn = if session.dry_run() {
        TargetGroupArn::planned(&spec.name)
    } else {
        let created = session
            .call(
                KIND,
                &spec.name,
                Operation::CreateTargetGroup,
                session.gateway.create_target_group(&request),
            )
            .await?;
        created.arn
    };

    let instances: Vec<String> = spec.instances.iter().cloned().collect();
    register(session, &path, &spec.name, &arn, instances).await?;
    Ok(arn)
}

/// Registered instances of a live group
pub async fn live_instances(
    session: &ApplySession<'_>,
    live: &TargetGroup,
) -> Result<BTreeSet<String>> {
    let targets = session
        .call(KIND, &live.name, Operation::ListTargets, session.gateway.list_targets(&live.arn))
        .await?;
    Ok(targets.into_iter().collect())
}

/// Reconcile a matched group. Membership changes go first, then one modify call.
///
/// Returns whether anything differed.
pub async fn modify(
    session: &mut ApplySession<'_>,
    lb_name: &str,
    spec: &TargetGroupSpec,
    live: &TargetGroup,
) -> Result<bool> {
    let instances = live_instances(session, live).await?;
    let desired = canonical_desired(spec)?;
    let current = canonical_live(live, &instances)?;
    if desired == current {
        debug!(target_group = %spec.name, "Target group unchanged");
        return Ok(false);
    }

    let diff = current.diff(&desired);
    let path = format!("{}/target_group:{}", lb_name, spec.name);
    let immutable: Vec<&str> = diff
        .iter()
        .map(|c| c.path.split(['.', '[']).next().unwrap_or_default())
        .filter(|field| IMMUTABLE_FIELDS.contains(field))
        .collect();
    if !immutable.is_empty() {
        warn!(
            target_group = %spec.name,
            fields = ?immutable,
            "Target group fields cannot be changed in place and are left as they are"
        );
    }

    info!(
        load_balancer = %lb_name,
        target_group = %spec.name,
        dry_run = session.dry_run(),
        diff = %format_changes(&diff),
        "Modifying target group"
    );

    let to_register: Vec<String> = spec.instances.difference(&instances).cloned().collect();
    let to_deregister: Vec<String> = instances.difference(&spec.instances).cloned().collect();
    register(session, &path, &spec.name, &live.arn, to_register).await?;
    deregister(session, &path, &spec.name, &live.arn, to_deregister).await?;

    let request = modify_request(spec);
    session.record(ChangeAction::Modify, KIND, &path, Some(payload(&request)?), diff);
    if !session.dry_run() {
        session
            .call(
                KIND,
                &spec.name,
                Operation::ModifyTargetGroup,
                session.gateway.modify_target_group(&live.arn, &request),
            )
            .await?;
    }
    Ok(true)
}

async fn register(
    session: &mut ApplySession<'_>,
    path: &str,
    name: &str,
    arn: &TargetGroupArn,
    targets: Vec<String>,
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    info!(target_group = %name, dry_run = session.dry_run(), ?targets, "Registering targets");
    session.record(ChangeAction::RegisterTargets, KIND, path, Some(payload(&targets)?), Vec::new());
    if session.dry_run() {
        return Ok(());
    }
    session
        .call(
            KIND,
            name,
            Operation::RegisterTargets,
            session.gateway.register_targets(arn, &targets),
        )
        .await
}

async fn deregister(
    session: &mut ApplySession<'_>,
    path: &str,
    name: &str,
    arn: &TargetGroupArn,
    targets: Vec<String>,
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    info!(target_group = %name, dry_run = session.dry_run(), ?targets, "Deregistering targets");
    let detail = payload(&targets)?;
    session.record(ChangeAction::DeregisterTargets, KIND, path, Some(detail), Vec::new());
    if session.dry_run() {
        return Ok(());
    }
    session
        .call(
            KIND,
            name,
            Operation::DeregisterTargets,
            session.gateway.deregister_targets(arn, &targets),
        )
        .await
}

pub async fn delete(
    session: &mut ApplySession<'_>,
    lb_name: &str,
    arn: &TargetGroupArn,
    name: &str,
) -> Result<()> {
    info!(
        load_balancer = %lb_name,
        target_group = %name,
        dry_run = session.dry_run(),
        "Deleting target group"
    );
    let path = format!("{}/target_group:{}", lb_name, name);
    session.record(ChangeAction::Delete, KIND, path, None, Vec::new());
    if session.dry_run() {
        return Ok(());
    }
    session
        .call(KIND, name, Operation::DeleteTargetGroup, session.gateway.delete_target_group(arn))
        .await
}
