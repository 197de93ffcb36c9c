//! Rule reconciler
//!
//! Content (conditions and resolved actions) and priority are reconciled
//! independently: a rule may need a content modify, a priority update, both
//! or neither. Priority updates for a listener are batched into one call.

use tracing::{debug, info};

use super::canonical::{format_changes, CanonicalForm};
use super::report::ChangeAction;
use super::resolver::{resolve_all, TargetGroupIndex};
use super::session::{payload, ApplySession};
use crate::domain::{payload_actions, Action, ListenerArn, ResourceKind, RuleArn, RuleSpec};
use crate::errors::Result;
use crate::gateway::{CreateRuleRequest, ModifyRuleRequest, Operation, Rule, RulePriority};

const KIND: ResourceKind = ResourceKind::Rule;

/// Desired fields outside the content comparison
pub const EXCLUDED_DESIRED_FIELDS: [&str; 2] = ["rule_arn", "priority"];

/// Live fields outside the content comparison
pub const EXCLUDED_LIVE_FIELDS: [&str; 3] = ["rule_arn", "priority", "is_default"];

pub fn owner(listener_path: &str, spec: &RuleSpec) -> String {
    format!("rule {} of {}", spec.label(), listener_path)
}

fn path(listener_path: &str, label: &str) -> String {
    format!("{}/rule:{}", listener_path, label)
}

pub fn create_request(
    listener_arn: &ListenerArn,
    spec: &RuleSpec,
    resolved: &[Action],
) -> CreateRuleRequest {
    CreateRuleRequest {
        listener_arn: listener_arn.clone(),
        priority: spec.priority,
        conditions: spec.conditions.clone(),
        actions: payload_actions(resolved),
    }
}

pub fn modify_request(spec: &RuleSpec, resolved: &[Action]) -> ModifyRuleRequest {
    ModifyRuleRequest { conditions: spec.conditions.clone(), actions: payload_actions(resolved) }
}

pub fn canonical_desired(spec: &RuleSpec, resolved: &[Action]) -> Result<CanonicalForm> {
    CanonicalForm::of(spec)?
        .without(&EXCLUDED_DESIRED_FIELDS)
        .with("actions", &payload_actions(resolved))
}

pub fn canonical_live(live: &Rule) -> Result<CanonicalForm> {
    Ok(CanonicalForm::of(live)?.without(&EXCLUDED_LIVE_FIELDS))
}

/// Whether the content differs; priority is not considered
pub fn needs_modify(spec: &RuleSpec, resolved: &[Action], live: &Rule) -> Result<bool> {
    Ok(canonical_desired(spec, resolved)? != canonical_live(live)?)
}

pub fn needs_priority_update(spec: &RuleSpec, live: &Rule) -> bool {
    spec.priority != live.priority
}

/// Create a rule under `listener_arn`; a dry run returns a planned identifier
pub async fn create(
    session: &mut ApplySession<'_>,
    listener_path: &str,
    listener_arn: &ListenerArn,
    spec: &RuleSpec,
    index: &TargetGroupIndex,
) -> Result<RuleArn> {
    let resolved = resolve_all(&spec.actions, index, &owner(listener_path, spec))?;
    let request = create_request(listener_arn, spec, &resolved);
    let detail = payload(&request)?;
    info!(
        listener = %listener_path,
        rule = %spec.label(),
        priority = spec.priority,
        dry_run = session.dry_run(),
        payload = %detail,
        "Creating rule"
    );
    let rule_path = path(listener_path, &spec.label());
    session.record(ChangeAction::Create, KIND, rule_path, Some(detail), Vec::new());

    if session.dry_run() {
        return Ok(RuleArn::planned(format!("{}/{}", listener_path, spec.priority)));
    }
    let created = session
        .call(KIND, &spec.label(), Operation::CreateRule, session.gateway.create_rule(&request))
        .await?;
    Ok(created.arn)
}

/// Modify a matched rule's content when it differs. Returns whether it did.
pub async fn modify(
    session: &mut ApplySession<'_>,
    listener_path: &str,
    spec: &RuleSpec,
    live: &Rule,
    index: &TargetGroupIndex,
) -> Result<bool> {
    let resolved = resolve_all(&spec.actions, index, &owner(listener_path, spec))?;
    let desired = canonical_desired(spec, &resolved)?;
    let current = canonical_live(live)?;
    if desired == current {
        debug!(listener = %listener_path, rule = %spec.label(), "Rule content unchanged");
        return Ok(false);
    }

    let diff = current.diff(&desired);
    info!(
        listener = %listener_path,
        rule = %spec.label(),
        dry_run = session.dry_run(),
        diff = %format_changes(&diff),
        "Modifying rule"
    );
    let request = modify_request(spec, &resolved);
    session.record(
        ChangeAction::Modify,
        KIND,
        path(listener_path, &spec.label()),
        Some(payload(&request)?),
        diff,
    );
    if !session.dry_run() {
        session
            .call(
                KIND,
                live.arn.as_str(),
                Operation::ModifyRule,
                session.gateway.modify_rule(&live.arn, &request),
            )
            .await?;
    }
    Ok(true)
}

/// Apply every priority change of one listener in a single call
pub async fn set_priorities(
    session: &mut ApplySession<'_>,
    listener_path: &str,
    changes: Vec<(String, RulePriority)>,
) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    for (label, change) in &changes {
        info!(
            listener = %listener_path,
            rule = %label,
            priority = change.priority,
            dry_run = session.dry_run(),
            "Updating rule priority"
        );
        session.record(
            ChangeAction::SetPriority,
            KIND,
            path(listener_path, label),
            Some(payload(&change.priority)?),
            Vec::new(),
        );
    }
    if session.dry_run() {
        return Ok(());
    }
    let priorities: Vec<RulePriority> = changes.into_iter().map(|(_, p)| p).collect();
    session
        .call(
            KIND,
            listener_path,
            Operation::SetRulePriorities,
            session.gateway.set_rule_priorities(&priorities),
        )
        .await?;
    Ok(())
}

pub async fn delete(
    session: &mut ApplySession<'_>,
    listener_path: &str,
    live: &Rule,
) -> Result<()> {
    let label = live
        .conditions
        .first()
        .and_then(|c| c.values.first())
        .cloned()
        .unwrap_or_else(|| format!("priority {}", live.priority));
    info!(listener = %listener_path, rule = %label, dry_run = session.dry_run(), "Deleting rule");
    session.record(ChangeAction::Delete, KIND, path(listener_path, &label), None, Vec::new());
    if session.dry_run() {
        return Ok(());
    }
    session
        .call(
            KIND,
            live.arn.as_str(),
            Operation::DeleteRule,
            session.gateway.delete_rule(&live.arn),
        )
        .await
}
