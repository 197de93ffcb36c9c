//! Listener reconciler
//!
//! Listeners are matched by port. The default action is resolved against the
//! target groups known to the pass right before every create or modify, and
//! only the resolved identifier is sent. Nested rules are reconciled
//! separately and are not part of the listener comparison.

use tracing::{debug, info};

use super::canonical::{format_changes, CanonicalForm};
use super::report::ChangeAction;
use super::resolver::{resolve_all, TargetGroupIndex};
use super::session::{payload, ApplySession};
use crate::domain::{
    payload_actions, Action, ListenerArn, ListenerSpec, LoadBalancerArn, ResourceKind,
};
use crate::errors::Result;
use crate::gateway::{CreateListenerRequest, Listener, ModifyListenerRequest, Operation};

const KIND: ResourceKind = ResourceKind::Listener;

/// Live fields never compared
pub const EXCLUDED_LIVE_FIELDS: [&str; 2] = ["listener_arn", "load_balancer_arn"];

/// Fields dropped from both sides when no TLS policy is desired
const TLS_FIELDS: [&str; 2] = ["certificates", "ssl_policy"];

/// Owner label used in resolution errors and log lines
pub fn owner(lb_name: &str, port: u32) -> String {
    format!("listener {} of '{}'", port, lb_name)
}

fn path(lb_name: &str, port: u32) -> String {
    format!("{}/listener:{}", lb_name, port)
}

fn ssl_policy(spec: &ListenerSpec) -> Option<String> {
    spec.has_ssl_policy().then(|| spec.ssl_policy.clone()).flatten()
}

pub fn create_request(
    spec: &ListenerSpec,
    load_balancer_arn: &LoadBalancerArn,
    resolved: &[Action],
) -> CreateListenerRequest {
    CreateListenerRequest {
        load_balancer_arn: load_balancer_arn.clone(),
        port: spec.port,
        protocol: spec.protocol,
        certificates: spec.certificates.clone(),
        ssl_policy: ssl_policy(spec),
        default_actions: payload_actions(resolved),
    }
}

pub fn modify_request(spec: &ListenerSpec, resolved: &[Action]) -> ModifyListenerRequest {
    ModifyListenerRequest {
        port: spec.port,
        protocol: spec.protocol,
        certificates: spec.certificates.clone(),
        ssl_policy: ssl_policy(spec),
        default_actions: payload_actions(resolved),
    }
}

pub fn canonical_desired(spec: &ListenerSpec, resolved: &[Action]) -> Result<CanonicalForm> {
    let form = CanonicalForm::of(spec)?
        .without(&["rules"])
        .with("default_actions", &payload_actions(resolved))?;
    Ok(if spec.has_ssl_policy() { form } else { form.without(&TLS_FIELDS) })
}

/// Live side of the comparison. TLS fields are dropped when the desired
/// listener has no TLS policy.
pub fn canonical_live(live: &Listener, compare_tls: bool) -> Result<CanonicalForm> {
    let form = CanonicalForm::of(live)?.without(&EXCLUDED_LIVE_FIELDS);
    Ok(if compare_tls { form } else { form.without(&TLS_FIELDS) })
}

pub fn needs_modify(spec: &ListenerSpec, resolved: &[Action], live: &Listener) -> Result<bool> {
    Ok(canonical_desired(spec, resolved)? != canonical_live(live, spec.has_ssl_policy())?)
}

/// Create the listener; a dry run returns a planned identifier
pub async fn create(
    session: &mut ApplySession<'_>,
    lb_name: &str,
    load_balancer_arn: &LoadBalancerArn,
    spec: &ListenerSpec,
    index: &TargetGroupIndex,
) -> Result<ListenerArn> {
    let resolved = resolve_all(&spec.default_actions, index, &owner(lb_name, spec.port))?;
    let request = create_request(spec, load_balancer_arn, &resolved);
    let detail = payload(&request)?;
    info!(
        load_balancer = %lb_name,
        port = spec.port,
        dry_run = session.dry_run(),
        payload = %detail,
        "Creating listener"
    );
    session.record(ChangeAction::Create, KIND, path(lb_name, spec.port), Some(detail), Vec::new());

    if session.dry_run() {
        return Ok(ListenerArn::planned(format!("{}/{}", lb_name, spec.port)));
    }
    let resource = format!("{}:{}", lb_name, spec.port);
    let created = session
        .call(KIND, &resource, Operation::CreateListener, session.gateway.create_listener(&request))
        .await?;
    Ok(created.arn)
}

/// Modify a matched listener when its canonical form differs. Returns whether it did.
pub async fn modify(
    session: &mut ApplySession<'_>,
    lb_name: &str,
    spec: &ListenerSpec,
    live: &Listener,
    index: &TargetGroupIndex,
) -> Result<bool> {
    let resolved = resolve_all(&spec.default_actions, index, &owner(lb_name, spec.port))?;
    let desired = canonical_desired(spec, &resolved)?;
    let current = canonical_live(live, spec.has_ssl_policy())?;
    if desired == current {
        debug!(load_balancer = %lb_name, port = spec.port, "Listener unchanged");
        return Ok(false);
    }

    let diff = current.diff(&desired);
    info!(
        load_balancer = %lb_name,
        port = spec.port,
        dry_run = session.dry_run(),
        diff = %format_changes(&diff),
        "Modifying listener"
    );
    let request = modify_request(spec, &resolved);
    let detail = payload(&request)?;
    session.record(ChangeAction::Modify, KIND, path(lb_name, spec.port), Some(detail), diff);
    if !session.dry_run() {
        session
            .call(
                KIND,
                live.arn.as_str(),
                Operation::ModifyListener,
                session.gateway.modify_listener(&live.arn, &request),
            )
            .await?;
    }
    Ok(true)
}

/// Delete a live listener; the provider removes its rules with it
pub async fn delete(session: &mut ApplySession<'_>, lb_name: &str, live: &Listener) -> Result<()> {
    info!(
        load_balancer = %lb_name,
        port = live.port,
        dry_run = session.dry_run(),
        "Deleting listener"
    );
    session.record(ChangeAction::Delete, KIND, path(lb_name, live.port), None, Vec::new());
    if session.dry_run() {
        return Ok(());
    }
    session
        .call(
            KIND,
            live.arn.as_str(),
            Operation::DeleteListener,
            session.gateway.delete_listener(&live.arn),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Certificate, Protocol, TargetGroupArn};

    fn index() -> TargetGroupIndex {
        [("web".to_string(), TargetGroupArn::new("arn:tg/web"))].into_iter().collect()
    }

    fn spec(port: u32) -> ListenerSpec {
        ListenerSpec {
            port,
            protocol: Protocol::Http,
            certificates: vec![],
            ssl_policy: None,
            default_actions: vec![Action::forward_to_name("web")],
            rules: vec![],
        }
    }

    fn live(port: u32) -> Listener {
        Listener {
            arn: ListenerArn::new("arn:listener/1"),
            load_balancer_arn: LoadBalancerArn::new("arn:lb/a"),
            port,
            protocol: Protocol::Http,
            certificates: vec![],
            ssl_policy: None,
            default_actions: vec![Action::forward_to_arn(TargetGroupArn::new("arn:tg/web"))],
        }
    }

    fn resolved(spec: &ListenerSpec) -> Vec<Action> {
        resolve_all(&spec.default_actions, &index(), "listener").unwrap()
    }

    #[test]
    fn test_resolved_name_matches_live_identifier() {
        let spec = spec(80);
        assert!(!needs_modify(&spec, &resolved(&spec), &live(80)).unwrap());
    }

    #[test]
    fn test_default_action_target_change() {
        let spec = spec(80);
        let mut current = live(80);
        current.default_actions = vec![Action::forward_to_arn(TargetGroupArn::new("arn:tg/old"))];
        assert!(needs_modify(&spec, &resolved(&spec), &current).unwrap());
    }

    #[test]
    fn test_tls_fields_ignored_without_policy() {
        let spec = spec(80);
        let mut current = live(80);
        current.certificates = vec![Certificate { certificate_arn: "arn:cert/1".to_string() }];
        current.ssl_policy = Some(String::new());
        assert!(!needs_modify(&spec, &resolved(&spec), &current).unwrap());
    }

    #[test]
    fn test_certificate_order_matters_with_policy() {
        let mut spec = spec(443);
        spec.protocol = Protocol::Https;
        spec.ssl_policy = Some("ELBSecurityPolicy-2016-08".to_string());
        spec.certificates = vec![
            Certificate { certificate_arn: "arn:cert/1".to_string() },
            Certificate { certificate_arn: "arn:cert/2".to_string() },
        ];
        let mut current = live(443);
        current.protocol = Protocol::Https;
        current.ssl_policy = spec.ssl_policy.clone();
        current.certificates = spec.certificates.iter().rev().cloned().collect();
        assert!(needs_modify(&spec, &resolved(&spec), &current).unwrap());

        current.certificates = spec.certificates.clone();
        assert!(!needs_modify(&spec, &resolved(&spec), &current).unwrap());
    }

    #[test]
    fn test_create_request_strips_names() {
        let spec = spec(80);
        let request = create_request(&spec, &LoadBalancerArn::new("arn:lb/a"), &resolved(&spec));
        let expected = vec![Action::forward_to_arn(TargetGroupArn::new("arn:tg/web"))];
        assert_eq!(request.default_actions, expected);
        assert_eq!(request.ssl_policy, None);
    }
}
