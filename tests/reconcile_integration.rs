//! Integration tests for the topology reconciler
//!
//! Each test drives a full apply against the in-memory gateway and checks the
//! exact mutating calls it received.

mod common;

use albsync::errors::{AlbError, GatewayError};
use albsync::gateway::{MemoryGateway, Operation};
use albsync::domain::ResourceKind;
use albsync::reconcile::{
    ApplyOptions, ChangeAction, ScopeFilter, SettlePolicy, TopologyReconciler,
};
use common::*;
use std::time::Duration;

const LISTENER_ONLY: &str = r#"
networks:
  vpc-1:
    load_balancers:
      - name: a
        subnets: [subnet-1, subnet-2]
        security_groups: [sg-1]
        target_groups:
          - name: web
            port: 8080
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
"#;

async fn apply(
    gateway: &MemoryGateway,
    yaml: &str,
    options: ApplyOptions,
) -> albsync::ApplyReport {
    TopologyReconciler::new(gateway, options).apply(&desired(yaml)).await.expect("apply succeeds")
}

#[tokio::test]
async fn test_create_bare_load_balancer() {
    let gateway = gateway();
    let report = apply(&gateway, BARE, live_options()).await;

    let calls = gateway.mutating_calls();
    assert_eq!(calls.len(), 1, "{:?}", calls);
    assert_eq!(calls[0].operation, Operation::CreateLoadBalancer);
    assert_eq!(calls[0].resource, "a");

    let snapshot = gateway.snapshot();
    let lb = &snapshot.load_balancers[0].load_balancer;
    assert_eq!(lb.subnet_ids(), vec!["subnet-1", "subnet-2"]);
    assert_eq!(lb.vpc_id, "vpc-1");
    assert_eq!(report.count(ResourceKind::LoadBalancer, ChangeAction::Create), 1);
}

#[tokio::test]
async fn test_delete_load_balancer_then_orphaned_target_group() {
    let gateway = gateway().with_release_polls(3);
    apply(&gateway, LISTENER_ONLY, live_options()).await;
    let lb_arn = gateway.snapshot().load_balancers[0].load_balancer.arn.clone();
    let tg_arn = gateway.snapshot().target_groups[0].target_group.arn.clone();
    gateway.clear_calls();

    let report = apply(&gateway, EMPTY_NETWORK, live_options()).await;

    let calls = gateway.mutating_calls();
    assert_eq!(
        mutating_operations(&gateway),
        vec![Operation::DeleteLoadBalancer, Operation::DeleteTargetGroup]
    );
    assert_eq!(calls[0].resource, lb_arn.to_string());
    assert_eq!(calls[1].resource, tg_arn.to_string());
    assert!(gateway.calls_for(Operation::ListTargetGroups).len() >= 3);

    let snapshot = gateway.snapshot();
    assert!(snapshot.load_balancers.is_empty());
    assert!(snapshot.target_groups.is_empty());
    assert_eq!(report.count(ResourceKind::TargetGroup, ChangeAction::Delete), 1);
}

#[tokio::test]
async fn test_settle_timeout_keeps_target_groups() {
    let gateway = gateway().with_release_polls(1_000_000);
    apply(&gateway, LISTENER_ONLY, live_options()).await;
    gateway.clear_calls();

    let settle = SettlePolicy {
        initial_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        timeout: Duration::from_millis(20),
    };
    let options = ApplyOptions::default().with_settle(settle);
    let result = TopologyReconciler::new(&gateway, options).apply(&desired(EMPTY_NETWORK)).await;

    assert!(matches!(result, Err(AlbError::Settle { .. })), "{:?}", result);
    assert!(gateway.calls_for(Operation::DeleteTargetGroup).is_empty());
    assert_eq!(gateway.snapshot().target_groups.len(), 1);
}

#[tokio::test]
async fn test_target_group_created_before_listener_that_references_it() {
    let gateway = gateway();
    apply(&gateway, BARE, live_options()).await;
    gateway.clear_calls();

    apply(&gateway, LISTENER_ONLY, live_options()).await;

    assert_eq!(
        mutating_operations(&gateway),
        vec![Operation::CreateTargetGroup, Operation::CreateListener]
    );
    let snapshot = gateway.snapshot();
    let tg_arn = &snapshot.target_groups[0].target_group.arn;
    let action = &snapshot.listeners[0].default_actions[0];
    assert_eq!(action.target_group_arn.as_ref(), Some(tg_arn));
    assert_eq!(action.target_group_name, None);
}

#[tokio::test]
async fn test_security_group_change_is_one_dedicated_call() {
    let gateway = gateway();
    apply(&gateway, BARE, live_options()).await;
    gateway.clear_calls();

    let changed = BARE.replace("[sg-1]", "[sg-2, sg-3]");
    let report = apply(&gateway, &changed, live_options()).await;

    assert_eq!(mutating_operations(&gateway), vec![Operation::SetSecurityGroups]);
    assert_eq!(report.count(ResourceKind::LoadBalancer, ChangeAction::SetSecurityGroups), 1);
    assert!(gateway.calls_for(Operation::SetSubnets).is_empty());
}

#[tokio::test]
async fn test_dry_run_issues_no_mutating_calls() {
    let gateway = gateway();
    let report = apply(&gateway, ROUTED, dry_run_options()).await;

    assert!(gateway.mutating_calls().is_empty());
    assert!(report.dry_run);
    assert_eq!(report.count(ResourceKind::LoadBalancer, ChangeAction::Create), 1);
    assert_eq!(report.count(ResourceKind::TargetGroup, ChangeAction::Create), 2);
    assert_eq!(report.count(ResourceKind::Listener, ChangeAction::Create), 1);
    assert_eq!(report.count(ResourceKind::Rule, ChangeAction::Create), 1);

    let create = report.changes_for(ResourceKind::LoadBalancer).next().unwrap();
    let detail = create.detail.as_ref().unwrap();
    assert_eq!(detail["subnets"], serde_json::json!(["subnet-1", "subnet-2"]));
}

#[tokio::test]
async fn test_second_apply_is_a_noop() {
    let gateway = gateway();
    apply(&gateway, LISTENER_ONLY, live_options()).await;
    gateway.clear_calls();

    let report = apply(&gateway, LISTENER_ONLY, live_options()).await;

    assert!(report.is_noop(), "{:?}", report.changes);
    assert!(gateway.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_health_check_change_is_one_modify() {
    let gateway = gateway();
    apply(&gateway, LISTENER_ONLY, live_options()).await;
    gateway.clear_calls();

    let changed = LISTENER_ONLY.replace(
        "            port: 8080\n",
        "            port: 8080\n            health_check:\n              path: /ready\n",
    );
    let report = apply(&gateway, &changed, live_options()).await;

    assert_eq!(mutating_operations(&gateway), vec![Operation::ModifyTargetGroup]);
    let change = report.changes_for(ResourceKind::TargetGroup).next().unwrap();
    assert!(change.diff.iter().any(|d| d.path == "health_check.path"), "{:?}", change.diff);
    assert_eq!(gateway.snapshot().target_groups[0].target_group.health_check.path, "/ready");
}

#[tokio::test]
async fn test_instances_registered_and_deregistered() {
    let gateway = gateway();
    apply(&gateway, ROUTED, live_options()).await;
    let web = |gateway: &MemoryGateway| {
        gateway
            .snapshot()
            .target_groups
            .into_iter()
            .find(|tg| tg.target_group.name == "web")
            .unwrap()
            .targets
    };
    assert_eq!(web(&gateway).len(), 2);

    let changed = ROUTED.replace("[i-1, i-2]", "[i-2, i-3]");
    gateway.clear_calls();
    apply(&gateway, &changed, dry_run_options()).await;
    assert!(gateway.mutating_calls().is_empty());

    apply(&gateway, &changed, live_options()).await;
    let targets: Vec<String> = web(&gateway).into_iter().collect();
    assert_eq!(targets, vec!["i-2", "i-3"]);
    assert_eq!(gateway.calls_for(Operation::RegisterTargets).len(), 1);
    assert_eq!(gateway.calls_for(Operation::DeregisterTargets).len(), 1);
}

#[tokio::test]
async fn test_removed_listener_cascades_to_its_target_group() {
    let gateway = gateway();
    apply(&gateway, LISTENER_ONLY, live_options()).await;
    gateway.clear_calls();

    apply(&gateway, BARE, live_options()).await;

    assert_eq!(
        mutating_operations(&gateway),
        vec![Operation::DeleteListener, Operation::DeleteTargetGroup]
    );
    assert!(gateway.snapshot().target_groups.is_empty());
}

#[tokio::test]
async fn test_target_group_shared_with_another_load_balancer_is_kept() {
    let shared = r#"
networks:
  vpc-1:
    load_balancers:
      - name: a
        subnets: [subnet-1]
        security_groups: [sg-1]
        target_groups:
          - name: web
            port: 8080
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
      - name: b
        subnets: [subnet-2]
        security_groups: [sg-1]
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
"#;
    let gateway = gateway();
    apply(&gateway, shared, live_options()).await;
    gateway.clear_calls();

    let without_a_listener = r#"
networks:
  vpc-1:
    load_balancers:
      - name: a
        subnets: [subnet-1]
        security_groups: [sg-1]
      - name: b
        subnets: [subnet-2]
        security_groups: [sg-1]
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
"#;
    apply(&gateway, without_a_listener, live_options()).await;

    assert_eq!(mutating_operations(&gateway), vec![Operation::DeleteListener]);
    assert_eq!(gateway.snapshot().target_groups.len(), 1);
}

#[tokio::test]
async fn test_unresolved_reference_fails_before_any_mutation() {
    let gateway = gateway();
    let broken = LISTENER_ONLY.replace("target_group_name: web", "target_group_name: missing");

    let result =
        TopologyReconciler::new(&gateway, dry_run_options()).apply(&desired(&broken)).await;

    match result {
        Err(AlbError::Resolution { target_group, owner }) => {
            assert_eq!(target_group, "missing");
            assert!(owner.contains("listener 80"), "{}", owner);
        }
        other => panic!("expected a resolution error, got {:?}", other),
    }
    assert!(gateway.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_invalid_desired_state_never_reaches_the_gateway() {
    let gateway = gateway();
    let mut state = desired(BARE);
    state.networks.get_mut("vpc-1").unwrap().load_balancers[0].subnets.clear();

    let result = TopologyReconciler::new(&gateway, live_options()).apply(&state).await;

    assert!(matches!(result, Err(AlbError::Validation { .. })));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_failure_isolation_per_load_balancer() {
    let two = r#"
networks:
  vpc-1:
    load_balancers:
      - name: bad
        subnets: [subnet-1]
        security_groups: [sg-1]
      - name: good
        subnets: [subnet-2]
        security_groups: [sg-1]
"#;
    let gateway = gateway();
    gateway.fail_on(Operation::CreateLoadBalancer, Some("bad"), GatewayError::conflict("quota"));

    let result = TopologyReconciler::new(&gateway, live_options()).apply(&desired(two)).await;
    assert!(matches!(
        result,
        Err(AlbError::Gateway { operation: Operation::CreateLoadBalancer, .. })
    ));
    assert!(gateway.snapshot().load_balancers.is_empty());

    let report = apply(&gateway, two, live_options().isolate_failures(true)).await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].load_balancer, "bad");
    assert!(report.failures[0].error.contains("quota"));
    let names: Vec<String> =
        gateway.snapshot().load_balancers.into_iter().map(|lb| lb.load_balancer.name).collect();
    assert_eq!(names, vec!["good"]);
}

#[tokio::test]
async fn test_out_of_scope_and_undeclared_networks_are_untouched() {
    let gateway = gateway();
    let live = r#"
networks:
  vpc-1:
    load_balancers:
      - name: tmp-1
        subnets: [subnet-1]
        security_groups: [sg-1]
  vpc-2:
    load_balancers:
      - name: other
        subnets: [subnet-3]
        security_groups: [sg-1]
"#;
    apply(&gateway, live, live_options()).await;
    gateway.clear_calls();

    let scope = ScopeFilter::new(&[], &["/^tmp-/".to_string()]).unwrap();
    let report = apply(&gateway, EMPTY_NETWORK, live_options().with_scope(scope)).await;

    assert!(report.is_noop());
    assert!(gateway.mutating_calls().is_empty());
    assert_eq!(gateway.snapshot().load_balancers.len(), 2);
}

#[tokio::test]
async fn test_listings_follow_every_page() {
    let gateway = gateway().with_page_size(1);
    apply(&gateway, ROUTED, live_options()).await;
    gateway.clear_calls();

    let report = apply(&gateway, ROUTED, dry_run_options()).await;

    // Both target groups were found across pages, so nothing is recreated.
    assert_eq!(report.count(ResourceKind::TargetGroup, ChangeAction::Create), 0);
    assert!(gateway.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_removed_rule_cascades_to_its_target_group() {
    let without_rule = r#"
networks:
  vpc-1:
    load_balancers:
      - name: a
        subnets: [subnet-1, subnet-2]
        security_groups: [sg-1]
        target_groups:
          - name: web
            port: 8080
            instances: [i-1, i-2]
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
"#;
    let gateway = gateway();
    apply(&gateway, ROUTED, live_options()).await;
    gateway.clear_calls();

    let report = apply(&gateway, without_rule, live_options()).await;

    assert_eq!(
        mutating_operations(&gateway),
        vec![Operation::DeleteRule, Operation::DeleteTargetGroup]
    );
    assert_eq!(report.count(ResourceKind::Rule, ChangeAction::Delete), 1);
    let snapshot = gateway.snapshot();
    assert!(snapshot.rules.iter().all(|r| r.rule.is_default));
    let names: Vec<String> =
        snapshot.target_groups.into_iter().map(|tg| tg.target_group.name).collect();
    assert_eq!(names, vec!["web"]);
}
