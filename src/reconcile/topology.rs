//! # Topology Reconciler
//!
//! Drives one apply over every declared virtual network. Live load balancers
//! are grouped by network, both sides pass through the scope filter, and
//! every entity goes through the same decision table:
//!
//! | desired | live | action |
//! |---|---|---|
//! | yes | no | create |
//! | no | yes | delete, cascading to children |
//! | yes | yes, canonical-equal | nothing |
//! | yes | yes, canonical-different | modify |
//!
//! Under one load balancer the order is fixed: dedicated load balancer
//! updates, target groups, listeners, and rules within each listener.
//! Target groups that are no longer desired, plus those only referenced by
//! deleted listeners or rules, are deleted last and only when nothing that
//! remains still references them.
//!
//! Networks present live but absent from the desired state are not touched.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::resolver::TargetGroupIndex;
use super::report::{ApplyReport, Failure};
use super::session::{ApplyOptions, ApplySession};
use super::{listener, load_balancer, rule, target_group};
use crate::desired::validate_desired_state;
use crate::domain::{
    Action, DesiredState, ListenerArn, ListenerSpec, LoadBalancerArn, LoadBalancerSpec, RuleArn,
    RuleSpec, TargetGroupArn, VirtualNetwork,
};
use crate::errors::Result;
use crate::gateway::{
    all_listeners, all_load_balancers, all_rules, all_target_groups, CloudGateway, LoadBalancer,
    Rule, RulePriority, TargetGroup, TargetGroupFilter,
};

/// Matching key of a desired rule within one listener pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RuleKey {
    /// Paired with the live rule holding this identifier
    Live(RuleArn),
    /// Not live yet; the index keeps keys unique within the pass
    Placeholder(usize),
}

impl RuleKey {
    fn for_spec(idx: usize, spec: &RuleSpec, live: &[Rule], listener_path: &str) -> Self {
        match &spec.rule_arn {
            Some(arn) if live.iter().any(|r| &r.arn == arn) => Self::Live(arn.clone()),
            Some(arn) => {
                warn!(
                    listener = %listener_path,
                    rule_arn = %arn,
                    "Rule identifier not found on the listener, creating the rule"
                );
                Self::Placeholder(idx)
            }
            None => Self::Placeholder(idx),
        }
    }
}

/// Target groups that may be deleted once the listener pass is over, by identifier.
type DeletionCandidates = BTreeMap<TargetGroupArn, String>;

pub struct TopologyReconciler<'a> {
    gateway: &'a dyn CloudGateway,
    options: ApplyOptions,
}

impl<'a> TopologyReconciler<'a> {
    pub fn new(gateway: &'a dyn CloudGateway, options: ApplyOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Converge the live topology onto `desired`.
    ///
    /// Validation runs first, so an invalid desired state never reaches the
    /// gateway. Without failure isolation the first error ends the run.
    #[instrument(
        skip(self, desired),
        fields(dry_run = self.options.dry_run, networks = desired.networks.len()),
        name = "apply"
    )]
    pub async fn apply(&self, desired: &DesiredState) -> Result<ApplyReport> {
        validate_desired_state(desired)?;

        let mut report = ApplyReport::new(self.options.dry_run);
        let live = all_load_balancers(self.gateway).await?;
        let mut live_by_network: BTreeMap<&str, Vec<&LoadBalancer>> = BTreeMap::new();
        for lb in &live {
            live_by_network.entry(lb.vpc_id.as_str()).or_default().push(lb);
        }

        for (network, declared) in &desired.networks {
            let live_lbs = live_by_network.remove(network.as_str()).unwrap_or_default();
            self.reconcile_network(&mut report, network, declared, &live_lbs).await?;
        }
        for (network, lbs) in &live_by_network {
            debug!(
                network = %network,
                load_balancers = lbs.len(),
                "Network not declared, leaving it untouched"
            );
        }

        info!(dry_run = self.options.dry_run, summary = %report.summary(), "Apply finished");
        Ok(report)
    }

    async fn reconcile_network(
        &self,
        report: &mut ApplyReport,
        network: &str,
        declared: &VirtualNetwork,
        live: &[&LoadBalancer],
    ) -> Result<()> {
        let scope = &self.options.scope;
        let mut live_by_name: BTreeMap<&str, &LoadBalancer> = BTreeMap::new();
        for lb in live {
            if scope.in_scope(&lb.name) {
                live_by_name.insert(lb.name.as_str(), *lb);
            } else {
                debug!(
                    network = %network,
                    load_balancer = %lb.name,
                    "Live load balancer out of scope"
                );
            }
        }

        for spec in &declared.load_balancers {
            if !scope.in_scope(&spec.name) {
                debug!(
                    network = %network,
                    load_balancer = %spec.name,
                    "Desired load balancer out of scope"
                );
                continue;
            }
            let live = live_by_name.remove(spec.name.as_str());
            let outcome = {
                let mut session = ApplySession::new(self.gateway, &self.options, report, network);
                self.reconcile_load_balancer(&mut session, spec, live)
                    .instrument(crate::reconcile_span!(network, spec.name))
                    .await
            };
            self.isolate(report, network, &spec.name, outcome)?;
        }

        for live in live_by_name.into_values() {
            let outcome = {
                let mut session = ApplySession::new(self.gateway, &self.options, report, network);
                load_balancer::delete(&mut session, live)
                    .instrument(crate::reconcile_span!(network, live.name))
                    .await
            };
            self.isolate(report, network, &live.name, outcome)?;
        }
        Ok(())
    }

    /// Either propagate a failure or, with isolation on, record it and carry on
    fn isolate(
        &self,
        report: &mut ApplyReport,
        network: &str,
        load_balancer: &str,
        outcome: Result<()>,
    ) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(err) if self.options.isolate_failures => {
                error!(
                    network = %network,
                    load_balancer = %load_balancer,
                    error = %err,
                    "Load balancer reconciliation failed"
                );
                report.failures.push(Failure {
                    network: network.to_string(),
                    load_balancer: load_balancer.to_string(),
                    error: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn reconcile_load_balancer(
        &self,
        session: &mut ApplySession<'_>,
        spec: &LoadBalancerSpec,
        live: Option<&LoadBalancer>,
    ) -> Result<()> {
        let arn = match live {
            Some(live) => {
                load_balancer::modify(session, spec, live).await?;
                live.arn.clone()
            }
            None => {
                let arn = load_balancer::create(session, spec).await?;
                load_balancer::sync_created_attributes(session, spec, &arn).await?;
                arn
            }
        };
        self.reconcile_children(session, spec, &arn).await
    }

    async fn reconcile_children(
        &self,
        session: &mut ApplySession<'_>,
        spec: &LoadBalancerSpec,
        lb_arn: &LoadBalancerArn,
    ) -> Result<()> {
        let lb_name = spec.name.as_str();

        let bound = if lb_arn.is_planned() {
            Vec::new()
        } else {
            all_target_groups(self.gateway, &TargetGroupFilter::for_load_balancer(lb_arn)).await?
        };
        let account = if spec.target_groups.is_empty() && spec.listeners.is_empty() {
            Vec::new()
        } else {
            all_target_groups(self.gateway, &TargetGroupFilter::default()).await?
        };

        let mut index: TargetGroupIndex =
            account.iter().map(|tg| (tg.name.clone(), tg.arn.clone())).collect();
        for tg in &bound {
            index.insert(tg.name.clone(), tg.arn.clone());
        }

        for tg_spec in &spec.target_groups {
            let live = bound.iter().find(|tg| tg.name == tg_spec.name).or_else(|| {
                let adopted = account.iter().find(|tg| tg.name == tg_spec.name);
                if adopted.is_some() {
                    info!(
                        load_balancer = %lb_name,
                        target_group = %tg_spec.name,
                        "Adopting existing target group"
                    );
                }
                adopted
            });
            let arn = match live {
                Some(live) => {
                    target_group::modify(session, lb_name, tg_spec, live).await?;
                    live.arn.clone()
                }
                None => target_group::create(session, lb_name, tg_spec).await?,
            };
            index.insert(tg_spec.name.clone(), arn);
        }

        let mut candidates: DeletionCandidates = bound
            .iter()
            .filter(|tg| !spec.target_groups.iter().any(|d| d.name == tg.name))
            .map(|tg| (tg.arn.clone(), tg.name.clone()))
            .collect();

        let live_listeners = if lb_arn.is_planned() {
            Vec::new()
        } else {
            all_listeners(self.gateway, lb_arn).await?
        };

        for listener_spec in &spec.listeners {
            let live = live_listeners.iter().find(|l| l.port == listener_spec.port);
            let listener_arn = match live {
                Some(live) => {
                    listener::modify(session, lb_name, listener_spec, live, &index).await?;
                    live.arn.clone()
                }
                None => listener::create(session, lb_name, lb_arn, listener_spec, &index).await?,
            };
            self.reconcile_rules(
                session,
                lb_name,
                listener_spec,
                &listener_arn,
                &index,
                &mut candidates,
            )
            .await?;
        }

        for live in &live_listeners {
            if spec.listeners.iter().any(|l| l.port == live.port) {
                continue;
            }
            note_targets(&mut candidates, &live.default_actions, &index);
            for live_rule in all_rules(self.gateway, &live.arn).await? {
                note_targets(&mut candidates, &live_rule.actions, &index);
            }
            listener::delete(session, lb_name, live).await?;
        }

        self.delete_unreferenced(session, spec, lb_arn, &index, &bound, candidates).await
    }

    /// Rule pass of one listener: deletes, content modifies, one batched
    /// priority update, then creates.
    async fn reconcile_rules(
        &self,
        session: &mut ApplySession<'_>,
        lb_name: &str,
        spec: &ListenerSpec,
        listener_arn: &ListenerArn,
        index: &TargetGroupIndex,
        candidates: &mut DeletionCandidates,
    ) -> Result<()> {
        let listener_path = format!("{}/listener:{}", lb_name, spec.port);
        let live_rules: Vec<Rule> = if listener_arn.is_planned() {
            Vec::new()
        } else {
            let rules = all_rules(self.gateway, listener_arn).await?;
            rules.into_iter().filter(|r| !r.is_default).collect()
        };

        let keyed: Vec<(RuleKey, &RuleSpec)> = spec
            .rules
            .iter()
            .enumerate()
            .map(|(idx, r)| (RuleKey::for_spec(idx, r, &live_rules, &listener_path), r))
            .collect();
        let matched: BTreeSet<&RuleArn> = keyed
            .iter()
            .filter_map(|(key, _)| match key {
                RuleKey::Live(arn) => Some(arn),
                RuleKey::Placeholder(_) => None,
            })
            .collect();

        for live in live_rules.iter().filter(|r| !matched.contains(&r.arn)) {
            note_targets(candidates, &live.actions, index);
            rule::delete(session, &listener_path, live).await?;
        }

        let mut priorities = Vec::new();
        for (key, rule_spec) in &keyed {
            let RuleKey::Live(arn) = key else { continue };
            let Some(live) = live_rules.iter().find(|r| &r.arn == arn) else { continue };
            rule::modify(session, &listener_path, rule_spec, live, index).await?;
            if rule::needs_priority_update(rule_spec, live) {
                priorities.push((
                    rule_spec.label(),
                    RulePriority { rule_arn: arn.clone(), priority: rule_spec.priority },
                ));
            }
        }
        rule::set_priorities(session, &listener_path, priorities).await?;

        for (key, rule_spec) in &keyed {
            if let RuleKey::Placeholder(_) = key {
                rule::create(session, &listener_path, listener_arn, rule_spec, index).await?;
            }
        }
        Ok(())
    }

    /// Delete candidate target groups that nothing desired still references.
    async fn delete_unreferenced(
        &self,
        session: &mut ApplySession<'_>,
        spec: &LoadBalancerSpec,
        lb_arn: &LoadBalancerArn,
        index: &TargetGroupIndex,
        bound: &[TargetGroup],
        candidates: DeletionCandidates,
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let referenced = referenced_target_groups(spec, index);
        let current = if session.dry_run() {
            bound.to_vec()
        } else {
            let filter = TargetGroupFilter::for_arns(candidates.keys().cloned().collect());
            all_target_groups(self.gateway, &filter).await?
        };

        for (arn, name) in candidates {
            if referenced.contains(&arn) {
                debug!(
                    load_balancer = %spec.name,
                    target_group = %name,
                    "Target group still referenced"
                );
                continue;
            }
            let Some(live) = current.iter().find(|tg| tg.arn == arn) else {
                debug!(
                    load_balancer = %spec.name,
                    target_group = %name,
                    "Target group already gone"
                );
                continue;
            };
            let in_use = if session.dry_run() {
                live.load_balancer_arns.iter().any(|a| a != lb_arn)
            } else {
                !live.load_balancer_arns.is_empty()
            };
            if in_use {
                warn!(
                    load_balancer = %spec.name,
                    target_group = %live.name,
                    "Target group is still in use elsewhere, keeping it"
                );
                continue;
            }
            target_group::delete(session, &spec.name, &live.arn, &live.name).await?;
        }
        Ok(())
    }
}

/// Remember the target groups an entity about to be deleted pointed at
fn note_targets(candidates: &mut DeletionCandidates, actions: &[Action], index: &TargetGroupIndex) {
    for arn in actions.iter().filter_map(|a| a.target_group_arn.as_ref()) {
        let name = index.name_of(arn).map_or_else(|| arn.to_string(), str::to_string);
        candidates.entry(arn.clone()).or_insert(name);
    }
}

/// Identifiers of every target group the desired load balancer keeps using
fn referenced_target_groups(
    spec: &LoadBalancerSpec,
    index: &TargetGroupIndex,
) -> BTreeSet<TargetGroupArn> {
    let declared = spec.target_groups.iter().filter_map(|tg| index.get(&tg.name).cloned());
    let actions = spec.listeners.iter().flat_map(|l| {
        l.default_actions.iter().chain(l.rules.iter().flat_map(|r| r.actions.iter()))
    });
    let from_actions = actions.filter_map(|a| {
        a.target_group_arn
            .clone()
            .or_else(|| a.target_group_name.as_deref().and_then(|n| index.get(n).cloned()))
    });
    declared.chain(from_actions).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, Protocol, TargetGroupSpec};
    use crate::gateway::MemoryGateway;
    use tracing_test::traced_test;

    fn index() -> TargetGroupIndex {
        [
            ("web".to_string(), TargetGroupArn::new("arn:tg/web")),
            ("api".to_string(), TargetGroupArn::new("arn:tg/api")),
            ("old".to_string(), TargetGroupArn::new("arn:tg/old")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_referenced_target_groups() {
        let mut spec = LoadBalancerSpec::new("a", &["s1"], &["sg-1"]);
        spec.target_groups.push(TargetGroupSpec::new("web", Protocol::Http, 80, "vpc-1"));
        spec.listeners.push(ListenerSpec {
            port: 80,
            protocol: Protocol::Http,
            certificates: vec![],
            ssl_policy: None,
            default_actions: vec![Action::forward_to_name("web")],
            rules: vec![RuleSpec {
                rule_arn: None,
                priority: 10,
                conditions: vec![Condition::new("path-pattern", &["/api/*"])],
                actions: vec![Action::forward_to_name("api")],
            }],
        });

        let referenced = referenced_target_groups(&spec, &index());
        assert!(referenced.contains(&TargetGroupArn::new("arn:tg/web")));
        assert!(referenced.contains(&TargetGroupArn::new("arn:tg/api")));
        assert!(!referenced.contains(&TargetGroupArn::new("arn:tg/old")));
    }

    #[test]
    fn test_note_targets_uses_known_names() {
        let mut candidates = DeletionCandidates::new();
        let actions = vec![
            Action::forward_to_arn(TargetGroupArn::new("arn:tg/old")),
            Action::forward_to_arn(TargetGroupArn::new("arn:tg/unknown")),
        ];
        note_targets(&mut candidates, &actions, &index());
        assert_eq!(
            candidates.get(&TargetGroupArn::new("arn:tg/old")).map(String::as_str),
            Some("old")
        );
        assert_eq!(
            candidates.get(&TargetGroupArn::new("arn:tg/unknown")).map(String::as_str),
            Some("arn:tg/unknown")
        );
    }

    #[test]
    fn test_rule_key_for_unknown_identifier_is_placeholder() {
        let spec = RuleSpec {
            rule_arn: Some(RuleArn::new("arn:rule/gone")),
            priority: 1,
            conditions: vec![],
            actions: vec![],
        };
        assert_eq!(RuleKey::for_spec(3, &spec, &[], "a/listener:80"), RuleKey::Placeholder(3));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_dry_run_logs_intended_create() {
        let gateway = MemoryGateway::new().with_subnet("subnet-1", "vpc-1");
        let mut desired = DesiredState::default();
        desired.networks.insert(
            "vpc-1".to_string(),
            VirtualNetwork {
                load_balancers: vec![LoadBalancerSpec::new("a", &["subnet-1"], &["sg-1"])],
            },
        );

        let reconciler = TopologyReconciler::new(&gateway, ApplyOptions::default().dry_run(true));
        let report = reconciler.apply(&desired).await.unwrap();

        assert!(gateway.mutating_calls().is_empty());
        assert_eq!(report.changes.len(), 1);
        assert!(logs_contain("Creating load balancer"));
        assert!(logs_contain("subnet-1"));
        assert!(logs_contain("sg-1"));
    }
}
