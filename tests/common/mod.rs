//! Common test utilities for all integration tests.
//!
//! Provides a seeded in-memory gateway, apply options without settle delays
//! and helpers for building desired state from YAML.

#![allow(dead_code)]

use albsync::desired::parse_desired_state;
use albsync::domain::DesiredState;
use albsync::gateway::{MemoryGateway, Operation};
use albsync::reconcile::{ApplyOptions, SettlePolicy};
use albsync::utils::DocumentFormat;

/// Gateway with two subnets in `vpc-1` and one in `vpc-2`
pub fn gateway() -> MemoryGateway {
    MemoryGateway::new()
        .with_subnet("subnet-1", "vpc-1")
        .with_subnet("subnet-2", "vpc-1")
        .with_subnet("subnet-3", "vpc-2")
}

pub fn live_options() -> ApplyOptions {
    ApplyOptions::default().with_settle(SettlePolicy::immediate())
}

pub fn dry_run_options() -> ApplyOptions {
    live_options().dry_run(true)
}

pub fn desired(yaml: &str) -> DesiredState {
    parse_desired_state(yaml, DocumentFormat::Yaml).expect("valid desired state")
}

/// Operations of the mutating calls, in call order
pub fn mutating_operations(gateway: &MemoryGateway) -> Vec<Operation> {
    gateway.mutating_calls().into_iter().map(|c| c.operation).collect()
}

/// Load balancer `a` with two subnets and nothing beneath it
pub const BARE: &str = r#"
networks:
  vpc-1:
    load_balancers:
      - name: a
        subnets: [subnet-1, subnet-2]
        security_groups: [sg-1]
"#;

/// Load balancer `a` routing port 80 to target group `web`, `/api/*` to `api`
pub const ROUTED: &str = r#"
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
          - name: api
            port: 9090
        listeners:
          - port: 80
            default_actions:
              - target_group_name: web
            rules:
              - priority: 10
                conditions:
                  - field: path-pattern
                    values: ["/api/*"]
                actions:
                  - target_group_name: api
"#;

/// The declared network with no load balancers left
pub const EMPTY_NETWORK: &str = r#"
networks:
  vpc-1:
    load_balancers: []
"#;
