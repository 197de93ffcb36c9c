//! Desired topology root
//!
//! The document shape shared by the loader and the exporter:
//!
//! ```yaml
//! networks:
//!   vpc-0123:
//!     load_balancers:
//!       - name: web
//!         subnets: [subnet-a, subnet-b]
//!         security_groups: [sg-1]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::load_balancer::LoadBalancerSpec;

/// Load balancers declared for one virtual network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct VirtualNetwork {
    #[serde(default)]
    #[validate(nested)]
    pub load_balancers: Vec<LoadBalancerSpec>,
}

impl VirtualNetwork {
    pub fn load_balancer(&self, name: &str) -> Option<&LoadBalancerSpec> {
        self.load_balancers.iter().find(|lb| lb.name == name)
    }
}

/// The full desired state, keyed by network id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub networks: BTreeMap<String, VirtualNetwork>,
}

impl DesiredState {
    pub fn is_empty(&self) -> bool {
        self.networks.values().all(|n| n.load_balancers.is_empty())
    }

    /// Number of declared load balancers across all networks
    pub fn load_balancer_count(&self) -> usize {
        self.networks.values().map(|n| n.load_balancers.len()).sum()
    }
}
