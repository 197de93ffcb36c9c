//! Desired-state loader
//!
//! Reads one or more YAML, JSON or TOML documents shaped as
//! `{ networks: { <network id>: { load_balancers: [...] } } }`, merges them,
//! fills network defaults and validates the result. The tree it returns is
//! never changed by the reconciler.

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::validation::validate_desired_state;
use crate::domain::DesiredState;
use crate::errors::{AlbError, Result};
use crate::utils::{read_document, DocumentFormat};

/// Load, merge and validate desired-state files
#[instrument(skip(paths), fields(files = paths.len()))]
pub fn load_desired_state(paths: &[PathBuf]) -> Result<DesiredState> {
    if paths.is_empty() {
        return Err(AlbError::validation_field(
            "at least one desired-state file is required",
            "files",
        ));
    }

    let mut state = DesiredState::default();
    for path in paths {
        let document = read_file(path)?;
        debug!(
            path = %path.display(),
            load_balancers = document.load_balancer_count(),
            "Read desired state"
        );
        merge(&mut state, document)?;
    }

    apply_network_defaults(&mut state);
    validate_desired_state(&state)?;

    info!(
        networks = state.networks.len(),
        load_balancers = state.load_balancer_count(),
        "Desired state loaded"
    );
    Ok(state)
}

/// Parse a single document without merging or validating
pub fn parse_desired_state(text: &str, format: DocumentFormat) -> Result<DesiredState> {
    let mut state: DesiredState = format.parse(text)?;
    apply_network_defaults(&mut state);
    Ok(state)
}

fn read_file(path: &Path) -> Result<DesiredState> {
    read_document(path).map_err(|e| match e {
        AlbError::Serialization { context } => {
            AlbError::serialization(format!("{}: {}", path.display(), context))
        }
        other => other,
    })
}

/// Merge `other` into `state`; a load balancer defined twice in one network is an error
pub fn merge(state: &mut DesiredState, other: DesiredState) -> Result<()> {
    for (network, declared) in other.networks {
        let target = state.networks.entry(network.clone()).or_default();
        for lb in declared.load_balancers {
            if target.load_balancer(&lb.name).is_some() {
                return Err(AlbError::validation_field(
                    format!("load balancer `{}' is already defined in {}", lb.name, network),
                    "load_balancers",
                ));
            }
            target.load_balancers.push(lb);
        }
    }
    Ok(())
}

/// Target groups without a network id take the enclosing network's
pub fn apply_network_defaults(state: &mut DesiredState) {
    for (network, declared) in state.networks.iter_mut() {
        for tg in declared.load_balancers.iter_mut().flat_map(|lb| lb.target_groups.iter_mut()) {
            if tg.vpc_id.is_empty() {
                tg.vpc_id = network.clone();
            }
        }
    }
}
