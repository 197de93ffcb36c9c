//! # albsync
//!
//! Declarative reconciliation of Layer-7 load balancers. A desired topology
//! of load balancers, target groups, listeners and rules, grouped by virtual
//! network, is compared with what a cloud gateway reports, and the gateway is
//! driven with the minimal set of calls that makes the two match.
//!
//! ## Architecture
//!
//! ```text
//! desired documents → loader/validation → TopologyReconciler → CloudGateway
//!                                               ↓
//!                                          ApplyReport
//! live topology → capture → exported documents
//! ```
//!
//! ## Core Components
//!
//! - **Desired state** ([`desired`]): loads and validates YAML/JSON/TOML documents
//! - **Reconciler** ([`reconcile`]): canonical comparison, scope filtering,
//!   reference resolution, per-entity reconcilers and the ordering across them
//! - **Gateway** ([`gateway`]): the provider seam and an in-memory implementation
//! - **Capture** ([`capture`]): live topology back into loadable documents
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use albsync::{load_desired_state, ApplyOptions, MemoryGateway, TopologyReconciler};
//! use std::path::PathBuf;
//!
//! # async fn run() -> albsync::Result<()> {
//! let desired = load_desired_state(&[PathBuf::from("topology.yaml")])?;
//! let gateway = MemoryGateway::new();
//! let report = TopologyReconciler::new(&gateway, ApplyOptions::default().dry_run(true))
//!     .apply(&desired)
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod cli;
pub mod config;
pub mod desired;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod reconcile;
pub mod utils;

// Re-export commonly used types and traits
pub use capture::{capture, CapturedState};
pub use config::Settings;
pub use desired::load_desired_state;
pub use domain::DesiredState;
pub use errors::{AlbError, Result};
pub use gateway::{CloudGateway, MemoryGateway};
pub use reconcile::{ApplyOptions, ApplyReport, TopologyReconciler};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "albsync");
    }
}
