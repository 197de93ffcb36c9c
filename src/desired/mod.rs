//! # Desired State
//!
//! Loading and validation of the user-authored topology. Everything here runs
//! before the first gateway call.

pub mod loader;
pub mod validation;

pub use loader::{apply_network_defaults, load_desired_state, merge, parse_desired_state};
pub use validation::{validate_desired_state, validate_load_balancer, validate_network};
