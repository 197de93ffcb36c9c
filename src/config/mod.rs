//! # Configuration Management
//!
//! Settings for a reconciliation run: scope, dry-run, the settle policy
//! after load balancer deletion, failure isolation and logging.

pub mod settings;

pub use settings::{LoggingSettings, Settings, SettleSettings, DEFAULT_CONFIG_FILE};
