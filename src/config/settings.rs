//! # Configuration Settings
//!
//! Defines the configuration structure for albsync. Values come from an
//! optional `albsync.toml`, then `ALBSYNC_*` environment variables, then
//! command line flags (applied by the CLI).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::errors::{AlbError, Result};
use crate::reconcile::{ScopeFilter, ScopeSettings};
use crate::utils::read_document;

/// File picked up from the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "albsync.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    /// Load balancers the run may touch
    pub scope: ScopeSettings,

    /// Compute and log the change set without issuing mutating calls
    pub dry_run: bool,

    /// Wait policy after a load balancer delete
    #[validate(nested)]
    pub settle: SettleSettings,

    /// Reconcile each load balancer inside its own failure boundary
    pub isolate_failures: bool,

    #[validate(nested)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from `path`, or from `albsync.toml` when present.
    ///
    /// An explicitly named file must exist; the implicit one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        Ok(settings.with_env())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AlbError::config(format!(
                "Configuration file {} does not exist",
                path.display()
            )));
        }
        read_document(path).map_err(|e| {
            AlbError::config_with_source(
                format!("Failed to load configuration from {}", path.display()),
                Box::new(e),
            )
        })
    }

    /// Apply `ALBSYNC_*` overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v.eq_ignore_ascii_case("true") || v == "1");
        let number = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        let list = |key: &str| {
            lookup(key).map(|v| {
                v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            })
        };

        if let Some(include) = list("ALBSYNC_INCLUDE") {
            self.scope.include = include;
        }
        if let Some(exclude) = list("ALBSYNC_EXCLUDE") {
            self.scope.exclude = exclude;
        }
        if let Some(dry_run) = flag("ALBSYNC_DRY_RUN") {
            self.dry_run = dry_run;
        }
        if let Some(isolate) = flag("ALBSYNC_ISOLATE_FAILURES") {
            self.isolate_failures = isolate;
        }
        if let Some(ms) = number("ALBSYNC_SETTLE_INITIAL_DELAY_MS") {
            self.settle.initial_delay_ms = ms;
        }
        if let Some(ms) = number("ALBSYNC_SETTLE_POLL_INTERVAL_MS") {
            self.settle.poll_interval_ms = ms;
        }
        if let Some(ms) = number("ALBSYNC_SETTLE_TIMEOUT_MS") {
            self.settle.timeout_ms = ms;
        }
        if let Some(level) = lookup("ALBSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = flag("ALBSYNC_LOG_JSON") {
            self.logging.json = json;
        }
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(AlbError::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        ScopeFilter::from_settings(&self.scope)?;

        if self.settle.poll_interval_ms > self.settle.timeout_ms {
            return Err(AlbError::config(
                "settle.poll_interval_ms must not exceed settle.timeout_ms",
            ));
        }

        Ok(())
    }
}

/// Poll-until-released policy applied after deleting a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SettleSettings {
    /// Fixed pause before the first poll
    #[validate(range(max = 600000, message = "Initial delay must be at most 10 minutes"))]
    pub initial_delay_ms: u64,

    #[validate(range(
        min = 100,
        max = 60000,
        message = "Poll interval must be between 100ms and 60 seconds"
    ))]
    pub poll_interval_ms: u64,

    /// Give up after this long, counted from the delete call
    #[validate(range(
        min = 1000,
        max = 3600000,
        message = "Settle timeout must be between 1 second and 1 hour"
    ))]
    pub timeout_ms: u64,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self { initial_delay_ms: 3000, poll_interval_ms: 1000, timeout_ms: 60000 }
    }
}

impl SettleSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level or `EnvFilter` directive list
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
