//! # Observability
//!
//! Structured logging for albsync. The library only emits `tracing` events
//! and spans; the subscriber is installed by the CLI from [`LoggingSettings`],
//! so verbosity and destination are configuration.

pub mod logging;

pub use logging::log_settings_info;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;
use crate::errors::{AlbError, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set. A subscriber that is
/// already installed (integration tests) is left in place.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter: std::result::Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> =
        match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::try_from_default_env().map_err(|e| e.into()),
            Err(_) => EnvFilter::try_new(&settings.level).map_err(|e| e.into()),
        };
    let filter = filter.map_err(|e| {
        AlbError::config_with_source(format!("Invalid log filter '{}'", settings.level), e)
    })?;

    let result = if settings.json {
        tracing::subscriber::set_global_default(
            fmt().json().with_env_filter(filter).with_writer(std::io::stderr).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            fmt().with_env_filter(filter).with_writer(std::io::stderr).finish(),
        )
    };
    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let settings = LoggingSettings { level: "albsync=loud".to_string(), json: false };
        assert!(matches!(init_logging(&settings), Err(AlbError::Config { .. })));
    }
}
