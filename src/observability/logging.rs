//! # Structured Logging
//!
//! Span macros for gateway calls and reconciliation passes. Every span carries
//! a generated id so the lines of one call can be grouped in JSON output.

/// Create a tracing span around a cloud gateway call.
///
/// ```rust,ignore
/// let span = gateway_span!(Operation::ListRules, resource = %listener_arn);
/// ```
#[macro_export]
macro_rules! gateway_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "gateway_call",
            operation = %$operation,
            call_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "gateway_call",
            operation = %$operation,
            call_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one load balancer's reconciliation
#[macro_export]
macro_rules! reconcile_span {
    ($network:expr, $load_balancer:expr) => {
        tracing::info_span!(
            "reconcile",
            network = %$network,
            load_balancer = %$load_balancer,
            pass_id = %uuid::Uuid::new_v4()
        )
    };
    ($network:expr, $load_balancer:expr, $($field:tt)*) => {
        tracing::info_span!(
            "reconcile",
            network = %$network,
            load_balancer = %$load_balancer,
            pass_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log the effective settings at startup
pub fn log_settings_info(settings: &crate::config::Settings) {
    tracing::info!(
        dry_run = settings.dry_run,
        include = ?settings.scope.include,
        exclude = ?settings.scope.exclude,
        isolate_failures = settings.isolate_failures,
        settle_timeout_ms = settings.settle.timeout_ms,
        "albsync configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = gateway_span!("list_rules");
        let _span = gateway_span!("list_rules", resource = %"arn:listener/1");
        let _span = reconcile_span!("vpc-1", "web");
        let _span = reconcile_span!("vpc-1", "web", dry_run = true);
    }

    #[test]
    fn test_log_settings_info() {
        let settings = crate::config::Settings::default();

        log_settings_info(&settings);
    }
}
