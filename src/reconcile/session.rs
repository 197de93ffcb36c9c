//! Apply options and the per-network session shared by the entity reconcilers.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

use super::canonical::FieldChange;
use super::report::{ApplyReport, Change, ChangeAction};
use super::scope::ScopeFilter;
use crate::config::{Settings, SettleSettings};
use crate::domain::ResourceKind;
use crate::errors::{GatewayContext, GatewayResult, Result};
use crate::gateway::{CloudGateway, Operation};

/// How long to wait for a deleted load balancer to release its target groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl SettlePolicy {
    /// No pause before the first poll; used against in-process gateways
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::from(&SettleSettings::default())
    }
}

impl From<&SettleSettings> for SettlePolicy {
    fn from(settings: &SettleSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay(),
            poll_interval: settings.poll_interval(),
            timeout: settings.timeout(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub scope: ScopeFilter,
    pub settle: SettlePolicy,
    pub isolate_failures: bool,
}

impl ApplyOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            dry_run: settings.dry_run,
            scope: ScopeFilter::from_settings(&settings.scope)?,
            settle: SettlePolicy::from(&settings.settle),
            isolate_failures: settings.isolate_failures,
        })
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn isolate_failures(mut self, isolate: bool) -> Self {
        self.isolate_failures = isolate;
        self
    }
}

/// State threaded through one virtual network's pass.
pub struct ApplySession<'a> {
    pub gateway: &'a dyn CloudGateway,
    pub options: &'a ApplyOptions,
    pub report: &'a mut ApplyReport,
    pub network: String,
}

impl<'a> ApplySession<'a> {
    pub fn new(
        gateway: &'a dyn CloudGateway,
        options: &'a ApplyOptions,
        report: &'a mut ApplyReport,
        network: impl Into<String>,
    ) -> Self {
        Self { gateway, options, report, network: network.into() }
    }

    pub fn dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Record a decision in the report
    pub fn record(
        &mut self,
        action: ChangeAction,
        kind: ResourceKind,
        path: impl Into<String>,
        detail: Option<Value>,
        diff: Vec<FieldChange>,
    ) {
        let change = Change {
            action,
            kind,
            network: self.network.clone(),
            path: path.into(),
            detail,
            diff,
            dry_run: self.options.dry_run,
        };
        self.report.record(change);
    }

    /// Issue one gateway call inside a span, attaching resource context on failure
    pub async fn call<T, Fut>(
        &self,
        kind: ResourceKind,
        resource: &str,
        operation: Operation,
        call: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        call.instrument(crate::gateway_span!(operation, resource = %resource))
            .await
            .context(kind, resource, operation)
    }
}

/// JSON rendering of a request for the report and log lines.
pub fn payload<T: Serialize>(request: &T) -> Result<Value> {
    Ok(serde_json::to_value(request)?)
}
