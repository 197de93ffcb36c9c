//! # Reconciliation Engine
//!
//! Matches desired entities to live ones across the network, load balancer,
//! target group / listener and rule levels, and issues the calls that
//! converge the live topology.
//!
//! - [`canonical`] turns any entity into an order-independent form; equality
//!   of two forms is the no-op test.
//! - [`scope`] selects the load balancers a run may touch.
//! - [`resolver`] swaps target group names in actions for identifiers.
//! - [`load_balancer`], [`target_group`], [`listener`] and [`rule`] shape
//!   create payloads, decide whether a modify is needed, and issue calls.
//! - [`topology`] orders all of the above and cascades deletes.
//!
//! ```rust,ignore
//! let gateway = MemoryGateway::load(Path::new("state.yaml"))?;
//! let reconciler = TopologyReconciler::new(&gateway, ApplyOptions::default().dry_run(true));
//! let report = reconciler.apply(&desired).await?;
//! ```

pub mod canonical;
pub mod listener;
pub mod load_balancer;
pub mod report;
pub mod resolver;
pub mod rule;
pub mod scope;
pub mod session;
pub mod target_group;
pub mod topology;

pub use canonical::{canonicalize, CanonicalForm, FieldChange};
pub use report::{ApplyReport, Change, ChangeAction, Failure};
pub use resolver::{resolve, resolve_all, TargetGroupIndex};
pub use scope::{ExcludePattern, ScopeFilter, ScopeSettings};
pub use session::{ApplyOptions, ApplySession, SettlePolicy};
pub use topology::TopologyReconciler;
