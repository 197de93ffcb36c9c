//! Runtime identifier newtypes
//!
//! Provider-assigned identifiers for each entity kind, kept distinct at compile
//! time so a listener identifier can never be passed where a target group one
//! is expected. During a dry run, entities that would be created carry a
//! *planned* identifier which is never sent to the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking an identifier minted locally for a dry-run create.
pub const PLANNED_PREFIX: &str = "planned:";

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a provider identifier
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Identifier standing in for an entity a dry run would create
            pub fn planned(name: impl fmt::Display) -> Self {
                Self(format!("{}{}/{}", PLANNED_PREFIX, $kind, name))
            }

            /// Whether this identifier was minted by a dry run
            pub fn is_planned(&self) -> bool {
                self.0.starts_with(PLANNED_PREFIX)
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert to inner string value
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

resource_id!(
    /// Identifier of a load balancer
    LoadBalancerArn,
    "loadbalancer"
);
resource_id!(
    /// Identifier of a target group
    TargetGroupArn,
    "targetgroup"
);
resource_id!(
    /// Identifier of a listener
    ListenerArn,
    "listener"
);
resource_id!(
    /// Identifier of a listener rule
    RuleArn,
    "listener-rule"
);
