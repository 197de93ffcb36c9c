//! Load balancer attribute map
//!
//! The provider exposes attributes as flat key/value string pairs. Desired
//! state and captured state use the nested [`LoadBalancerAttributes`] form;
//! the five fixed keys are always present, defaults applied when unset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const ACCESS_LOGS_ENABLED: &str = "access_logs.s3.enabled";
pub const ACCESS_LOGS_BUCKET: &str = "access_logs.s3.bucket";
pub const ACCESS_LOGS_PREFIX: &str = "access_logs.s3.prefix";
pub const IDLE_TIMEOUT: &str = "idle_timeout.timeout_seconds";
pub const DELETION_PROTECTION: &str = "deletion_protection.enabled";

/// Keys managed by albsync, in provider order.
pub const FIXED_KEYS: [&str; 5] = [
    ACCESS_LOGS_ENABLED,
    ACCESS_LOGS_BUCKET,
    ACCESS_LOGS_PREFIX,
    IDLE_TIMEOUT,
    DELETION_PROTECTION,
];

const DEFAULT_IDLE_TIMEOUT_SECONDS: u32 = 60;

/// A single provider attribute pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Access log delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogs {
    pub enabled: bool,
    pub bucket: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerAttributes {
    pub access_logs: AccessLogs,
    pub idle_timeout_seconds: u32,
    pub deletion_protection: bool,
}

impl Default for LoadBalancerAttributes {
    fn default() -> Self {
        Self {
            access_logs: AccessLogs::default(),
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECONDS,
            deletion_protection: false,
        }
    }
}

impl LoadBalancerAttributes {
    /// Encode as the provider's flat pair list, all five keys present.
    pub fn to_pairs(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(ACCESS_LOGS_ENABLED, self.access_logs.enabled.to_string()),
            Attribute::new(ACCESS_LOGS_BUCKET, self.access_logs.bucket.clone()),
            Attribute::new(ACCESS_LOGS_PREFIX, self.access_logs.prefix.clone()),
            Attribute::new(IDLE_TIMEOUT, self.idle_timeout_seconds.to_string()),
            Attribute::new(DELETION_PROTECTION, self.deletion_protection.to_string()),
        ]
    }

    /// Decode from provider pairs. Missing keys keep their defaults; keys
    /// outside the fixed set are returned separately.
    pub fn from_pairs(pairs: &[Attribute]) -> (Self, BTreeMap<String, String>) {
        let mut attributes = Self::default();
        let mut extra = BTreeMap::new();

        for pair in pairs {
            match pair.key.as_str() {
                ACCESS_LOGS_ENABLED => {
                    attributes.access_logs.enabled = parse_or_default(pair, false);
                }
                ACCESS_LOGS_BUCKET => attributes.access_logs.bucket = pair.value.clone(),
                ACCESS_LOGS_PREFIX => attributes.access_logs.prefix = pair.value.clone(),
                IDLE_TIMEOUT => {
                    attributes.idle_timeout_seconds =
                        parse_or_default(pair, DEFAULT_IDLE_TIMEOUT_SECONDS);
                }
                DELETION_PROTECTION => {
                    attributes.deletion_protection = parse_or_default(pair, false);
                }
                _ => {
                    extra.insert(pair.key.clone(), pair.value.clone());
                }
            }
        }

        (attributes, extra)
    }
}

fn parse_or_default<T: std::str::FromStr>(pair: &Attribute, default: T) -> T {
    pair.value.parse().unwrap_or_else(|_| {
        warn!(key = %pair.key, value = %pair.value, "Unparseable attribute value, using default");
        default
    })
}

/// Pairs in the form used for the attribute equality check: restricted to the
/// fixed keys, sorted by key, and without bucket/prefix while access logging
/// is disabled.
pub fn comparable_pairs(pairs: &[Attribute]) -> Vec<Attribute> {
    let logs_disabled = pairs
        .iter()
        .find(|p| p.key == ACCESS_LOGS_ENABLED)
        .is_some_and(|p| p.value.eq_ignore_ascii_case("false"));

    let mut comparable: Vec<Attribute> = pairs
        .iter()
        .filter(|p| FIXED_KEYS.contains(&p.key.as_str()))
        .filter(|p| {
            !(logs_disabled && (p.key == ACCESS_LOGS_BUCKET || p.key == ACCESS_LOGS_PREFIX))
        })
        .cloned()
        .collect();
    comparable.sort();
    comparable
}
