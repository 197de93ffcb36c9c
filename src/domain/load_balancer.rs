//! Load balancer domain types
//!
//! [`LoadBalancerSpec`] is the root of one desired topology branch: it owns
//! its target groups and listeners, and listeners own their rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

use super::attributes::LoadBalancerAttributes;
use super::listener::ListenerSpec;
use super::target_group::TargetGroupSpec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    #[default]
    InternetFacing,
    Internal,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::InternetFacing => "internet-facing",
            Scheme::Internal => "internal",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpAddressType {
    #[default]
    Ipv4,
    Dualstack,
}

impl IpAddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpAddressType::Ipv4 => "ipv4",
            IpAddressType::Dualstack => "dualstack",
        }
    }
}

impl fmt::Display for IpAddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LoadBalancerSpec {
    #[serde(default)]
    #[validate(length(min = 1, message = "`name' is required"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "`subnets' is required"))]
    pub subnets: Vec<String>,

    #[serde(default)]
    #[validate(length(min = 1, message = "`security_groups' is required"))]
    pub security_groups: Vec<String>,

    #[serde(default)]
    pub scheme: Scheme,

    #[serde(default)]
    pub ip_address_type: IpAddressType,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub attributes: LoadBalancerAttributes,

    #[serde(default)]
    #[validate(nested)]
    pub target_groups: Vec<TargetGroupSpec>,

    #[serde(default)]
    #[validate(nested)]
    pub listeners: Vec<ListenerSpec>,
}

impl LoadBalancerSpec {
    /// Create a load balancer with default scheme, attributes and no children
    pub fn new(name: impl Into<String>, subnets: &[&str], security_groups: &[&str]) -> Self {
        Self {
            name: name.into(),
            subnets: subnets.iter().map(|s| s.to_string()).collect(),
            security_groups: security_groups.iter().map(|s| s.to_string()).collect(),
            scheme: Scheme::default(),
            ip_address_type: IpAddressType::default(),
            tags: BTreeMap::new(),
            attributes: LoadBalancerAttributes::default(),
            target_groups: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Subnet ids sorted for the set comparison
    pub fn sorted_subnets(&self) -> Vec<String> {
        let mut subnets = self.subnets.clone();
        subnets.sort();
        subnets
    }

    /// Security group ids sorted for the set comparison
    pub fn sorted_security_groups(&self) -> Vec<String> {
        let mut groups = self.security_groups.clone();
        groups.sort();
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let lb: LoadBalancerSpec = serde_yaml::from_str(
            "name: web\nsubnets: [subnet-2, subnet-1]\nsecurity_groups: [sg-1]\n",
        )
        .unwrap();
        assert_eq!(lb.scheme, Scheme::InternetFacing);
        assert_eq!(lb.ip_address_type, IpAddressType::Ipv4);
        assert_eq!(lb.attributes, LoadBalancerAttributes::default());
        assert_eq!(lb.sorted_subnets(), vec!["subnet-1", "subnet-2"]);
        assert!(lb.validate().is_ok());
    }

    #[test]
    fn test_subnets_and_security_groups_required() {
        let lb = LoadBalancerSpec::new("web", &[], &[]);
        let errors = lb.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(
            fields["subnets"][0].message.as_deref(),
            Some("`subnets' is required")
        );
        assert!(fields.contains_key("security_groups"));
    }

    #[test]
    fn test_scheme_wire_names() {
        assert_eq!(serde_json::to_string(&Scheme::InternetFacing).unwrap(), "\"internet-facing\"");
        let parsed: IpAddressType = serde_json::from_str("\"dualstack\"").unwrap();
        assert_eq!(parsed, IpAddressType::Dualstack);
    }
}
