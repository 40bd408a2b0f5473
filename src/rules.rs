//! Firewall rule model.
//!
//! Inbound rules read from the remote firewall are split into two kinds:
//! [`InboundRule::Managed`] entries the reconciler may rewrite, and
//! [`InboundRule::Opaque`] entries it never looks inside and hands back
//! exactly as they were read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AllowlistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = AllowlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(AllowlistError::InvalidProtocol(other.to_string())),
        }
    }
}

/// A rule this tool owns: one port, one protocol, an ordered set of sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRule {
    pub port: u16,
    pub protocol: Protocol,
    pub sources: Vec<String>,
}

impl ManagedRule {
    pub fn new<S: Into<String>>(protocol: Protocol, port: u16, sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            port,
            protocol,
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }
}

/// A rule the reconciler does not understand.
///
/// `protocol` and `ports` are extracted for matching only; `raw` is the
/// rule exactly as the firewall returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueRule {
    pub protocol: String,
    pub ports: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRule {
    Managed(ManagedRule),
    Opaque(OpaqueRule),
}

impl InboundRule {
    /// The single port this rule applies to, if it is a single port.
    pub fn port(&self) -> Option<u16> {
        match self {
            InboundRule::Managed(rule) => Some(rule.port),
            InboundRule::Opaque(rule) => rule.ports.parse().ok(),
        }
    }

    pub fn protocol(&self) -> &str {
        match self {
            InboundRule::Managed(rule) => rule.protocol.as_str(),
            InboundRule::Opaque(rule) => &rule.protocol,
        }
    }

    pub fn as_managed(&self) -> Option<&ManagedRule> {
        match self {
            InboundRule::Managed(rule) => Some(rule),
            InboundRule::Opaque(_) => None,
        }
    }

    /// The address sources of this rule. For an unmanaged rule these are
    /// the string entries of `sources.addresses` as the firewall sent them.
    pub fn addresses(&self) -> Vec<String> {
        match self {
            InboundRule::Managed(rule) => rule.sources.clone(),
            InboundRule::Opaque(rule) => rule
                .raw
                .pointer("/sources/addresses")
                .and_then(serde_json::Value::as_array)
                .map(|list| list.iter().filter_map(|a| a.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        }
    }
}

impl From<ManagedRule> for InboundRule {
    fn from(rule: ManagedRule) -> Self {
        InboundRule::Managed(rule)
    }
}

impl fmt::Display for InboundRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundRule::Managed(rule) => write!(
                f,
                "{}/{} <- [{}]",
                rule.protocol,
                rule.port,
                rule.sources.join(", ")
            ),
            InboundRule::Opaque(rule) => write!(f, "{}/{} (unmanaged)", rule.protocol, rule.ports),
        }
    }
}

/// Firewall state this tool must hand back untouched on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Passthrough {
    pub outbound_rules: Vec<serde_json::Value>,
    pub tags: Vec<String>,
    pub droplet_ids: Vec<u64>,
}

/// The firewall as read at the start of one reconciliation cycle.
///
/// Always fetched fresh; never kept between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallSnapshot {
    pub id: String,
    pub name: String,
    pub inbound_rules: Vec<InboundRule>,
    pub passthrough: Passthrough,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("icmp".parse::<Protocol>().unwrap(), Protocol::Icmp);
        assert!(matches!(
            "TCP".parse::<Protocol>(),
            Err(AllowlistError::InvalidProtocol(ref p)) if p == "TCP"
        ));
    }

    #[test]
    fn test_opaque_port_parsing() {
        let single = InboundRule::Opaque(OpaqueRule {
            protocol: "tcp".into(),
            ports: "443".into(),
            raw: json!({}),
        });
        let range = InboundRule::Opaque(OpaqueRule {
            protocol: "tcp".into(),
            ports: "8000-9000".into(),
            raw: json!({}),
        });
        assert_eq!(single.port(), Some(443));
        assert_eq!(range.port(), None);
        assert!(range.addresses().is_empty());
    }

    #[test]
    fn test_opaque_addresses() {
        let rule = InboundRule::Opaque(OpaqueRule {
            protocol: "tcp".into(),
            ports: "22".into(),
            raw: json!({
                "protocol": "tcp",
                "ports": "22",
                "sources": { "addresses": ["5.5.5.5/32", "::/0"], "tags": ["bastion"] }
            }),
        });
        assert_eq!(rule.addresses(), vec!["5.5.5.5/32", "::/0"]);

        let managed: InboundRule = ManagedRule::new(Protocol::Udp, 53, ["9.9.9.9/32"]).into();
        assert_eq!(managed.addresses(), vec!["9.9.9.9/32"]);
    }

    #[test]
    fn test_display() {
        let rule: InboundRule = ManagedRule::new(Protocol::Tcp, 22, ["1.2.3.4/32", "5.6.7.8/32"]).into();
        assert_eq!(rule.to_string(), "tcp/22 <- [1.2.3.4/32, 5.6.7.8/32]");
    }
}
