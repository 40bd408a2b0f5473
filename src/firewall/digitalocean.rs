//! DigitalOcean cloud firewall (API v2).

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::FirewallStore;
use crate::config::SecureString;
use crate::error::{AllowlistError, Result};
use crate::rules::{FirewallSnapshot, InboundRule, ManagedRule, OpaqueRule, Passthrough, Protocol};

pub const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";

#[derive(Debug, Deserialize)]
struct FirewallEnvelope {
    firewall: WireFirewall,
}

#[derive(Debug, Deserialize)]
struct WireFirewall {
    id: String,
    name: String,
    inbound_rules: Option<Vec<Value>>,
    outbound_rules: Option<Vec<Value>>,
    droplet_ids: Option<Vec<u64>>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    name: &'a str,
    inbound_rules: Vec<Value>,
    outbound_rules: &'a [Value],
    droplet_ids: &'a [u64],
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct DigitalOceanStore {
    client: Client,
    base_url: String,
    token: SecureString,
}

impl DigitalOceanStore {
    pub fn new(client: Client, base_url: impl Into<String>, token: SecureString) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    fn firewall_url(&self, firewall_id: &str) -> String {
        format!("{}/v2/firewalls/{}", self.base_url.trim_end_matches('/'), firewall_id)
    }
}

/// Turn a non-2xx response into a readable message, preferring the API's own.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => format!("HTTP {}: {}", status, api.message),
        Err(_) => format!("HTTP {}", status),
    }
}

#[async_trait]
impl FirewallStore for DigitalOceanStore {
    async fn get_snapshot(&self, firewall_id: &str) -> Result<FirewallSnapshot> {
        let fetch_failed = |message: String| AllowlistError::StoreFetchFailed {
            firewall_id: firewall_id.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.firewall_url(firewall_id))
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(error_message(response).await));
        }

        let body = response.text().await.map_err(|e| fetch_failed(e.to_string()))?;
        let envelope: FirewallEnvelope =
            serde_json::from_str(&body).map_err(|e| fetch_failed(format!("invalid response: {}", e)))?;

        let snapshot = decode_firewall(envelope.firewall);
        debug!(
            firewall_id,
            "Read firewall '{}' with {} inbound rules",
            snapshot.name,
            snapshot.inbound_rules.len()
        );
        Ok(snapshot)
    }

    async fn submit(
        &self,
        firewall_id: &str,
        name: &str,
        inbound_rules: &[InboundRule],
        passthrough: &Passthrough,
    ) -> Result<()> {
        let request = UpdateRequest {
            name,
            inbound_rules: inbound_rules.iter().map(encode_inbound).collect(),
            outbound_rules: &passthrough.outbound_rules,
            droplet_ids: &passthrough.droplet_ids,
            tags: &passthrough.tags,
        };

        let response = self
            .client
            .put(self.firewall_url(firewall_id))
            .bearer_auth(self.token.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| AllowlistError::StoreSubmitFailed {
                firewall_id: firewall_id.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AllowlistError::StoreSubmitFailed {
                firewall_id: firewall_id.to_string(),
                message: error_message(response).await,
            });
        }

        debug!(firewall_id, "Submitted {} inbound rules", inbound_rules.len());
        Ok(())
    }
}

fn decode_firewall(wire: WireFirewall) -> FirewallSnapshot {
    FirewallSnapshot {
        id: wire.id,
        name: wire.name,
        inbound_rules: wire
            .inbound_rules
            .unwrap_or_default()
            .into_iter()
            .map(decode_inbound)
            .collect(),
        passthrough: Passthrough {
            outbound_rules: wire.outbound_rules.unwrap_or_default(),
            tags: wire.tags.unwrap_or_default(),
            droplet_ids: wire.droplet_ids.unwrap_or_default(),
        },
    }
}

/// Decode one wire rule. Only plain single-port, address-only rules are
/// treated as managed; everything else is carried through as-is.
fn decode_inbound(raw: Value) -> InboundRule {
    if let Some(rule) = decode_managed(&raw) {
        return InboundRule::Managed(rule);
    }

    let field = |key: &str| raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    InboundRule::Opaque(OpaqueRule {
        protocol: field("protocol"),
        ports: field("ports"),
        raw,
    })
}

fn decode_managed(raw: &Value) -> Option<ManagedRule> {
    let obj = raw.as_object()?;
    if obj
        .keys()
        .any(|k| !matches!(k.as_str(), "protocol" | "ports" | "sources"))
    {
        return None;
    }

    let protocol: Protocol = obj.get("protocol")?.as_str()?.parse().ok()?;
    let port = obj
        .get("ports")?
        .as_str()?
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)?;

    let mut addresses = Vec::new();
    for (kind, list) in obj.get("sources")?.as_object()? {
        let list = list.as_array()?;
        if kind == "addresses" {
            for address in list {
                addresses.push(address.as_str()?.to_string());
            }
        } else if !list.is_empty() {
            // droplets, tags, load balancers: not ours to rewrite
            return None;
        }
    }

    Some(ManagedRule::new(protocol, port, addresses))
}

fn encode_inbound(rule: &InboundRule) -> Value {
    match rule {
        InboundRule::Managed(rule) => json!({
            "protocol": rule.protocol.as_str(),
            "ports": rule.port.to_string(),
            "sources": { "addresses": rule.sources },
        }),
        InboundRule::Opaque(rule) => rule.raw.clone(),
    }
}
