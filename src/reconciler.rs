//! Inbound rule reconciliation.
//!
//! Both operations are pure: they take the snapshot by reference and
//! return the complete inbound rule list to submit. The remote API only
//! accepts whole rule sets, so the output is never a diff.

use std::collections::HashSet;

use crate::error::Result;
use crate::rules::{FirewallSnapshot, InboundRule, ManagedRule, Protocol};
use crate::validation::{normalize, normalize_all, validate_port};

/// The "allow my IP" path always targets TCP.
pub const SINGLE_IP_PROTOCOL: Protocol = Protocol::Tcp;

/// How a single address is merged into an existing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Keep existing sources and add the address if missing.
    Append,
    /// Drop every existing source for the port and keep only the address.
    ///
    /// Locks the port down to one address: anyone else currently relying
    /// on that rule loses access.
    Replace,
}

/// What a single-address upsert did to the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    CreateNew,
    Append,
    ReplaceSources,
    NoOp,
}

impl UpsertAction {
    /// Whether the rule set needs to be submitted.
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertAction::NoOp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    pub action: UpsertAction,
    /// The normalized address that was upserted.
    pub source: String,
    /// An unmanaged rule was rewritten as a plain address rule.
    pub rebuilt: bool,
    pub inbound_rules: Vec<InboundRule>,
}

/// Replace every rule on a managed port with the desired rules.
///
/// Rules on ports not named in `desired` are kept in their original
/// order, followed by one rule per desired entry with normalized,
/// deduplicated sources. Fails without producing anything if any
/// desired source is malformed.
pub fn reconcile_bulk(current: &FirewallSnapshot, desired: &[ManagedRule]) -> Result<Vec<InboundRule>> {
    // Normalize everything up front so a bad source aborts before any output exists
    let mut replacements = Vec::with_capacity(desired.len());
    for rule in desired {
        let mut seen = HashSet::new();
        let sources: Vec<String> = normalize_all(&rule.sources)?
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();
        replacements.push(InboundRule::Managed(ManagedRule {
            port: rule.port,
            protocol: rule.protocol,
            sources,
        }));
    }

    let managed_ports: HashSet<u16> = desired.iter().map(|r| r.port).collect();

    let mut out: Vec<InboundRule> = current
        .inbound_rules
        .iter()
        .filter(|rule| !rule.port().is_some_and(|p| managed_ports.contains(&p)))
        .cloned()
        .collect();
    out.extend(replacements);

    Ok(out)
}

/// Add one address to the TCP rule for `port`, creating the rule if needed.
///
/// The first TCP rule on the port is the target, whatever its source
/// kinds. An unmanaged target is rebuilt as a plain address rule seeded
/// from its `sources.addresses`; its tag, droplet and load balancer
/// sources are not carried over. The matched rule keeps its position.
///
/// | existing rule        | Append      | Replace        |
/// |----------------------|-------------|----------------|
/// | none                 | CreateNew   | CreateNew      |
/// | without the address  | Append      | ReplaceSources |
/// | with the address     | NoOp        | ReplaceSources |
pub fn reconcile_single_ip(
    current: &FirewallSnapshot,
    port: i64,
    source_ip: &str,
    mode: UpsertMode,
) -> Result<Upsert> {
    let port = validate_port(port)?;
    let source = normalize(source_ip)?;

    let mut inbound_rules = current.inbound_rules.clone();
    let target = inbound_rules
        .iter()
        .position(|rule| rule.protocol() == SINGLE_IP_PROTOCOL.as_str() && rule.port() == Some(port));

    let Some(index) = target else {
        inbound_rules.push(ManagedRule::new(SINGLE_IP_PROTOCOL, port, [source.clone()]).into());
        return Ok(Upsert {
            action: UpsertAction::CreateNew,
            source,
            rebuilt: false,
            inbound_rules,
        });
    };

    let existing = &inbound_rules[index];
    let rebuilt = existing.as_managed().is_none();
    let mut sources = existing.addresses();

    let action = match mode {
        UpsertMode::Replace => {
            sources = vec![source.clone()];
            UpsertAction::ReplaceSources
        }
        UpsertMode::Append if sources.contains(&source) => UpsertAction::NoOp,
        UpsertMode::Append => {
            sources.push(source.clone());
            UpsertAction::Append
        }
    };

    if action.is_change() {
        inbound_rules[index] = ManagedRule::new(SINGLE_IP_PROTOCOL, port, sources).into();
    }

    Ok(Upsert {
        action,
        source,
        rebuilt: rebuilt && action.is_change(),
        inbound_rules,
    })
}
