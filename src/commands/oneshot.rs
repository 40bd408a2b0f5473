//! Oneshot command implementation.

use anyhow::Result;
use tracing::info;

use super::{build_allowlister, lock_for};
use crate::config::Config;
use crate::fetcher::format_count;
use crate::service::{Allowlister, Outcome};

/// Run the oneshot command
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let allowlister = build_allowlister(config)?;
    reconcile_once(&allowlister, config, dry_run).await
}

/// One locked reconciliation cycle; shared with the daemon.
pub(crate) async fn reconcile_once(allowlister: &Allowlister, config: &Config, dry_run: bool) -> Result<()> {
    let _guard = lock_for(config, dry_run)?;

    if dry_run {
        info!("[DRY-RUN] Reconciling firewall {}...", allowlister.firewall_id());
    } else {
        info!("Reconciling firewall {}...", allowlister.firewall_id());
    }

    match allowlister.run(dry_run).await? {
        Outcome::Submitted { inbound_rules, sources } => info!(
            "Firewall updated: {} inbound rules, {} allowed sources",
            inbound_rules.len(),
            format_count(sources)
        ),
        Outcome::DryRun { inbound_rules, sources } => info!(
            "[DRY-RUN] Firewall not modified: {} inbound rules, {} allowed sources",
            inbound_rules.len(),
            format_count(sources)
        ),
    }

    Ok(())
}
