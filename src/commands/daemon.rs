//! Daemon command implementation.

use anyhow::{Context, Result};
use tracing::info;

use super::build_allowlister;
use super::oneshot::reconcile_once;
use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::signal::{listen_for_signals, ShutdownToken};

/// Run the daemon command until SIGINT/SIGTERM
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let allowlister = build_allowlister(config)?;
    let schedule = config.schedule()?;

    info!("Checking connectivity...");
    allowlister
        .check_connectivity()
        .await
        .context("Connectivity check failed, not starting")?;

    let shutdown = ShutdownToken::new();
    listen_for_signals(shutdown.clone());

    let scheduler = Scheduler::new(schedule, config.schedule.run_on_start);
    info!(
        "Daemon started for firewall {} ({}{})",
        allowlister.firewall_id(),
        scheduler.schedule(),
        if dry_run { ", dry-run" } else { "" }
    );

    scheduler
        .run(
            "reconciliation",
            || reconcile_once(&allowlister, config, dry_run),
            &shutdown,
        )
        .await;

    info!("Daemon stopped");
    Ok(())
}
