//! Allow-current-ip command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{build_allowlister, lock_for};
use crate::config::Config;
use crate::fetcher::{build_http_client, DEFAULT_TIMEOUT};
use crate::reconciler::{UpsertAction, UpsertMode};
use crate::retry::RetryPolicy;
use crate::sources::PublicIpProvider;
use crate::validation::validate_port;

/// Run the allow-current-ip command
pub async fn run(config: &Config, port: i64, remove: bool, dry_run: bool) -> Result<()> {
    // Fail on a bad port before touching the network
    validate_port(port)?;

    let client = build_http_client(DEFAULT_TIMEOUT)?;
    let detector = PublicIpProvider::new(client, &config.public_ip.service_url);
    let retry = RetryPolicy::from(&config.retry);
    let ip = retry
        .run("Detecting public IP", || detector.detect())
        .await
        .context("Failed to detect current public IP")?;
    info!("Current public IP: {}", ip);

    let mode = if remove {
        warn!("--remove: every other source allowed on tcp/{} will lose access", port);
        UpsertMode::Replace
    } else {
        UpsertMode::Append
    };

    let allowlister = build_allowlister(config)?;
    let _guard = lock_for(config, dry_run)?;
    let outcome = allowlister
        .allow_address(&ip.to_string(), port, mode, dry_run)
        .await?;

    let summary = match outcome.action {
        UpsertAction::NoOp => format!("{} is already allowed on tcp/{}, nothing to do", outcome.source, outcome.port),
        UpsertAction::CreateNew => format!("Created tcp/{} rule allowing {}", outcome.port, outcome.source),
        UpsertAction::Append => format!("Added {} to tcp/{}", outcome.source, outcome.port),
        UpsertAction::ReplaceSources => format!("tcp/{} now allows only {}", outcome.port, outcome.source),
    };

    if dry_run && outcome.action.is_change() {
        println!("[DRY-RUN] {}", summary);
    } else {
        println!("{}", summary);
    }

    Ok(())
}
