//! CLI command implementations.

pub mod allow_current_ip;
pub mod daemon;
pub mod oneshot;
pub mod status;
pub mod validate;
pub mod version;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::fetcher::{build_http_client, DEFAULT_TIMEOUT};
use crate::firewall::DigitalOceanStore;
use crate::lock::LockGuard;
use crate::retry::RetryPolicy;
use crate::service::Allowlister;
use crate::sources::{CloudflareProvider, DomainProvider, PublicIpProvider, SourceProvider};

/// Wire the driver up from configuration.
///
/// The domain provider only exists when domains are configured, and the
/// public IP only joins the sources when `public-ip.include-in-rules` is set.
pub fn build_allowlister(config: &Config) -> Result<Allowlister> {
    let client = build_http_client(DEFAULT_TIMEOUT)?;
    let do_config = &config.digitalocean;

    let store = DigitalOceanStore::new(client.clone(), &do_config.base_url, do_config.api_key.clone());

    let mut providers: Vec<Box<dyn SourceProvider>> =
        vec![Box::new(CloudflareProvider::new(client.clone(), &config.cloudflare.ips_url))];
    let mut disabled = Vec::new();

    if config.netdata.domains.is_empty() {
        disabled.push("netdata");
    } else {
        providers.push(Box::new(DomainProvider::new(config.netdata.domains.clone())));
    }

    if config.public_ip.include_in_rules {
        providers.push(Box::new(PublicIpProvider::new(client, &config.public_ip.service_url)));
    } else {
        disabled.push("public-ip");
    }

    let managed = config.managed_ports()?;

    Ok(Allowlister::new(
        &do_config.firewall_id,
        Box::new(store),
        providers,
        managed,
        RetryPolicy::from(&config.retry),
    )
    .with_disabled(disabled))
}

/// Take the per-firewall lock for a cycle that will write.
///
/// Dry runs never write and skip the lock.
pub fn lock_for(config: &Config, dry_run: bool) -> Result<Option<LockGuard>> {
    if dry_run {
        return Ok(None);
    }
    LockGuard::acquire(&config.lock_dir(), &config.digitalocean.firewall_id)
        .map(Some)
        .context("Failed to lock firewall")
}
