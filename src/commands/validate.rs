//! Validate command implementation.

use anyhow::Result;
use chrono::Utc;

use super::build_allowlister;
use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::service::Health;

/// Run the validate command
///
/// The configuration has already been loaded and validated by the time
/// this runs; what remains is the schedule and connectivity.
pub async fn run(config: &Config) -> Result<()> {
    println!("[OK] Configuration valid");
    println!("     Firewall:      {}", config.digitalocean.firewall_id);

    let ports = config.managed_ports()?;
    let ports: Vec<String> = ports.iter().map(|(p, port)| format!("{}/{}", p, port)).collect();
    println!("     Managed ports: {}", if ports.is_empty() { "(none)".to_string() } else { ports.join(", ") });

    let scheduler = Scheduler::new(config.schedule()?, config.schedule.run_on_start);
    println!("[OK] Schedule: {}", scheduler.schedule());
    if let Some(next) = scheduler.next_run_after(Utc::now()) {
        let first = if config.schedule.run_on_start { "on start, then " } else { "" };
        println!("     Next run:      {}{}", first, next.to_rfc3339());
    }

    let allowlister = build_allowlister(config)?;
    let status = allowlister.status().await;

    match status.firewall.status {
        Health::Ok => println!(
            "[OK] Firewall '{}' reachable ({} inbound rules)",
            status.firewall.name.as_deref().unwrap_or_default(),
            status.firewall.inbound_rules.unwrap_or_default()
        ),
        _ => println!(
            "[FAIL] Firewall: {}",
            status.firewall.error.as_deref().unwrap_or("unknown error")
        ),
    }

    for source in &status.sources {
        match source.status {
            Health::Ok => println!(
                "[OK] {}: {} IPv4, {} IPv6",
                source.name, source.ipv4, source.ipv6
            ),
            Health::Error => println!(
                "[FAIL] {}: {}",
                source.name,
                source.error.as_deref().unwrap_or("unknown error")
            ),
            Health::Disabled => println!("[--] {}: disabled", source.name),
        }
    }

    // Same criteria the daemon applies before starting
    allowlister.check_connectivity().await?;
    println!();
    println!("Ready.");

    Ok(())
}
