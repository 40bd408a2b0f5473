//! firewall-allowlister - Cloud Firewall Allowlist Reconciler
//!
//! Keeps a DigitalOcean firewall's inbound rules in sync with upstream address sources.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use firewall_allowlister::cli::{Cli, Commands};
use firewall_allowlister::commands;
use firewall_allowlister::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Version needs no configuration
    if let Commands::Version { output } = cli.command {
        return commands::version::run(output);
    }

    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        config.tracing_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Daemon { dry_run } => commands::daemon::run(&config, dry_run).await,
        Commands::Oneshot { dry_run } => commands::oneshot::run(&config, dry_run).await,
        Commands::AllowCurrentIp { dry_run, port, remove } => {
            commands::allow_current_ip::run(&config, port, remove, dry_run).await
        }
        Commands::Validate => commands::validate::run(&config).await,
        Commands::Status { format } => commands::status::run(&config, format).await,
        Commands::Version { output } => commands::version::run(output),
    }
}
