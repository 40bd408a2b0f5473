//! CLI argument parsing with clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{Overrides, SecureString};

#[derive(Parser, Debug)]
#[command(name = "firewall-allowlister")]
#[command(author, version, about = "Keeps a cloud firewall's allowed sources in sync with published IP ranges")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (default: ./config.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (DEBUG, INFO, WARN, ERROR)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// DigitalOcean API token
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// DigitalOcean firewall ID
    #[arg(long, global = true)]
    pub firewall_id: Option<String>,

    /// Cron expression for the daemon (e.g. "0 0 * * *")
    #[arg(long, global = true)]
    pub cron_schedule: Option<String>,

    /// Timezone the cron expression is evaluated in (e.g. Europe/Paris)
    #[arg(long, global = true)]
    pub cron_timezone: Option<String>,

    /// Fixed reconciliation interval instead of cron (e.g. 30m, 24h)
    #[arg(long, global = true)]
    pub interval: Option<String>,

    /// Cloudflare IP ranges endpoint
    #[arg(long, global = true)]
    pub cloudflare_ips_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run continuously, reconciling on schedule
    Daemon {
        /// Compute and log the rules without updating the firewall
        #[arg(long)]
        dry_run: bool,
    },

    /// Reconcile once and exit
    Oneshot {
        /// Compute and log the rules without updating the firewall
        #[arg(long)]
        dry_run: bool,
    },

    /// Allow this machine's public IP on a TCP port
    AllowCurrentIp {
        /// Compute and log the rules without updating the firewall
        #[arg(long)]
        dry_run: bool,

        /// TCP port to open
        #[arg(long, short, default_value_t = 22)]
        port: i64,

        /// Replace every existing source on the port with the current IP
        #[arg(long)]
        remove: bool,
    },

    /// Validate configuration and check connectivity
    Validate,

    /// Show the state of the firewall and every source provider
    Status {
        #[arg(long, short, value_enum, default_value_t = StatusFormat::Json)]
        format: StatusFormat,
    },

    /// Show version
    Version {
        #[arg(long, short, value_enum, default_value_t = VersionFormat::Text)]
        output: VersionFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFormat {
    Json,
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionFormat {
    Text,
    Json,
}

impl Cli {
    /// Config values given as flags.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            log_level: self.log_level.clone(),
            api_key: self.api_key.clone().map(SecureString::new),
            firewall_id: self.firewall_id.clone(),
            cron_schedule: self.cron_schedule.clone(),
            cron_timezone: self.cron_timezone.clone(),
            interval: self.interval.clone(),
            cloudflare_ips_url: self.cloudflare_ips_url.clone(),
        }
    }
}
