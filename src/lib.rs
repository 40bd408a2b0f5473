//! # firewall-allowlister - Cloud Firewall Allowlist Reconciler
//!
//! Keeps the inbound rules of a DigitalOcean cloud firewall in sync with a
//! set of upstream address providers (Cloudflare edge ranges, the resolved
//! addresses of monitoring domains, this machine's public IP).
//!
//! ## Features
//!
//! - **Declarative** - Managed ports always hold exactly the aggregated sources
//! - **Non-Intrusive** - Rules on unmanaged ports are submitted back byte-for-byte
//! - **Single-IP Upsert** - Open a TCP port for the current public IP
//! - **Resilient** - Bounded exponential backoff around every remote call
//! - **Safe Scheduling** - Cycles never overlap, one writer per firewall
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   firewall-allowlister                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: daemon, oneshot, allow-current-ip, ...     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml + env + flags)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sources (SourceProvider trait)                             │
//! │    ├── CloudflareProvider (reqwest + rustls)                │
//! │    ├── DomainProvider (dns-lookup)                          │
//! │    └── PublicIpProvider                                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (ipnet)                                         │
//! │    └── Normalization, dedup, deterministic ordering         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler (pure)                                          │
//! │    └── Bulk replacement and single-IP upsert                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Firewall (FirewallStore trait)                             │
//! │    └── DigitalOceanStore (GET / PUT /v2/firewalls/{id})     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scheduler + Signal + Lock                                  │
//! │    └── Cron cycles, graceful shutdown, single writer        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use firewall_allowlister::config::{Config, Overrides};
//! use firewall_allowlister::commands::build_allowlister;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None, &Overrides::default())?;
//!     let allowlister = build_allowlister(&config)?;
//!
//!     // Compute the rules without touching the firewall
//!     let outcome = allowlister.run(true).await?;
//!     println!("{} inbound rules", outcome.inbound_rules().len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Merge provider lists into one ordered source list
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration loading, precedence and validation
//! - [`error`] - Typed errors for the core
//! - [`fetcher`] - Shared HTTP client and bounded body reads
//! - [`firewall`] - Firewall store abstraction and DigitalOcean client
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`reconciler`] - Pure rule computation
//! - [`retry`] - Exponential backoff for remote calls
//! - [`rules`] - Firewall rule model
//! - [`scheduler`] - Cron and interval scheduling of reconciliation cycles
//! - [`service`] - The reconciliation driver
//! - [`signal`] - Graceful shutdown signal handling
//! - [`sources`] - Address source providers
//! - [`validation`] - Address and port validation

pub mod aggregator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod firewall;
pub mod lock;
pub mod reconciler;
pub mod retry;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod signal;
pub mod sources;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{AllowlistError, Result};
pub use reconciler::{reconcile_bulk, reconcile_single_ip, UpsertAction, UpsertMode};
pub use rules::{FirewallSnapshot, InboundRule, ManagedRule, Protocol};
pub use service::Allowlister;
