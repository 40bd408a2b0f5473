//! Configuration management.
//!
//! Values are layered, lowest priority first: built-in defaults, the YAML
//! file, `FIREWALL_ALLOWLISTER_*` environment variables, command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::firewall::DEFAULT_BASE_URL;
use crate::rules::Protocol;
use crate::scheduler::Schedule;
use crate::validation::{is_valid_interval, parse_interval, validate_port};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const ENV_PREFIX: &str = "FIREWALL_ALLOWLISTER_";
pub const DEFAULT_CLOUDFLARE_IPS_URL: &str = "https://api.cloudflare.com/client/v4/ips";
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://icanhazip.com/";
pub const DEFAULT_CRON_SCHEDULE: &str = "0 0 * * *";
pub const DEFAULT_CRON_TIMEZONE: &str = "UTC";

/// Valid log level values
const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "ERROR", "FATAL"];

/// Secure string type that zeroizes memory on drop
/// Used for the API token
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// DEBUG, INFO, WARN, ERROR (FATAL is treated as ERROR)
    pub log_level: String,

    /// When the daemon reconciles
    pub cron: CronConfig,

    pub schedule: ScheduleConfig,

    pub digitalocean: DigitalOceanConfig,

    pub cloudflare: CloudflareConfig,

    /// Domains whose addresses are allowed
    pub netdata: NetdataConfig,

    pub public_ip: PublicIpConfig,

    /// Retry policy for every remote call
    pub retry: RetrySettings,

    /// Where per-firewall lock files live (default: system temp dir)
    pub lock_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            cron: CronConfig::default(),
            schedule: ScheduleConfig::default(),
            digitalocean: DigitalOceanConfig::default(),
            cloudflare: CloudflareConfig::default(),
            netdata: NetdataConfig::default(),
            public_ip: PublicIpConfig::default(),
            retry: RetrySettings::default(),
            lock_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CronConfig {
    /// Cron expression, five fields or six with leading seconds
    pub schedule: String,
    /// IANA timezone the expression is evaluated in
    pub timezone: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_CRON_SCHEDULE.to_string(),
            timezone: DEFAULT_CRON_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Fixed interval ("30m", "24h", ...); when set it replaces the cron schedule
    pub interval: Option<String>,
    /// Reconcile immediately when the daemon starts
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: None,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DigitalOceanConfig {
    /// Token can be set directly or via FIREWALL_ALLOWLISTER_DIGITALOCEAN_API_KEY
    /// Memory is securely zeroed when dropped
    pub api_key: SecureString,
    /// Environment variable name to read the token from (optional)
    pub api_key_env: Option<String>,
    pub firewall_id: String,
    pub base_url: String,
    /// Ports whose rules this tool owns
    pub inbound_rules: Vec<InboundRuleConfig>,
}

impl Default for DigitalOceanConfig {
    fn default() -> Self {
        Self {
            api_key: SecureString::default(),
            api_key_env: None,
            firewall_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            inbound_rules: Vec::new(),
        }
    }
}

/// One managed port, as written in the config file.
///
/// Kept loose here so validation can name the offending entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundRuleConfig {
    pub port: i64,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CloudflareConfig {
    pub ips_url: String,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            ips_url: DEFAULT_CLOUDFLARE_IPS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetdataConfig {
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PublicIpConfig {
    /// IP echo service used to detect our own address
    pub service_url: String,
    /// Also allow our own address on every managed port
    pub include_in_rules: bool,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_PUBLIC_IP_URL.to_string(),
            include_in_rules: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub api_key: Option<SecureString>,
    pub firewall_id: Option<String>,
    pub cron_schedule: Option<String>,
    pub cron_timezone: Option<String>,
    pub interval: Option<String>,
    pub cloudflare_ips_url: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file without validating it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Build the effective configuration from every layer, then validate it.
    ///
    /// An explicitly given file must exist. Without one, `config.yaml` in
    /// the working directory is used if present.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Apply `FIREWALL_ALLOWLISTER_*` variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("CRON_SCHEDULE") {
            self.cron.schedule = v;
        }
        if let Some(v) = var("CRON_TIMEZONE") {
            self.cron.timezone = v;
        }
        if let Some(v) = var("SCHEDULE_INTERVAL") {
            self.schedule.interval = Some(v);
        }
        if let Some(v) = var("SCHEDULE_RUN_ON_START") {
            self.schedule.run_on_start = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        // A custom variable name wins over the default one
        let custom_key = self
            .digitalocean
            .api_key_env
            .as_deref()
            .and_then(|name| lookup(name))
            .filter(|v| !v.is_empty());
        if let Some(v) = custom_key.or_else(|| var("DIGITALOCEAN_API_KEY")) {
            self.digitalocean.api_key = SecureString::new(v);
        }
        if let Some(v) = var("DIGITALOCEAN_FIREWALL_ID") {
            self.digitalocean.firewall_id = v;
        }
        if let Some(v) = var("DIGITALOCEAN_BASE_URL") {
            self.digitalocean.base_url = v;
        }
        if let Some(v) = var("CLOUDFLARE_IPS_URL") {
            self.cloudflare.ips_url = v;
        }
        if let Some(v) = var("NETDATA_DOMAINS") {
            self.netdata.domains = v
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("PUBLIC_IP_SERVICE_URL") {
            self.public_ip.service_url = v;
        }
        if let Some(v) = var("LOCK_DIR") {
            self.lock_dir = Some(PathBuf::from(v));
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ref v) = overrides.log_level {
            self.log_level = v.clone();
        }
        if let Some(ref v) = overrides.api_key {
            self.digitalocean.api_key = v.clone();
        }
        if let Some(ref v) = overrides.firewall_id {
            self.digitalocean.firewall_id = v.clone();
        }
        if let Some(ref v) = overrides.cron_schedule {
            self.cron.schedule = v.clone();
        }
        if let Some(ref v) = overrides.cron_timezone {
            self.cron.timezone = v.clone();
        }
        if let Some(ref v) = overrides.interval {
            self.schedule.interval = Some(v.clone());
        }
        if let Some(ref v) = overrides.cloudflare_ips_url {
            self.cloudflare.ips_url = v.clone();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.digitalocean.api_key.is_empty() {
            anyhow::bail!("digitalocean.api-key is required");
        }

        if self.digitalocean.firewall_id.trim().is_empty() {
            anyhow::bail!("digitalocean.firewall-id is required");
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_ascii_uppercase().as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Valid values: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            );
        }

        // Both are checked even when an interval takes precedence
        Schedule::cron(&self.cron.schedule, &self.cron.timezone)?;
        if let Some(ref interval) = self.schedule.interval {
            if !is_valid_interval(interval) {
                anyhow::bail!(
                    "Invalid schedule.interval '{}'. Use format like '4h', '30m', '1d'",
                    interval
                );
            }
        }

        for (key, url) in [
            ("digitalocean.base-url", &self.digitalocean.base_url),
            ("cloudflare.ips-url", &self.cloudflare.ips_url),
            ("public-ip.service-url", &self.public_ip.service_url),
        ] {
            if !url.starts_with("https://") {
                anyhow::bail!("{} must use HTTPS: {}", key, url);
            }
        }

        self.managed_ports()?;

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max-attempts must be at least 1");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!(
                "retry.initial-backoff-ms ({}) exceeds retry.max-backoff-ms ({})",
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms
            );
        }

        Ok(())
    }

    /// The daemon schedule: the fixed interval when one is set, otherwise
    /// the cron expression in its timezone.
    pub fn schedule(&self) -> Result<Schedule> {
        match self.schedule.interval {
            Some(ref interval) => parse_interval(interval)
                .map(Schedule::every)
                .with_context(|| {
                    format!(
                        "Invalid schedule.interval '{}'. Use format like '4h', '30m', '1d'",
                        interval
                    )
                }),
            None => Schedule::cron(&self.cron.schedule, &self.cron.timezone),
        }
    }

    /// The configured managed ports, validated.
    pub fn managed_ports(&self) -> Result<Vec<(Protocol, u16)>> {
        self.digitalocean
            .inbound_rules
            .iter()
            .enumerate()
            .map(|(i, rule)| -> Result<(Protocol, u16)> {
                let port = validate_port(rule.port).with_context(|| format!("inbound rule {}", i))?;
                let protocol: Protocol = rule
                    .protocol
                    .parse()
                    .with_context(|| format!("inbound rule {}", i))?;
                Ok((protocol, port))
            })
            .collect()
    }

    /// Tracing level for the configured log level
    pub fn tracing_level(&self) -> Level {
        level_from_str(&self.log_level).unwrap_or(Level::INFO)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

/// Map a log level name onto a tracing level. FATAL has no tracing
/// equivalent and maps to ERROR.
pub fn level_from_str(level: &str) -> Option<Level> {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" => Some(Level::WARN),
        "ERROR" | "FATAL" => Some(Level::ERROR),
        _ => None,
    }
}
