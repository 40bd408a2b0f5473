use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use super::SourceProvider;
use crate::aggregator::{aggregate, partition_by_family};
use crate::error::{AllowlistError, Result};

const NAME: &str = "netdata";

/// Default DNS resolution timeout per domain
pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Addresses of a fixed set of domain names.
///
/// Each domain is resolved once and its answer ordered IPv4 first, then
/// IPv6. A domain that fails to resolve is skipped; the provider only
/// fails when none of them resolve.
pub struct DomainProvider {
    domains: Vec<String>,
    timeout: Duration,
}

impl DomainProvider {
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            timeout: DNS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resolve a host name with a timeout.
async fn resolve(domain: &str, timeout: Duration) -> std::result::Result<Vec<IpAddr>, String> {
    let host = domain.to_string();
    let lookup = tokio::task::spawn_blocking(move || {
        dns_lookup::lookup_host(&host).map(|addrs| addrs.into_iter().collect::<Vec<IpAddr>>())
    });

    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Ok(addrs))) if addrs.is_empty() => Err("no addresses".to_string()),
        Ok(Ok(Ok(addrs))) => Ok(addrs),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(_)) => Err("DNS task failed".to_string()),
        Err(_) => Err(format!("DNS timeout after {}s", timeout.as_secs())),
    }
}

#[async_trait]
impl SourceProvider for DomainProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let mut per_domain = Vec::with_capacity(self.domains.len());
        let mut failures = Vec::new();

        for domain in &self.domains {
            match resolve(domain, self.timeout).await {
                Ok(addrs) => {
                    debug!("Resolved {} to {} addresses", domain, addrs.len());
                    per_domain.push(partition_by_family(&addrs));
                }
                Err(e) => {
                    warn!("Failed to resolve {}: {}", domain, e);
                    failures.push(format!("{}: {}", domain, e));
                }
            }
        }

        if per_domain.is_empty() && !failures.is_empty() {
            return Err(AllowlistError::provider(NAME, failures.join("; ")));
        }

        Ok(aggregate(&per_domain))
    }
}
