//! Source address providers.
//!
//! Each provider returns a list of raw address or CIDR strings. Lists are
//! not normalized here; the reconciler does that before building rules.

mod cloudflare;
mod domains;
mod public_ip;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

pub use cloudflare::CloudflareProvider;
pub use domains::DomainProvider;
pub use public_ip::PublicIpProvider;

use crate::error::{AllowlistError, Result};
use crate::retry::RetryPolicy;

#[cfg(test)]
use mockall::automock;

/// Something that can produce a list of allowed source addresses.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short name used in logs and status output
    fn name(&self) -> &'static str;

    /// Fetch the provider's current address list
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Result of fetching one provider
#[derive(Debug)]
pub struct ProviderResult {
    pub provider: &'static str,
    pub result: Result<Vec<String>>,
}

/// Fetch every provider concurrently, each under the retry policy.
///
/// Results come back in provider order regardless of completion order.
pub async fn fetch_all(providers: &[Box<dyn SourceProvider>], retry: &RetryPolicy) -> Vec<ProviderResult> {
    let fetches = providers.iter().map(|provider| async move {
        let operation = format!("Fetching {}", provider.name());
        let result = retry.run(&operation, || provider.fetch()).await;
        ProviderResult {
            provider: provider.name(),
            result,
        }
    });
    join_all(fetches).await
}

/// Collect address lists from all providers, in provider order.
///
/// A failing provider is logged and skipped. Fails with
/// [`AllowlistError::AllProvidersFailed`] only when every provider failed.
pub async fn collect(providers: &[Box<dyn SourceProvider>], retry: &RetryPolicy) -> Result<Vec<Vec<String>>> {
    let results = fetch_all(providers, retry).await;
    let total = results.len();

    let mut lists = Vec::with_capacity(total);
    for ProviderResult { provider, result } in results {
        match result {
            Ok(list) => {
                info!(provider, "Fetched {} sources from {}", list.len(), provider);
                lists.push(list);
            }
            Err(e) => warn!(provider, "Skipping {}: {}", provider, e),
        }
    }

    if total > 0 && lists.is_empty() {
        return Err(AllowlistError::AllProvidersFailed(total));
    }

    Ok(lists)
}
