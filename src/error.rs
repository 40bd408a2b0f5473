//! Error types for the allowlister.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllowlistError {
    #[error("Invalid IP address or CIDR block: {0}")]
    InvalidAddress(String),

    #[error("Invalid port {0} (must be 1-65535)")]
    InvalidPort(i64),

    #[error("Invalid protocol '{0}' (must be tcp, udp, or icmp)")]
    InvalidProtocol(String),

    #[error("Failed to fetch from {provider}: {message}")]
    ProviderFetchFailed { provider: String, message: String },

    #[error("All {0} source providers failed")]
    AllProvidersFailed(usize),

    #[error("No source addresses collected, refusing to submit an empty allowlist")]
    NoSources,

    #[error("Failed to get firewall {firewall_id}: {message}")]
    StoreFetchFailed { firewall_id: String, message: String },

    #[error("Failed to update firewall {firewall_id}: {message}")]
    StoreSubmitFailed { firewall_id: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl AllowlistError {
    pub(crate) fn provider(provider: &str, message: impl ToString) -> Self {
        Self::ProviderFetchFailed {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AllowlistError>;
