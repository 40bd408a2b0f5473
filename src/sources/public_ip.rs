use async_trait::async_trait;
use reqwest::Client;
use std::net::IpAddr;

use super::SourceProvider;
use crate::error::{AllowlistError, Result};
use crate::fetcher::fetch_text;

const NAME: &str = "public-ip";

/// An IP echo reply is one line; anything bigger is not one.
const MAX_REPLY_SIZE: usize = 256;

/// The caller's own public address, as seen by an IP echo service.
pub struct PublicIpProvider {
    client: Client,
    url: String,
}

impl PublicIpProvider {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Ask the echo service for our address.
    pub async fn detect(&self) -> Result<IpAddr> {
        let body = fetch_text(&self.client, &self.url, MAX_REPLY_SIZE)
            .await
            .map_err(|e| AllowlistError::provider(NAME, e))?;
        let trimmed = body.trim();
        trimmed
            .parse()
            .map_err(|_| AllowlistError::provider(NAME, format!("not an IP address: {:?}", trimmed)))
    }
}

#[async_trait]
impl SourceProvider for PublicIpProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(vec![self.detect().await?.to_string()])
    }
}
