use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::SourceProvider;
use crate::error::{AllowlistError, Result};
use crate::fetcher::{fetch_text, MAX_RESPONSE_SIZE};

const NAME: &str = "cloudflare";

#[derive(Debug, Deserialize)]
struct IpsResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<IpsResult>,
}

#[derive(Debug, Deserialize)]
struct IpsResult {
    #[serde(default)]
    ipv4_cidrs: Vec<String>,
    #[serde(default)]
    ipv6_cidrs: Vec<String>,
}

/// Cloudflare's published edge ranges, IPv4 first then IPv6.
pub struct CloudflareProvider {
    client: Client,
    url: String,
}

impl CloudflareProvider {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let body = fetch_text(&self.client, &self.url, MAX_RESPONSE_SIZE)
            .await
            .map_err(|e| AllowlistError::provider(NAME, e))?;
        parse_ips_response(&body)
    }
}

fn parse_ips_response(body: &str) -> Result<Vec<String>> {
    let response: IpsResponse =
        serde_json::from_str(body).map_err(|e| AllowlistError::provider(NAME, format!("invalid JSON: {}", e)))?;

    if !response.success {
        let errors: Vec<String> = response.errors.iter().map(|e| e.to_string()).collect();
        return Err(AllowlistError::provider(
            NAME,
            format!("API reported failure: [{}]", errors.join(", ")),
        ));
    }

    let result = response
        .result
        .ok_or_else(|| AllowlistError::provider(NAME, "response has no result"))?;

    debug!(
        "Cloudflare returned {} IPv4 and {} IPv6 ranges",
        result.ipv4_cidrs.len(),
        result.ipv6_cidrs.len()
    );

    let mut cidrs = result.ipv4_cidrs;
    cidrs.extend(result.ipv6_cidrs);
    Ok(cidrs)
}
