//! HTTP plumbing shared by the source providers and the firewall client.

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{AllowlistError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum size of a provider response (1 MB)
/// Published CDN range lists are a few KB, so this is generous
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Build the HTTP client used for every outbound request.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("firewall-allowlister/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AllowlistError::Http(format!("Failed to create HTTP client: {}", e)))
}

/// GET `url` and return its body, rejecting non-2xx responses and bodies
/// larger than `max_size`.
pub async fn fetch_text(client: &Client, url: &str, max_size: usize) -> Result<String> {
    debug!("GET {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AllowlistError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AllowlistError::Http(format!("HTTP {} from {}", status, url)));
    }

    // Check Content-Length header if available
    if let Some(content_length) = response.content_length() {
        if content_length as usize > max_size {
            return Err(AllowlistError::Http(format!(
                "Response too large: {} bytes (max: {} bytes)",
                content_length, max_size
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| AllowlistError::Http(format!("Failed to read response body: {}", e)))?;

    // Double-check actual size after download
    if body.len() > max_size {
        return Err(AllowlistError::Http(format!(
            "Downloaded content too large: {} bytes (max: {} bytes)",
            body.len(),
            max_size
        )));
    }

    Ok(body)
}

/// Format a count with K/M suffix
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
