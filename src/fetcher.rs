//! HTTP fetcher for public cloud IP-range feeds.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// Maximum size of one feed (10 MB).
/// The AWS feed, the largest of the three, is under 2 MB.
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

/// HTTP client for unauthenticated feeds
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a new fetcher with default settings
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("asm-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.fetch_with_retry(url, || self.client.get(url)).await?;
        serde_json::from_str(&body).with_context(|| format!("Malformed JSON from {}", url))
    }

    /// POST a JSON body and parse the JSON response
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, payload: &Value) -> Result<T> {
        let body = self
            .fetch_with_retry(url, || self.client.post(url).json(payload))
            .await?;
        serde_json::from_str(&body).with_context(|| format!("Malformed JSON from {}", url))
    }

    /// Send a request with retry logic and size validation
    async fn fetch_with_retry<F>(&self, url: &str, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match build().send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        if let Some(content_length) = response.content_length() {
                            check_size(content_length as usize)?;
                        }

                        let body = response
                            .text()
                            .await
                            .context("Failed to read response body")?;
                        check_size(body.len())?;
                        return Ok(body);
                    }
                    last_error = Some(anyhow::anyhow!("HTTP {} from {}", response.status(), url));
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error fetching {}", url)))
    }
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_FEED_SIZE {
        anyhow::bail!(
            "Response too large: {} bytes (max: {} bytes)",
            size,
            MAX_FEED_SIZE
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_size() {
        assert!(check_size(0).is_ok());
        assert!(check_size(MAX_FEED_SIZE).is_ok());
        assert!(check_size(MAX_FEED_SIZE + 1).is_err());
    }

    #[test]
    fn test_fetcher_new() {
        assert!(Fetcher::new().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        let fetcher = Fetcher::new().unwrap();
        let result: Result<Value> = fetcher.get_json("not-a-url").await;
        assert!(result.is_err());
    }
}
