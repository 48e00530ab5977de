//! Remote resource fetching with bounded retries and cache fallback.
//!
//! Fetch failure is reported, never raised: a source that cannot be
//! reached after all attempts yields `None` so the caller can skip that
//! data source for the current cycle and leave prior store content
//! untouched.

use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::FileCache;
use crate::config::IngestionConfig;

/// Retry policy for remote fetches.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_ingestion_config(config: &IngestionConfig) -> Self {
        Self {
            max_attempts: config.fetch_max_attempts.max(1),
            initial_delay: Duration::from_millis(config.fetch_initial_delay_ms),
            max_delay: Duration::from_millis(config.fetch_max_delay_ms),
            backoff_multiplier: config.fetch_backoff_multiplier,
            jitter: true,
        }
    }

    /// Delay before the given retry (0-based attempt index of the retry).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt as i32);
        let base = self.initial_delay.as_millis() as f64 * exp;
        let mut delay_ms = base.min(self.max_delay.as_millis() as f64);
        if self.jitter {
            // Up to 25% extra, spreads concurrent deployments apart.
            delay_ms += delay_ms * 0.25 * fastrand::f64();
        }
        Duration::from_millis(delay_ms as u64)
    }
}

pub struct Fetcher {
    client: Client,
    cache: FileCache,
    retry: RetryConfig,
}

impl Fetcher {
    pub fn new(cache: FileCache, retry: RetryConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            cache,
            retry,
        }
    }

    /// Fetch a remote resource, preferring the local cache unless forced.
    ///
    /// Returns the raw content, or `None` when the cache misses and every
    /// network attempt failed. The content is not written back to the
    /// cache here; the caller owns that step.
    pub async fn fetch(&self, url: &str, cache_key: &str, force_refresh: bool) -> Option<Vec<u8>> {
        if !force_refresh {
            if let Some(content) = self.cache.cached_file(cache_key).await {
                info!(
                    "Using cached copy of '{}' ({} bytes), skipping remote fetch",
                    cache_key,
                    content.len()
                );
                return Some(content);
            }
        }

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt - 1);
                debug!(
                    "Retrying fetch of {} in {:?} (attempt {}/{})",
                    url,
                    delay,
                    attempt + 1,
                    self.retry.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.try_fetch(url).await {
                Ok(content) => {
                    info!("Downloaded {} ({} bytes)", url, content.len());
                    return Some(content);
                }
                Err(e) => {
                    warn!(
                        "Fetch attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        self.retry.max_attempts,
                        url,
                        e
                    );
                }
            }
        }

        warn!(
            "Giving up on {} after {} attempts; this source is skipped for the current cycle",
            url, self.retry.max_attempts
        );
        None
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let total_size = response.content_length();
        let mut content = match total_size {
            Some(total) => Vec::with_capacity(total as usize),
            None => Vec::new(),
        };

        let mut stream = response.bytes_stream();
        let mut last_logged = 0usize;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| format!("download interrupted: {}", e))?;
            content.extend_from_slice(&chunk);

            // Log progress every ~4 MiB for large documents.
            if content.len() - last_logged >= 4 * 1024 * 1024 {
                debug!("Downloaded {} bytes from {}", content.len(), url);
                last_logged = content.len();
            }
        }

        Ok(content)
    }
}
