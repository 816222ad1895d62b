//! Host rate limiter: waits for a free window before a scrape starts.

use std::sync::Arc;
use std::time::Duration;

use super::backend::{RateLimitBackend, RateLimitResult};
use super::config::RateLimitConfig;
use crate::models::PUBLISHER_EQUIVALENT_ENDPOINT_ID;
use crate::utils::netloc;

/// Type alias for a shared backend.
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// A claimed window. Hand it back with [`HostRateLimiter::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPermit {
    /// `None` when the request bypassed rate limiting.
    key: Option<String>,
}

impl RateLimitPermit {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Spaces requests per (endpoint, domain) pair across every worker sharing
/// the backend.
#[derive(Clone)]
pub struct HostRateLimiter {
    backend: BoxedRateLimitBackend,
    config: RateLimitConfig,
}

impl HostRateLimiter {
    pub fn new(backend: BoxedRateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Window key for a request; the publisher-equivalent endpoint is never limited.
    pub fn key_for(endpoint_id: Option<&str>, url: &str) -> Option<(String, String)> {
        if endpoint_id == Some(PUBLISHER_EQUIVALENT_ENDPOINT_ID) {
            return None;
        }
        let netloc = netloc(url).unwrap_or_default();
        Some((format!("{}:{}", endpoint_id.unwrap_or(""), netloc), netloc))
    }

    /// One claim attempt.
    pub async fn try_begin(
        &self,
        endpoint_id: Option<&str>,
        url: &str,
    ) -> RateLimitResult<Option<RateLimitPermit>> {
        let Some((key, netloc)) = Self::key_for(endpoint_id, url) else {
            return Ok(Some(RateLimitPermit { key: None }));
        };
        let interval = self.config.interval_for(&netloc);
        let now_ms = chrono::Utc::now().timestamp_millis();
        if self.backend.try_claim(&key, interval, now_ms).await? {
            Ok(Some(RateLimitPermit { key: Some(key) }))
        } else {
            Ok(None)
        }
    }

    /// Keep trying to claim until `max_wait` has been spent sleeping.
    /// `None` means give up on this target for this pass.
    pub async fn acquire(
        &self,
        endpoint_id: Option<&str>,
        url: &str,
    ) -> RateLimitResult<Option<RateLimitPermit>> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(permit) = self.try_begin(endpoint_id, url).await? {
                return Ok(Some(permit));
            }
            if waited >= self.config.max_wait() {
                tracing::info!("Rate limit wait exceeded for {}, giving up this pass", url);
                return Ok(None);
            }
            let sleep = self.config.retry_sleep();
            tracing::debug!("Rate limiting {}: waiting {:?}", url, sleep);
            tokio::time::sleep(sleep).await;
            waited += sleep;
        }
    }

    /// Mark the request finished so the window measures from its start.
    pub async fn finish(&self, permit: RateLimitPermit) -> RateLimitResult<()> {
        if let Some(key) = permit.key {
            let now_ms = chrono::Utc::now().timestamp_millis();
            self.backend.finish(&key, now_ms).await?;
        }
        Ok(())
    }
}
