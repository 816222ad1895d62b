//! In-memory rate limit backend for single-process operation.
//!
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{RateLimitBackend, RateLimitResult, RateLimitWindow};

/// Lock-based window storage. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    windows: Arc<RwLock<HashMap<String, RateLimitWindow>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn try_claim(
        &self,
        key: &str,
        min_interval: Duration,
        now_ms: i64,
    ) -> RateLimitResult<bool> {
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_default();
        if !window.is_open(min_interval, now_ms) {
            return Ok(false);
        }
        window.started_at = Some(now_ms);
        window.finished_at = None;
        Ok(true)
    }

    async fn finish(&self, key: &str, now_ms: i64) -> RateLimitResult<()> {
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_default();
        window.started_at = None;
        window.finished_at = Some(now_ms);
        Ok(())
    }

    async fn window(&self, key: &str) -> RateLimitResult<Option<RateLimitWindow>> {
        Ok(self.windows.read().await.get(key).copied())
    }
}
