//! Pluggable backend trait for rate limit windows.
//!
//! A window records when the last request to an (endpoint, domain) pair
//! started and finished. Backends must make `try_claim` atomic: two callers
//! racing on the same key never both see `true`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RateLimitError {
    fn from(e: serde_json::Error) -> Self {
        RateLimitError::Serialization(e.to_string())
    }
}

/// Timestamps (Unix ms) of the last request through one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl RateLimitWindow {
    /// Whether a request may start at `now_ms` given the minimum interval.
    pub fn is_open(&self, min_interval: Duration, now_ms: i64) -> bool {
        match self.started_at {
            Some(started) => started < now_ms - min_interval.as_millis() as i64,
            None => true,
        }
    }
}

/// Storage for rate limit windows.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Atomically mark the window started at `now_ms` if it is open.
    ///
    /// Returns `false` without touching the window when another request
    /// started less than `min_interval` ago.
    async fn try_claim(&self, key: &str, min_interval: Duration, now_ms: i64)
        -> RateLimitResult<bool>;

    /// Clear `started_at` and record the finish time.
    async fn finish(&self, key: &str, now_ms: i64) -> RateLimitResult<()>;

    /// Current window state, if any.
    async fn window(&self, key: &str) -> RateLimitResult<Option<RateLimitWindow>>;
}
