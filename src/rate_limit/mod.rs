//! Per-(endpoint, domain) request spacing for the scrape scheduler.
//!
//! Windows live in a pluggable backend:
//! - In-memory (default, single process)
//! - Redis (distributed, multi-process; `redis-backend` feature)

mod backend;
mod config;
mod limiter;
mod memory;

#[cfg(feature = "redis-backend")]
mod redis;

pub use backend::{RateLimitBackend, RateLimitError, RateLimitResult, RateLimitWindow};
pub use config::{RateLimitConfig, COOPERATIVE_HOSTS};
pub use limiter::{BoxedRateLimitBackend, HostRateLimiter, RateLimitPermit};
pub use memory::InMemoryRateLimitBackend;

#[cfg(feature = "redis-backend")]
pub use redis::RedisRateLimitBackend;

use std::sync::Arc;

/// Build a backend from its configured name: `memory` or a `redis://` URL.
pub async fn backend_from_spec(spec: &str) -> RateLimitResult<BoxedRateLimitBackend> {
    if spec.is_empty() || spec == "memory" {
        return Ok(Arc::new(InMemoryRateLimitBackend::new()));
    }
    if spec.starts_with("redis://") || spec.starts_with("rediss://") {
        return redis_backend(spec).await;
    }
    Err(RateLimitError::Unavailable(format!(
        "unknown rate limit backend: {}",
        spec
    )))
}

#[cfg(feature = "redis-backend")]
async fn redis_backend(url: &str) -> RateLimitResult<BoxedRateLimitBackend> {
    Ok(Arc::new(RedisRateLimitBackend::new(url).await?))
}

#[cfg(not(feature = "redis-backend"))]
async fn redis_backend(_url: &str) -> RateLimitResult<BoxedRateLimitBackend> {
    Err(RateLimitError::Unavailable(
        "built without the redis-backend feature".to_string(),
    ))
}
