//! Redis-backed rate limit windows for multi-process coordination.
//!
//! The claim is a single Lua script, so the read-check-write happens
//! atomically on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult, RateLimitWindow};

/// Key prefix for rate limit data in Redis.
const KEY_PREFIX: &str = "oafinder:ratelimit:";
/// Windows nobody touched for a day are dropped.
const WINDOW_TTL_SECS: i64 = 86400;

const CLAIM_SCRIPT: &str = r#"
    local key = KEYS[1]
    local now_ms = tonumber(ARGV[1])
    local interval_ms = tonumber(ARGV[2])
    local ttl = tonumber(ARGV[3])

    local started = tonumber(redis.call('HGET', key, 'started_at'))
    if started and started >= now_ms - interval_ms then
        return 0
    end

    redis.call('HSET', key, 'started_at', now_ms)
    redis.call('HDEL', key, 'finished_at')
    redis.call('EXPIRE', key, ttl)
    return 1
"#;

/// Redis-backed window storage.
pub struct RedisRateLimitBackend {
    conn: ConnectionManager,
}

impl RedisRateLimitBackend {
    /// Connect to `redis_url` (e.g. "redis://localhost:6379").
    pub async fn new(redis_url: &str) -> RateLimitResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RateLimitError::Database(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            RateLimitError::Database(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }

    fn window_key(&self, key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    async fn try_claim(
        &self,
        key: &str,
        min_interval: Duration,
        now_ms: i64,
    ) -> RateLimitResult<bool> {
        let mut conn = self.conn.clone();
        let claimed: i64 = Script::new(CLAIM_SCRIPT)
            .key(self.window_key(key))
            .arg(now_ms)
            .arg(min_interval.as_millis() as i64)
            .arg(WINDOW_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Database(e.to_string()))?;
        Ok(claimed == 1)
    }

    async fn finish(&self, key: &str, now_ms: i64) -> RateLimitResult<()> {
        let mut conn = self.conn.clone();
        let key = self.window_key(key);

        redis::pipe()
            .hdel(&key, "started_at")
            .hset(&key, "finished_at", now_ms)
            .expire(&key, WINDOW_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RateLimitError::Database(e.to_string()))?;

        Ok(())
    }

    async fn window(&self, key: &str) -> RateLimitResult<Option<RateLimitWindow>> {
        let mut conn = self.conn.clone();
        let fields: Vec<Option<i64>> = redis::cmd("HMGET")
            .arg(self.window_key(key))
            .arg("started_at")
            .arg("finished_at")
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Database(e.to_string()))?;

        let started_at = fields.first().copied().flatten();
        let finished_at = fields.get(1).copied().flatten();
        if started_at.is_none() && finished_at.is_none() {
            return Ok(None);
        }
        Ok(Some(RateLimitWindow {
            started_at,
            finished_at,
        }))
    }
}
