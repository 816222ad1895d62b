//! Durable queue rows for scrape dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a queued target is in its claim lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Waiting to be claimed, including targets released after a failure.
    Pending,
    Claimed,
    Scraped,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Scraped => "scraped",
        }
    }
}

/// One queued target. `host` is the fairness key (endpoint id or URL host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub target_id: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(target_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            host: host.into(),
            started: None,
            finished: None,
        }
    }

    pub fn state(&self) -> QueueState {
        match (self.started, self.finished) {
            (Some(_), _) => QueueState::Claimed,
            (None, Some(_)) => QueueState::Scraped,
            (None, None) => QueueState::Pending,
        }
    }

    /// A claim older than `ttl` belongs to a worker that died.
    pub fn claim_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.started.is_some_and(|started| started < now - ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let mut entry = QueueEntry::new("t1", "repo.example.edu");
        assert_eq!(entry.state(), QueueState::Pending);

        entry.started = Some(now);
        assert_eq!(entry.state(), QueueState::Claimed);

        entry.started = None;
        entry.finished = Some(now);
        assert_eq!(entry.state(), QueueState::Scraped);
    }

    #[test]
    fn test_claim_expiry() {
        let now = Utc::now();
        let mut entry = QueueEntry::new("t1", "h");
        assert!(!entry.claim_expired(now, chrono::Duration::hours(1)));
        entry.started = Some(now - chrono::Duration::hours(2));
        assert!(entry.claim_expired(now, chrono::Duration::hours(1)));
    }
}
