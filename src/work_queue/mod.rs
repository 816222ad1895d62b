//! Durable, host-fair job queue for scrape targets.
//!
//! Workers claim a batch, scrape each target, then either mark it finished
//! or release it. A released target keeps its previous `finished` time and
//! is picked up again on a later pass. Claims older than the claim TTL are
//! treated as abandoned and become claimable again.

mod error;
mod handle;
mod memory;

pub use error::QueueError;
pub use handle::ClaimHandle;
pub use memory::InMemoryQueueStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::QueueEntry;

/// Parameters for one claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Maximum entries returned.
    pub chunk_size: usize,
    /// Maximum entries per host in one claim.
    pub per_host_limit: usize,
    /// Only claim entries for this host.
    pub host: Option<String>,
    pub claim_ttl: Duration,
}

impl ClaimRequest {
    pub fn new(chunk_size: usize, per_host_limit: usize, claim_ttl: Duration) -> Self {
        Self {
            chunk_size,
            per_host_limit,
            host: None,
            claim_ttl,
        }
    }

    /// Restrict to one host; the per-host limit becomes the chunk size.
    pub fn for_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self.per_host_limit = self.chunk_size;
        self
    }
}

/// Entry counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub claimed: u64,
    pub scraped: u64,
}

/// A durable queue with atomic claim semantics.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add an entry, or leave an existing one untouched.
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError>;

    /// Atomically claim up to `chunk_size` eligible entries, marking them started.
    async fn claim(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimHandle>, QueueError>;

    /// Clear the claim and record completion.
    async fn mark_finished(&self, handle: ClaimHandle, now: DateTime<Utc>)
        -> Result<(), QueueError>;

    /// Clear the claim without recording completion.
    async fn release(&self, handle: ClaimHandle) -> Result<(), QueueError>;

    async fn get(&self, target_id: &str) -> Result<Option<QueueEntry>, QueueError>;

    async fn counts(&self, now: DateTime<Utc>, claim_ttl: Duration)
        -> Result<QueueCounts, QueueError>;
}

/// Whether an entry can be claimed at `now`.
pub fn is_claimable(entry: &QueueEntry, now: DateTime<Utc>, claim_ttl: Duration) -> bool {
    entry.started.is_none() || entry.claim_expired(now, claim_ttl)
}

/// Pick target ids host-fairly: per host, least recently finished first
/// (never-finished before all others), capped at `per_host_limit`; then
/// round-robin across hosts until `chunk_size` is reached.
pub fn select_fair<'a>(
    entries: impl IntoIterator<Item = &'a QueueEntry>,
    request: &ClaimRequest,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut by_host: BTreeMap<&str, Vec<&QueueEntry>> = BTreeMap::new();
    for entry in entries {
        if !is_claimable(entry, now, request.claim_ttl) {
            continue;
        }
        if request.host.as_deref().is_some_and(|h| h != entry.host) {
            continue;
        }
        by_host.entry(entry.host.as_str()).or_default().push(entry);
    }

    let mut queues: Vec<Vec<&QueueEntry>> = by_host
        .into_values()
        .map(|mut group| {
            group.sort_by(|a, b| {
                a.finished
                    .is_some()
                    .cmp(&b.finished.is_some())
                    .then(a.finished.cmp(&b.finished))
                    .then(a.target_id.cmp(&b.target_id))
            });
            group.truncate(request.per_host_limit);
            group.reverse();
            group
        })
        .collect();

    let mut picked = Vec::new();
    while picked.len() < request.chunk_size {
        let mut progressed = false;
        for queue in queues.iter_mut() {
            if picked.len() >= request.chunk_size {
                break;
            }
            if let Some(entry) = queue.pop() {
                picked.push(entry.target_id.clone());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    picked
}
