//! In-memory queue store for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{
    is_claimable, select_fair, ClaimHandle, ClaimRequest, QueueCounts, QueueError, QueueStore,
};
use crate::models::{QueueEntry, QueueState};

#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    entries: Arc<Mutex<HashMap<String, QueueEntry>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.entries
            .lock()
            .await
            .entry(entry.target_id.clone())
            .or_insert(entry);
        Ok(())
    }

    async fn claim(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimHandle>, QueueError> {
        let mut entries = self.entries.lock().await;
        let picked = select_fair(entries.values(), request, now);

        let mut handles = Vec::with_capacity(picked.len());
        for id in picked {
            if let Some(entry) = entries.get_mut(&id) {
                entry.started = Some(now);
                handles.push(ClaimHandle::new(entry.clone()));
            }
        }
        Ok(handles)
    }

    async fn mark_finished(
        &self,
        handle: ClaimHandle,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let claimed = handle.consume();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&claimed.target_id)
            .ok_or_else(|| QueueError::NotFound(claimed.target_id.clone()))?;
        entry.started = None;
        entry.finished = Some(now);
        Ok(())
    }

    async fn release(&self, handle: ClaimHandle) -> Result<(), QueueError> {
        let claimed = handle.consume();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&claimed.target_id)
            .ok_or_else(|| QueueError::NotFound(claimed.target_id.clone()))?;
        entry.started = None;
        Ok(())
    }

    async fn get(&self, target_id: &str) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self.entries.lock().await.get(target_id).cloned())
    }

    async fn counts(
        &self,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<QueueCounts, QueueError> {
        let entries = self.entries.lock().await;
        let mut counts = QueueCounts::default();
        for entry in entries.values() {
            if entry.state() == QueueState::Claimed && !is_claimable(entry, now, claim_ttl) {
                counts.claimed += 1;
            } else if entry.finished.is_some() {
                counts.scraped += 1;
            } else {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_finish_release_cycle() {
        let store = InMemoryQueueStore::new();
        store.enqueue(QueueEntry::new("t1", "h1")).await.unwrap();
        store.enqueue(QueueEntry::new("t2", "h1")).await.unwrap();
        let request = ClaimRequest::new(10, 10, Duration::minutes(30));
        let now = Utc::now();

        let handles = store.claim(&request, now).await.unwrap();
        assert_eq!(handles.len(), 2);
        // Everything is claimed now.
        assert!(store.claim(&request, now).await.unwrap().is_empty());

        let mut handles = handles.into_iter();
        let first = handles.next().unwrap();
        let first_id = first.target_id().to_string();
        store.mark_finished(first, now).await.unwrap();
        let second = handles.next().unwrap();
        let second_id = second.target_id().to_string();
        store.release(second).await.unwrap();

        let finished = store.get(&first_id).await.unwrap().unwrap();
        assert_eq!(finished.state(), QueueState::Scraped);
        let released = store.get(&second_id).await.unwrap().unwrap();
        assert_eq!(released.state(), QueueState::Pending);

        let counts = store.counts(now, Duration::minutes(30)).await.unwrap();
        assert_eq!(counts, QueueCounts { pending: 1, claimed: 0, scraped: 1 });

        // The released entry comes back first: it was never finished.
        let again = store.claim(&request, now).await.unwrap();
        assert_eq!(again[0].target_id(), second_id);
        for handle in again {
            store.release(handle).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_enqueue_keeps_existing_entry() {
        let store = InMemoryQueueStore::new();
        let mut done = QueueEntry::new("t1", "h1");
        done.finished = Some(Utc::now());
        store.enqueue(done.clone()).await.unwrap();
        store.enqueue(QueueEntry::new("t1", "h1")).await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), Some(done));
    }
}
