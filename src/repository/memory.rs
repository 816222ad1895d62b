//! In-memory harvest index for tests and one-shot runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{target_matches_work, HarvestIndex};
use crate::models::{ScrapeOutcome, ScrapeTarget, Work};
use crate::work_queue::QueueError;

#[derive(Clone, Default)]
pub struct InMemoryHarvestIndex {
    targets: Arc<RwLock<HashMap<String, ScrapeTarget>>>,
}

impl InMemoryHarvestIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HarvestIndex for InMemoryHarvestIndex {
    async fn upsert_target(&self, target: &ScrapeTarget) -> Result<(), QueueError> {
        let mut targets = self.targets.write().await;
        let mut fresh = target.clone();
        if let Some(existing) = targets.get(&target.id) {
            fresh.apply_outcome(existing.stored_outcome(), Utc::now());
            fresh.scrape_updated = existing.scrape_updated;
        }
        targets.insert(fresh.id.clone(), fresh);
        Ok(())
    }

    async fn get_target(&self, id: &str) -> Result<Option<ScrapeTarget>, QueueError> {
        Ok(self.targets.read().await.get(id).cloned())
    }

    async fn targets_for_work(&self, work: &Work) -> Result<Vec<ScrapeTarget>, QueueError> {
        let targets = self.targets.read().await;
        let mut found: Vec<ScrapeTarget> = targets
            .values()
            .filter(|t| target_matches_work(t, work))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn record_outcomes(
        &self,
        outcomes: &[(String, ScrapeOutcome)],
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut targets = self.targets.write().await;
        for (id, outcome) in outcomes {
            let target = targets
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            target.apply_outcome(outcome.clone(), now);
        }
        Ok(())
    }
}
