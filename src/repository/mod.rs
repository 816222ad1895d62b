//! Repository layer: the harvest index of scrape targets and the durable
//! queue, backed by SQLite.

mod memory;
mod sqlite;

pub use memory::InMemoryHarvestIndex;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{ScrapeOutcome, ScrapeTarget, Work};
use crate::utils::normalize;
use crate::work_queue::QueueError;

/// Scrape targets linked to works, plus their last scrape outcomes.
#[async_trait]
pub trait HarvestIndex: Send + Sync {
    /// Insert a target or refresh its harvested metadata, keeping any
    /// stored scrape outcome.
    async fn upsert_target(&self, target: &ScrapeTarget) -> Result<(), QueueError>;

    async fn get_target(&self, id: &str) -> Result<Option<ScrapeTarget>, QueueError>;

    /// Targets matching the work by DOI or by normalised title.
    async fn targets_for_work(&self, work: &Work) -> Result<Vec<ScrapeTarget>, QueueError>;

    /// Write a batch of outcomes in one transaction.
    async fn record_outcomes(
        &self,
        outcomes: &[(String, ScrapeOutcome)],
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;
}

/// Whether `target` could belong to `work`: same DOI or same normalised title.
pub fn target_matches_work(target: &ScrapeTarget, work: &Work) -> bool {
    if target.doi.as_deref() == Some(work.doi.as_str()) {
        return true;
    }
    match (&target.normalized_title, &work.title) {
        (Some(target_title), Some(title)) => {
            let target_title = normalize(target_title);
            !target_title.is_empty() && target_title == normalize(title)
        }
        _ => false,
    }
}

/// Fixed-width timestamp text, so lexical order matches time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
