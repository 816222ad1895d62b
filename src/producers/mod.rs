//! Location candidate producers.
//!
//! Each producer reads one kind of evidence about a work and emits zero or
//! more open locations. Producers are independent of each other; the
//! resolution engine runs them in a fixed order and merges the results.

mod journal;
mod lookups;
mod manual;
mod publisher;
mod repository;

pub use journal::JournalPolicyProducer;
pub use lookups::{PmcProducer, SemanticScholarProducer, S2_ENDPOINT_ID};
pub use manual::{ManualOverride, ManualOverrides};
pub use publisher::{scrape_publisher_page, StoredScrapeProducer};
pub use repository::{
    title_matched_targets, GreenTargetProducer, MatchedTarget, PublisherEquivalentProducer,
    MAX_TITLE_MATCHES_PER_ENDPOINT,
};

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::evidence::as_repository;
use crate::models::{OpenLocation, ScrapeTarget, Version, Work};

/// Inputs shared by every producer during one resolution pass.
#[derive(Debug, Clone, Copy)]
pub struct ProducerContext<'a> {
    /// Harvested pages linked to the work by DOI or title.
    pub targets: &'a [ScrapeTarget],
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
}

impl<'a> ProducerContext<'a> {
    pub fn new(targets: &'a [ScrapeTarget], now: DateTime<Utc>) -> Self {
        Self {
            targets,
            today: now.date_naive(),
            now,
        }
    }
}

/// Candidates emitted by producers, split by whether they are open yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub open: Vec<OpenLocation>,
    /// Locations whose `oa_date` lies in the future.
    pub embargoed: Vec<OpenLocation>,
}

impl Candidates {
    pub fn push_open(&mut self, location: OpenLocation) {
        self.open.push(location);
    }

    pub fn push_embargoed(&mut self, location: OpenLocation) {
        self.embargoed.push(location);
    }

    /// Route a location by its `oa_date`.
    pub fn push_dated(&mut self, location: OpenLocation, today: NaiveDate) {
        if location.oa_date.is_some_and(|d| d > today) {
            self.push_embargoed(location);
        } else {
            self.push_open(location);
        }
    }

    pub fn extend(&mut self, other: Candidates) {
        self.open.extend(other.open);
        self.embargoed.extend(other.embargoed);
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.embargoed.is_empty()
    }
}

/// A single evidence source.
pub trait LocationProducer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates;
}

/// The producers that need nothing beyond the work and its targets, in the
/// order their candidates are collected.
pub fn standard_producers() -> Vec<Box<dyn LocationProducer>> {
    vec![
        Box::new(JournalPolicyProducer),
        Box::new(PmcProducer),
        Box::new(GreenTargetProducer),
        Box::new(PublisherEquivalentProducer),
        Box::new(StoredScrapeProducer),
        Box::new(SemanticScholarProducer),
    ]
}

/// Rewrite a location found for a preprint work as a repository copy of the
/// submitted version.
pub fn make_preprint(mut location: OpenLocation) -> OpenLocation {
    location.evidence = as_repository(&location.evidence);
    location.host_type = crate::models::HostType::Repository;
    location.version = Some(Version::Submitted);
    location
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{evidence, HostType};

    #[test]
    fn test_make_preprint() {
        let loc = OpenLocation::new(evidence::FREE_PDF)
            .with_pdf_url(Some("https://www.biorxiv.org/content/1.full.pdf".into()))
            .with_version(Some(Version::Published));
        let preprint = make_preprint(loc);
        assert_eq!(preprint.evidence, "oa repository (via free pdf)");
        assert_eq!(preprint.host_type, HostType::Repository);
        assert_eq!(preprint.version, Some(Version::Submitted));
    }

    #[test]
    fn test_push_dated_splits_future() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut candidates = Candidates::default();
        candidates.push_dated(
            OpenLocation::new(evidence::FREE_ARTICLE).with_oa_date(NaiveDate::from_ymd_opt(2025, 1, 1)),
            today,
        );
        candidates.push_dated(
            OpenLocation::new(evidence::FREE_ARTICLE).with_oa_date(NaiveDate::from_ymd_opt(2024, 1, 1)),
            today,
        );
        candidates.push_dated(OpenLocation::new(evidence::FREE_ARTICLE), today);
        assert_eq!(candidates.open.len(), 2);
        assert_eq!(candidates.embargoed.len(), 1);
    }

    #[test]
    fn test_standard_producer_order() {
        let names: Vec<_> = standard_producers().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec!["journal_policy", "pmc", "green_targets", "publisher_equivalent", "stored_scrape", "s2"]
        );
    }
}
