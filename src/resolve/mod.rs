//! Resolution engine.
//!
//! Runs every candidate producer for a work, filters what they found,
//! ranks the survivors and reduces them to one best open location plus a
//! work-level OA status. Resolution reads nothing but its inputs, so running
//! it twice on the same work and targets gives the same answer.

mod compliance;
mod rank;
mod validation;

pub use compliance::NoncompliantRegistry;
pub use rank::{compare, dedup_by_best_url, merge_publisher_pdf, rank, sort_locations};
pub use validation::{AcceptAllPdfUrls, CheckedPdfUrls, PdfUrlValidator};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{HostType, License, OaStatus, OpenLocation, ScrapeTarget, Version, Work};
use crate::producers::{
    standard_producers, Candidates, LocationProducer, ManualOverrides, ProducerContext,
};
use crate::utils::fix_url_scheme;

/// Repositories that present abstracts or stray files as full text.
const EXCLUDED_ENDPOINT_IDS: &[&str] = &["01b84da34b861aa938d", "58e562cef9eb07c3c1d"];

/// The outcome of resolving one work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub doi: String,
    pub is_oa: bool,
    pub oa_status: OaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_oa_location: Option<OpenLocation>,
    /// Every surviving location, best first.
    pub oa_locations: Vec<OpenLocation>,
    /// Locations that will open on a future date.
    pub oa_locations_embargoed: Vec<OpenLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_metadata_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Resolution {
    fn closed(doi: &str) -> Self {
        Self {
            doi: doi.to_string(),
            is_oa: false,
            oa_status: OaStatus::Closed,
            best_oa_location: None,
            oa_locations: Vec::new(),
            oa_locations_embargoed: Vec::new(),
            free_pdf_url: None,
            free_metadata_url: None,
            license: None,
            version: None,
            evidence: None,
        }
    }

    /// The URL a reader should be sent to.
    pub fn fulltext_url(&self) -> Option<&str> {
        self.free_pdf_url
            .as_deref()
            .or(self.free_metadata_url.as_deref())
    }

    /// Derive the work-level fields from ranked locations.
    fn decide(work: &Work, locations: Vec<OpenLocation>, embargoed: Vec<OpenLocation>) -> Self {
        let mut resolution = Self::closed(&work.doi);
        resolution.oa_locations_embargoed = embargoed;

        if let Some(best) = locations.first() {
            resolution.free_pdf_url = best.pdf_url.clone();
            resolution.free_metadata_url = best.metadata_url.clone();
            resolution.license = best.license;
            resolution.version = best.version;
            resolution.evidence = Some(best.evidence.clone());
            resolution.oa_status = if work.is_preprint() {
                OaStatus::Green
            } else {
                locations
                    .iter()
                    .map(OpenLocation::oa_status)
                    .max()
                    .unwrap_or(OaStatus::Closed)
            };
            resolution.best_oa_location = Some(best.clone());
        }

        // no open license on something nobody can read
        if resolution.fulltext_url().is_none() {
            resolution.license = None;
            resolution.evidence = None;
            resolution.version = None;
            resolution.oa_status = OaStatus::Closed;
            resolution.best_oa_location = None;
        }
        resolution.is_oa = resolution.oa_status != OaStatus::Closed;
        resolution.oa_locations = locations;
        resolution
    }
}

/// Collects candidates from every producer and ranks them.
pub struct ResolutionEngine {
    producers: Vec<Box<dyn LocationProducer>>,
    overrides: ManualOverrides,
    registry: NoncompliantRegistry,
    validator: Box<dyn PdfUrlValidator>,
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionEngine {
    /// Engine with the standard producers and the built-in rule tables.
    pub fn new() -> Self {
        Self {
            producers: standard_producers(),
            overrides: ManualOverrides::builtin(),
            registry: NoncompliantRegistry::builtin(),
            validator: Box::new(AcceptAllPdfUrls),
        }
    }

    pub fn with_producers(mut self, producers: Vec<Box<dyn LocationProducer>>) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_overrides(mut self, overrides: ManualOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_registry(mut self, registry: NoncompliantRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_validator(mut self, validator: impl PdfUrlValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Raw candidates for `work`, before filtering and ranking.
    pub fn candidates(&self, work: &Work, targets: &[ScrapeTarget], now: DateTime<Utc>) -> Candidates {
        self.find_candidates(work, targets, now, true)
    }

    fn find_candidates(
        &self,
        work: &Work,
        targets: &[ScrapeTarget],
        now: DateTime<Utc>,
        follow_links: bool,
    ) -> Candidates {
        let mut found = Candidates::default();
        if work.is_closed_exception() {
            tracing::debug!("{} is a closed exception", work.doi);
            return found;
        }

        let ctx = ProducerContext::new(targets, now);
        for producer in &self.producers {
            let produced = producer.produce(work, &ctx);
            if !produced.is_empty() {
                tracing::debug!(
                    "{}: {} open, {} embargoed for {}",
                    producer.name(),
                    produced.open.len(),
                    produced.embargoed.len(),
                    work.doi
                );
            }
            found.extend(produced);
        }

        if follow_links {
            found.open.extend(self.linked_locations(work, targets, now));
        }

        if let Some(replacement) = self.overrides.get(work) {
            found.open = replacement;
            found.embargoed.clear();
        }

        if found.open.iter().any(|l| l.host_type == HostType::Publisher) {
            found.embargoed.retain(|l| l.host_type != HostType::Publisher);
        }
        found
    }

    /// Best repository copy of each preprint and best published publisher
    /// copy of each postprint. Linked works are resolved without their own
    /// links.
    fn linked_locations(
        &self,
        work: &Work,
        targets: &[ScrapeTarget],
        now: DateTime<Utc>,
    ) -> Vec<OpenLocation> {
        let mut linked = Vec::new();
        for preprint in &work.preprints {
            let related = preprint.without_links();
            if let Some(location) = self
                .ranked(&related, targets, now, false)
                .into_iter()
                .find(|l| l.host_type == HostType::Repository)
            {
                linked.push(location);
            }
        }
        for postprint in &work.postprints {
            let related = postprint.without_links();
            if let Some(location) = self
                .ranked(&related, targets, now, false)
                .into_iter()
                .find(|l| l.host_type == HostType::Publisher && l.version == Some(Version::Published))
            {
                linked.push(location);
            }
        }
        linked
    }

    fn keep(&self, work: &Work, location: &OpenLocation) -> bool {
        if !location.is_open() {
            return false;
        }
        if self.registry.is_noncompliant(location) {
            tracing::info!("dropping reported noncompliant location {:?}", location.best_url());
            return false;
        }
        if let Some(pdf_url) = location.pdf_url.as_deref() {
            if !self.validator.is_valid(pdf_url) {
                tracing::debug!("dropping invalid pdf url {}", pdf_url);
                return false;
            }
        }
        if work.has_bad_doi_url() && location.best_url() == Some(work.url().as_str()) {
            return false;
        }
        !location
            .endpoint_id
            .as_deref()
            .is_some_and(|e| EXCLUDED_ENDPOINT_IDS.contains(&e))
    }

    /// Drop noncompliant or invalid candidates and tidy URL schemes.
    pub fn filter(&self, work: &Work, locations: Vec<OpenLocation>) -> Vec<OpenLocation> {
        locations
            .into_iter()
            .filter(|l| self.keep(work, l))
            .map(|mut l| {
                l.pdf_url = l.pdf_url.as_deref().map(fix_url_scheme);
                l.metadata_url = l.metadata_url.as_deref().map(fix_url_scheme);
                l
            })
            .collect()
    }

    fn ranked(
        &self,
        work: &Work,
        targets: &[ScrapeTarget],
        now: DateTime<Utc>,
        follow_links: bool,
    ) -> Vec<OpenLocation> {
        let found = self.find_candidates(work, targets, now, follow_links);
        rank(self.filter(work, found.open))
    }

    /// Resolve `work` against its harvested targets as of `now`.
    pub fn resolve(&self, work: &Work, targets: &[ScrapeTarget], now: DateTime<Utc>) -> Resolution {
        let found = self.candidates(work, targets, now);
        let locations = rank(self.filter(work, found.open));
        let mut embargoed = found.embargoed;
        sort_locations(&mut embargoed);
        let embargoed = dedup_by_best_url(embargoed);

        let resolution = Resolution::decide(work, locations, embargoed);
        tracing::info!(
            "resolved {}: {} ({} locations, {} embargoed)",
            work.doi,
            resolution.oa_status,
            resolution.oa_locations.len(),
            resolution.oa_locations_embargoed.len()
        );
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{evidence, S2Lookup, StoredScrape};
    use crate::producers::ManualOverride;
    use chrono::NaiveDate;

    struct Fixed(Vec<OpenLocation>);

    impl LocationProducer for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn produce(&self, _work: &Work, _ctx: &ProducerContext<'_>) -> Candidates {
            Candidates {
                open: self.0.clone(),
                embargoed: Vec::new(),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn work() -> Work {
        let mut w = Work::new("10.1234/resolve").unwrap();
        w.issued = NaiveDate::from_ymd_opt(2023, 3, 1);
        w
    }

    fn engine(locations: Vec<OpenLocation>) -> ResolutionEngine {
        ResolutionEngine::new()
            .with_producers(vec![Box::new(Fixed(locations))])
            .with_overrides(ManualOverrides::new())
    }

    const SHARED_PDF: &str = "https://publisher.example.com/article/1.pdf";

    fn scenario() -> Vec<OpenLocation> {
        let a = OpenLocation::new(evidence::repository_match(crate::models::MatchType::Doi))
            .with_pdf_url(Some(SHARED_PDF.into()))
            .with_version(Some(Version::Accepted))
            .with_license(Some(License::CcBy));
        let b = OpenLocation::new(evidence::FREE_PDF)
            .with_pdf_url(Some(SHARED_PDF.into()))
            .with_version(Some(Version::Published));
        let c = OpenLocation::new(evidence::PAGE_SAYS_LICENSE)
            .with_pdf_url(Some(SHARED_PDF.into()))
            .with_version(Some(Version::Published))
            .with_license(Some(License::CcBy));
        vec![a, b, c]
    }

    #[test]
    fn test_publisher_published_licensed_wins() {
        let resolution = engine(scenario()).resolve(&work(), &[], now());
        let best = resolution.best_oa_location.clone().unwrap();
        assert_eq!(best.evidence, evidence::PAGE_SAYS_LICENSE);
        assert_eq!(best.license, Some(License::CcBy));
        assert_eq!(resolution.oa_status, OaStatus::Hybrid);
        assert!(resolution.is_oa);
        assert_eq!(resolution.oa_locations.len(), 1);
        assert_eq!(resolution.free_pdf_url.as_deref(), Some(SHARED_PDF));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let base = scenario();
        let expected = engine(base.clone()).resolve(&work(), &[], now());
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let permuted: Vec<_> = order.iter().map(|&i| base[i].clone()).collect();
            assert_eq!(engine(permuted).resolve(&work(), &[], now()), expected);
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut w = work();
        w.s2 = Some(S2Lookup {
            pdf_url: "https://pdfs.semanticscholar.org/1.pdf".into(),
            url: None,
        });
        w.stored_scrape = Some(StoredScrape {
            evidence: Some(evidence::FREE_ARTICLE.into()),
            metadata_url: Some("https://publisher.example.com/article/1".into()),
            ..StoredScrape::default()
        });
        let engine = ResolutionEngine::new();
        let first = engine.resolve(&w, &[], now());
        let second = engine.resolve(&w, &[], now());
        assert_eq!(first, second);
        assert_eq!(first.oa_locations.len(), 2);
        assert_eq!(first.oa_status, OaStatus::Bronze);
    }

    #[test]
    fn test_manual_override_replaces_everything() {
        let w = work();
        let mut overrides = ManualOverrides::new();
        let entry = ManualOverride {
            pdf_url: Some("https://arxiv.org/pdf/2401.00001.pdf".into()),
            version: Some(Version::Submitted),
            ..ManualOverride::default()
        };
        overrides.insert(&w.doi, entry.clone());
        let resolution = engine(scenario())
            .with_overrides(overrides)
            .resolve(&w, &[], now());
        assert_eq!(resolution.oa_locations, vec![entry.location(&w.doi)]);
        assert_eq!(resolution.oa_status, OaStatus::Green);

        let mut suppress = ManualOverrides::new();
        suppress.insert(&w.doi, ManualOverride::default());
        let resolution = engine(scenario()).with_overrides(suppress).resolve(&w, &[], now());
        assert!(resolution.oa_locations.is_empty());
        assert_eq!(resolution.oa_status, OaStatus::Closed);
        assert!(resolution.license.is_none());
    }

    #[test]
    fn test_embargo_suppressed_by_open_publisher_copy() {
        let mut w = work();
        w.journal_policy.embargo_days = Some(730);

        let embargoed_only = ResolutionEngine::new().resolve(&w, &[], now());
        assert!(!embargoed_only.is_oa);
        assert_eq!(embargoed_only.oa_locations_embargoed.len(), 1);
        assert_eq!(
            embargoed_only.oa_locations_embargoed[0].oa_date,
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );

        w.stored_scrape = Some(StoredScrape {
            evidence: Some(evidence::FREE_ARTICLE.into()),
            metadata_url: Some("https://publisher.example.com/article/1".into()),
            ..StoredScrape::default()
        });
        let with_open_copy = ResolutionEngine::new().resolve(&w, &[], now());
        assert!(with_open_copy.is_oa);
        assert!(with_open_copy.oa_locations_embargoed.is_empty());
    }

    #[test]
    fn test_filters() {
        let w = work();
        let noncompliant = OpenLocation::new(evidence::FREE_PDF)
            .with_pdf_url(Some(
                "https://pq-static-content.proquest.com/collateral/media2/documents/ebookcentral-dda.pdf".into(),
            ))
            .with_doi(&w.doi);
        let mut excluded = OpenLocation::new(evidence::repository_match(crate::models::MatchType::Doi))
            .with_pdf_url(Some("https://abstracts.example.org/1.pdf".into()));
        excluded.endpoint_id = Some("01b84da34b861aa938d".into());
        let invalid = OpenLocation::new(evidence::FREE_PDF)
            .with_pdf_url(Some("https://publisher.example.com/broken.pdf".into()));
        let no_url = OpenLocation::new(evidence::FREE_ARTICLE);
        let kept = OpenLocation::new(evidence::PMCID_LOOKUP)
            .with_metadata_url(Some("http://www.ncbi.nlm.nih.gov/pmc/articles/PMC1".into()));

        let checked: CheckedPdfUrls =
            [("https://publisher.example.com/broken.pdf".to_string(), false)].into_iter().collect();
        let resolution = engine(vec![noncompliant, excluded, invalid, no_url, kept])
            .with_validator(checked)
            .resolve(&w, &[], now());

        assert_eq!(resolution.oa_locations.len(), 1);
        assert_eq!(
            resolution.free_metadata_url.as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1")
        );
        assert_eq!(resolution.oa_status, OaStatus::Green);
    }

    #[test]
    fn test_preprint_is_green_and_closed_exception_is_closed() {
        let mut preprint = work();
        preprint.genre = Some("posted-content".into());
        let resolution = engine(scenario()).resolve(&preprint, &[], now());
        assert_eq!(resolution.oa_status, OaStatus::Green);

        let mut closed = work();
        closed.issns = vec!["1751-2409".into()];
        let resolution = engine(scenario()).resolve(&closed, &[], now());
        assert_eq!(resolution.oa_status, OaStatus::Closed);
        assert!(resolution.oa_locations.is_empty());
    }

    #[test]
    fn test_linked_versions() {
        let mut preprint = Work::new("10.1101/2023.01.01.000001").unwrap();
        preprint.genre = Some("posted-content".into());
        preprint.s2 = Some(S2Lookup {
            pdf_url: "https://www.biorxiv.org/content/1.full.pdf".into(),
            url: None,
        });

        let mut article = work();
        article.preprints = vec![preprint.clone()];
        let resolution = ResolutionEngine::new().resolve(&article, &[], now());
        assert_eq!(resolution.oa_locations.len(), 1);
        assert_eq!(resolution.oa_locations[0].doi.as_deref(), Some(preprint.doi.as_str()));
        assert_eq!(resolution.oa_status, OaStatus::Green);

        let mut published = work();
        published.stored_scrape = Some(StoredScrape {
            evidence: Some(evidence::PAGE_SAYS_LICENSE.into()),
            metadata_url: Some("https://publisher.example.com/article/1".into()),
            license: Some(License::CcBy),
            ..StoredScrape::default()
        });
        let mut linked_preprint = preprint.clone();
        linked_preprint.s2 = None;
        linked_preprint.postprints = vec![published];
        let resolution = ResolutionEngine::new().resolve(&linked_preprint, &[], now());
        let best = resolution.best_oa_location.unwrap();
        assert_eq!(best.host_type, HostType::Publisher);
        assert_eq!(best.version, Some(Version::Published));
        // the work itself is a preprint
        assert_eq!(resolution.oa_status, OaStatus::Green);
    }
}
