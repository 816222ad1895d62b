//! Scrape targets: repository or publisher-equivalent pages linked to a work.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{License, Version};
use crate::utils::extract_domain;

/// Endpoint id for pages that stand in for the publisher's own landing page.
pub const PUBLISHER_EQUIVALENT_ENDPOINT_ID: &str = "oadoi_publisher_equivalent";
/// Record id carried by publisher-equivalent pages.
pub const PUBLISHER_EQUIVALENT_PMH_ID: &str = "oa_publisher_equivalent";

/// Records from these harvests are never scraped.
const EXCLUDED_PMH_FRAGMENTS: &[&str] = &["oai:open-archive.highwire.org"];
/// URL fragments that only ever lead to broken pages.
const EXCLUDED_URL_FRAGMENTS: &[&str] = &["//hdl.handle.net/10454/"];
/// (prefix, suffix) pairs of excluded URLs.
const EXCLUDED_URL_SHAPES: &[(&str, &str)] = &[("https://biblio.vub.ac.be/vubir/", ".html")];

/// How a harvested record was linked to a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Doi,
    Title,
    TitleFirstAuthor,
    TitleLastAuthor,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::Title => "title",
            Self::TitleFirstAuthor => "title and first author",
            Self::TitleLastAuthor => "title and last author",
        }
    }
}

/// Result of scraping one page. Errors are carried as text, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ScrapeOutcome {
    pub fn is_open(&self) -> bool {
        self.pdf_url.is_some() || self.metadata_url.is_some()
    }

    /// Append an error message, keeping earlier ones.
    pub fn record_error(&mut self, message: impl AsRef<str>) {
        if !self.error.is_empty() {
            self.error.push_str("; ");
        }
        self.error.push_str(message.as_ref());
    }
}

/// A page associated with a work, plus the outcome of its last scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmh_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    /// The repository promises it never holds submitted versions.
    #[serde(default)]
    pub no_submitted_versions: bool,
    /// Raw harvested metadata record, used for version and license cues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_xml: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_available: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: String,
}

impl ScrapeTarget {
    pub fn new(url: &str, pmh_id: Option<&str>, endpoint_id: Option<&str>) -> Self {
        Self {
            id: Self::compute_id(url, pmh_id, endpoint_id),
            url: url.to_string(),
            doi: None,
            normalized_title: None,
            authors: Vec::new(),
            pmh_id: pmh_id.map(str::to_string),
            endpoint_id: endpoint_id.map(str::to_string),
            repository_name: None,
            no_submitted_versions: false,
            record_xml: None,
            first_available: None,
            scrape_pdf_url: None,
            scrape_metadata_url: None,
            scrape_license: None,
            scrape_version: None,
            scrape_updated: None,
            error: String::new(),
        }
    }

    /// Stable id derived from where the page came from.
    pub fn compute_id(url: &str, pmh_id: Option<&str>, endpoint_id: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(endpoint_id.unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(pmh_id.unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())[..20].to_string()
    }

    /// Fairness key for the scrape queue: the endpoint, else the URL host.
    pub fn queue_host(&self) -> String {
        self.endpoint_id
            .clone()
            .or_else(|| extract_domain(&self.url))
            .unwrap_or_default()
    }

    pub fn is_publisher_equivalent(&self) -> bool {
        self.pmh_id.as_deref() == Some(PUBLISHER_EQUIVALENT_PMH_ID)
    }

    pub fn is_open(&self) -> bool {
        self.scrape_pdf_url.is_some() || self.scrape_metadata_url.is_some()
    }

    /// A PubMed Central article page, read through the Europe PMC API instead of scraped.
    pub fn is_pmc(&self) -> bool {
        self.url.contains("ncbi.nlm.nih.gov/pmc") || self.url.contains("europepmc.org/articles/")
    }

    /// Lowercase PMCID taken from the last path segment of a PMC URL.
    pub fn pmcid(&self) -> Option<String> {
        if !self.is_pmc() {
            return None;
        }
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| id.to_lowercase().starts_with("pmc"))
            .map(str::to_lowercase)
    }

    pub fn is_arxiv(&self) -> bool {
        self.pmh_id.as_deref().is_some_and(|id| id.contains("oai:arXiv.org"))
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// On the permanent exclusion list, or missing a harvest record id.
    pub fn is_excluded(&self) -> bool {
        let Some(pmh_id) = self.pmh_id.as_deref() else {
            return true;
        };
        EXCLUDED_PMH_FRAGMENTS.iter().any(|f| pmh_id.contains(f))
            || EXCLUDED_URL_FRAGMENTS.iter().any(|f| self.url.contains(f))
            || EXCLUDED_URL_SHAPES
                .iter()
                .any(|(prefix, suffix)| self.url.starts_with(prefix) && self.url.ends_with(suffix))
    }

    fn not_scraped_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.scrape_updated {
            Some(updated) => updated < now - window,
            None => true,
        }
    }

    /// A target may be scraped again if its last scrape was clean or has gone stale.
    pub fn is_eligible(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        (!self.has_error() || self.not_scraped_within(now, staleness)) && !self.is_excluded()
    }

    /// Replace the stored outcome with a fresh one.
    pub fn apply_outcome(&mut self, outcome: ScrapeOutcome, now: DateTime<Utc>) {
        self.scrape_pdf_url = outcome.pdf_url;
        self.scrape_metadata_url = outcome.metadata_url;
        self.scrape_license = outcome.license;
        self.scrape_version = outcome.version;
        self.scrape_updated = Some(now);
        self.error = outcome.error;
    }

    /// The outcome currently stored on the target.
    pub fn stored_outcome(&self) -> ScrapeOutcome {
        ScrapeOutcome {
            pdf_url: self.scrape_pdf_url.clone(),
            metadata_url: self.scrape_metadata_url.clone(),
            license: self.scrape_license,
            version: self.scrape_version,
            evidence: None,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScrapeTarget {
        ScrapeTarget::new(
            "https://repo.example.edu/record/1",
            Some("oai:repo.example.edu:1"),
            Some("endpoint1"),
        )
    }

    #[test]
    fn test_id_is_stable() {
        let a = target();
        let b = target();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 20);
        let other = ScrapeTarget::new("https://repo.example.edu/record/2", Some("x"), None);
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_errored_target_respects_staleness_window() {
        let now = Utc::now();
        let mut t = target();
        t.error = "timeout".into();
        t.scrape_updated = Some(now - Duration::days(1));
        assert!(!t.is_eligible(now, Duration::days(7)));

        t.scrape_updated = Some(now - Duration::days(8));
        assert!(t.is_eligible(now, Duration::days(7)));
    }

    #[test]
    fn test_clean_target_is_eligible() {
        let now = Utc::now();
        let mut t = target();
        t.scrape_updated = Some(now - Duration::hours(1));
        assert!(t.is_eligible(now, Duration::days(7)));
    }

    #[test]
    fn test_exclusions() {
        let now = Utc::now();
        let no_pmh = ScrapeTarget::new("https://repo.example.edu/1", None, None);
        assert!(!no_pmh.is_eligible(now, Duration::days(7)));

        let highwire = ScrapeTarget::new(
            "https://example.org/1",
            Some("oai:open-archive.highwire.org:1"),
            None,
        );
        assert!(highwire.is_excluded());

        let vub = ScrapeTarget::new("https://biblio.vub.ac.be/vubir/paper.html", Some("oai:vub:1"), None);
        assert!(vub.is_excluded());

        let handle = ScrapeTarget::new("https://hdl.handle.net/10454/123", Some("oai:x:1"), None);
        assert!(handle.is_excluded());
    }

    #[test]
    fn test_apply_outcome_replaces_previous_scrape() {
        let now = Utc::now();
        let mut t = target();
        t.error = "old error".into();
        t.scrape_pdf_url = Some("https://old.example/1.pdf".into());

        t.apply_outcome(
            ScrapeOutcome {
                metadata_url: Some(t.url.clone()),
                version: Some(Version::Accepted),
                ..Default::default()
            },
            now,
        );

        assert_eq!(t.scrape_pdf_url, None);
        assert_eq!(t.scrape_metadata_url.as_deref(), Some(t.url.as_str()));
        assert_eq!(t.scrape_updated, Some(now));
        assert!(!t.has_error());
        assert!(t.is_open());
    }

    #[test]
    fn test_pmcid_from_url() {
        let t = ScrapeTarget::new(
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC3039489",
            Some("oai:pubmedcentral.nih.gov:3039489"),
            None,
        );
        assert!(t.is_pmc());
        assert_eq!(t.pmcid().as_deref(), Some("pmc3039489"));
        assert_eq!(target().pmcid(), None);
    }

    #[test]
    fn test_record_error_appends() {
        let mut outcome = ScrapeOutcome::default();
        outcome.record_error("first");
        outcome.record_error("second");
        assert_eq!(outcome.error, "first; second");
    }
}
