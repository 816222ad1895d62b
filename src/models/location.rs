//! Open locations: individual claimed copies of a work.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::evidence::{OA_JOURNAL_PREFIX, OA_REPOSITORY_PREFIX};
use super::License;
use crate::utils::doi_url;

/// Manuscript version, ordered from least to most final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Version {
    #[serde(rename = "submittedVersion", alias = "submitted")]
    Submitted,
    #[serde(rename = "acceptedVersion", alias = "accepted")]
    Accepted,
    #[serde(rename = "publishedVersion", alias = "published")]
    Published,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submittedVersion",
            Self::Accepted => "acceptedVersion",
            Self::Published => "publishedVersion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "submittedVersion" | "submitted" => Some(Self::Submitted),
            "acceptedVersion" | "accepted" => Some(Self::Accepted),
            "publishedVersion" | "published" => Some(Self::Published),
            _ => None,
        }
    }
}

/// Who serves a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    Publisher,
    Repository,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Repository => "repository",
        }
    }

    /// Infer the host from an evidence string.
    pub fn from_evidence(evidence: &str) -> Self {
        if evidence.starts_with(OA_REPOSITORY_PREFIX) {
            Self::Repository
        } else {
            Self::Publisher
        }
    }
}

/// OA status, ordered by precedence (closed lowest, gold highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OaStatus {
    Closed,
    Green,
    Bronze,
    Hybrid,
    Gold,
}

impl OaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Green => "green",
            Self::Bronze => "bronze",
            Self::Hybrid => "hybrid",
            Self::Gold => "gold",
        }
    }
}

impl std::fmt::Display for OaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single claimed accessible copy of a work.
///
/// Locations are built by candidate producers and treated as values from
/// then on: the resolution engine clones rather than edits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    pub evidence: String,
    pub host_type: HostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oa_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmh_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    /// Publisher-specific licenses from this publisher read as free-to-read, not hybrid.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bronze_exception: bool,
}

impl OpenLocation {
    /// Create a location with the host type inferred from the evidence.
    pub fn new(evidence: impl Into<String>) -> Self {
        let evidence = evidence.into();
        Self {
            host_type: HostType::from_evidence(&evidence),
            evidence,
            pdf_url: None,
            metadata_url: None,
            license: None,
            version: None,
            oa_date: None,
            updated_at: None,
            doi: None,
            endpoint_id: None,
            pmh_id: None,
            institution: None,
            bronze_exception: false,
        }
    }

    pub fn with_pdf_url(mut self, url: Option<String>) -> Self {
        self.pdf_url = url;
        self
    }

    pub fn with_metadata_url(mut self, url: Option<String>) -> Self {
        self.metadata_url = url;
        self
    }

    pub fn with_license(mut self, license: Option<License>) -> Self {
        self.license = license;
        self
    }

    pub fn with_version(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self
    }

    pub fn with_doi(mut self, doi: &str) -> Self {
        self.doi = Some(doi.to_string());
        self
    }

    pub fn with_oa_date(mut self, date: Option<NaiveDate>) -> Self {
        self.oa_date = date;
        self
    }

    pub fn with_updated_at(mut self, updated: Option<DateTime<Utc>>) -> Self {
        self.updated_at = updated;
        self
    }

    /// The URL a reader should be sent to: the PDF if known, else the landing page.
    pub fn best_url(&self) -> Option<&str> {
        self.pdf_url
            .as_deref()
            .or(self.metadata_url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// A location without any URL is not open.
    pub fn is_open(&self) -> bool {
        self.best_url().is_some()
    }

    /// Whether the hosting venue is itself an open journal.
    pub fn is_gold(&self) -> bool {
        self.is_open()
            && self.host_type == HostType::Publisher
            && self.evidence.starts_with(OA_JOURNAL_PREFIX)
    }

    pub fn is_green(&self) -> bool {
        self.is_open() && self.host_type == HostType::Repository
    }

    /// Publisher-hosted with a license, in a venue that isn't open.
    pub fn is_hybrid(&self) -> bool {
        if !self.is_open() || self.host_type != HostType::Publisher || self.is_gold() {
            return false;
        }
        match self.license {
            Some(License::PublisherSpecificOa) if self.bronze_exception => false,
            Some(_) => true,
            None => false,
        }
    }

    pub fn is_bronze(&self) -> bool {
        self.is_open()
            && self.host_type == HostType::Publisher
            && !self.is_gold()
            && !self.is_hybrid()
    }

    pub fn oa_status(&self) -> OaStatus {
        if !self.is_open() {
            OaStatus::Closed
        } else if self.is_gold() {
            OaStatus::Gold
        } else if self.is_green() {
            OaStatus::Green
        } else if self.is_hybrid() {
            OaStatus::Hybrid
        } else {
            OaStatus::Bronze
        }
    }

    /// Quality score; lower is better.
    ///
    /// Host type dominates, then manuscript version, then having a PDF, then
    /// license specificity. The publisher bonus only applies when the version
    /// is known, so an unversioned publisher link cannot outrank a versioned
    /// repository copy on host alone.
    pub fn sort_score(&self) -> i32 {
        let mut score = 0;

        if self.host_type == HostType::Publisher && self.version.is_some() {
            score -= 1000;
        }

        match self.version {
            Some(Version::Published) => {
                score -= 600;
                if let (Some(doi), Some(metadata_url)) = (&self.doi, &self.metadata_url) {
                    if *metadata_url == doi_url(doi) {
                        score -= 200;
                    }
                }
            }
            Some(Version::Accepted) => score -= 400,
            Some(Version::Submitted) => score -= 200,
            None => {}
        }

        if self.pdf_url.is_some() {
            score -= 100;
        }

        score -= 25 * i32::from(License::specificity(self.license.as_ref()));

        if self.evidence.contains("doi") {
            score -= 10;
        }

        score
    }

    /// Total ordering key: score first, then best URL, then every remaining
    /// field, so equal-scoring candidates never depend on input order.
    #[allow(clippy::type_complexity)]
    pub fn ranking_key(
        &self,
    ) -> (
        i32,
        Option<&str>,
        Option<&str>,
        Option<&str>,
        &str,
        Option<License>,
        Option<Version>,
        Option<NaiveDate>,
        Option<&str>,
    ) {
        (
            self.sort_score(),
            self.best_url(),
            self.metadata_url.as_deref(),
            self.pdf_url.as_deref(),
            self.evidence.as_str(),
            self.license,
            self.version,
            self.oa_date,
            self.endpoint_id.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evidence;

    fn publisher(license: Option<License>) -> OpenLocation {
        OpenLocation::new(evidence::PAGE_SAYS_LICENSE)
            .with_metadata_url(Some("https://publisher.example.com/article/1".into()))
            .with_version(Some(Version::Published))
            .with_license(license)
    }

    #[test]
    fn test_host_type_from_evidence() {
        assert_eq!(
            OpenLocation::new(evidence::PMCID_LOOKUP).host_type,
            HostType::Repository
        );
        assert_eq!(
            OpenLocation::new(evidence::FREE_PDF).host_type,
            HostType::Publisher
        );
    }

    #[test]
    fn test_oa_status_derivation() {
        assert_eq!(publisher(Some(License::CcBy)).oa_status(), OaStatus::Hybrid);
        assert_eq!(publisher(None).oa_status(), OaStatus::Bronze);

        let gold = OpenLocation::new(evidence::OA_JOURNAL_DOAJ)
            .with_metadata_url(Some("https://doi.org/10.1/x".into()))
            .with_license(Some(License::CcBy));
        assert_eq!(gold.oa_status(), OaStatus::Gold);

        let green = OpenLocation::new(evidence::PMCID_LOOKUP)
            .with_metadata_url(Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1".into()));
        assert_eq!(green.oa_status(), OaStatus::Green);
    }

    #[test]
    fn test_location_without_urls_is_closed() {
        let loc = OpenLocation::new(evidence::FREE_ARTICLE).with_license(Some(License::CcBy));
        assert!(!loc.is_open());
        assert_eq!(loc.oa_status(), OaStatus::Closed);
    }

    #[test]
    fn test_elsevier_bronze_exception() {
        let mut loc = publisher(Some(License::PublisherSpecificOa));
        assert_eq!(loc.oa_status(), OaStatus::Hybrid);
        loc.bronze_exception = true;
        assert_eq!(loc.oa_status(), OaStatus::Bronze);
    }

    #[test]
    fn test_sort_score_prefers_publisher_published_licensed() {
        let repo_accepted = OpenLocation::new("oa repository (via OAI-PMH doi match)")
            .with_pdf_url(Some("https://repo.example.edu/1.pdf".into()))
            .with_version(Some(Version::Accepted))
            .with_license(Some(License::CcBy));
        let bronze = publisher(None);
        let hybrid = publisher(Some(License::CcBy));

        assert!(hybrid.sort_score() < bronze.sort_score());
        assert!(bronze.sort_score() < repo_accepted.sort_score());
    }

    #[test]
    fn test_version_ordering_and_serde() {
        assert!(Version::Published > Version::Accepted);
        assert!(Version::Accepted > Version::Submitted);
        let v: Version = serde_json::from_str("\"acceptedVersion\"").unwrap();
        assert_eq!(v, Version::Accepted);
        let short: Version = serde_json::from_str("\"published\"").unwrap();
        assert_eq!(short, Version::Published);
    }
}
