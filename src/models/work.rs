//! Works and the bibliographic facts the resolution pass reads.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{License, OaStatus, Version};
use crate::utils::{doi_url, is_same_publisher, normalize_doi};

/// ISSNs whose DOI links never resolve to the article.
const BAD_DOI_URL_ISSNS: &[&str] = &["1507-1367", "2237-0722"];
/// DOI prefixes whose landing pages only carry abstracts.
const BAD_DOI_URL_PREFIXES: &[&str] = &["10.5004/dwt."];
/// Journals whose landing-page PDFs hold a whole issue, or lead somewhere else.
const WHOLE_ISSUE_PDF_ISSNS: &[&str] = &[
    "1818-5487",
    "2072-5981",
    "1989-8649",
    "2164-3989",
    "0970-9274",
    "0973-5070",
    "2471-190X",
    "0097-6156",
    "0210-6124",
];
/// Journals that are never reported open regardless of evidence.
const CLOSED_ISSNS: &[&str] = &["1751-2409", "1751-2395"];

/// A journal-level listing that makes every article open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    /// First publication year the listing covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_year: Option<i32>,
}

impl OpenListing {
    pub fn covers(&self, year: Option<i32>) -> bool {
        match (self.since_year, year) {
            (Some(since), Some(year)) => year >= since,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Journal-level open-access policy flags supplied by the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doaj: Option<OpenListing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_publisher: Option<OpenListing>,
    /// The publisher opens every work of this genre, e.g. its posted content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_publisher_genre: Option<OpenListing>,
    /// Year from which the journal's observed OA rate marks it as open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_oa_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<OpenListing>,
    #[serde(default)]
    pub repository_doi_prefix: bool,
    #[serde(default)]
    pub journal_doi_prefix: bool,
    #[serde(default)]
    pub repository_url_prefix: bool,
    /// Known delayed-access embargo, in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embargo_days: Option<i64>,
    /// Journal is known to open articles after some delay of unknown length.
    #[serde(default)]
    pub delayed_oa: bool,
}

/// A license entry from the registration agency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossrefLicense {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    /// `vor`, `am`, `tdm` or `unspecified`.
    #[serde(default = "default_content_version")]
    pub content_version: String,
}

fn default_content_version() -> String {
    "unspecified".to_string()
}

/// A PubMed Central copy linked to the work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmcLink {
    pub pmcid: String,
    /// `live` once the copy is public, otherwise the planned release date.
    pub release: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

/// A hit in the Semantic Scholar open-PDF index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S2Lookup {
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The stored outcome of the last live publisher-page scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredScrape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl StoredScrape {
    /// A scrape that found something other than a closed page.
    pub fn is_open(&self) -> bool {
        matches!(self.evidence.as_deref(), Some(e) if !e.is_empty() && e != "closed")
    }
}

/// A scholarly work, keyed by its normalised DOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    pub doi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn_l: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposited: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// First publisher-assigned alternative id, e.g. an Elsevier PII.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_author: Option<String>,
    #[serde(default)]
    pub journal_policy: JournalPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crossref_licenses: Vec<CrossrefLicense>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pmc_links: Vec<PmcLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s2: Option<S2Lookup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_scrape: Option<StoredScrape>,
    /// Full-text link from the registration agency's text-mining metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_mining_pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_doi_url: Option<String>,
    /// HTTP status of the DOI resolution, `-1` when it could not be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_doi_status: Option<i32>,
    /// Preprints of this work, already loaded by the metadata store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprints: Vec<Work>,
    /// Published versions of this work when it is itself a preprint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postprints: Vec<Work>,
    /// OA status recorded by the previous resolution pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_oa_status: Option<OaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Work {
    /// Create a work from any DOI form; `None` if no DOI can be found in it.
    pub fn new(raw_doi: &str) -> Option<Self> {
        let doi = normalize_doi(raw_doi)?;
        Some(Self {
            doi,
            title: None,
            publisher: None,
            journal: None,
            issn_l: None,
            issns: Vec::new(),
            issued: None,
            deposited: None,
            genre: None,
            alternative_id: None,
            first_author: None,
            last_author: None,
            journal_policy: JournalPolicy::default(),
            crossref_licenses: Vec::new(),
            pmc_links: Vec::new(),
            s2: None,
            stored_scrape: None,
            text_mining_pdf_url: None,
            resolved_doi_url: None,
            resolved_doi_status: None,
            preprints: Vec::new(),
            postprints: Vec::new(),
            current_oa_status: None,
            last_refresh: None,
        })
    }

    /// Re-normalise the identifier after deserialisation.
    pub fn normalized(mut self) -> Self {
        if let Some(doi) = normalize_doi(&self.doi) {
            self.doi = doi;
        }
        self.preprints = self.preprints.into_iter().map(Self::normalized).collect();
        self.postprints = self.postprints.into_iter().map(Self::normalized).collect();
        self
    }

    pub fn url(&self) -> String {
        doi_url(&self.doi)
    }

    pub fn year(&self) -> Option<i32> {
        self.issued.map(|d| d.year())
    }

    /// Best known publication date; the epoch when nothing is known.
    pub fn published_date(&self) -> NaiveDate {
        self.issued.or(self.deposited).unwrap_or_default()
    }

    pub fn genre(&self) -> &str {
        self.genre.as_deref().unwrap_or("")
    }

    pub fn is_same_publisher(&self, name: &str) -> bool {
        is_same_publisher(self.publisher.as_deref(), name)
    }

    /// Posted content outside any journal.
    pub fn is_preprint(&self) -> bool {
        self.genre() == "posted-content" && self.issns.is_empty()
    }

    pub fn is_springer_ebook(&self) -> bool {
        self.doi.starts_with("10.1007")
            && self
                .publisher
                .as_deref()
                .is_some_and(|p| p.to_lowercase().contains("springer"))
            && self.genre().contains("book")
    }

    /// Works that are reported closed whatever the evidence says.
    pub fn is_closed_exception(&self) -> bool {
        self.is_springer_ebook() || self.issns.iter().any(|i| CLOSED_ISSNS.contains(&i.as_str()))
    }

    /// DOI links for this work lead somewhere other than the article.
    pub fn has_bad_doi_url(&self) -> bool {
        self.issns
            .iter()
            .any(|i| BAD_DOI_URL_ISSNS.contains(&i.as_str()))
            || BAD_DOI_URL_PREFIXES.iter().any(|p| self.doi.starts_with(p))
    }

    /// The DOI resolved to a missing page on the last check.
    pub fn doi_resolution_failed(&self) -> bool {
        matches!(self.resolved_doi_status, Some(404) | Some(-1))
    }

    /// Journal-level records never get a publisher scrape.
    pub fn should_scrape_publisher_page(&self) -> bool {
        self.genre() != "journal"
    }

    /// Whether a PDF link on the publisher page can be trusted to be this article.
    pub fn should_look_for_publisher_pdf(&self) -> bool {
        if self.genre() == "book" {
            return self.is_same_publisher("Université Paris Cité");
        }
        if let Some(issn_l) = self.issn_l.as_deref() {
            if WHOLE_ISSUE_PDF_ISSNS.contains(&issn_l) {
                return false;
            }
            if issn_l == "0007-0610" && self.year().is_some_and(|y| y <= 1999) {
                return false;
            }
        }
        true
    }

    /// Publisher-specific licenses from Elsevier read as free-to-read (bronze).
    pub fn elsevier_bronze_exception(&self, license: Option<License>) -> bool {
        if license != Some(License::PublisherSpecificOa) {
            return false;
        }
        self.publisher
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains("elsevier"))
            || self
                .resolved_doi_url
                .as_deref()
                .is_some_and(|u| u.contains("sciencedirect.com"))
            || self.doi.starts_with("10.1016")
    }

    /// End of a predicted delayed-access embargo, if it lies after `today`.
    pub fn predicted_bronze_embargo_end(&self, today: NaiveDate) -> Option<NaiveDate> {
        let embargo = self.journal_policy.embargo_days?;
        let end = self.published_date() + Duration::days(embargo);
        (end > today).then_some(end)
    }

    /// A copy without preprint or postprint links, for resolving related works
    /// without recursing back into this one.
    pub fn without_links(&self) -> Self {
        let mut work = self.clone();
        work.preprints.clear();
        work.postprints.clear();
        work
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(doi: &str) -> Work {
        Work::new(doi).unwrap()
    }

    #[test]
    fn test_new_normalizes_doi() {
        let w = work("https://doi.org/10.1234/ABC.def");
        assert_eq!(w.doi, "10.1234/abc.def");
        assert_eq!(w.url(), "https://doi.org/10.1234/abc.def");
        assert!(Work::new("not a doi").is_none());
    }

    #[test]
    fn test_is_preprint() {
        let mut w = work("10.1101/2020.01.01.000001");
        w.genre = Some("posted-content".into());
        assert!(w.is_preprint());
        w.issns.push("1234-5678".into());
        assert!(!w.is_preprint());
    }

    #[test]
    fn test_closed_exceptions() {
        let mut w = work("10.1007/978-3-030-00000-0");
        w.publisher = Some("Springer International Publishing".into());
        w.genre = Some("book-chapter".into());
        assert!(w.is_closed_exception());

        let mut w = work("10.1234/x");
        w.issns = vec!["1751-2409".into()];
        assert!(w.is_closed_exception());
    }

    #[test]
    fn test_bad_doi_url() {
        assert!(work("10.5004/dwt.2020.1").has_bad_doi_url());
        let mut w = work("10.1234/x");
        assert!(!w.has_bad_doi_url());
        w.issns = vec!["2237-0722".into()];
        assert!(w.has_bad_doi_url());
    }

    #[test]
    fn test_elsevier_bronze_exception() {
        let w = work("10.1016/j.cell.2020.01.001");
        assert!(w.elsevier_bronze_exception(Some(License::PublisherSpecificOa)));
        assert!(!w.elsevier_bronze_exception(Some(License::CcBy)));
        assert!(!work("10.1234/x").elsevier_bronze_exception(Some(License::PublisherSpecificOa)));
    }

    #[test]
    fn test_predicted_bronze_embargo_end() {
        let mut w = work("10.1234/x");
        w.issued = NaiveDate::from_ymd_opt(2024, 1, 1);
        w.journal_policy.embargo_days = Some(365);
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            w.predicted_bronze_embargo_end(today),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        let later = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(w.predicted_bronze_embargo_end(later), None);
    }

    #[test]
    fn test_publisher_pdf_search_exceptions() {
        let mut w = work("10.1234/x");
        assert!(w.should_look_for_publisher_pdf());
        w.genre = Some("book".into());
        assert!(!w.should_look_for_publisher_pdf());
        w.genre = Some("journal-article".into());
        w.issn_l = Some("0007-0610".into());
        w.issued = NaiveDate::from_ymd_opt(1998, 3, 1);
        assert!(!w.should_look_for_publisher_pdf());
        w.issued = NaiveDate::from_ymd_opt(2005, 3, 1);
        assert!(w.should_look_for_publisher_pdf());
        w.genre = Some("journal".into());
        assert!(!w.should_scrape_publisher_page());
    }

    #[test]
    fn test_open_listing_covers_year() {
        let listing = OpenListing {
            license: None,
            since_year: Some(2015),
        };
        assert!(listing.covers(Some(2016)));
        assert!(!listing.covers(Some(2010)));
        assert!(!listing.covers(None));
        assert!(OpenListing::default().covers(None));
    }
}
