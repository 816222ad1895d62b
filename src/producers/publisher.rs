//! Publisher landing-page evidence: the stored result of the last live
//! scrape, and the live scrape that refreshes it.

use chrono::{DateTime, Duration, Utc};

use super::{make_preprint, Candidates, LocationProducer, ProducerContext};
use crate::models::{OaStatus, OpenLocation, StoredScrape, Version, Work};
use crate::pages::{LandingPage, PageScraper, PublisherPage};

/// Journal of Neuroscience opens articles six months after publication.
const DELAYED_OPEN_ISSN_L: &str = "0270-6474";
const DELAYED_OPEN_DAYS: i64 = 190;

/// The stored publisher scrape as a location.
pub struct StoredScrapeProducer;

impl StoredScrapeProducer {
    pub fn location(work: &Work, stored: &StoredScrape) -> Option<OpenLocation> {
        if !stored.is_open() {
            return None;
        }
        let evidence = stored.evidence.clone().unwrap_or_default();
        let version = match stored.pdf_url.as_deref() {
            Some(pdf) if pdf.contains("/article/am/pii/") => Version::Accepted,
            _ => Version::Published,
        };
        let mut location = OpenLocation::new(evidence)
            .with_pdf_url(stored.pdf_url.clone())
            .with_metadata_url(stored.metadata_url.clone())
            .with_license(stored.license)
            .with_version(Some(version))
            .with_updated_at(stored.updated)
            .with_doi(&work.doi);
        location.bronze_exception = work.elsevier_bronze_exception(stored.license);

        if work.is_preprint() {
            location = make_preprint(location);
        }
        if matches!(location.oa_status(), OaStatus::Gold | OaStatus::Hybrid | OaStatus::Green) {
            location.oa_date = work.issued;
        }
        Some(location)
    }
}

impl LocationProducer for StoredScrapeProducer {
    fn name(&self) -> &'static str {
        "stored_scrape"
    }

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        let Some(mut location) = work
            .stored_scrape
            .as_ref()
            .and_then(|stored| Self::location(work, stored))
        else {
            return candidates;
        };

        if work.issn_l.as_deref() == Some(DELAYED_OPEN_ISSN_L) && location.oa_date.is_some() {
            location.oa_date = location.oa_date.map(|d| d + Duration::days(DELAYED_OPEN_DAYS));
            candidates.push_dated(location, ctx.today);
        } else {
            candidates.push_open(location);
        }
        candidates
    }
}

/// Scrape the work's DOI landing page and return the result in stored form.
///
/// Returns `None` for works whose publisher page is never scraped. A page
/// that shows nothing open is stored with `closed` evidence.
pub async fn scrape_publisher_page(
    scraper: &PageScraper,
    work: &Work,
    now: DateTime<Utc>,
) -> Option<StoredScrape> {
    if !work.should_scrape_publisher_page() {
        tracing::info!("skipping publisher scrape for {}", work.doi);
        return None;
    }
    let page = LandingPage::Publisher(PublisherPage::for_work(work));
    let outcome = scraper.scrape(&page).await.outcome;
    if !outcome.error.is_empty() {
        tracing::info!("publisher scrape of {} recorded: {}", work.doi, outcome.error);
    }

    let open = outcome.is_open() && outcome.evidence.is_some();
    Some(StoredScrape {
        evidence: Some(if open {
            outcome.evidence.unwrap_or_default()
        } else {
            "closed".to_string()
        }),
        pdf_url: outcome.pdf_url.filter(|_| open),
        metadata_url: outcome.metadata_url.filter(|_| open),
        license: outcome.license.filter(|_| open),
        updated: Some(now),
    })
}
