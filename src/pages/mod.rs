//! Landing-page scrapers: one variant per kind of page, sharing the fetch
//! layer and the classifier.
//!
//! A scrape never fails. Fetch and parse problems are written to the
//! outcome's error text and the page is reported as not open.

mod pmc;
mod publisher;
mod repository;
mod verify;

pub use pmc::{PmcPage, DEFAULT_EUROPEPMC_API_URL};
pub use publisher::PublisherPage;
pub use repository::RepositoryPage;

use std::sync::Arc;

use crate::http_client::{FetchError, FetchOptions, HttpResponse};
use crate::models::{ScrapeOutcome, ScrapeTarget};
use crate::redirect::RedirectResolver;
use crate::services::{
    archive_quietly, ArchiveKind, ArchiveSink, MetricsSink, NullArchiveSink, PdfTextExtractor,
    PdftotextExtractor, TracingMetricsSink,
};

/// Pages of PDF text read when looking for version cues.
pub const MAX_PDF_TEXT_PAGES: u32 = 25;

/// A page to scrape, tagged by the kind of site serving it.
#[derive(Debug, Clone)]
pub enum LandingPage {
    Publisher(PublisherPage),
    Repository(RepositoryPage),
    Pmc(PmcPage),
}

impl LandingPage {
    /// Pick the variant for a harvested target.
    pub fn for_target(target: &ScrapeTarget) -> Self {
        if target.is_publisher_equivalent() {
            return Self::Publisher(PublisherPage::new(&target.url));
        }
        match target.pmcid() {
            Some(pmcid) => Self::Pmc(PmcPage::new(&pmcid)),
            None => Self::Repository(RepositoryPage::from_target(target)),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Publisher(page) => &page.url,
            Self::Repository(page) => &page.url,
            Self::Pmc(page) => &page.pmcid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Publisher(_) => "publisher",
            Self::Repository(_) => "repository",
            Self::Pmc(_) => "pmc",
        }
    }
}

/// What one scrape produced.
#[derive(Debug, Default)]
pub struct PageScrape {
    pub outcome: ScrapeOutcome,
    /// Markup of the landing page, when one was read.
    pub landing_page: Option<String>,
    /// The verified full-text PDF, when one was fetched.
    pub pdf: Option<HttpResponse>,
}

/// Scrapes landing pages through the shared redirect resolver.
#[derive(Clone)]
pub struct PageScraper {
    resolver: RedirectResolver,
    pdf_text: Arc<dyn PdfTextExtractor>,
    archive: Arc<dyn ArchiveSink>,
    metrics: Arc<dyn MetricsSink>,
    europepmc_api_url: String,
}

impl PageScraper {
    pub fn new(resolver: RedirectResolver) -> Self {
        Self {
            resolver,
            pdf_text: Arc::new(PdftotextExtractor::new()),
            archive: Arc::new(NullArchiveSink),
            metrics: Arc::new(TracingMetricsSink),
            europepmc_api_url: DEFAULT_EUROPEPMC_API_URL.to_string(),
        }
    }

    pub fn with_pdf_text(mut self, pdf_text: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf_text = pdf_text;
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveSink>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_europepmc_api_url(mut self, url: impl Into<String>) -> Self {
        self.europepmc_api_url = url.into();
        self
    }

    pub fn resolver(&self) -> &RedirectResolver {
        &self.resolver
    }

    /// Scrape one page.
    pub async fn scrape(&self, page: &LandingPage) -> PageScrape {
        let kind = page.kind();
        self.metrics.incr(&format!("scrape.{}.attempted", kind), 1);
        tracing::debug!("Scraping {} page {}", kind, page.url());

        let scrape = match page {
            LandingPage::Publisher(p) => publisher::scrape(self, p).await,
            LandingPage::Repository(p) => repository::scrape(self, p).await,
            LandingPage::Pmc(p) => pmc::scrape(self, p).await,
        };

        if scrape.outcome.is_open() {
            self.metrics.incr(&format!("scrape.{}.open", kind), 1);
        }
        if !scrape.outcome.error.is_empty() {
            self.metrics.incr(&format!("scrape.{}.error", kind), 1);
        }
        scrape
    }

    /// Scrape a harvested target and archive what was read.
    pub async fn scrape_target(&self, target: &ScrapeTarget) -> ScrapeOutcome {
        let page = LandingPage::for_target(target);
        let scrape = self.scrape(&page).await;

        if let Some(markup) = &scrape.landing_page {
            archive_quietly(self.archive.as_ref(), &target.id, ArchiveKind::LandingPage, markup.as_bytes())
                .await;
        }
        if let Some(pdf) = &scrape.pdf {
            archive_quietly(self.archive.as_ref(), &target.id, ArchiveKind::Pdf, pdf.body()).await;
        }

        let mut outcome = scrape.outcome;
        if target.is_publisher_equivalent() && outcome.is_open() && outcome.pdf_url.is_none() {
            outcome.metadata_url = Some(target.url.clone());
        }
        outcome
    }

    pub(crate) fn fetch_options(&self, ask_slowly: bool) -> FetchOptions {
        FetchOptions {
            ask_slowly,
            session_id: Some(uuid::Uuid::new_v4().simple().to_string()),
            ..FetchOptions::default()
        }
    }
}

/// Record a fetch failure. Oversized bodies are "no evidence", not errors.
pub(crate) fn record_fetch_error(outcome: &mut ScrapeOutcome, url: &str, error: &FetchError, during: &str) {
    if error.is_too_large() {
        tracing::info!("{} is too large, skipping ({})", url, error);
        return;
    }
    let message = format!("ERROR: {} on {} in {}", error, url, during);
    tracing::info!("{}", message);
    outcome.record_error(message);
}

/// Record a non-200 status. 401 just means the page is closed.
pub(crate) fn record_status(outcome: &mut ScrapeOutcome, status: u16, url: &str, during: &str) {
    if status == 401 {
        tracing::debug!("{} is unauthorized, not open", url);
        return;
    }
    let message = format!("ERROR: status_code={} on {} in {}", status, url, during);
    tracing::info!("{}", message);
    outcome.record_error(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PUBLISHER_EQUIVALENT_ENDPOINT_ID;
    use crate::models::PUBLISHER_EQUIVALENT_PMH_ID;

    #[test]
    fn test_variant_for_target() {
        let pmc = ScrapeTarget::new(
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123",
            Some("oai:pubmedcentral.nih.gov:123"),
            None,
        );
        assert_eq!(LandingPage::for_target(&pmc).kind(), "pmc");

        let equivalent = ScrapeTarget::new(
            "https://publisher.example.com/article/1",
            Some(PUBLISHER_EQUIVALENT_PMH_ID),
            Some(PUBLISHER_EQUIVALENT_ENDPOINT_ID),
        );
        assert_eq!(LandingPage::for_target(&equivalent).kind(), "publisher");

        let repo = ScrapeTarget::new("https://repo.example.edu/1", Some("oai:repo:1"), Some("ep"));
        let page = LandingPage::for_target(&repo);
        assert_eq!(page.kind(), "repository");
        assert_eq!(page.url(), "https://repo.example.edu/1");
    }

    #[test]
    fn test_too_large_is_not_an_error() {
        let mut outcome = ScrapeOutcome::default();
        record_fetch_error(
            &mut outcome,
            "https://x/big.pdf",
            &FetchError::TooLarge { limit: 1, observed: 2 },
            "gets_a_pdf",
        );
        assert!(outcome.error.is_empty());

        record_fetch_error(&mut outcome, "https://x/", &FetchError::Transient("reset".into()), "gets_a_pdf");
        assert!(outcome.error.starts_with("ERROR: Transient fetch error: reset on https://x/"));

        record_status(&mut outcome, 401, "https://x/", "gets_a_pdf");
        assert!(!outcome.error.contains("401"));
        record_status(&mut outcome, 403, "https://x/", "gets_a_pdf");
        assert!(outcome.error.contains("status_code=403"));
    }
}
