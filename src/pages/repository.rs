//! Repository landing pages, harvested over OAI-PMH.

use std::sync::LazyLock;

use regex::Regex;

use super::{record_fetch_error, record_status, PageScrape, PageScraper, MAX_PDF_TEXT_PAGES};
use crate::classify::rules::trust_repository_license;
use crate::classify::version::{apply_overrides, apply_pdf_text, apply_record, default_version, version_from_landing_page};
use crate::classify::{
    discard_pdf_url, find_bhl_view_link, find_doc_download_link, find_normalized_license, find_pdf_link,
    is_a_pdf_page, is_word_doc, looks_like_html, try_pdf_link_as_doc, Link, PageContext, PageKind,
    PdfEvidence, VersionCascade, VersionSource,
};
use crate::http_client::{FetchOptions, HttpResponse};
use crate::models::evidence::repository_match;
use crate::models::{MatchType, ScrapeOutcome, ScrapeTarget, Version};
use crate::utils::{clean_url, extract_domain, get_link_target};

/// URL fragments of sites that asked not to be scraped, or are read another way.
const DO_NOT_SCRAPE: &[&str] = &[
    "ncbi.nlm.nih.gov",
    "europepmc.org",
    "/europepmc/",
    "pubmed",
    "elar.rsvpu.ru",
    "elib.uraic.ru",
    "elar.usfeu.ru",
    "elar.urfu.ru",
    "elar.uspu.ru",
];

static DIRECT_PDF_SUPPLEMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:pure\.mpg\.de|authors\.library\.caltech\.edu)").unwrap());
static CITESEERX_DOWNLOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<h3>Download Links</h3>.*?href="(.*?)""#).unwrap());
static CONTENTDM_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://cdm21054\.contentdm\.oclc\.org/digital/collection/IR/id/(\d+)").unwrap());

/// A repository record's landing page.
#[derive(Debug, Clone)]
pub struct RepositoryPage {
    pub url: String,
    pub pmh_id: Option<String>,
    pub endpoint_id: Option<String>,
    /// How the record was matched to the work, used for the evidence text.
    pub match_type: Option<MatchType>,
    pub no_submitted_versions: bool,
    pub record_xml: Option<String>,
}

impl RepositoryPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            pmh_id: None,
            endpoint_id: None,
            match_type: None,
            no_submitted_versions: false,
            record_xml: None,
        }
    }

    pub fn from_target(target: &ScrapeTarget) -> Self {
        Self {
            url: target.url.clone(),
            pmh_id: target.pmh_id.clone(),
            endpoint_id: target.endpoint_id.clone(),
            match_type: None,
            no_submitted_versions: target.no_submitted_versions,
            record_xml: target.record_xml.clone(),
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = Some(match_type);
        self
    }

    fn is_arxiv(&self) -> bool {
        self.pmh_id.as_deref().is_some_and(|id| id.contains("oai:arXiv.org"))
    }
}

fn on_do_not_scrape_list(url: &str) -> bool {
    DO_NOT_SCRAPE.iter().any(|fragment| url.contains(fragment))
}

fn use_resolved_landing_url(resolved_url: &str) -> bool {
    extract_domain(resolved_url).is_some_and(|host| host.ends_with("adsabs.harvard.edu"))
}

fn repository_pdf_link(url: &str, html: &str, ctx: &PageContext<'_>, resolved_url: &str) -> Option<Link> {
    let link = if url.contains("citeseerx.ist.psu.edu/") {
        // Prefer the copy on the third-party site over the cached one.
        CITESEERX_DOWNLOAD
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| Link::new(m.as_str(), "download"))
    } else if html.contains("osf-cookie") {
        let href = format!("{}/download", url).replace("//download", "/download");
        Some(Link::new(href, "download"))
    } else {
        find_pdf_link(html, &ctx.links(resolved_url))
    };

    link.or_else(|| {
        CONTENTDM_ITEM
            .captures(resolved_url)
            .and_then(|c| c.get(1))
            .map(|id| Link::new(format!("/digital/api/collection/IR/id/{}/download", id.as_str()), "download"))
    })
}

/// Look for full text on the landing page itself.
async fn scrape_landing_page(scraper: &PageScraper, page: &RepositoryPage, opts: &FetchOptions, scrape: &mut PageScrape) {
    let url = page.url.as_str();
    if on_do_not_scrape_list(url) {
        tracing::info!("not scraping {} because it is on the do not scrape list", url);
        return;
    }

    let resolved = match scraper.resolver.resolve(url, None, opts).await {
        Ok(resolved) => resolved,
        Err(e) => {
            record_fetch_error(&mut scrape.outcome, url, &e, "scrape_for_fulltext_link");
            return;
        }
    };
    let response = resolved.response;
    let resolved_url = response.url.clone();
    let metadata_url = if use_resolved_landing_url(&resolved_url) {
        resolved_url.clone()
    } else {
        url.to_string()
    };

    if response.status.as_u16() != 200 {
        record_status(&mut scrape.outcome, response.status.as_u16(), url, "scrape_for_fulltext_link");
        return;
    }

    let ctx = PageContext {
        url,
        publisher: None,
        issn_l: None,
        kind: PageKind::Repository,
    };

    if is_a_pdf_page(&response, &ctx.rules(&resolved_url)) {
        if DIRECT_PDF_SUPPLEMENTS.is_match(&resolved_url) {
            tracing::debug!("ignoring direct pdf link {}", resolved_url);
        } else {
            tracing::debug!("{} is a PDF", resolved_url);
            scrape.outcome.pdf_url = Some(url.to_string());
            scrape.pdf = Some(response);
        }
        return;
    }

    if is_word_doc(&response) {
        tracing::debug!("{} is a word doc", url);
        scrape.outcome.metadata_url = Some(metadata_url);
        return;
    }

    let html = response.text();
    if !html.is_empty() && !looks_like_html(&html) {
        return;
    }
    scrape.landing_page = Some(html.clone());

    let outcome = &mut scrape.outcome;
    outcome.license = find_normalized_license(&html);
    outcome.version = version_from_landing_page(&resolved_url, &html);

    let pdf_link = repository_pdf_link(url, &html, &ctx, &resolved_url);
    if let Some(link) = &pdf_link {
        tracing::debug!("found a PDF download link: {} {} [{}]", link.href, link.anchor, url);
        let pdf_url = get_link_target(&link.href, &resolved_url);
        if let Some(pdf) = scraper.gets_a_pdf(link, &resolved_url, None, opts, outcome).await {
            outcome.metadata_url = Some(metadata_url);
            if link.anchor.to_lowercase().contains("accepted version") {
                outcome.version = Some(Version::Accepted);
            }
            if !discard_pdf_url(&pdf_url, &resolved_url) {
                outcome.pdf_url = Some(pdf_url);
                scrape.pdf = Some(pdf);
            }
            return;
        }
    }

    let doc_link = find_doc_download_link(&html)
        .or_else(|| pdf_link.filter(|_| try_pdf_link_as_doc(&resolved_url)));
    if let Some(link) = doc_link {
        if scraper.gets_a_word_doc(&link, &resolved_url, opts, outcome).await {
            tracing::debug!("{} links a word doc", url);
            outcome.metadata_url = Some(metadata_url);
            return;
        }
    }

    if let Some(link) = find_bhl_view_link(&resolved_url, &html) {
        tracing::info!("found a BHL document link: {}", get_link_target(&link.href, &resolved_url));
        outcome.metadata_url = Some(metadata_url);
        return;
    }

    if trust_repository_license(&resolved_url) {
        if let Some(license) = outcome.license {
            tracing::info!("trusting license {}", license);
            outcome.metadata_url = Some(metadata_url);
        }
    }
}

/// Settle version and license from policy, the harvested record and the PDF.
async fn settle_version(
    scraper: &PageScraper,
    page: &RepositoryPage,
    opts: &FetchOptions,
    outcome: &mut ScrapeOutcome,
    pdf: Option<&HttpResponse>,
) {
    let pmh_id = page.pmh_id.as_deref();
    let mut cascade = VersionCascade::new(default_version(page.no_submitted_versions, pmh_id));
    cascade.set_license(outcome.license);
    apply_record(
        &mut cascade,
        page.no_submitted_versions,
        page.record_xml.as_deref(),
        pmh_id,
        outcome.pdf_url.as_deref(),
    );

    if cascade.source() < VersionSource::StrictMetadata {
        let fetched = match (pdf, outcome.pdf_url.clone()) {
            (Some(_), _) | (None, None) => None,
            (None, Some(pdf_url)) => {
                scraper
                    .fetch_pdf(&pdf_url, None, opts, outcome, "set_version_and_license")
                    .await
            }
        };
        if let Some(pdf) = pdf.or(fetched.as_ref()) {
            match scraper.pdf_text.extract(pdf.body(), MAX_PDF_TEXT_PAGES).await {
                Ok(text) => {
                    let raw_text = String::from_utf8_lossy(pdf.body());
                    apply_pdf_text(
                        &mut cascade,
                        &PdfEvidence {
                            raw_text: &raw_text,
                            pages: &text.pages,
                            url: &pdf.url,
                        },
                    );
                }
                Err(e) => tracing::info!("couldn't read text of {}: {}", pdf.url, e),
            }
        }
        apply_overrides(&mut cascade, pmh_id);
    }

    tracing::debug!(
        "settled {} as {} from {:?}, license {:?}",
        page.url,
        cascade.version().as_str(),
        cascade.source(),
        cascade.license()
    );
    outcome.version = Some(cascade.version());
    outcome.license = cascade.license();
}

pub(super) async fn scrape(scraper: &PageScraper, page: &RepositoryPage) -> PageScrape {
    let mut scrape = PageScrape::default();
    let opts = scraper.fetch_options(false);

    if page.is_arxiv() {
        scrape.outcome.metadata_url = Some(page.url.clone());
        scrape.outcome.pdf_url = Some(page.url.replace("abs", "pdf"));
    } else {
        scrape_landing_page(scraper, page, &opts, &mut scrape).await;
    }

    if scrape.outcome.is_open() {
        if scrape.outcome.metadata_url.is_none() {
            scrape.outcome.metadata_url = Some(page.url.clone());
        }
        if scrape.outcome.version.is_none() {
            settle_version(scraper, page, &opts, &mut scrape.outcome, scrape.pdf.as_ref()).await;
        }
    }

    let outcome = &mut scrape.outcome;
    outcome.metadata_url = outcome.metadata_url.as_deref().map(clean_url);
    outcome.pdf_url = outcome.pdf_url.as_deref().map(clean_url);
    if outcome.is_open() {
        outcome.evidence = page.match_type.map(repository_match);
    } else {
        outcome.license = None;
        outcome.version = None;
    }

    scrape
}
