//! Publisher landing pages.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{record_fetch_error, record_status, PageScrape, PageScraper};
use crate::classify::{
    access_signal, backup_access_signal, find_normalized_license, find_pdf_link, get_pdf_in_meta,
    is_a_pdf_page, license_statement, looks_like_html, page_potential_license_text,
    rewrite_publisher_pdf_url, AccessSignal, Link, PageContext, PageKind, PageLicense,
};
use crate::classify::rules::trust_publisher_license;
use crate::models::evidence::{FREE_ARTICLE, FREE_PDF, PAGE_SAYS_LICENSE, PAGE_SAYS_OPEN_ACCESS};
use crate::models::{License, ScrapeOutcome, Version, Work};
use crate::utils::{extract_domain, fix_url_scheme, get_link_target, is_same_publisher};

const AUTHOR_MANUSCRIPT: &str = "open (author manuscript)";

static IEEE_PDF_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""pdfPath":\s*"(/ielx?7/[\d/]*\.pdf)""#).unwrap());
static TANDF_FULL_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://(?:www\.)?tandfonline\.com/doi/full/(10\..+)").unwrap());
static OJS_GENERATOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(r#"meta[name="generator"][content^="Open Journal Systems"]"#).ok());
static OJS_ISSUE_ARTICLES: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(r#"div[role="main"] li a[id^="article-"]"#).ok());

/// A publisher's landing page for one article.
#[derive(Debug, Clone)]
pub struct PublisherPage {
    pub url: String,
    pub publisher: Option<String>,
    pub issn_l: Option<String>,
    /// Look for a PDF link at all; off for journals whose PDFs are whole issues.
    pub find_pdf_link: bool,
    /// Fallback PDF URL from the registration agency, tried when the page has none.
    pub pdf_hint: Option<String>,
}

impl PublisherPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            publisher: None,
            issn_l: None,
            find_pdf_link: true,
            pdf_hint: None,
        }
    }

    /// The DOI landing page of `work`.
    pub fn for_work(work: &Work) -> Self {
        Self {
            url: work.url(),
            publisher: work.publisher.clone(),
            issn_l: work.issn_l.clone(),
            find_pdf_link: work.should_look_for_publisher_pdf(),
            pdf_hint: work.text_mining_pdf_url.clone(),
        }
    }
}

fn use_resolved_landing_url(resolved_url: &str) -> bool {
    extract_domain(resolved_url).is_some_and(|host| host.ends_with("journals.lww.com"))
}

/// A PDF served straight from the DOI is trusted, except from OUP.
fn trust_pdf_landing_pages(publisher: Option<&str>) -> bool {
    !is_same_publisher(publisher, "Oxford University Press (OUP)")
}

/// OJS issue tables of contents list every article in the issue.
fn is_ojs_issue_index(html: &str) -> bool {
    let (Some(generator), Some(articles)) = (OJS_GENERATOR.as_ref(), OJS_ISSUE_ARTICLES.as_ref()) else {
        return false;
    };
    let document = Html::parse_document(html);
    if document.select(generator).next().is_none() {
        return false;
    }
    document.select(articles).count() > 1
}

/// Known PDF locations for hosts that don't link them in markup.
fn fallback_pdf_link(host: &str, html: &str, resolved_url: &str) -> Option<Link> {
    if host.ends_with("ieeexplore.ieee.org") {
        if let Some(path) = IEEE_PDF_PATH.captures(html).and_then(|c| c.get(1)) {
            return Some(Link::new(path.as_str().replace("iel7", "ielx7"), "download"));
        }
    }
    if ["osf.io", "psyarxiv.com"].iter().any(|h| host.ends_with(h)) {
        return Some(Link::new(get_link_target("download", resolved_url), "download"));
    }
    None
}

fn mark_open(outcome: &mut ScrapeOutcome, metadata_url: &str, evidence: &str) {
    outcome.metadata_url = Some(metadata_url.to_string());
    outcome.evidence = Some(evidence.to_string());
}

pub(super) async fn scrape(scraper: &PageScraper, page: &PublisherPage) -> PageScrape {
    let mut scrape = PageScrape::default();
    let publisher = page.publisher.as_deref();
    let opts = scraper.fetch_options(true);
    tracing::debug!("checking to see if {} says it is open", page.url);

    let resolved = match scraper.resolver.resolve(&page.url, publisher, &opts).await {
        Ok(resolved) => resolved,
        Err(e) => {
            record_fetch_error(&mut scrape.outcome, &page.url, &e, "scrape_for_fulltext_link");
            return scrape;
        }
    };
    let response = resolved.response;
    let resolved_url = response.url.clone();
    let metadata_url = if use_resolved_landing_url(&resolved_url) {
        resolved_url.clone()
    } else {
        page.url.clone()
    };

    if response.status.as_u16() != 200 {
        record_status(
            &mut scrape.outcome,
            response.status.as_u16(),
            &resolved_url,
            "scrape_for_fulltext_link",
        );
        return scrape;
    }

    if resolved_url.contains("crossref.org/_deleted-doi/") {
        tracing::info!("{} is a deleted doi", page.url);
        return scrape;
    }

    let ctx = PageContext {
        url: &page.url,
        publisher,
        issn_l: page.issn_l.as_deref(),
        kind: PageKind::Publisher,
    };
    let rule_ctx = ctx.rules(&resolved_url);

    if is_a_pdf_page(&response, &rule_ctx) {
        if trust_pdf_landing_pages(publisher) {
            tracing::debug!("landing page {} is a PDF", page.url);
            scrape.outcome.pdf_url = Some(fix_url_scheme(&page.url));
            scrape.outcome.evidence = Some(FREE_PDF.to_string());
            scrape.outcome.version = Some(Version::Published);
            scrape.pdf = Some(response);
        } else {
            tracing::debug!("landing page {} is an untrusted PDF", page.url);
        }
        return scrape;
    }

    let html = response.text();
    if !html.is_empty() && !looks_like_html(&html) {
        tracing::debug!("{} is not html, skipping", resolved_url);
        return scrape;
    }
    scrape.landing_page = Some(html.clone());

    let host = extract_domain(&resolved_url).unwrap_or_default();
    if host.ends_with("ssrn.com") {
        tracing::info!("not looking for full text at {}", host);
        return scrape;
    }

    if is_ojs_issue_index(&html) {
        tracing::info!("{} looks like a full issue index from OJS, skipping", resolved_url);
        return scrape;
    }

    let license_text = page_potential_license_text(&html);
    let trusted_license = trust_publisher_license(&resolved_url);
    let outcome = &mut scrape.outcome;

    let link = if page.find_pdf_link {
        find_pdf_link(&html, &ctx.links(&resolved_url))
    } else {
        tracing::info!("skipping pdf search on {}", resolved_url);
        None
    }
    .or_else(|| fallback_pdf_link(&host, &html, &resolved_url))
    .or_else(|| {
        page.pdf_hint.as_ref().map(|hint| {
            tracing::info!("using hint {}", hint);
            Link::new(hint.clone(), "xref pdf url")
        })
    });

    if let Some(mut link) = link {
        let pdf_url = rewrite_publisher_pdf_url(&get_link_target(&link.href, &resolved_url));
        link.href = pdf_url.clone();

        if let Some(pdf) = scraper
            .gets_a_pdf(&link, &resolved_url, publisher, &opts, outcome)
            .await
        {
            mark_open(outcome, &metadata_url, FREE_PDF);
            // Token links work but expire; keep only the landing page.
            if !(pdf_url.contains("pdfs.journals.lww.com") && pdf_url.contains("token=")) {
                outcome.pdf_url = Some(pdf_url);
            }
            if trusted_license {
                if let Some(license) = find_normalized_license(&license_text) {
                    outcome.license = Some(license);
                }
            }
            scrape.pdf = Some(pdf);
        } else if pdf_url.starts_with("https://www.sciencedirect.com/science/article/pii/") {
            let manuscript_url = pdf_url.replace("/article/pii/", "/article/am/pii/");
            if let Some(pdf) = scraper
                .fetch_pdf(&manuscript_url, publisher, &opts, outcome, "gets_a_pdf")
                .await
            {
                mark_open(outcome, &metadata_url, AUTHOR_MANUSCRIPT);
                outcome.pdf_url = Some(manuscript_url);
                outcome.version = Some(Version::Accepted);
                scrape.pdf = Some(pdf);
            }
        }
    }

    let citation_pdf = get_pdf_in_meta(&html).map(|l| l.href);
    match access_signal(&html, &rule_ctx, citation_pdf.as_deref()) {
        Some(AccessSignal::Free) => mark_open(outcome, &metadata_url, FREE_ARTICLE),
        Some(AccessSignal::OpenAccess) => {
            mark_open(outcome, &metadata_url, PAGE_SAYS_OPEN_ACCESS);
            outcome.license = Some(License::UnspecifiedOa);
        }
        None => {}
    }

    if outcome.license.is_none() && backup_access_signal(&html, &rule_ctx).is_some() {
        mark_open(outcome, &metadata_url, PAGE_SAYS_OPEN_ACCESS);
        outcome.license = Some(License::UnspecifiedOa);
    }

    if outcome.license.is_none() {
        if let Some(doi) = TANDF_FULL_TEXT.captures(&resolved_url).and_then(|c| c.get(1)) {
            let tab_url = format!("https://www.tandfonline.com/action/showCopyRight?doi={}", doi.as_str());
            tracing::info!("looking for license tab {} on T&F landing page {}", tab_url, resolved_url);
            match scraper.resolver.resolve(&tab_url, publisher, &opts).await {
                Ok(tab) if tab.response.status.as_u16() == 200 => {
                    let tab_text = page_potential_license_text(&tab.response.text());
                    if let Some(license) = find_normalized_license(&tab_text) {
                        tracing::info!("found license {} on license tab", license);
                        outcome.license = Some(license);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("license tab {} failed: {}", tab_url, e),
            }
        }
    }

    if trusted_license {
        match license_statement(&license_text) {
            Some(PageLicense::Named(license)) => {
                mark_open(outcome, &metadata_url, PAGE_SAYS_LICENSE);
                outcome.license = Some(license);
            }
            Some(PageLicense::Unspecified) => {
                mark_open(outcome, &metadata_url, PAGE_SAYS_OPEN_ACCESS);
                outcome.license = Some(License::UnspecifiedOa);
            }
            None => {}
        }
    }

    if outcome.evidence.is_some() {
        if !outcome.is_open() {
            outcome.metadata_url = Some(metadata_url);
        }
        outcome.metadata_url = outcome.metadata_url.as_deref().map(fix_url_scheme);
        outcome.pdf_url = outcome.pdf_url.as_deref().map(fix_url_scheme);
        if outcome.version.is_none() {
            outcome.version = Some(Version::Published);
        }
        tracing::debug!("decided {} is open", page.url);
    } else {
        outcome.license = None;
        tracing::debug!("decided {} doesn't say open", page.url);
    }

    scrape
}
