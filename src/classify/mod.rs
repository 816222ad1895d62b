//! Page classification: turns one fetched response into structured signals.
//!
//! Everything here is a pure function of the response and what is already
//! known about the work. Rule data lives in [`rules`]; the submodules walk it.

pub mod license;
pub mod links;
pub mod pdf;
pub mod rules;
pub mod version;

pub use license::{find_normalized_license, license_statement, page_potential_license_text, PageLicense};
pub use links::{
    discard_pdf_url, find_bhl_view_link, find_doc_download_link, find_pdf_link,
    get_pdf_from_javascript, get_pdf_in_meta, get_useful_links, try_pdf_link_as_doc, Link,
    LinkContext, PageKind,
};
pub use pdf::{is_a_pdf_page, is_pdf_from_header, is_word_doc};
pub use rules::{rewrite_publisher_pdf_url, RuleContext};
pub use version::{PdfEvidence, VersionCascade, VersionSource};

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::http_client::HttpResponse;
use crate::models::{License, Version};
use rules::{
    first_match, trust_publisher_license, BACKUP_HYBRID_RULES, BRONZE_CITATION_PDF, BRONZE_RULES,
    HYBRID_RULES,
};

static LOOKS_LIKE_HTML: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*<").unwrap());

/// Known context about the page being classified.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// URL requested before redirects.
    pub url: &'a str,
    pub publisher: Option<&'a str>,
    pub issn_l: Option<&'a str>,
    pub kind: PageKind,
}

impl<'a> PageContext<'a> {
    pub fn rules(&self, resolved_url: &'a str) -> RuleContext<'a> {
        RuleContext {
            resolved_url,
            publisher: self.publisher,
            issn_l: self.issn_l,
        }
    }

    pub fn links(&self, resolved_url: &'a str) -> LinkContext<'a> {
        LinkContext {
            url: self.url,
            resolved_url,
            publisher: self.publisher,
            kind: self.kind,
        }
    }
}

/// Signals extracted from a single response, before any verification fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub url: String,
    pub is_pdf: bool,
    pub is_word_doc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_download_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Markup says the article is free to read.
    pub free_to_read: bool,
    /// Markup says the article is Open Access.
    pub says_open_access: bool,
}

/// How the page itself signals access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSignal {
    /// Free to read without a license: bronze.
    Free,
    /// Says Open Access: hybrid, license unspecified.
    OpenAccess,
}

pub fn looks_like_html(text: &str) -> bool {
    LOOKS_LIKE_HTML.is_match(text)
}

/// Bronze and hybrid fingerprints on a publisher page. Open Access markup
/// outranks free-to-read markup when both are present.
pub fn access_signal(html: &str, ctx: &RuleContext<'_>, citation_pdf: Option<&str>) -> Option<AccessSignal> {
    if let Some(rule) = first_match(&HYBRID_RULES, ctx, html) {
        tracing::debug!("found hybrid markup {}", rule.regex.as_str());
        return Some(AccessSignal::OpenAccess);
    }
    if let Some(rule) = first_match(&BRONZE_RULES, ctx, html) {
        tracing::debug!("found bronze markup {}", rule.regex.as_str());
        return Some(AccessSignal::Free);
    }
    if citation_pdf.is_some_and(|href| BRONZE_CITATION_PDF.iter().any(|re| re.is_match(href))) {
        return Some(AccessSignal::Free);
    }
    None
}

/// Weaker Open Access markers, consulted only when nothing else was found.
pub fn backup_access_signal(html: &str, ctx: &RuleContext<'_>) -> Option<AccessSignal> {
    first_match(&BACKUP_HYBRID_RULES, ctx, html).map(|_| AccessSignal::OpenAccess)
}

/// Classify a fully loaded response.
pub fn classify(response: &HttpResponse, ctx: &PageContext<'_>) -> Classification {
    let resolved = response.url.as_str();
    let rule_ctx = ctx.rules(resolved);

    let mut result = Classification {
        url: resolved.to_string(),
        is_pdf: is_a_pdf_page(response, &rule_ctx),
        ..Classification::default()
    };

    if result.is_pdf {
        return result;
    }

    result.is_word_doc = is_word_doc(response);
    if result.is_word_doc {
        return result;
    }

    let html = response.text();
    if !looks_like_html(&html) {
        return result;
    }

    result.pdf_download_link = find_pdf_link(&html, &ctx.links(resolved));

    let license_text = page_potential_license_text(&html);
    let trusted = match ctx.kind {
        PageKind::Publisher => trust_publisher_license(resolved),
        PageKind::Repository => true,
    };
    if trusted {
        result.license = license_statement(&license_text)
            .map(|l| l.license())
            .or_else(|| find_normalized_license(&license_text));
    }

    if ctx.kind == PageKind::Publisher {
        let citation_pdf = get_pdf_in_meta(&html).map(|l| l.href);
        match access_signal(&html, &rule_ctx, citation_pdf.as_deref())
            .or_else(|| result.license.is_none().then(|| backup_access_signal(&html, &rule_ctx)).flatten())
        {
            Some(AccessSignal::Free) => result.free_to_read = true,
            Some(AccessSignal::OpenAccess) => result.says_open_access = true,
            None => {}
        }
    } else {
        result.version = version::version_from_landing_page(resolved, &html);
    }

    result
}
