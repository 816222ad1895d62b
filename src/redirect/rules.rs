//! Redirect conventions, applied in a fixed priority order.

use std::sync::LazyLock;

use regex::Regex;

use crate::http_client::HttpResponse;
use crate::utils::{extract_domain, get_link_target, html_unescape, is_same_publisher};

static JS_LOCATION_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<script>location.href='(.*)'</script>").unwrap());
static OVID_AN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)OvidAN = '(.*?)';").unwrap());
static OVID_JOURNAL_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)var journalURL = "(.*?)";"#).unwrap());
static META_REFRESH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<meta[^>]*http-equiv="?refresh"?[^>]*>"#).unwrap());
static META_REFRESH_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)url=["']?([^">']*)"#).unwrap());
static SCIENCEDIRECT_PDF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.location\.replace\('(https://pdf\.sciencedirectassets\.com[^']*)'\)")
        .unwrap()
});
static OUP_PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://academic\.oup\.com/.*\.pdf").unwrap());

const OUP_CAPTCHA_PREFIX: &str = "https://academic.oup.com/crawlprevention/governor";
const OVID_PUBLISHER: &str = "Ovid Technologies (Wolters Kluwer Health)";
/// Bodies smaller than this may be nothing but a script redirect.
const TINY_BODY_BYTES: u64 = 500;
/// Meta-refresh targets that are error pages, not content.
const IGNORED_REFRESH_SUFFIXES: &[&str] = &["Error/JavaScript.html", "/?reason=expired"];

/// Whether a hop counts against the protocol or the business-logic cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    Http,
    BusinessLogic,
}

/// Where to go next and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub target: String,
    pub rule: &'static str,
    /// The hop lands on a crawler-prevention page and must be audited.
    pub audit: bool,
}

/// Facts about the request that some rules depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectContext<'a> {
    pub publisher: Option<&'a str>,
}

/// A content-level redirect convention recognised on 200 responses.
pub struct BodyRule {
    pub name: &'static str,
    pub find: fn(&HttpResponse, &str, &RedirectContext<'_>) -> Option<String>,
}

/// Content-level rules in priority order.
pub const BODY_RULES: &[BodyRule] = &[
    BodyRule {
        name: "js location.href",
        find: js_location_href,
    },
    BodyRule {
        name: "ovid accession number",
        find: ovid_accession,
    },
    BodyRule {
        name: "ovid journal url",
        find: ovid_journal_url,
    },
    BodyRule {
        name: "meta refresh",
        find: meta_refresh,
    },
    BodyRule {
        name: "sciencedirect pdf",
        find: sciencedirect_pdf,
    },
];

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn js_location_href(response: &HttpResponse, text: &str, _: &RedirectContext<'_>) -> Option<String> {
    let size = response
        .content_length()
        .unwrap_or(response.body().len() as u64);
    if size >= TINY_BODY_BYTES {
        return None;
    }
    let target = first_capture(&JS_LOCATION_HREF, text)?;
    if target.starts_with('/') {
        Some(get_link_target(&target, &response.url))
    } else {
        Some(target)
    }
}

fn ovid_accession(_: &HttpResponse, text: &str, ctx: &RedirectContext<'_>) -> Option<String> {
    if !is_same_publisher(ctx.publisher, OVID_PUBLISHER) {
        return None;
    }
    let an = first_capture(&OVID_AN, text)?;
    Some(format!("http://content.wkhealth.com/linkback/openurl?an={}", an))
}

fn ovid_journal_url(response: &HttpResponse, text: &str, _: &RedirectContext<'_>) -> Option<String> {
    let host = extract_domain(&response.url)?;
    if !host.ends_with("ovid.com") {
        return None;
    }
    first_capture(&OVID_JOURNAL_URL, text)
}

fn meta_refresh(response: &HttpResponse, text: &str, _: &RedirectContext<'_>) -> Option<String> {
    let tag = META_REFRESH.find(text)?;
    tracing::info!("found a meta refresh element: {}", tag.as_str());
    let path = first_capture(&META_REFRESH_URL, tag.as_str())?;
    let target = get_link_target(&html_unescape(path.trim()), &response.url);
    if IGNORED_REFRESH_SUFFIXES.iter().any(|s| target.ends_with(s)) {
        return None;
    }
    Some(target)
}

fn sciencedirect_pdf(_: &HttpResponse, text: &str, _: &RedirectContext<'_>) -> Option<String> {
    first_capture(&SCIENCEDIRECT_PDF, text)
}

/// Decide the next hop for `response`, or `None` when no rule fires.
pub fn next_hop(response: &HttpResponse, ctx: &RedirectContext<'_>) -> Option<(HopKind, Hop)> {
    if response.is_redirect() {
        let location = response.location()?;
        let target = get_link_target(location, &response.url);
        tracing::info!("30x redirect: {}", target);
        let audit = target.starts_with(OUP_CAPTCHA_PREFIX) || OUP_PDF.is_match(&response.url);
        return Some((
            HopKind::Http,
            Hop {
                target,
                rule: "http location",
                audit,
            },
        ));
    }

    if response.status.as_u16() != 200 {
        return None;
    }

    let text = response.text();
    BODY_RULES.iter().find_map(|rule| {
        (rule.find)(response, &text, ctx).map(|target| {
            tracing::info!("{} redirect to {}", rule.name, target);
            (
                HopKind::BusinessLogic,
                Hop {
                    target,
                    rule: rule.name,
                    audit: false,
                },
            )
        })
    })
}
