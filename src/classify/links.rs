//! Full-text link discovery on landing pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use super::rules::{
    has_bad_anchor_word, has_bad_href_word, LinkRuleScope, BAD_LINK_RULES, BAD_SECTION_SELECTORS,
    BAD_SIBLING_SECTIONS, META_PDF_REWRITE_RULES, NATURE_META_PDF,
};
use crate::utils::{extract_domain, is_same_publisher};

pub const META_PDF_ANCHOR: &str = "<meta citation_pdf_url>";

const UTPRESS: &str = "University of Toronto Press Inc. (UTPress)";
const OVID: &str = "Ovid Technologies (Wolters Kluwer Health)";

static PDF_URL_JS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""pdfUrl":"(.*?)""#).unwrap());
static EXPORT_PDF_JS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""exportPdfDownloadUrl": ?"(.*?)""#).unwrap());
static VERSION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:submitted|accepted|published) version(?:\s+\([0-9.,gmkb ]+\))?$").unwrap()
});
static OCLC_PAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://(www\.)?oclc\.org").unwrap());
static RUDMET_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(www\.)?rudmet\.ru/journal/").unwrap());
static RUDMET_PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(www\.)?rudmet\.net/media/articles/.*\.pdf$").unwrap());
static UU_DSPACE_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://dspace\.library\.uu\.nl/").unwrap());

/// A candidate link: where it goes and what it says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    pub anchor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `src` and `class` values of images inside the anchor.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Link {
    pub fn new(href: impl Into<String>, anchor: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            anchor: anchor.into(),
            ..Self::default()
        }
    }

    pub fn is_purchase_link(&self) -> bool {
        if self.anchor.contains("purchase") {
            tracing::info!("found a purchase link! {} {}", self.anchor, self.href);
            return true;
        }
        false
    }
}

/// Which kind of landing page the links come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Publisher,
    Repository,
}

/// What link selection needs to know about the page.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// The URL originally requested.
    pub url: &'a str,
    /// The URL the page was finally served from.
    pub resolved_url: &'a str,
    pub publisher: Option<&'a str>,
    pub kind: PageKind,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

static BAD_SECTIONS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| BAD_SECTION_SELECTORS.iter().filter_map(|s| selector(s)).collect());
static ANCHORS: LazyLock<Option<Selector>> = LazyLock::new(|| selector("a"));
static METAS: LazyLock<Option<Selector>> = LazyLock::new(|| selector("meta"));

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Every anchor outside the known non-article sections that has an href and
/// something to call it by.
pub fn get_useful_links(html: &str) -> Vec<Link> {
    let document = Html::parse_document(html);

    let mut bad = HashSet::new();
    for sel in BAD_SECTIONS.iter() {
        bad.extend(document.select(sel).map(|el| el.id()));
    }
    for section in BAD_SIBLING_SECTIONS {
        let Some(tag) = selector(section.tag) else {
            continue;
        };
        for marker in document.select(&tag) {
            let text = element_text(&marker);
            let hit = if section.contains {
                text.contains(section.text)
            } else {
                text == section.text
            };
            if !hit {
                continue;
            }
            bad.extend(
                marker
                    .next_siblings()
                    .filter_map(ElementRef::wrap)
                    .filter(|sib| sib.value().name() == section.sibling_tag)
                    .map(|sib| sib.id()),
            );
        }
    }

    let Some(anchors) = ANCHORS.as_ref() else {
        return Vec::new();
    };

    document
        .select(anchors)
        .filter(|a| {
            !bad.contains(&a.id()) && !a.ancestors().any(|node| bad.contains(&node.id()))
        })
        .filter_map(|a| link_from_anchor(&a))
        .collect()
}

fn link_from_anchor(a: &ElementRef<'_>) -> Option<Link> {
    let attrs = a.value();
    let href = attrs.attr("href")?.to_string();
    let title = attrs.attr("title").map(str::to_string);

    let images: Vec<String> = a
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "img")
        .flat_map(|img| {
            [img.value().attr("src"), img.value().attr("class")]
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();

    let text = element_text(a).trim().to_lowercase();
    let anchor = if !text.is_empty() {
        text
    } else if let Some(tooltip) = attrs
        .attr("data-tooltip")
        .filter(|t| t.to_lowercase().contains("download pdf"))
    {
        tooltip.to_string()
    } else if let Some(t) = title
        .as_deref()
        .filter(|t| t.to_lowercase().contains("download fulltext"))
    {
        format!("title: {}", t)
    } else if href.to_lowercase().contains("?create_pdf_query") {
        "pdf_generator".to_string()
    } else {
        let children: Vec<ElementRef<'_>> = a.children().filter_map(ElementRef::wrap).collect();
        match children.as_slice() {
            [only] if only.value().name() == "img" => {
                let src = only.value().attr("src").filter(|s| s.contains("pdf"))?;
                format!("image: {}", src)
            }
            _ => return None,
        }
    };

    Some(Link {
        href,
        anchor,
        title,
        images,
    })
}

/// The `citation_pdf_url` meta tag, with per-site rewrites applied.
pub fn get_pdf_in_meta(html: &str) -> Option<Link> {
    if !html.contains("citation_pdf_url") {
        return None;
    }
    let document = Html::parse_document(html);
    let metas = METAS.as_ref()?;
    let content = document.select(metas).find_map(|meta| {
        let m = meta.value();
        let named = m.attr("name") == Some("citation_pdf_url")
            || m.attr("property") == Some("citation_pdf_url");
        named.then(|| m.attr("content")).flatten()
    })?;

    Some(Link::new(transform_meta_pdf(content, html), META_PDF_ANCHOR))
}

fn transform_meta_pdf(href: &str, html: &str) -> String {
    let mut href = href.to_string();
    for (re, replacement) in META_PDF_REWRITE_RULES.iter() {
        href = re.replace(&href, *replacement).into_owned();
    }

    // Nature's meta link is a preview; the page may carry the full file.
    if let Some(path) = NATURE_META_PDF.captures(&href).and_then(|c| c.get(1)) {
        let reference = format!("{}_reference.pdf", path.as_str().trim_end_matches(".pdf"));
        if html.contains(&reference) {
            href = reference;
        }
    }

    href
}

/// Decode a JSON string body lifted out of a script; left as is if it isn't one.
fn decode_escaped_href(href: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", href)).unwrap_or_else(|_| href.to_string())
}

/// PDF URLs embedded in inline page state.
pub fn get_pdf_from_javascript(html: &str) -> Option<Link> {
    if let Some(m) = PDF_URL_JS.captures(html).and_then(|c| c.get(1)) {
        return Some(Link::new(decode_escaped_href(m.as_str()), "pdfUrl"));
    }
    EXPORT_PDF_JS
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| Link::new(decode_escaped_href(m.as_str()), "exportPdfDownloadUrl"))
}

/// Links known to be wrong on particular sites.
pub fn is_known_bad_link(link: &Link, ctx: &LinkContext<'_>) -> bool {
    let is_meta = link.anchor == META_PDF_ANCHOR;

    for rule in BAD_LINK_RULES.iter() {
        let applies = match rule.scope {
            LinkRuleScope::Any => true,
            LinkRuleScope::MetaOnly => is_meta,
            LinkRuleScope::PublisherOnly => ctx.kind == PageKind::Publisher,
        };
        if !applies {
            continue;
        }
        let page_matches = rule
            .page
            .as_ref()
            .is_none_or(|re| re.is_match(ctx.resolved_url) || re.is_match(ctx.url));
        if !page_matches {
            continue;
        }
        let href_matches = rule.href.as_ref().is_none_or(|re| re.is_match(&link.href));
        if href_matches {
            return true;
        }
        // A site rule owns its site: once the page matches, nothing else applies.
        if rule.scope == LinkRuleScope::Any && rule.page.is_some() {
            return false;
        }
    }
    false
}

fn accepts(link: &Link, ctx: &LinkContext<'_>) -> bool {
    let anchor = link.anchor.to_lowercase();
    let href = &link.href;

    if anchor.contains("pdf") {
        return !(is_same_publisher(ctx.publisher, UTPRESS) && href.contains("epdf"));
    }

    if (link.anchor.contains("download") || link.anchor.contains("télécharger"))
        && !link.anchor.contains("citation")
    {
        return true;
    }

    if ctx.publisher.is_some()
        && !is_same_publisher(ctx.publisher, OVID)
        && !is_same_publisher(ctx.publisher, UTPRESS)
        && (anchor.contains("full text") || anchor.contains("текст статьи"))
    {
        return true;
    }

    if OCLC_PAGE.is_match(ctx.url)
        && href.ends_with(".pdf")
        && (anchor.contains("download") || anchor.contains("read"))
    {
        return true;
    }

    if ctx.resolved_url.contains("aida-itea.org") && href.contains("pdf") {
        return true;
    }

    if RUDMET_PAGE.is_match(ctx.resolved_url) && RUDMET_PDF.is_match(href) {
        return true;
    }

    if UU_DSPACE_PAGE.is_match(ctx.resolved_url)
        && anchor.contains("open access version via utrecht university repository")
    {
        return true;
    }

    if link.images.iter().any(|i| i.to_lowercase().contains("pdf")) {
        return true;
    }

    if link
        .title
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains("pdf"))
        || href.contains("download/pdf")
    {
        return true;
    }

    let href_lower = href.to_lowercase();
    VERSION_LABEL.is_match(&anchor) && (href_lower.ends_with(".pdf") || href_lower.contains(".pdf?"))
}

/// Best guess at the full-text PDF link on a landing page.
///
/// Candidates are tried in order: the `citation_pdf_url` meta tag, PDF URLs
/// in inline page state, then anchors outside non-article sections.
pub fn find_pdf_link(html: &str, ctx: &LinkContext<'_>) -> Option<Link> {
    let candidates = get_pdf_in_meta(html)
        .into_iter()
        .chain(get_pdf_from_javascript(html))
        .chain(get_useful_links(html));

    for link in candidates {
        tracing::trace!("trying {}, {} in find_pdf_link", link.href, link.anchor);

        if is_known_bad_link(&link, ctx)
            || has_bad_anchor_word(&link.anchor)
            || has_bad_href_word(&link.href)
        {
            continue;
        }
        if link.href.contains('\n') && !link.href.contains("securityanddefence.pl") {
            continue;
        }
        if link.href.starts_with('#') {
            continue;
        }
        if accepts(&link, ctx) {
            return Some(link);
        }
    }
    None
}

/// A link to a Word version of the article.
pub fn find_doc_download_link(html: &str) -> Option<Link> {
    get_useful_links(html).into_iter().find(|link| {
        !has_bad_href_word(&link.href)
            && !has_bad_anchor_word(&link.anchor)
            && (link.href.contains(".doc") || link.anchor.contains(".doc"))
    })
}

/// Biodiversity Heritage Library pages link the scan with "view article".
pub fn find_bhl_view_link(url: &str, html: &str) -> Option<Link> {
    let host = extract_domain(url)?;
    if !host.ends_with("biodiversitylibrary.org") {
        return None;
    }
    get_useful_links(html)
        .into_iter()
        .find(|link| link.anchor == "view article")
}

/// Hosts where a found PDF link may also be a Word file.
pub fn try_pdf_link_as_doc(resolved_url: &str) -> bool {
    extract_domain(resolved_url)
        .is_some_and(|host| ["paleorxiv.org", "osf.io"].iter().any(|h| host.ends_with(h)))
}

/// The landing page counts as open but the PDF URL itself is unusable.
pub fn discard_pdf_url(pdf_url: &str, landing_url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(pdf_url) {
        let expiring = parsed
            .host_str()
            .is_some_and(|h| h.ends_with("exlibrisgroup.com"))
            && parsed.query().is_some_and(|q| q.contains("Expires="));
        if expiring {
            return true;
        }
    }
    // many papers on one page
    landing_url == "https://www.swarthmore.edu/donna-jo-napoli/publications-available-download"
}
