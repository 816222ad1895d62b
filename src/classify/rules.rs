//! Declarative rule tables for page classification.
//!
//! Every heuristic the classifier applies lives here as data: markup
//! fingerprints keyed by URL fragment, publisher or journal, URL rewrites,
//! and word lists for link filtering. Control flow lives in the sibling
//! modules and walks these tables in order.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::{extract_domain, is_same_publisher};

/// What a markup rule is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Substring of the lowercased resolved URL.
    UrlFragment(&'static str),
    /// Publisher name, compared after normalisation.
    Publisher(&'static str),
    IssnL(&'static str),
}

/// A regex over page markup that applies only within a scope.
#[derive(Debug, Clone, Copy)]
pub struct MarkupRule {
    pub scope: Scope,
    pub pattern: &'static str,
}

const fn url(fragment: &'static str, pattern: &'static str) -> MarkupRule {
    MarkupRule {
        scope: Scope::UrlFragment(fragment),
        pattern,
    }
}

const fn publisher(name: &'static str, pattern: &'static str) -> MarkupRule {
    MarkupRule {
        scope: Scope::Publisher(name),
        pattern,
    }
}

const fn journal(issn_l: &'static str, pattern: &'static str) -> MarkupRule {
    MarkupRule {
        scope: Scope::IssnL(issn_l),
        pattern,
    }
}

/// Facts about the page a rule may be scoped on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext<'a> {
    pub resolved_url: &'a str,
    pub publisher: Option<&'a str>,
    pub issn_l: Option<&'a str>,
}

impl Scope {
    pub fn applies(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Scope::UrlFragment(fragment) => ctx.resolved_url.to_lowercase().contains(fragment),
            Scope::Publisher(name) => is_same_publisher(ctx.publisher, name),
            Scope::IssnL(issn_l) => ctx.issn_l == Some(*issn_l),
        }
    }
}

/// A markup rule with its pattern compiled case-insensitively, `.` matching newlines.
pub struct CompiledRule {
    pub scope: Scope,
    pub regex: Regex,
}

impl CompiledRule {
    pub fn matches(&self, ctx: &RuleContext<'_>, html: &str) -> bool {
        self.scope.applies(ctx) && self.regex.is_match(html)
    }
}

fn compile(rules: &[MarkupRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| match Regex::new(&format!("(?is){}", rule.pattern)) {
            Ok(regex) => Some(CompiledRule {
                scope: rule.scope,
                regex,
            }),
            Err(e) => {
                tracing::warn!("Skipping invalid rule pattern {:?}: {}", rule.pattern, e);
                None
            }
        })
        .collect()
}

/// First rule in `rules` matching the page, if any.
pub fn first_match<'r>(
    rules: &'r [CompiledRule],
    ctx: &RuleContext<'_>,
    html: &str,
) -> Option<&'r CompiledRule> {
    rules.iter().find(|r| r.matches(ctx, html))
}

// ---------------------------------------------------------------------------
// Document detection
// ---------------------------------------------------------------------------

/// Publishers whose PDF content-type headers can't be trusted.
pub const BAD_HEADER_PUBLISHERS: &[&str] = &["Addleton Academic Publishers"];

/// Markup that means "the full text is right here" on some publisher sites.
pub const FREE_MARKUP: &[MarkupRule] = &[
    publisher(
        "Wiley-Blackwell",
        r#"<span class="freeAccess" title="You have free access to this content">"#,
    ),
    publisher("Wiley-Blackwell", r#"<iframe id="pdfDocument""#),
    publisher("JSTOR", r#"<li class="download-pdf-button">.*Download PDF.*</li>"#),
    publisher(
        "Institute of Electrical and Electronics Engineers (IEEE)",
        r#"<frame src="http://ieeexplore.ieee.org/.*?pdf.*?</frameset>"#,
    ),
    publisher("IOP Publishing", r"Full Refereed Journal Article"),
];

pub static FREE_MARKUP_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| compile(FREE_MARKUP));

// ---------------------------------------------------------------------------
// Access fingerprints
// ---------------------------------------------------------------------------

/// Free to read, no license: the page is a bronze location.
pub const BRONZE_MARKUP: &[MarkupRule] = &[
    url("sciencedirect.com/", r#"<div class="OpenAccessLabel">open archive</div>"#),
    url(
        "sciencedirect.com/",
        r#"<span[^>]*class="[^"]*pdf-download-label[^"]*"[^>]*>Download PDF</span>"#,
    ),
    url(
        "sciencedirect.com/",
        r#"<span class="primary-cta-button-text|link-button-text">View\s*<strong>PDF</strong></span>"#,
    ),
    url("onlinelibrary.wiley.com", r#"<div[^>]*class="doi-access"[^>]*>Free Access</div>"#),
    url("openedition.org", r#"<span[^>]*id="img-freemium"[^>]*></span>"#),
    url("openedition.org", r#"<span[^>]*id="img-openaccess"[^>]*></span>"#),
    url("microbiologyresearch.org", r#"<span class="accesstext">(?:</span>)?Free"#),
    url("journals.lww.com", r#"<li[^>]*id="[^"]*-article-indicators-free"[^>]*>"#),
    url("ashpublications.org", r#"<i[^>]*class="[^"]*icon-availability_free"#),
    url("academic.oup.com", r#"<i[^>]*class="[^"]*icon-availability_free"#),
    url("publications.aap.org", r#"<i[^>]*class="[^"]*icon-availability_free"#),
    url("degruyter.com/", r"<span>Free Access</span>"),
    url("degruyter.com/", r#"data-accessrestricted="false""#),
    url("practicalactionpublishing.com", r#"<img [^>]*class="open-access-icon""#),
    url("iucnredlist.org", r"<title>"),
    publisher(
        "New England Journal of Medicine (NEJM/MMS)",
        r#"<meta content="yes" name="evt-free""#,
    ),
    publisher("Massachusetts Medical Society", r#"<meta content="yes" name="evt-free""#),
    publisher("University of Chicago Press", r#"<img[^>]*class="[^"]*accessIconLocation"#),
    publisher(
        "Elsevier BV",
        r#"<span[^>]*class="[^"]*article-header__access[^"]*"[^>]*>Open Archive</span>"#,
    ),
    journal("1352-2310", r"<span[^>]*>Download PDF</span>"),
];

pub static BRONZE_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| compile(BRONZE_MARKUP));

/// `citation_pdf_url` values that only appear on free-to-read articles.
pub static BRONZE_CITATION_PDF: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)^https?://www\.sciencedirect\.com/science/article/pii/S[0-9X]+/pdf(?:ft)?\?md5=[0-9a-f]+.*[0-9x]+-main.pdf$"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// The page says it is Open Access: a hybrid location with an unspecified license.
pub const HYBRID_MARKUP: &[MarkupRule] = &[
    url("projecteuclid.org/", r"<strong>Full-text: Open access</strong>"),
    url("sciencedirect.com/", r#"<div class="OpenAccessLabel">open access</div>"#),
    url(
        "journals.ametsoc.org/",
        r#"src="/templates/jsp/_style2/_ams/images/access_free\.gif""#,
    ),
    url(
        "apsjournals.apsnet.org",
        r#"src="/products/aps/releasedAssets/images/open-access-icon\.png""#,
    ),
    url("psychiatriapolska.pl", r"is an Open Access journal:"),
    url("journals.lww.com", r#"<span class="[^>]*ejp-indicator--free"#),
    url("journals.lww.com", r#"<img[^>]*src="[^"]*/icon-access-open\.gif"[^>]*>"#),
    url("iospress.com", r#"<img[^>]*src="[^"]*/img/openaccess_icon.png[^"]*"[^>]*>"#),
    url("rti.org/", r"</svg>[^<]*Open Access[^<]*</span>"),
    url("cambridge.org/", r#"<span[^>]*class="open-access"[^>]*>Open access</span>"#),
    publisher("Informa UK Limited", r"/accessOA.png"),
    publisher("Oxford University Press (OUP)", r"<i class='icon-availability_open'"),
    publisher(
        "Institute of Electrical and Electronics Engineers (IEEE)",
        r#""isOpenAccess":true"#,
    ),
    publisher(
        "Institute of Electrical and Electronics Engineers (IEEE)",
        r#""openAccessFlag":"yes""#,
    ),
    publisher("Royal Society of Chemistry (RSC)", r"/open_access_blue.png"),
    publisher(
        "Cambridge University Press (CUP)",
        r#"<span class="icon access open-access cursorDefault">"#,
    ),
    publisher("Wiley", r#"<div[^>]*class="doi-access"[^>]*>Open Access</div>"#),
];

pub static HYBRID_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| compile(HYBRID_MARKUP));

/// Weaker Open Access markers, used only when no license was found.
pub const BACKUP_HYBRID_MARKUP: &[MarkupRule] = &[url("degruyter.com/", r"<span>Open Access</span>")];

pub static BACKUP_HYBRID_RULES: LazyLock<Vec<CompiledRule>> =
    LazyLock::new(|| compile(BACKUP_HYBRID_MARKUP));

/// License statements on landing pages; group 1 holds the license text.
pub const PAGE_LICENSE_PATTERNS: &[&str] = &[
    r"(creativecommons.org/licenses/[a-z\-]+)",
    r"distributed under the terms (.*) which permits",
    r"This is an open access article under the terms (.*) which permits",
    r"This is an open-access article distributed under the terms (.*), where it is permissible",
    r"This is an open access article published under (.*) which permits",
    r#"<div class="openAccess-articleHeaderContainer(.*?)</div>"#,
    r"this article is published under the creative commons (.*) licence",
    r"This work is licensed under a Creative Commons (.*), which permits ",
];

pub static PAGE_LICENSE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PAGE_LICENSE_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
        .collect()
});

/// Publisher hosts whose landing-page license text produces false positives.
pub const UNTRUSTED_LICENSE_HOSTS: &[&str] = &[
    "indianjournalofmarketing.com",
    "rnajournal.cshlp.org",
    "press.umich.edu",
    "genome.cshlp.org",
    "medlit.ru",
    "journals.eco-vector.com",
    "alife-robotics.co.jp",
    "un-pub.eu",
    "zniso.fcgie.ru",
    "molbiolcell.org",
    "jcog.com.tr",
    "aimsciences.org",
    "soed.in",
    "berghahnjournals.com",
    "ojs.ual.es",
    "cjc-online.ca",
];

static RUPRESS_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rupress\.org/jcb/[^/]+/(\d+)").unwrap());

/// Whether a license read off a publisher landing page can be believed.
pub fn trust_publisher_license(resolved_url: &str) -> bool {
    let Some(host) = extract_domain(resolved_url) else {
        return true;
    };

    if let Some(untrusted) = UNTRUSTED_LICENSE_HOSTS.iter().find(|h| host.ends_with(*h)) {
        tracing::info!("not trusting license from {}", untrusted);
        return false;
    }

    if host.ends_with("rupress.org") {
        // From volume 217 on the license comes from Crossref instead.
        return RUPRESS_VOLUME
            .captures(resolved_url)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .is_some_and(|volume| volume < 217);
    }

    true
}

/// Repository hosts whose page license alone makes the page open.
pub const TRUSTED_REPOSITORY_LICENSE_HOSTS: &[&str] =
    &["babel.hathitrust.org", "quod.lib.umich.edu", "taju.uniarts.fi"];

pub fn trust_repository_license(resolved_url: &str) -> bool {
    extract_domain(resolved_url).is_some_and(|host| {
        TRUSTED_REPOSITORY_LICENSE_HOSTS
            .iter()
            .any(|h| host.ends_with(h))
    })
}

// ---------------------------------------------------------------------------
// URL rewrites
// ---------------------------------------------------------------------------

/// Regex rewrites applied to `citation_pdf_url` values.
pub const META_PDF_REWRITES: &[(&str, &str)] = &[
    (
        r"(https?://[\w\.]*onlinelibrary.wiley.com/doi/)pdf(/.+)",
        "${1}pdfdirect${2}",
    ),
    (r"(^https?://drops\.dagstuhl\.de/.*\.pdf)/$", "${1}"),
    (
        r"^(https?://repository\.ubn\.ru\.nl/bitstream/)(\d+.*\.pdf)$",
        "${1}handle/${2}",
    ),
    (r"^http://(journal\.nileuniversity.edu\.ng/?.*)", "https://${1}"),
    (
        r"^http://virginialibrariesjournal\.org//articles",
        "http://virginialibrariesjournal.org/articles",
    ),
    (r"^http://www.(ecologyandsociety.org/.*.pdf)", "https://www.${1}"),
];

pub static META_PDF_REWRITE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    META_PDF_REWRITES
        .iter()
        .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, *r)))
        .collect()
});

/// Nature meta links point at a preview; the page may link the full PDF.
pub static NATURE_META_PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://www\.nature\.com(/articles/[a-z0-9-]*.pdf)").unwrap());

/// Publisher viewer URLs rewritten to the direct PDF: (URL prefix regex, from, to).
pub const PUBLISHER_PDF_REWRITES: &[(&str, &str, &str)] = &[
    (
        r"^https?://recyt\.fecyt\.es/index\.php/EPI/article/view/",
        "/article/view/",
        "/article/download/",
    ),
    (r"^https?://(www.)?mitpressjournals\.org/doi/full/10\.+", "/doi/full/", "/doi/pdf/"),
    (r"^https?://(www.)?journals\.uchicago\.edu/doi/full/10\.+", "/doi/full/", "/doi/pdf/"),
    (r"^https?://(www.)?ascopubs\.org/doi/full/10\.+", "/doi/full/", "/doi/pdfdirect/"),
    (r"^https?://(www\.)?ahajournals\.org/doi/reader/10\..+", "/doi/reader/", "/doi/pdf/"),
    (r"^https?://(www\.)?journals.sagepub.com/doi/reader/10\..+", "/doi/reader/", "/doi/pdf/"),
    (r"^https?://(www\.)?tandfonline.com/doi/epdf/10\..+", "/doi/epdf/", "/doi/pdf/"),
    (r"^https?://(www\.)?ajronline.org/doi/epdf/10\..+", "/doi/epdf/", "/doi/pdf/"),
    (r"^https?://(www\.)?pubs.acs.org/doi/epdf/10\..+", "/doi/epdf/", "/doi/pdf/"),
    (
        r"^https?://(www\.)?royalsocietypublishing.org/doi/epdf/10\..+",
        "/doi/epdf/",
        "/doi/pdf/",
    ),
    (r"^https?://(www\.)?onlinelibrary.wiley.com/doi/epdf/10\..+", "/epdf/", "/pdfdirect/"),
];

pub static PUBLISHER_PDF_REWRITE_RULES: LazyLock<Vec<(Regex, &'static str, &'static str)>> =
    LazyLock::new(|| {
        PUBLISHER_PDF_REWRITES
            .iter()
            .filter_map(|(p, from, to)| Regex::new(p).ok().map(|re| (re, *from, *to)))
            .collect()
    });

/// Apply the first matching viewer-to-PDF rewrite.
pub fn rewrite_publisher_pdf_url(pdf_url: &str) -> String {
    PUBLISHER_PDF_REWRITE_RULES
        .iter()
        .find(|(re, _, _)| re.is_match(pdf_url))
        .map(|(_, from, to)| pdf_url.replace(from, to))
        .unwrap_or_else(|| pdf_url.to_string())
}

// ---------------------------------------------------------------------------
// Link filtering
// ---------------------------------------------------------------------------

/// Sections whose links never point at the article itself.
pub const BAD_SECTION_SELECTORS: &[&str] = &[
    "div[class='relatedItem']",
    "ol[class='links-for-figure']",
    "div[class='citedBySection']",
    "div[class='references']",
    "div[class='moduletable']",
    "div[class*='ref-list']",
    "div[class*='references']",
    "div#supplementary-material",
    "div#toc",
    "div[class*='cta-guide-authors']",
    "div[class*='footer-publication']",
    "d-appendix",
    "dt-appendix",
    "div[id^='dt-cite']",
    "ol[class*='ref-item']",
    "div[class*='NLM_back']",
    "div[class*='NLM_citation']",
    "div#relatedcontent",
    "div#author-infos",
    "ul#book-metrics",
    "section#article_references",
    "section#SupplementaryMaterial",
    "div#attach_additional_files",
    "span[class*='fa-lock']",
    "ul#reflist",
    "div[class='listbibl']",
    "div[class*='summation-section']",
    "ul[class*='references']",
    "span[class*='ref-lnk']",
    "div#referenceContainer",
    "div[class*='table-of-content']",
    "div#utpPrimaryNav",
    "p[class='bibentry']",
    "a[class*='cover-out']",
    "div[class='footnotes']",
    "section#article-references",
    "div[class='refs']",
    "div[class='citation-content']",
    "li[class='refbiblio']",
    "div[class='Citation']",
    "section#ej-article-sam-container",
    "li[class*='article-references']",
    "section#supplementary-materials",
    "span[class*='ref-list'] span[class*='reference']",
    "div[class*='ncbiinpagenav']",
    "section[class*='references']",
    "div#references-list",
    "li[class*='linked-article__item']",
    "div#booktoc",
    "div#tocWrapper",
    "tr[class='bookTocEntryRow']",
];

/// A heading-like element followed by siblings that are bad sections.
#[derive(Debug, Clone, Copy)]
pub struct SiblingSection {
    pub tag: &'static str,
    /// Exact text of the marker element, or a substring when `contains`.
    pub text: &'static str,
    pub contains: bool,
    pub sibling_tag: &'static str,
}

const fn after(tag: &'static str, text: &'static str, sibling_tag: &'static str) -> SiblingSection {
    SiblingSection {
        tag,
        text,
        contains: false,
        sibling_tag,
    }
}

pub const BAD_SIBLING_SECTIONS: &[SiblingSection] = &[
    after("p", "References", "p"),
    after("h2", "References", "ul"),
    after("h4", "References", "p"),
    after("td", "References", "td"),
    after("h3", "Acknowledgements", "p"),
    after("h2", "Policies and information", "ul"),
    SiblingSection {
        tag: "h4",
        text: "Multimedia Appendix",
        contains: true,
        sibling_tag: "a",
    },
];

/// Sections stripped before searching a page for license text.
pub const LICENSE_BAD_SECTION_SELECTORS: &[&str] = &[
    "div[class*='view-pnas-featured']",
    "meta[name*='citation_reference']",
];

/// Href substrings that are surely not the article PDF.
pub const BAD_HREF_WORDS: &[&str] = &[
    "/eab/",
    "/suppl_file/",
    "supplementary+file",
    "showsubscriptions",
    "/faq",
    "{{",
    "cdt-flyer",
    "figures",
    "price-lists",
    "aaltodoc_pdf_a.pdf",
    "janssenmd.com",
    "community-register",
    "quickreference",
    "libraryrequestform",
    "iporeport",
    "no_local_copy",
    ".zip",
    ".gz",
    ".tar.",
    "/doi/full/10.1642",
    "hyke.org",
    "&rendering=",
    ".fmatter",
    "/samples/",
    "letter_to_publisher",
    "first-page",
    "lib_rec_form",
    "ebook-flyer",
    "accesoRestringido",
    "/productFlyer/",
    "/author_agreement",
    "supinfo.pdf",
    "/Appendix",
    "content_policy.pdf",
    "BookTOC.pdf",
    "BookBackMatter.pdf",
    "publishers-catalogue",
    "_toc_",
    "adobe.com/products/acrobat",
    "featured-article-pdf",
    "modern-slavery-act-statement.pdf",
    "Deposit_Agreement",
    "/product_flyer/",
    "links.lww.com/JBJS/F791",
    "ctr_media_kit",
    "ctr_advertising_rates",
    "format=googlePreviewPdf",
    "type=googlepdf",
    "guide_authors",
    "_TOC.pdf",
    "-supplement.pdf",
    "ethicspolicy.pdf",
    "coi_disclosure.pdf",
    "_leaflet.pdf",
    "User-manual.pdf",
    "table_final.pdf",
    "/doi/full/10.18553/jmcp.",
    "Bilkent-research-paper.pdf",
    "guia_busquedas_avanzadas.pdf",
    "PDFs/2017-Legacy-1516816496183.pdf",
    "TermsOfUse.pdf",
    "javascript:void",
    "/DownloadSummary/",
    "WOS000382116900027.pdf",
];

/// Hrefs that look bad but are the article.
pub const HREF_WHITELIST: &[&str] = &[
    "190317_MainText_Figures_JNNP.pdf",
    "Using%20Google%20Forms%20to%20Track%20Library%20Space%20Usage%20w%20figures.pdf",
];

pub static BAD_HREF_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)jmir_v[a-z0-9]+_app\d+\.pdf"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Anchor text substrings that are surely not the article PDF.
pub const BAD_ANCHOR_WORDS: &[&str] = &[
    "user",
    "guide",
    "checklist",
    "abstracts",
    "downloaded publications",
    "metadata from the pdf file",
    "récupérer les métadonnées à partir d'un fichier pdf",
    "bulk downloads",
    "license agreement",
    "masthead",
    "download statistics",
    "supplement",
    "figure",
    "faq",
    "download MODS",
    "BibTeX citations",
    "RIS citations",
    "ACS ActiveView PDF",
    "Submission Form",
    "Sample Pages",
    "Download this page",
    "Download left page",
    "Download right page",
    "author agreement",
    "map to our office",
    "download flyer",
    "download extract",
    "Call for Papers",
    "View PDF Flyer",
    "Full Text HTML",
    "Submitting an item to the Open Research repository",
    "Download our catalogue",
    "Reprint Order Form",
    "Cost Confirmation and Order Form",
];

pub fn has_bad_href_word(href: &str) -> bool {
    let lowered = href.to_lowercase();
    if HREF_WHITELIST
        .iter()
        .any(|good| lowered.contains(&good.to_lowercase()))
    {
        return false;
    }
    BAD_HREF_WORDS
        .iter()
        .any(|bad| lowered.contains(&bad.to_lowercase()))
        || BAD_HREF_PATTERNS.iter().any(|re| re.is_match(href))
}

pub fn has_bad_anchor_word(anchor: &str) -> bool {
    let lowered = anchor.to_lowercase();
    BAD_ANCHOR_WORDS
        .iter()
        .any(|bad| lowered.contains(&bad.to_lowercase()))
}

/// Which page kinds a known-bad-link rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRuleScope {
    Any,
    PublisherOnly,
    MetaOnly,
}

/// A link known to be wrong on a given site.
#[derive(Debug, Clone, Copy)]
pub struct BadLinkRule {
    /// Regex on the resolved page URL; `None` matches every page.
    pub page: Option<&'static str>,
    /// Regex on the href; `None` rejects every link on matching pages.
    pub href: Option<&'static str>,
    pub scope: LinkRuleScope,
}

const fn bad_link(page: Option<&'static str>, href: Option<&'static str>, scope: LinkRuleScope) -> BadLinkRule {
    BadLinkRule { page, href, scope }
}

pub const BAD_LINKS: &[BadLinkRule] = &[
    // abstracts
    bad_link(Some(r"^https?://repositorio\.uchile\.cl/handle"), Some(r"item_\d+\.pdf"), LinkRuleScope::Any),
    // unstable disclaimer key
    bad_link(Some(r"^https?://dial\.uclouvain\.be"), Some(r"downloader\.php\?.*disclaimer="), LinkRuleScope::Any),
    bad_link(Some(r"^https?://(?:www)?\.goodfellowpublishers\.com"), Some(r"(?i)free_files/"), LinkRuleScope::Any),
    bad_link(Some(r"^https?://(?:www)?\.intellectbooks\.com"), Some(r"(?i)_nfc"), LinkRuleScope::Any),
    bad_link(Some(r"^https?://philpapers.org/rec/FISBAI"), Some(r"FISBAI\.pdf$"), LinkRuleScope::Any),
    bad_link(Some(r"^https?://eresearch\.qmu\.ac\.uk/"), Some(r"appendix\.pdf"), LinkRuleScope::Any),
    bad_link(None, Some(r"^https://dsq-sds\.org/article/download/298/345$"), LinkRuleScope::Any),
    bad_link(None, Some(r"^https?://cora\.ucc\.ie/bitstream/"), LinkRuleScope::MetaOnly),
    bad_link(None, Some(r"^https?://zefq-journal\.com/"), LinkRuleScope::MetaOnly),
    bad_link(None, Some(r"^https?://www\.nowpublishers\.com/"), LinkRuleScope::MetaOnly),
    bad_link(
        Some(r"^https?://researchonline\.federation\.edu\.au/vital/access/manager/Repository/"),
        None,
        LinkRuleScope::MetaOnly,
    ),
    bad_link(Some(r"^https?://www.dora.lib4ri.ch/[^/]*/islandora/object/"), None, LinkRuleScope::MetaOnly),
    bad_link(Some(r"^https?://ifs\.org\.uk/publications/"), None, LinkRuleScope::MetaOnly),
    bad_link(Some(r"^https?://ogma\.newcastle\.edu\.au"), None, LinkRuleScope::MetaOnly),
    bad_link(Some(r"^https?://cjon\.ons\.org"), None, LinkRuleScope::MetaOnly),
    bad_link(Some(r"^https?://nowpublishers\.com"), None, LinkRuleScope::MetaOnly),
    bad_link(Some(r"^https?://dspace\.library\.uu\.nl"), None, LinkRuleScope::MetaOnly),
    // issue pages listing every article
    bad_link(Some(r"^https?://www.reabic.net/journals/bir/"), None, LinkRuleScope::PublisherOnly),
    bad_link(Some(r"^https?://nnw.cz"), None, LinkRuleScope::PublisherOnly),
    bad_link(Some(r"^https?://www\.journal-imab-bg\.org/"), Some(r"TitlePage\.pdf$"), LinkRuleScope::PublisherOnly),
    bad_link(Some(r"^https?://(www\.)?molbiolcell\.org/"), Some(r"special_issues$"), LinkRuleScope::PublisherOnly),
    bad_link(
        Some(r"^https?://(www\.)?englishjournal\.net/"),
        Some(r"AuthorshipResponsibility\.pdf$"),
        LinkRuleScope::PublisherOnly,
    ),
];

pub struct CompiledBadLink {
    pub page: Option<Regex>,
    pub href: Option<Regex>,
    pub scope: LinkRuleScope,
}

pub static BAD_LINK_RULES: LazyLock<Vec<CompiledBadLink>> = LazyLock::new(|| {
    BAD_LINKS
        .iter()
        .filter_map(|rule| {
            let page = match rule.page {
                Some(p) => Some(Regex::new(p).ok()?),
                None => None,
            };
            let href = match rule.href {
                Some(p) => Some(Regex::new(p).ok()?),
                None => None,
            };
            Some(CompiledBadLink {
                page,
                href,
                scope: rule.scope,
            })
        })
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_compiles() {
        assert_eq!(FREE_MARKUP_RULES.len(), FREE_MARKUP.len());
        assert_eq!(BRONZE_RULES.len(), BRONZE_MARKUP.len());
        assert_eq!(HYBRID_RULES.len(), HYBRID_MARKUP.len());
        assert_eq!(BACKUP_HYBRID_RULES.len(), BACKUP_HYBRID_MARKUP.len());
        assert_eq!(PAGE_LICENSE_RULES.len(), PAGE_LICENSE_PATTERNS.len());
        assert_eq!(META_PDF_REWRITE_RULES.len(), META_PDF_REWRITES.len());
        assert_eq!(PUBLISHER_PDF_REWRITE_RULES.len(), PUBLISHER_PDF_REWRITES.len());
        assert_eq!(BAD_LINK_RULES.len(), BAD_LINKS.len());
        for selector in BAD_SECTION_SELECTORS.iter().chain(LICENSE_BAD_SECTION_SELECTORS) {
            assert!(scraper::Selector::parse(selector).is_ok(), "{}", selector);
        }
    }

    #[test]
    fn test_scopes() {
        let ctx = RuleContext {
            resolved_url: "https://www.ScienceDirect.com/science/article/pii/S1",
            publisher: Some("Elsevier BV"),
            issn_l: Some("1352-2310"),
        };
        assert!(Scope::UrlFragment("sciencedirect.com/").applies(&ctx));
        assert!(Scope::Publisher("Elsevier BV").applies(&ctx));
        assert!(!Scope::Publisher("Wiley").applies(&ctx));
        assert!(Scope::IssnL("1352-2310").applies(&ctx));
    }

    #[test]
    fn test_publisher_pdf_rewrites() {
        assert_eq!(
            rewrite_publisher_pdf_url("https://www.tandfonline.com/doi/epdf/10.1080/1"),
            "https://www.tandfonline.com/doi/pdf/10.1080/1"
        );
        assert_eq!(
            rewrite_publisher_pdf_url("https://onlinelibrary.wiley.com/doi/epdf/10.1002/x"),
            "https://onlinelibrary.wiley.com/doi/pdfdirect/10.1002/x"
        );
        assert_eq!(
            rewrite_publisher_pdf_url("https://ascopubs.org/doi/full/10.1200/JCO.1"),
            "https://ascopubs.org/doi/pdfdirect/10.1200/JCO.1"
        );
        assert_eq!(
            rewrite_publisher_pdf_url("https://repo.example.edu/a.pdf"),
            "https://repo.example.edu/a.pdf"
        );
    }

    #[test]
    fn test_license_trust() {
        assert!(!trust_publisher_license("https://www.molbiolcell.org/doi/10.1091/x"));
        assert!(trust_publisher_license("https://journals.plos.org/plosone/article?id=1"));
        assert!(trust_publisher_license("https://rupress.org/jcb/article/216/1/1"));
        assert!(!trust_publisher_license("https://rupress.org/jcb/article/218/1/1"));
        assert!(trust_repository_license("https://babel.hathitrust.org/cgi/pt?id=1"));
        assert!(!trust_repository_license("https://repo.example.edu/1"));
    }

    #[test]
    fn test_href_and_anchor_words() {
        assert!(has_bad_href_word("/content/suppl_file/x.pdf"));
        assert!(!has_bad_href_word("/files/190317_MainText_Figures_JNNP.pdf"));
        assert!(has_bad_href_word("/app/jmir_v21i9e15011_app1.pdf"));
        assert!(!has_bad_href_word("/bitstream/1/article.pdf"));
        assert!(has_bad_anchor_word("Supplementary Material"));
        assert!(!has_bad_anchor_word("download pdf"));
    }
}
