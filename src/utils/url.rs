//! URL helpers for link resolution.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static JSESSIONID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";jsessionid=\w+").unwrap());
static DOI_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:dx\.)?doi\.org/(.*)").unwrap());
static WINDOWS_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]:\\").unwrap());

/// Hosts that serve the same content over https; plain http links to them are upgraded.
const HTTPS_HOSTS: &[&str] = &[
    "doi.org",
    "dx.doi.org",
    "arxiv.org",
    "europepmc.org",
    "www.ncbi.nlm.nih.gov",
    "zenodo.org",
    "figshare.com",
    "hal.archives-ouvertes.fr",
    "citeseerx.ist.psu.edu",
];

/// Extract the host from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}

/// Host plus explicit port, the unit rate limits are keyed on.
pub fn netloc(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Remove `;jsessionid=...` path parameters.
pub fn strip_jsessionid(url: &str) -> String {
    JSESSIONID.replace_all(url, "").into_owned()
}

/// Resolve an href found on a page against the page URL.
pub fn get_link_target(href: &str, base_url: &str) -> String {
    let href = strip_jsessionid(href.trim());
    match Url::parse(base_url).and_then(|base| base.join(&href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href,
    }
}

/// Upgrade known https-capable hosts and trim stray whitespace.
pub fn fix_url_scheme(url: &str) -> String {
    let trimmed = url.trim();
    if let Some(rest) = trimmed.strip_prefix("http://") {
        let host = rest.split(['/', '?', '#']).next().unwrap_or("");
        if HTTPS_HOSTS.contains(&host.to_lowercase().as_str()) {
            return format!("https://{}", rest);
        }
    }
    trimmed.to_string()
}

/// Normalise a URL pulled out of metadata or markup before it is stored.
pub fn clean_url(url: &str) -> String {
    let fixed = fix_url_scheme(url).replace(['\n', '\r'], "");
    if WINDOWS_PATH.is_match(&fixed) {
        fixed.replace('\\', "%5C")
    } else {
        fixed
    }
}

/// Whether the URL is a DOI resolver link.
pub fn is_doi_url(url: &str) -> bool {
    DOI_URL.is_match(&url.to_lowercase())
}

/// Canonical resolver URL for a DOI.
pub fn doi_url(doi: &str) -> String {
    format!("https://doi.org/{}", doi)
}
