//! Identifier and name normalisation.

use std::sync::LazyLock;

use regex::Regex;

static DOI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(10\.\d+/[^\s]+)").unwrap());
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static STOPWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(a|an|the|and)\b").unwrap());

/// Reduce any DOI-bearing string (bare DOI, `doi:` prefix, resolver URL) to
/// its lowercase `10.xxxx/...` form. Returns `None` if no DOI is present.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let found = DOI_PATTERN.captures(&lowered)?.get(1)?.as_str();
    let doi = found.replace('\0', "");
    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

/// Collapse a free-text name into a comparison key: lowercase, markup and
/// punctuation removed, articles dropped, no whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_tags = TAG_PATTERN.replace_all(&lowered, "");
    let no_punct: String = no_tags
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let no_stopwords = STOPWORD_PATTERN.replace_all(&no_punct, "");
    no_stopwords.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Compare two publisher names after normalisation.
pub fn is_same_publisher(a: Option<&str>, b: &str) -> bool {
    match a {
        Some(a) if !a.is_empty() && !b.is_empty() => normalize(a) == normalize(b),
        _ => false,
    }
}
