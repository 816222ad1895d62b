//! License extraction and normalisation.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::rules::{LICENSE_BAD_SECTION_SELECTORS, PAGE_LICENSE_RULES};
use crate::models::License;

/// Ordered (needle, license) pairs. Needles are matched against text that has
/// been lowercased with whitespace and dashes removed, so more specific
/// needles must come first.
const LICENSE_NEEDLES: &[(&str, License)] = &[
    ("creativecommons.org/licenses/byncnd", License::CcByNcNd),
    ("creativecommons.org/licenses/byncsa", License::CcByNcSa),
    ("creativecommons.org/licenses/bynd", License::CcByNd),
    ("creativecommons.org/licenses/bysa", License::CcBySa),
    ("creativecommons.org/licenses/bync", License::CcByNc),
    ("creativecommons.org/licenses/by", License::CcBy),
    ("creativecommons.org/publicdomain/zero", License::Cc0),
    ("creativecommons.org/publicdomain/mark", License::PublicDomain),
    ("ccbyncnd", License::CcByNcNd),
    ("ccbyncsa", License::CcByNcSa),
    ("ccbynd", License::CcByNd),
    ("ccbysa", License::CcBySa),
    ("ccbync", License::CcByNc),
    ("ccby", License::CcBy),
    ("creativecommonsattributionnoncommercialnoderivatives", License::CcByNcNd),
    ("creativecommonsattributionnoncommercialnoderivs", License::CcByNcNd),
    ("creativecommonsattributionnoncommercialsharealike", License::CcByNcSa),
    ("creativecommonsattributionnoderivatives", License::CcByNd),
    ("creativecommonsattributionsharealike", License::CcBySa),
    ("creativecommonsattributionnoncommercial", License::CcByNc),
    ("creativecommonsattribution", License::CcBy),
    ("cc0", License::Cc0),
    ("publicdomain", License::PublicDomain),
    ("acsauthorchoice", License::AcsSpecific),
    ("acseditorschoice", License::AcsSpecific),
    ("elsevier.com/openaccess/userlicense", License::ElsevierSpecific),
    ("mitlicense", License::Mit),
    ("gnugeneralpubliclicense", License::Gpl),
    ("thisisanopenaccessarticle", License::UnspecifiedOa),
];

/// Map free text to the closed license vocabulary.
pub fn find_normalized_license(text: &str) -> Option<License> {
    if text.is_empty() {
        return None;
    }
    let squashed: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    LICENSE_NEEDLES
        .iter()
        .find(|(needle, _)| squashed.contains(needle))
        .map(|(_, license)| *license)
}

static LICENSE_BAD_SECTIONS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    LICENSE_BAD_SECTION_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

/// The page with sections that mention other articles' licenses removed.
pub fn page_potential_license_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = html.to_string();
    for sel in LICENSE_BAD_SECTIONS.iter() {
        for section in document.select(sel) {
            let markup = section.html();
            if let Some(start) = text.find(&markup) {
                text.replace_range(start..start + markup.len(), "");
            } else {
                // Serialised markup can differ from the source; drop the text instead.
                for chunk in section.text().filter(|t| !t.trim().is_empty()) {
                    text = text.replacen(chunk, "", 1);
                }
            }
        }
    }
    text
}

/// What a license statement on the page says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLicense {
    /// The statement names a license in the vocabulary.
    Named(License),
    /// The statement only says the article is open.
    Unspecified,
}

impl PageLicense {
    pub fn license(&self) -> License {
        match self {
            Self::Named(license) => *license,
            Self::Unspecified => License::UnspecifiedOa,
        }
    }
}

/// Run the page license statement cascade; the first pattern that matches decides.
pub fn license_statement(license_text: &str) -> Option<PageLicense> {
    PAGE_LICENSE_RULES.iter().find_map(|re| {
        let captured = re.captures(license_text)?;
        let statement = captured.get(1).map(|m| m.as_str()).unwrap_or_default();
        Some(match find_normalized_license(statement) {
            Some(license) => PageLicense::Named(license),
            None => PageLicense::Unspecified,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cc_urls() {
        assert_eq!(
            find_normalized_license("https://creativecommons.org/licenses/by-nc-nd/4.0/"),
            Some(License::CcByNcNd)
        );
        assert_eq!(
            find_normalized_license("http://creativecommons.org/licenses/by/3.0/"),
            Some(License::CcBy)
        );
        assert_eq!(
            find_normalized_license("https://creativecommons.org/publicdomain/zero/1.0/"),
            Some(License::Cc0)
        );
    }

    #[test]
    fn test_normalize_prose() {
        assert_eq!(
            find_normalized_license("Creative Commons Attribution-NonCommercial License"),
            Some(License::CcByNc)
        );
        assert_eq!(find_normalized_license("CC BY-SA 4.0"), Some(License::CcBySa));
        assert_eq!(
            find_normalized_license("http://pubs.acs.org/page/policy/authorchoice_termsofuse.html ACS AuthorChoice"),
            Some(License::AcsSpecific)
        );
        assert_eq!(
            find_normalized_license("https://www.elsevier.com/open-access/userlicense/1.0/"),
            Some(License::ElsevierSpecific)
        );
        assert_eq!(find_normalized_license("All rights reserved"), None);
        assert_eq!(find_normalized_license(""), None);
    }

    #[test]
    fn test_license_statement_cascade() {
        let page = r#"<p>This is an open access article under the terms of the Creative Commons Attribution License, which permits use</p>"#;
        assert_eq!(license_statement(page), Some(PageLicense::Named(License::CcBy)));

        let vague = r#"<div class="openAccess-articleHeaderContainer">Open Access</div>"#;
        assert_eq!(license_statement(vague), Some(PageLicense::Unspecified));
        assert_eq!(license_statement("<p>Subscribe to read</p>"), None);
    }

    #[test]
    fn test_license_text_drops_featured_sections() {
        let html = r#"<html><body><div class="view-pnas-featured">creativecommons.org/licenses/by-nc</div><p>main</p></body></html>"#;
        let text = page_potential_license_text(html);
        assert!(!text.contains("creativecommons"));
        assert!(text.contains("main"));
    }
}
