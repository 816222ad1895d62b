//! Normalised license vocabulary.

use serde::{Deserialize, Serialize};

/// A license tag from the closed vocabulary every producer normalises to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum License {
    #[serde(rename = "cc-by")]
    CcBy,
    #[serde(rename = "cc-by-sa")]
    CcBySa,
    #[serde(rename = "cc-by-nd")]
    CcByNd,
    #[serde(rename = "cc-by-nc")]
    CcByNc,
    #[serde(rename = "cc-by-nc-sa")]
    CcByNcSa,
    #[serde(rename = "cc-by-nc-nd")]
    CcByNcNd,
    #[serde(rename = "cc0")]
    Cc0,
    #[serde(rename = "pd")]
    PublicDomain,
    #[serde(rename = "mit")]
    Mit,
    #[serde(rename = "gpl")]
    Gpl,
    #[serde(rename = "acs-specific: authorchoice/editors choice usage agreement")]
    AcsSpecific,
    #[serde(rename = "elsevier-specific: oa user license")]
    ElsevierSpecific,
    #[serde(rename = "publisher-specific-oa")]
    PublisherSpecificOa,
    #[serde(rename = "implied-oa")]
    ImpliedOa,
    #[serde(rename = "unspecified-oa")]
    UnspecifiedOa,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CcBy => "cc-by",
            Self::CcBySa => "cc-by-sa",
            Self::CcByNd => "cc-by-nd",
            Self::CcByNc => "cc-by-nc",
            Self::CcByNcSa => "cc-by-nc-sa",
            Self::CcByNcNd => "cc-by-nc-nd",
            Self::Cc0 => "cc0",
            Self::PublicDomain => "pd",
            Self::Mit => "mit",
            Self::Gpl => "gpl",
            Self::AcsSpecific => "acs-specific: authorchoice/editors choice usage agreement",
            Self::ElsevierSpecific => "elsevier-specific: oa user license",
            Self::PublisherSpecificOa => "publisher-specific-oa",
            Self::ImpliedOa => "implied-oa",
            Self::UnspecifiedOa => "unspecified-oa",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cc-by" => Some(Self::CcBy),
            "cc-by-sa" => Some(Self::CcBySa),
            "cc-by-nd" => Some(Self::CcByNd),
            "cc-by-nc" => Some(Self::CcByNc),
            "cc-by-nc-sa" => Some(Self::CcByNcSa),
            "cc-by-nc-nd" => Some(Self::CcByNcNd),
            "cc0" => Some(Self::Cc0),
            "pd" => Some(Self::PublicDomain),
            "mit" => Some(Self::Mit),
            "gpl" => Some(Self::Gpl),
            "acs-specific: authorchoice/editors choice usage agreement" => Some(Self::AcsSpecific),
            "elsevier-specific: oa user license" => Some(Self::ElsevierSpecific),
            "publisher-specific-oa" => Some(Self::PublisherSpecificOa),
            "implied-oa" => Some(Self::ImpliedOa),
            "unspecified-oa" => Some(Self::UnspecifiedOa),
            _ => None,
        }
    }

    /// Whether the tag names an actual license rather than a bare "it's open" claim.
    pub fn is_explicit(&self) -> bool {
        !matches!(self, Self::UnspecifiedOa | Self::ImpliedOa)
    }

    /// Rank used when ordering locations: explicit > unspecified > none.
    pub fn specificity(license: Option<&License>) -> u8 {
        match license {
            Some(l) if l.is_explicit() => 2,
            Some(_) => 1,
            None => 0,
        }
    }
}

impl std::fmt::Display for License {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uses_tag_strings() {
        let json = serde_json::to_string(&License::CcByNcNd).unwrap();
        assert_eq!(json, "\"cc-by-nc-nd\"");
        let parsed: License = serde_json::from_str("\"unspecified-oa\"").unwrap();
        assert_eq!(parsed, License::UnspecifiedOa);
    }

    #[test]
    fn test_specificity() {
        assert_eq!(License::specificity(Some(&License::CcBy)), 2);
        assert_eq!(License::specificity(Some(&License::UnspecifiedOa)), 1);
        assert_eq!(License::specificity(None), 0);
    }
}
