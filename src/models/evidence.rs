//! Provenance strings recorded on open locations.
//!
//! The prefix of an evidence string carries meaning: `oa journal` marks an
//! open venue and `oa repository` marks a repository-hosted copy.

use super::MatchType;

pub const OA_JOURNAL_DOAJ: &str = "oa journal (via doaj)";
pub const OA_JOURNAL_PUBLISHER: &str = "oa journal (via publisher name)";
pub const OA_JOURNAL_OBSERVED: &str = "oa journal (via observed oa rate)";
pub const OA_JOURNAL_MANUAL: &str = "oa journal (via manual setting)";
pub const OA_JOURNAL_DOI_PREFIX: &str = "oa journal (via doi prefix)";
pub const OA_REPOSITORY_DOI_PREFIX: &str = "oa repository (via doi prefix)";
pub const OA_REPOSITORY_URL_PREFIX: &str = "oa repository (via url prefix)";
pub const CROSSREF_LICENSE: &str = "open (via crossref license)";
pub const CROSSREF_AUTHOR_MANUSCRIPT: &str = "open (via crossref license, author manuscript)";
pub const EMBARGOED_JOURNAL_POLICY: &str = "embargoed (via journal policy)";
pub const PMCID_LOOKUP: &str = "oa repository (via pmcid lookup)";
pub const SEMANTIC_SCHOLAR: &str = "oa repository (semantic scholar lookup)";
pub const FREE_PDF: &str = "open (via free pdf)";
pub const FREE_ARTICLE: &str = "open (via free article)";
pub const PAGE_SAYS_OPEN_ACCESS: &str = "open (via page says Open Access)";
pub const PAGE_SAYS_LICENSE: &str = "open (via page says license)";
pub const MANUAL: &str = "manual";

pub const OA_JOURNAL_PREFIX: &str = "oa journal";
pub const OA_REPOSITORY_PREFIX: &str = "oa repository";

/// Evidence for a repository page matched to a work through harvested metadata.
pub fn repository_match(match_type: MatchType) -> String {
    format!("oa repository (via OAI-PMH {} match)", match_type.as_str())
}

/// Replace the leading provenance word(s) of an evidence string with
/// `oa repository`, keeping any parenthesised detail.
pub fn as_repository(evidence: &str) -> String {
    match evidence.find(" (") {
        Some(idx) => format!("{}{}", OA_REPOSITORY_PREFIX, &evidence[idx..]),
        None => OA_REPOSITORY_PREFIX.to_string(),
    }
}
