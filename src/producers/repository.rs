//! Locations from harvested pages: repository copies and publisher-equivalent
//! pages, matched to the work by DOI or by title with an author check.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::{Candidates, LocationProducer, ProducerContext};
use crate::models::evidence::{repository_match, FREE_ARTICLE, FREE_PDF};
use crate::models::{MatchType, OpenLocation, ScrapeTarget, Version, Work};
use crate::utils::normalize;

/// One repository returning this many title matches for a work is matching
/// on a generic title, so none of its title matches are kept.
pub const MAX_TITLE_MATCHES_PER_ENDPOINT: usize = 10;

/// Repositories only recorded first-available dates reliably from this day on.
fn first_reliable_availability_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 8, 7).unwrap_or_default()
}

/// A target linked to a work, with how the link was made.
#[derive(Debug, Clone, Copy)]
pub struct MatchedTarget<'a> {
    pub target: &'a ScrapeTarget,
    pub match_type: MatchType,
}

fn author_match(work: &Work, target: &ScrapeTarget) -> Option<MatchType> {
    if work.first_author.is_none() && work.last_author.is_none() {
        return Some(MatchType::Title);
    }
    if target.authors.is_empty() {
        return Some(MatchType::Title);
    }
    let authors = normalize(&target.authors.join(", "));
    let contains = |name: &Option<String>| {
        name.as_deref()
            .map(normalize)
            .is_some_and(|n| !n.is_empty() && authors.contains(&n))
    };
    if contains(&work.first_author) {
        Some(MatchType::TitleFirstAuthor)
    } else if contains(&work.last_author) {
        Some(MatchType::TitleLastAuthor)
    } else {
        None
    }
}

/// Targets that belong to `work`, tagged with their match type.
///
/// DOI matches always count. Title matches must pass the author check and
/// are dropped wholesale when one endpoint returns too many of them.
pub fn title_matched_targets<'a>(work: &Work, targets: &'a [ScrapeTarget]) -> Vec<MatchedTarget<'a>> {
    let title = work.title.as_deref().map(normalize).unwrap_or_default();

    let mut by_doi = Vec::new();
    let mut by_title = Vec::new();
    for target in targets {
        if target.doi.as_deref() == Some(work.doi.as_str()) {
            by_doi.push(MatchedTarget {
                target,
                match_type: MatchType::Doi,
            });
            continue;
        }
        let target_title = target.normalized_title.as_deref().map(normalize);
        if title.is_empty() || target_title.as_deref() != Some(title.as_str()) {
            continue;
        }
        match author_match(work, target) {
            Some(match_type) => by_title.push(MatchedTarget { target, match_type }),
            None => tracing::debug!("author check failed for {} on {}", work.doi, target.url),
        }
    }

    let mut per_endpoint: HashMap<Option<&str>, usize> = HashMap::new();
    for matched in &by_title {
        *per_endpoint.entry(matched.target.endpoint_id.as_deref()).or_default() += 1;
    }
    if per_endpoint.values().any(|&n| n >= MAX_TITLE_MATCHES_PER_ENDPOINT) {
        tracing::info!("matched too many pages in one repository for {}, ignoring title matches", work.doi);
        by_title.clear();
    }

    by_title.extend(by_doi);
    by_title
}

/// Springer ebook chapters whose repository copies are only tables of contents.
fn is_springer_toc_only(work: &Work, targets: &[MatchedTarget<'_>]) -> bool {
    work.publisher
        .as_deref()
        .is_some_and(|p| p.to_lowercase().contains("springer"))
        && targets.iter().any(|m| {
            m.target
                .scrape_pdf_url
                .as_deref()
                .is_some_and(|u| u.ends_with("?pdf=chapter%20toc"))
        })
}

/// Open repository copies.
pub struct GreenTargetProducer;

impl LocationProducer for GreenTargetProducer {
    fn name(&self) -> &'static str {
        "green_targets"
    }

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        let matched = title_matched_targets(work, ctx.targets);
        if is_springer_toc_only(work, &matched) {
            return candidates;
        }

        for m in matched {
            let target = m.target;
            if target.is_publisher_equivalent() || !target.is_open() {
                continue;
            }
            let mut location = OpenLocation::new(repository_match(m.match_type))
                .with_pdf_url(target.scrape_pdf_url.clone())
                .with_metadata_url(target.scrape_metadata_url.clone())
                .with_license(target.scrape_license)
                .with_version(target.scrape_version)
                .with_updated_at(target.scrape_updated)
                .with_oa_date(
                    target
                        .first_available
                        .filter(|d| *d >= first_reliable_availability_date()),
                )
                .with_doi(&work.doi);
            location.pmh_id = target.pmh_id.clone();
            location.endpoint_id = target.endpoint_id.clone();
            location.institution = target.repository_name.clone();
            location.bronze_exception = work.elsevier_bronze_exception(target.scrape_license);
            candidates.push_open(location);
        }
        candidates
    }
}

/// Pages that stand in for the publisher's own landing page.
pub struct PublisherEquivalentProducer;

impl LocationProducer for PublisherEquivalentProducer {
    fn name(&self) -> &'static str {
        "publisher_equivalent"
    }

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        for m in title_matched_targets(work, ctx.targets) {
            let target = m.target;
            if !target.is_publisher_equivalent() || !target.is_open() {
                continue;
            }
            let evidence = if target.scrape_pdf_url.is_some() {
                FREE_PDF
            } else {
                FREE_ARTICLE
            };
            let mut location = OpenLocation::new(evidence)
                .with_pdf_url(target.scrape_pdf_url.clone())
                .with_metadata_url(target.scrape_metadata_url.clone())
                .with_license(target.scrape_license)
                .with_version(Some(Version::Published))
                .with_updated_at(target.scrape_updated)
                .with_doi(target.doi.as_deref().unwrap_or(&work.doi));
            location.bronze_exception = work.elsevier_bronze_exception(target.scrape_license);
            if location.is_hybrid() {
                location.oa_date = work.issued;
            }
            candidates.push_open(location);
        }
        candidates
    }
}
