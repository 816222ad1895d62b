//! Ordering, merging and deduplication of open locations.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{HostType, OpenLocation, Version};

/// Total order over locations: best first, with every field taking part so
/// the result never depends on the order candidates arrived in.
pub fn compare(a: &OpenLocation, b: &OpenLocation) -> Ordering {
    a.ranking_key().cmp(&b.ranking_key()).then_with(|| {
        (
            a.host_type,
            a.doi.as_deref(),
            a.pmh_id.as_deref(),
            a.institution.as_deref(),
            a.updated_at,
            a.bronze_exception,
        )
            .cmp(&(
                b.host_type,
                b.doi.as_deref(),
                b.pmh_id.as_deref(),
                b.institution.as_deref(),
                b.updated_at,
                b.bronze_exception,
            ))
    })
}

pub fn sort_locations(locations: &mut [OpenLocation]) {
    locations.sort_by(compare);
}

fn is_publisher_published(location: &OpenLocation) -> bool {
    location.host_type == HostType::Publisher && location.version == Some(Version::Published)
}

/// Copy the PDF of a publisher copy onto its landing-page twin.
///
/// Applies only when there is exactly one published publisher location with
/// a PDF, exactly one without, and both share a landing page. The two then
/// have the same best URL and collapse in [`dedup_by_best_url`].
pub fn merge_publisher_pdf(locations: &mut [OpenLocation]) {
    let without_pdf: Vec<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, l)| is_publisher_published(l) && l.pdf_url.is_none())
        .map(|(i, _)| i)
        .collect();
    let with_pdf: Vec<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, l)| is_publisher_published(l) && l.pdf_url.is_some())
        .map(|(i, _)| i)
        .collect();

    if let ([bare], [full]) = (without_pdf.as_slice(), with_pdf.as_slice()) {
        if locations[*bare].metadata_url == locations[*full].metadata_url {
            tracing::debug!(
                "merging publisher pdf {:?} onto landing page {:?}",
                locations[*full].pdf_url,
                locations[*bare].metadata_url
            );
            locations[*bare].pdf_url = locations[*full].pdf_url.clone();
        }
    }
}

/// Keep the first location for each best URL.
pub fn dedup_by_best_url(locations: Vec<OpenLocation>) -> Vec<OpenLocation> {
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|l| match l.best_url() {
            Some(url) => seen.insert(url.to_string()),
            None => true,
        })
        .collect()
}

/// Sort, merge publisher twins, re-sort and deduplicate.
pub fn rank(mut locations: Vec<OpenLocation>) -> Vec<OpenLocation> {
    sort_locations(&mut locations);
    merge_publisher_pdf(&mut locations);
    // the merged copy now scores differently
    sort_locations(&mut locations);
    dedup_by_best_url(locations)
}
