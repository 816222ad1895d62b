//! Locations read straight from lookup tables: PubMed Central links and the
//! Semantic Scholar open-PDF index.

use super::{Candidates, LocationProducer, ProducerContext};
use crate::models::evidence::{PMCID_LOOKUP, SEMANTIC_SCHOLAR};
use crate::models::{OpenLocation, Version, Work};

/// Endpoint id recorded on Semantic Scholar locations.
pub const S2_ENDPOINT_ID: &str = "trmgzrn8eq4yx7ddvmzs";

/// Live PubMed Central copies.
pub struct PmcProducer;

impl LocationProducer for PmcProducer {
    fn name(&self) -> &'static str {
        "pmc"
    }

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        for link in work.pmc_links.iter().filter(|l| l.release == "live") {
            let location = OpenLocation::new(PMCID_LOOKUP)
                .with_metadata_url(Some(format!(
                    "https://www.ncbi.nlm.nih.gov/pmc/articles/{}",
                    link.pmcid.to_uppercase()
                )))
                .with_version(link.version)
                .with_updated_at(Some(ctx.now))
                .with_doi(&work.doi);
            candidates.push_open(location);
        }
        candidates
    }
}

pub struct SemanticScholarProducer;

impl LocationProducer for SemanticScholarProducer {
    fn name(&self) -> &'static str {
        "s2"
    }

    fn produce(&self, work: &Work, _ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        if let Some(lookup) = &work.s2 {
            let mut location = OpenLocation::new(SEMANTIC_SCHOLAR)
                .with_pdf_url(Some(lookup.pdf_url.clone()))
                .with_metadata_url(lookup.url.clone())
                .with_version(Some(Version::Submitted))
                .with_doi(&work.doi);
            location.endpoint_id = Some(S2_ENDPOINT_ID.to_string());
            candidates.push_open(location);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostType, PmcLink, S2Lookup};
    use chrono::Utc;

    #[test]
    fn test_only_live_pmc_links() {
        let mut work = Work::new("10.1234/pmc").unwrap();
        work.pmc_links = vec![
            PmcLink {
                pmcid: "pmc123".into(),
                release: "live".into(),
                version: Some(Version::Accepted),
            },
            PmcLink {
                pmcid: "pmc456".into(),
                release: "2030-01-01".into(),
                version: Some(Version::Published),
            },
        ];
        let found = PmcProducer.produce(&work, &ProducerContext::new(&[], Utc::now()));
        assert_eq!(found.open.len(), 1);
        let loc = &found.open[0];
        assert_eq!(
            loc.metadata_url.as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123")
        );
        assert_eq!(loc.host_type, HostType::Repository);
        assert_eq!(loc.version, Some(Version::Accepted));
    }

    #[test]
    fn test_semantic_scholar_lookup() {
        let mut work = Work::new("10.1234/s2").unwrap();
        assert!(SemanticScholarProducer
            .produce(&work, &ProducerContext::new(&[], Utc::now()))
            .is_empty());

        work.s2 = Some(S2Lookup {
            pdf_url: "https://pdfs.semanticscholar.org/ab/cd.pdf".into(),
            url: Some("https://www.semanticscholar.org/paper/abcd".into()),
        });
        let found = SemanticScholarProducer.produce(&work, &ProducerContext::new(&[], Utc::now()));
        let loc = &found.open[0];
        assert_eq!(loc.endpoint_id.as_deref(), Some(S2_ENDPOINT_ID));
        assert_eq!(loc.version, Some(Version::Submitted));
        assert!(loc.is_green());
    }
}
