//! Journal-level policy lookup: open venues, DOI and URL prefixes, and
//! registration-agency license records.

use chrono::{Duration, Months, NaiveDate};

use super::{make_preprint, Candidates, LocationProducer, ProducerContext};
use crate::classify::find_normalized_license;
use crate::models::evidence::{
    CROSSREF_AUTHOR_MANUSCRIPT, CROSSREF_LICENSE, EMBARGOED_JOURNAL_POLICY, OA_JOURNAL_DOAJ,
    OA_JOURNAL_DOI_PREFIX, OA_JOURNAL_MANUAL, OA_JOURNAL_OBSERVED, OA_JOURNAL_PUBLISHER,
    OA_REPOSITORY_DOI_PREFIX, OA_REPOSITORY_URL_PREFIX,
};
use crate::models::{CrossrefLicense, License, OaStatus, OpenLocation, Version, Work};

/// Open journals reachable even though their DOI lookups fail.
const FAILED_DOI_EXEMPT_ISSN_LS: &[&str] = &["2324-1098"];

/// Publishers whose scraped license beats the DOAJ listing's.
const SCRAPED_LICENSE_OVER_DOAJ: &[&str] = &["BMJ", "Swiss Chemical Society"];

/// Publishers whose author-manuscript licenses don't lead to a readable copy.
const NO_OPEN_MANUSCRIPT_PUBLISHERS: &[&str] = &[
    "IOP Publishing",
    "Wiley-Blackwell",
    "Royal Society of Chemistry (RSC)",
    "Oxford University Press (OUP)",
];

/// License that opens the manuscript twelve months after publication.
const CHORUS_DELAYED_LICENSE: &str =
    "https://academic.oup.com/journals/pages/open_access/funder_policies/chorus/standard_publication_model";

/// APS journal codes as they appear, lowercased, in DOIs.
const APS_JOURNAL_CODES: &[(&str, &str)] = &[
    ("revmodphys", "RevModPhys"),
    ("physrevlett", "PhysRevLett"),
    ("physrevaccelbeams", "PhysRevAccelBeams"),
    ("physrevapplied", "PhysRevApplied"),
    ("physrevphyseducres", "PhysRevPhysEducRes"),
    ("physrevstper", "PhysRevSTPER"),
    ("physreva", "PhysRevA"),
    ("physrevb", "PhysRevB"),
    ("physrevc", "PhysRevC"),
    ("physrevd", "PhysRevD"),
    ("physreve", "PhysRevE"),
    ("physrevx", "PhysRevX"),
];

/// Earliest open version-of-record license, with its start date.
fn open_vor_license(work: &Work) -> Option<&CrossrefLicense> {
    work.crossref_licenses
        .iter()
        .filter(|l| matches!(l.content_version.as_str(), "vor" | "unspecified"))
        .filter(|l| find_normalized_license(&l.url).is_some())
        .min_by_key(|l| l.start)
}

/// Author-manuscript licenses ordered by the date they take effect.
fn open_manuscript_licenses(work: &Work) -> Vec<(String, Option<NaiveDate>)> {
    let delay = if work.is_same_publisher("Institute of Electrical and Electronics Engineers (IEEE)") {
        Duration::days(365 * 2)
    } else {
        Duration::zero()
    };
    let mut licenses: Vec<_> = work
        .crossref_licenses
        .iter()
        .filter(|l| l.content_version == "am")
        .map(|l| (l.url.clone(), l.start.map(|d| d + delay)))
        .collect();
    licenses.sort_by_key(|(_, date)| *date);
    licenses
}

fn aps_accepted_url(doi: &str) -> Option<String> {
    let mut proper = doi.to_string();
    for (lower, upper) in APS_JOURNAL_CODES {
        if proper.contains(lower) {
            proper = proper.replacen(lower, upper, 1);
            break;
        }
    }
    (proper != doi).then(|| format!("https://link.aps.org/accepted/{}", proper))
}

/// What the policy cascade decided before it is turned into a location.
struct PolicyMatch {
    evidence: &'static str,
    license: Option<License>,
    version: Version,
    oa_date: Option<NaiveDate>,
    pdf_url: Option<String>,
}

impl PolicyMatch {
    fn new(evidence: &'static str, license: Option<License>, oa_date: Option<NaiveDate>) -> Self {
        Self {
            evidence,
            license,
            version: Version::Published,
            oa_date,
            pdf_url: None,
        }
    }
}

fn scraped_license(work: &Work) -> Option<License> {
    work.stored_scrape.as_ref().and_then(|s| s.license)
}

fn elsevier_manuscript_url(work: &Work) -> Option<String> {
    let pii = work.alternative_id.as_deref()?;
    let pii = pii.split_whitespace().collect::<Vec<_>>().join(" ");
    (!pii.is_empty()).then(|| format!("http://manuscript.elsevier.com/{}/pdf/{}.pdf", pii, pii))
}

/// `None` ends the cascade: listed publishers' manuscripts are never trusted.
fn author_manuscript_match(work: &Work, url: &str, date: Option<NaiveDate>) -> Option<PolicyMatch> {
    if NO_OPEN_MANUSCRIPT_PUBLISHERS.iter().any(|p| work.is_same_publisher(p)) {
        tracing::debug!("Ignoring author manuscript license on {}", work.doi);
        return None;
    }

    let mut found = PolicyMatch::new(
        CROSSREF_AUTHOR_MANUSCRIPT,
        Some(find_normalized_license(url).unwrap_or(License::PublisherSpecificOa)),
        date.or(work.issued),
    );
    found.version = Version::Accepted;

    if work.is_same_publisher("Elsevier BV") {
        found.pdf_url = elsevier_manuscript_url(work);
    } else if work.is_same_publisher("American Physical Society (APS)") {
        found.pdf_url = aps_accepted_url(&work.doi);
    } else if work.is_same_publisher("AIP Publishing") {
        found.pdf_url = Some(format!("https://aip.scitation.org/doi/{}", work.doi));
    } else if work.is_same_publisher("Wiley") || work.is_same_publisher("American Geophysical Union (AGU)") {
        found.pdf_url = Some(format!("https://rss.onlinelibrary.wiley.com/doi/am-pdf/{}", work.doi));
    } else if url == CHORUS_DELAYED_LICENSE {
        found.oa_date = work.issued.and_then(|d| d.checked_add_months(Months::new(12)));
    }
    Some(found)
}

fn policy_match(work: &Work, today: NaiveDate) -> Option<PolicyMatch> {
    let policy = &work.journal_policy;
    let year = work.year();

    if let Some(doaj) = policy.doaj.as_ref().filter(|l| l.covers(year)) {
        let license = match open_vor_license(work) {
            Some(vor) => find_normalized_license(&vor.url),
            None if SCRAPED_LICENSE_OVER_DOAJ.iter().any(|p| work.is_same_publisher(p))
                && scraped_license(work).is_some() =>
            {
                scraped_license(work)
            }
            None => doaj.license,
        };
        return Some(PolicyMatch::new(OA_JOURNAL_DOAJ, license, work.issued));
    }

    if let Some(listing) = policy.open_publisher.as_ref().filter(|l| l.covers(year)) {
        let license = match (listing.license, scraped_license(work)) {
            (Some(License::UnspecifiedOa), Some(scraped)) => Some(scraped),
            (license, _) => license,
        };
        return Some(PolicyMatch::new(OA_JOURNAL_PUBLISHER, license, work.issued));
    }

    if let Some(listing) = policy.open_publisher_genre.as_ref().filter(|l| l.covers(year)) {
        return Some(PolicyMatch::new(OA_JOURNAL_PUBLISHER, listing.license, work.issued));
    }

    if let (Some(since), Some(year)) = (policy.observed_oa_year, year) {
        if year >= since {
            return Some(PolicyMatch::new(OA_JOURNAL_OBSERVED, None, work.issued));
        }
    }

    if let Some(manual) = policy.manual.as_ref().filter(|l| l.covers(year)) {
        return Some(PolicyMatch::new(OA_JOURNAL_MANUAL, manual.license, work.issued));
    }

    if policy.repository_doi_prefix {
        return Some(PolicyMatch::new(OA_REPOSITORY_DOI_PREFIX, None, work.issued));
    }
    if policy.journal_doi_prefix {
        return Some(PolicyMatch::new(OA_JOURNAL_DOI_PREFIX, None, work.issued));
    }
    if policy.repository_url_prefix {
        return Some(PolicyMatch::new(OA_REPOSITORY_URL_PREFIX, None, work.issued));
    }

    if let Some(vor) = open_vor_license(work) {
        return Some(PolicyMatch::new(
            CROSSREF_LICENSE,
            find_normalized_license(&vor.url),
            vor.start.or(work.issued),
        ));
    }

    if let Some((url, date)) = open_manuscript_licenses(work).pop() {
        return author_manuscript_match(work, &url, date);
    }

    work.predicted_bronze_embargo_end(today)
        .map(|end| PolicyMatch::new(EMBARGOED_JOURNAL_POLICY, None, Some(end)))
}

/// Locations implied by what is known about the journal, without fetching anything.
pub struct JournalPolicyProducer;

impl JournalPolicyProducer {
    /// The policy location and whether its open date is still in the future.
    pub fn lookup(work: &Work, today: NaiveDate) -> Option<(OpenLocation, bool)> {
        let found = policy_match(work, today)?;

        let mut landing_url = work.url();
        let mut resolution_failed = work.doi_resolution_failed()
            && !work
                .issn_l
                .as_deref()
                .is_some_and(|i| FAILED_DOI_EXEMPT_ISSN_LS.contains(&i));

        if work.resolved_doi_status == Some(404)
            && work
                .resolved_doi_url
                .as_deref()
                .is_some_and(|u| u.starts_with("https://journals.co.za"))
        {
            landing_url = format!("https://journals.co.za/doi/{}", work.doi.to_uppercase());
            resolution_failed = false;
        }

        if resolution_failed {
            tracing::debug!("{} did not resolve, skipping {}", work.doi, found.evidence);
            return None;
        }

        let mut location = OpenLocation::new(found.evidence)
            .with_metadata_url(Some(landing_url))
            .with_pdf_url(found.pdf_url)
            .with_license(found.license)
            .with_version(Some(found.version))
            .with_oa_date(found.oa_date)
            .with_doi(&work.doi);
        location.bronze_exception = work.elsevier_bronze_exception(found.license);

        let is_future = location.oa_date.is_some_and(|d| d > today);
        if location.oa_status() == OaStatus::Bronze && !is_future {
            location.oa_date = None;
        }
        if work.is_preprint() {
            location = make_preprint(location);
        }
        Some((location, is_future))
    }
}

impl LocationProducer for JournalPolicyProducer {
    fn name(&self) -> &'static str {
        "journal_policy"
    }

    fn produce(&self, work: &Work, ctx: &ProducerContext<'_>) -> Candidates {
        let mut candidates = Candidates::default();
        if let Some((location, is_future)) = Self::lookup(work, ctx.today) {
            if is_future {
                candidates.push_embargoed(location);
            } else {
                candidates.push_open(location);
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostType, OpenListing, StoredScrape};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn work(doi: &str) -> Work {
        let mut w = Work::new(doi).unwrap();
        w.issued = NaiveDate::from_ymd_opt(2020, 3, 1);
        w
    }

    fn license(url: &str, version: &str, start: Option<NaiveDate>) -> CrossrefLicense {
        CrossrefLicense {
            url: url.into(),
            start,
            content_version: version.into(),
        }
    }

    #[test]
    fn test_doaj_journal_is_gold() {
        let mut w = work("10.1234/gold");
        w.journal_policy.doaj = Some(OpenListing {
            license: Some(License::CcByNc),
            since_year: Some(2010),
        });
        w.crossref_licenses
            .push(license("https://creativecommons.org/licenses/by/4.0/", "vor", None));

        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(!is_future);
        assert_eq!(loc.evidence, OA_JOURNAL_DOAJ);
        assert_eq!(loc.license, Some(License::CcBy));
        assert_eq!(loc.oa_status(), OaStatus::Gold);
        assert_eq!(loc.oa_date, w.issued);
        assert_eq!(loc.metadata_url.as_deref(), Some("https://doi.org/10.1234/gold"));
        assert_eq!(loc.version, Some(Version::Published));
    }

    #[test]
    fn test_open_publisher_prefers_scraped_license() {
        let mut w = work("10.1234/pub");
        w.journal_policy.open_publisher = Some(OpenListing {
            license: Some(License::UnspecifiedOa),
            since_year: None,
        });
        w.stored_scrape = Some(StoredScrape {
            license: Some(License::CcBySa),
            ..StoredScrape::default()
        });
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.evidence, OA_JOURNAL_PUBLISHER);
        assert_eq!(loc.license, Some(License::CcBySa));
    }

    #[test]
    fn test_crossref_license_in_future_is_embargoed() {
        let mut w = work("10.1234/hybrid");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1);
        w.crossref_licenses
            .push(license("http://creativecommons.org/licenses/by/4.0", "vor", start));

        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(is_future);
        assert_eq!(loc.evidence, CROSSREF_LICENSE);
        assert_eq!(loc.oa_date, start);
        assert_eq!(loc.oa_status(), OaStatus::Hybrid);

        let candidates = JournalPolicyProducer.produce(&w, &ProducerContext::new(&[], chrono::Utc::now()));
        assert_eq!(candidates.embargoed.len() + candidates.open.len(), 1);
    }

    #[test]
    fn test_author_manuscript_license() {
        let mut w = work("10.1109/tpami.2020.1");
        w.publisher = Some("Institute of Electrical and Electronics Engineers (IEEE)".into());
        w.crossref_licenses.push(license(
            "https://ieeexplore.ieee.org/Xplorehelp/downloads/license-information/OAPA.html",
            "am",
            NaiveDate::from_ymd_opt(2020, 3, 1),
        ));

        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(!is_future);
        assert_eq!(loc.evidence, CROSSREF_AUTHOR_MANUSCRIPT);
        assert_eq!(loc.version, Some(Version::Accepted));
        assert_eq!(loc.license, Some(License::PublisherSpecificOa));
        assert_eq!(loc.oa_date, NaiveDate::from_ymd_opt(2022, 3, 1));
    }

    #[test]
    fn test_manuscript_ignored_for_listed_publishers() {
        let mut w = work("10.1088/1234");
        w.publisher = Some("IOP Publishing".into());
        w.crossref_licenses
            .push(license("http://iopscience.iop.org/info/page/text-and-data-mining", "am", None));
        assert!(JournalPolicyProducer::lookup(&w, today()).is_none());
    }

    #[test]
    fn test_untrusted_manuscript_stops_before_predicted_embargo() {
        for publisher in NO_OPEN_MANUSCRIPT_PUBLISHERS {
            let mut w = work("10.1093/untrusted");
            w.issued = NaiveDate::from_ymd_opt(2024, 1, 1);
            w.publisher = Some(publisher.to_string());
            w.journal_policy.embargo_days = Some(365);
            w.crossref_licenses
                .push(license("https://academic.oup.com/pages/standard-publication-reuse-rights", "am", None));
            assert!(JournalPolicyProducer::lookup(&w, today()).is_none(), "{}", publisher);
        }

        // without the manuscript license the embargo prediction still applies
        let mut w = work("10.1093/untrusted");
        w.issued = NaiveDate::from_ymd_opt(2024, 1, 1);
        w.publisher = Some("Oxford University Press (OUP)".into());
        w.journal_policy.embargo_days = Some(365);
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.evidence, EMBARGOED_JOURNAL_POLICY);
    }

    #[test]
    fn test_elsevier_manuscript_url() {
        let mut w = work("10.1016/j.cell.2020.01.001");
        w.publisher = Some("Elsevier BV".into());
        w.alternative_id = Some("S0092867420300015".into());
        w.crossref_licenses.push(license(
            "http://www.elsevier.com/open-access/userlicense/1.0/",
            "am",
            NaiveDate::from_ymd_opt(2021, 3, 1),
        ));

        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(!is_future);
        assert_eq!(loc.evidence, CROSSREF_AUTHOR_MANUSCRIPT);
        assert_eq!(loc.version, Some(Version::Accepted));
        assert_eq!(
            loc.pdf_url.as_deref(),
            Some("http://manuscript.elsevier.com/S0092867420300015/pdf/S0092867420300015.pdf")
        );

        w.alternative_id = None;
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.pdf_url, None);
    }

    #[test]
    fn test_open_publisher_genre() {
        let mut w = work("10.1234/report");
        w.genre = Some("report".into());
        w.journal_policy.open_publisher_genre = Some(OpenListing {
            license: Some(License::CcBy),
            since_year: None,
        });
        // a later rule in the cascade that must not win
        w.journal_policy.journal_doi_prefix = true;

        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(!is_future);
        assert_eq!(loc.evidence, OA_JOURNAL_PUBLISHER);
        assert_eq!(loc.license, Some(License::CcBy));
        assert_eq!(loc.oa_date, w.issued);
        assert_eq!(loc.oa_status(), OaStatus::Gold);

        w.journal_policy.open_publisher_genre = Some(OpenListing {
            license: Some(License::CcBy),
            since_year: Some(2022),
        });
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.evidence, OA_JOURNAL_DOI_PREFIX);
    }

    #[test]
    fn test_aps_manuscript_url() {
        assert_eq!(
            aps_accepted_url("10.1103/physrevlett.120.1").as_deref(),
            Some("https://link.aps.org/accepted/10.1103/PhysRevLett.120.1")
        );
        assert_eq!(aps_accepted_url("10.1103/other"), None);
    }

    #[test]
    fn test_predicted_embargo() {
        let mut w = work("10.1234/delayed");
        w.issued = NaiveDate::from_ymd_opt(2024, 1, 1);
        w.journal_policy.embargo_days = Some(365);
        let (loc, is_future) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert!(is_future);
        assert_eq!(loc.evidence, EMBARGOED_JOURNAL_POLICY);
        assert_eq!(loc.oa_status(), OaStatus::Bronze);
        assert!(loc.oa_date.is_some());
    }

    #[test]
    fn test_failed_doi_resolution_emits_nothing() {
        let mut w = work("10.1234/gone");
        w.journal_policy.journal_doi_prefix = true;
        w.resolved_doi_status = Some(404);
        assert!(JournalPolicyProducer::lookup(&w, today()).is_none());

        w.resolved_doi_url = Some("https://journals.co.za/doi/abs/10.1234/gone".into());
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.metadata_url.as_deref(), Some("https://journals.co.za/doi/10.1234/GONE"));
    }

    #[test]
    fn test_prefix_matches_and_preprint_rewrite() {
        let mut w = work("10.1101/2020.1");
        w.journal_policy.repository_doi_prefix = true;
        w.genre = Some("posted-content".into());
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.host_type, HostType::Repository);
        assert_eq!(loc.version, Some(Version::Submitted));

        let mut w = work("10.1234/prefix");
        w.journal_policy.journal_doi_prefix = true;
        let (loc, _) = JournalPolicyProducer::lookup(&w, today()).unwrap();
        assert_eq!(loc.oa_status(), OaStatus::Gold);
        assert_eq!(loc.oa_date, w.issued);
    }
}
