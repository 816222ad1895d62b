//! PubMed Central articles, read from the Europe PMC search API rather than scraped.

use serde::Deserialize;

use super::{record_fetch_error, record_status, PageScrape, PageScraper};
use crate::classify::find_normalized_license;
use crate::models::{License, ScrapeOutcome, Version};

pub const DEFAULT_EUROPEPMC_API_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

/// Article whose scan starts mid-PDF.
const OFFSET_PDF_PMCID: &str = "pmc2126438";

#[derive(Debug, Clone)]
pub struct PmcPage {
    /// Lowercase PMCID, e.g. `pmc123456`.
    pub pmcid: String,
}

impl PmcPage {
    pub fn new(pmcid: &str) -> Self {
        Self {
            pmcid: pmcid.to_lowercase(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<PmcRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PmcRecord {
    #[serde(rename = "hasPDF")]
    has_pdf: Option<String>,
    auth_man: Option<String>,
    is_open_access: Option<String>,
    license: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref() == Some("Y")
}

fn outcome_for(pmcid: &str, record: &PmcRecord) -> ScrapeOutcome {
    let mut outcome = ScrapeOutcome {
        metadata_url: Some(format!("http://europepmc.org/articles/{}", pmcid)),
        ..ScrapeOutcome::default()
    };
    if flag(&record.has_pdf) {
        let mut pdf_url = format!("http://europepmc.org/articles/{}?pdf=render", pmcid);
        if pmcid == OFFSET_PDF_PMCID {
            pdf_url.push_str("#page=8");
        }
        outcome.pdf_url = Some(pdf_url);
    }
    outcome.version = Some(if flag(&record.auth_man) {
        Version::Accepted
    } else {
        Version::Published
    });
    outcome.license = match record.license.as_deref() {
        Some(raw) if !raw.is_empty() => find_normalized_license(raw),
        _ if flag(&record.is_open_access) => Some(License::UnspecifiedOa),
        _ => None,
    };
    outcome
}

pub(super) async fn scrape(scraper: &PageScraper, page: &PmcPage) -> PageScrape {
    let mut scrape = PageScrape::default();
    let query = match url::Url::parse_with_params(
        &scraper.europepmc_api_url,
        &[
            ("query", page.pmcid.as_str()),
            ("resulttype", "core"),
            ("format", "json"),
            ("tool", "oadoi"),
        ],
    ) {
        Ok(query) => query,
        Err(e) => {
            scrape
                .outcome
                .record_error(format!("ERROR: bad Europe PMC URL {}: {}", scraper.europepmc_api_url, e));
            return scrape;
        }
    };

    let response = match scraper.resolver.client().get(query.as_str()).await {
        Ok(response) => response,
        Err(e) => {
            record_fetch_error(&mut scrape.outcome, query.as_str(), &e, "query_pmc");
            return scrape;
        }
    };
    if response.status.as_u16() != 200 {
        record_status(&mut scrape.outcome, response.status.as_u16(), query.as_str(), "query_pmc");
        return scrape;
    }

    let parsed: SearchResponse = match serde_json::from_slice(response.body()) {
        Ok(parsed) => parsed,
        Err(e) => {
            scrape
                .outcome
                .record_error(format!("ERROR: bad Europe PMC response for {}: {}", page.pmcid, e));
            return scrape;
        }
    };

    match parsed.result_list.result.first() {
        Some(record) => scrape.outcome = outcome_for(&page.pmcid, record),
        None => tracing::info!("no Europe PMC record for {}", page.pmcid),
    }
    scrape
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{FetchConfig, HttpClient};
    use crate::pages::LandingPage;
    use crate::redirect::RedirectResolver;
    use crate::test_support::serve;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn record(has_pdf: &str, auth_man: &str, license: Option<&str>) -> PmcRecord {
        PmcRecord {
            has_pdf: Some(has_pdf.into()),
            auth_man: Some(auth_man.into()),
            is_open_access: Some("Y".into()),
            license: license.map(str::to_string),
        }
    }

    #[test]
    fn test_outcome_from_record() {
        let outcome = outcome_for("pmc42", &record("Y", "N", Some("cc by-nc")));
        assert_eq!(outcome.metadata_url.as_deref(), Some("http://europepmc.org/articles/pmc42"));
        assert_eq!(outcome.pdf_url.as_deref(), Some("http://europepmc.org/articles/pmc42?pdf=render"));
        assert_eq!(outcome.version, Some(Version::Published));
        assert_eq!(outcome.license, Some(License::CcByNc));

        let manuscript = outcome_for("pmc43", &record("N", "Y", None));
        assert_eq!(manuscript.pdf_url, None);
        assert_eq!(manuscript.version, Some(Version::Accepted));
        assert_eq!(manuscript.license, Some(License::UnspecifiedOa));

        let offset = outcome_for(OFFSET_PDF_PMCID, &record("Y", "N", None));
        assert!(offset.pdf_url.unwrap().ends_with("?pdf=render#page=8"));
    }

    #[tokio::test]
    async fn test_scrape_reads_search_api() {
        let base = serve(Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let results = if params.get("query").map(String::as_str) == Some("pmc1234")
                    && params.get("format").map(String::as_str) == Some("json")
                {
                    serde_json::json!([{"hasPDF": "Y", "authMan": "Y", "isOpenAccess": "Y", "license": "cc by"}])
                } else {
                    serde_json::json!([])
                };
                Json(serde_json::json!({"hitCount": 1, "resultList": {"result": results}}))
            }),
        ))
        .await;

        let scraper = PageScraper::new(RedirectResolver::new(HttpClient::new(FetchConfig::default())))
            .with_europepmc_api_url(format!("{}/search", base));

        let outcome = scraper.scrape(&LandingPage::Pmc(PmcPage::new("PMC1234"))).await.outcome;
        assert_eq!(outcome.version, Some(Version::Accepted));
        assert_eq!(outcome.license, Some(License::CcBy));
        assert!(outcome.pdf_url.is_some());

        let missing = scraper.scrape(&LandingPage::Pmc(PmcPage::new("pmc9"))).await.outcome;
        assert!(!missing.is_open());
        assert!(missing.error.is_empty());
    }
}
