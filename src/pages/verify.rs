//! Verification fetches: a link only counts once its target is fetched and
//! sniffed.

use super::{record_fetch_error, record_status, PageScraper};
use crate::classify::{is_a_pdf_page, is_word_doc, Link, RuleContext};
use crate::http_client::{FetchOptions, HttpResponse};
use crate::models::ScrapeOutcome;
use crate::utils::get_link_target;

impl PageScraper {
    /// Follow `link` from `base_url` and return the response if it is a PDF.
    pub(crate) async fn gets_a_pdf(
        &self,
        link: &Link,
        base_url: &str,
        publisher: Option<&str>,
        opts: &FetchOptions,
        outcome: &mut ScrapeOutcome,
    ) -> Option<HttpResponse> {
        if link.is_purchase_link() {
            return None;
        }
        let absolute_url = get_link_target(&link.href, base_url);
        tracing::debug!("checking whether {} is a pdf", absolute_url);
        self.fetch_pdf(&absolute_url, publisher, opts, outcome, "gets_a_pdf")
            .await
    }

    /// Fetch `url` and keep the response only if it is a PDF.
    pub(crate) async fn fetch_pdf(
        &self,
        url: &str,
        publisher: Option<&str>,
        opts: &FetchOptions,
        outcome: &mut ScrapeOutcome,
        during: &str,
    ) -> Option<HttpResponse> {
        let resolved = match self.resolver.resolve(url, publisher, opts).await {
            Ok(resolved) => resolved,
            Err(e) => {
                record_fetch_error(outcome, url, &e, during);
                return None;
            }
        };

        let response = resolved.response;
        if response.status.as_u16() != 200 {
            record_status(outcome, response.status.as_u16(), &response.url, during);
            return None;
        }

        let is_pdf = is_a_pdf_page(
            &response,
            &RuleContext {
                resolved_url: &response.url,
                publisher,
                issn_l: None,
            },
        );
        is_pdf.then_some(response)
    }

    /// Follow `link` and report whether it serves a Word document.
    pub(crate) async fn gets_a_word_doc(
        &self,
        link: &Link,
        base_url: &str,
        opts: &FetchOptions,
        outcome: &mut ScrapeOutcome,
    ) -> bool {
        if link.is_purchase_link() {
            return false;
        }
        let absolute_url = get_link_target(&link.href, base_url);
        match self.resolver.resolve(&absolute_url, None, opts).await {
            Ok(resolved) if resolved.response.status.as_u16() == 200 => is_word_doc(&resolved.response),
            Ok(_) => false,
            Err(e) => {
                record_fetch_error(outcome, &absolute_url, &e, "gets_a_word_doc");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{FetchConfig, HttpClient};
    use crate::redirect::RedirectResolver;
    use crate::test_support::serve;
    use axum::http::{header, StatusCode};
    use axum::response::{Html, IntoResponse};
    use axum::routing::get;
    use axum::Router;

    fn pdf_bytes() -> Vec<u8> {
        let mut body = b"%PDF-1.5\n".to_vec();
        body.extend(std::iter::repeat(b'x').take(400));
        body
    }

    fn scraper() -> PageScraper {
        PageScraper::new(RedirectResolver::new(HttpClient::new(FetchConfig::default())))
    }

    async fn server() -> String {
        serve(
            Router::new()
                .route(
                    "/paper.pdf",
                    get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], pdf_bytes()) }),
                )
                .route("/landing", get(|| async { Html("<html><body>not a pdf</body></html>") }))
                .route("/private.pdf", get(|| async { StatusCode::UNAUTHORIZED.into_response() }))
                .route("/gone.pdf", get(|| async { StatusCode::NOT_FOUND.into_response() })),
        )
        .await
    }

    #[tokio::test]
    async fn test_gets_a_pdf_verifies_target() {
        let base = server().await;
        let scraper = scraper();
        let opts = FetchOptions::default();
        let mut outcome = ScrapeOutcome::default();

        let found = scraper
            .gets_a_pdf(&Link::new("/paper.pdf", "pdf"), &format!("{}/landing", base), None, &opts, &mut outcome)
            .await;
        assert!(found.is_some());
        assert!(found.unwrap().url.ends_with("/paper.pdf"));

        let html = scraper
            .gets_a_pdf(&Link::new("/landing", "pdf"), &base, None, &opts, &mut outcome)
            .await;
        assert!(html.is_none());
        assert!(outcome.error.is_empty());
    }

    #[tokio::test]
    async fn test_gets_a_pdf_status_errors() {
        let base = server().await;
        let scraper = scraper();
        let opts = FetchOptions::default();
        let mut outcome = ScrapeOutcome::default();

        let private = scraper
            .gets_a_pdf(&Link::new("/private.pdf", "pdf"), &base, None, &opts, &mut outcome)
            .await;
        assert!(private.is_none());
        assert!(outcome.error.is_empty());

        let gone = scraper
            .gets_a_pdf(&Link::new("/gone.pdf", "pdf"), &base, None, &opts, &mut outcome)
            .await;
        assert!(gone.is_none());
        assert!(outcome.error.contains("status_code=404"));
        assert!(outcome.error.contains("in gets_a_pdf"));
    }

    #[tokio::test]
    async fn test_purchase_link_is_never_fetched() {
        let mut outcome = ScrapeOutcome::default();
        let link = Link::new("http://127.0.0.1:9/paper.pdf", "purchase pdf");
        let found = scraper()
            .gets_a_pdf(&link, "http://127.0.0.1:9/", None, &FetchOptions::default(), &mut outcome)
            .await;
        assert!(found.is_none());
        assert!(outcome.error.is_empty());
    }
}
