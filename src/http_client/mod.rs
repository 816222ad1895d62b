//! Fetcher: one bounded HTTP GET with host-aware proxy and profile selection.
//!
//! Redirects are never followed here; the redirect resolver owns that loop.

mod error;
mod profile;
mod response;
mod user_agent;

pub use error::FetchError;
pub use profile::{FetchProfile, ProfileSelector};
pub use response::{parse_content_disposition_filename, HttpResponse};
pub use user_agent::{default_user_agent, resolve_user_agent, DEFAULT_CONTACT};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, FROM};
use reqwest::{Certificate, Client, Proxy};
use serde::Deserialize;

/// Default cap on any buffered body.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 25 * 1024 * 1024;

/// Limits, credentials and routing tables for the fetch layer.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_body_bytes: u64,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Timeout multiplier for slow (proxied) requests.
    pub slow_multiplier: u32,
    pub max_attempts: u32,
    pub max_attempts_slow: u32,
    pub retry_backoff: Duration,
    pub user_agent: Option<String>,
    pub contact_email: String,
    pub stealth_proxy_url: Option<String>,
    /// Extra headers sent to the rotating proxy.
    pub stealth_headers: HashMap<String, String>,
    /// Header carrying the proxy session id.
    pub stealth_session_header: String,
    /// Header asking the proxy for a longer upstream timeout in slow mode.
    pub stealth_timeout_header: String,
    pub extraction_api_url: String,
    pub extraction_api_key: Option<String>,
    pub static_ip_proxy_url: Option<String>,
    /// PEM bundle added to the trust store when verifying TLS.
    pub ca_bundle: Option<PathBuf>,
    pub profiles: ProfileSelector,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let mut stealth_headers = HashMap::new();
        stealth_headers.insert("X-Proxy-Profile".to_string(), "desktop".to_string());
        stealth_headers.insert("X-Proxy-Cookies".to_string(), "disable".to_string());
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            slow_multiplier: 10,
            max_attempts: 2,
            max_attempts_slow: 3,
            retry_backoff: Duration::from_secs(1),
            user_agent: None,
            contact_email: DEFAULT_CONTACT.to_string(),
            stealth_proxy_url: None,
            stealth_headers,
            stealth_session_header: "X-Proxy-Session".to_string(),
            stealth_timeout_header: "X-Proxy-Timeout".to_string(),
            extraction_api_url: "https://api.zyte.com/v1/extract".to_string(),
            extraction_api_key: None,
            static_ip_proxy_url: None,
            ca_bundle: None,
            profiles: ProfileSelector::default(),
        }
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    /// Route through the proxy with multiplied timeouts and a larger retry budget.
    pub ask_slowly: bool,
    pub verify_tls: bool,
    /// Leave the body of 3xx responses unread. Any other body is read
    /// inside the retry loop, so a failure mid-body is retried too.
    pub skip_redirect_body: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProxyRoute {
    None,
    Stealth,
    StaticIp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: ProxyRoute,
    identify: bool,
    slow: bool,
    verify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionAnswer {
    status_code: Option<u16>,
    url: Option<String>,
    http_response_body: Option<String>,
    #[serde(default)]
    http_response_headers: Vec<ExtractionHeader>,
}

#[derive(Debug, Deserialize)]
struct ExtractionHeader {
    name: String,
    value: String,
}

/// HTTP client shared by every component that touches the network.
///
/// Underlying `reqwest` clients are built lazily, one per combination of
/// proxy route, identification, slowness and TLS verification.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<FetchConfig>,
    clients: Arc<Mutex<HashMap<ClientKey, Client>>>,
}

impl HttpClient {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The profile a URL would be fetched with, after falling back for
    /// profiles whose credentials are not configured.
    pub fn profile_for(&self, url: &str) -> FetchProfile {
        match self.config.profiles.select(url) {
            FetchProfile::ExtractionApi if self.config.extraction_api_key.is_none() => {
                tracing::debug!("No extraction API key, fetching {} directly", url);
                FetchProfile::Direct
            }
            FetchProfile::Stealth if self.config.stealth_proxy_url.is_none() => {
                tracing::debug!("No stealth proxy, fetching {} directly", url);
                FetchProfile::Direct
            }
            other => other,
        }
    }

    /// Fetch with default options: buffered body, no TLS verification.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.fetch(url, &FetchOptions::default()).await
    }

    /// Fetch `url`, retrying transient failures with a fixed backoff.
    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<HttpResponse, FetchError> {
        let max_attempts = if opts.ask_slowly {
            self.config.max_attempts_slow
        } else {
            self.config.max_attempts
        }
        .max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url, opts).await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::info!("Fetching {} failed ({}), trying again", url, e);
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    tracing::info!("Giving up on {} after {} attempt(s): {}", url, attempt, e);
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }

    async fn fetch_once(&self, url: &str, opts: &FetchOptions) -> Result<HttpResponse, FetchError> {
        let profile = self.profile_for(url);
        tracing::info!("LIVE GET on {} ({})", url, profile.as_str());

        if profile == FetchProfile::ExtractionApi {
            return self.fetch_via_extraction_api(url).await;
        }

        let mut url = url.to_string();
        let stealth = profile == FetchProfile::Stealth;
        let proxy = if url.contains("citeseerx.ist.psu.edu/") {
            url = url.replacen("http://", "https://", 1);
            if self.config.static_ip_proxy_url.is_some() {
                ProxyRoute::StaticIp
            } else {
                ProxyRoute::None
            }
        } else if stealth || (opts.ask_slowly && self.config.stealth_proxy_url.is_some()) {
            ProxyRoute::Stealth
        } else {
            ProxyRoute::None
        };

        let client = self.client_for(ClientKey {
            proxy,
            identify: !stealth,
            slow: opts.ask_slowly,
            verify: opts.verify_tls,
        })?;

        let mut request = client.get(&url);
        for (name, value) in &opts.headers {
            if stealth && name.eq_ignore_ascii_case("user-agent") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        if proxy == ProxyRoute::Stealth {
            for (name, value) in &self.config.stealth_headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let session = opts
                .session_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            request = request.header(self.config.stealth_session_header.as_str(), session);
            if opts.ask_slowly {
                request = request.header(self.config.stealth_timeout_header.as_str(), "300000");
            }
        } else {
            request = request.header("Accept-Language", "en-US,en;q=0.9");
        }

        let response = request.send().await?;
        let mut response = HttpResponse::pending(response, self.config.max_body_bytes);

        if let Some(declared) = response.content_length() {
            if declared > self.config.max_body_bytes {
                tracing::info!("Content too large on GET on {}", url);
                return Err(FetchError::TooLarge {
                    limit: self.config.max_body_bytes,
                    observed: declared,
                });
            }
        }

        if !(opts.skip_redirect_body && response.is_redirect()) {
            response.load().await?;
        }
        Ok(response)
    }

    async fn fetch_via_extraction_api(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let key = self
            .config
            .extraction_api_key
            .as_deref()
            .ok_or_else(|| FetchError::Build("extraction API key not configured".to_string()))?;

        let client = self.client_for(ClientKey {
            proxy: ProxyRoute::None,
            identify: true,
            slow: true,
            verify: true,
        })?;

        tracing::info!("Calling extraction API for {}", url);
        let answer = client
            .post(&self.config.extraction_api_url)
            .basic_auth(key, Some(""))
            .json(&serde_json::json!({
                "url": url,
                "httpResponseHeaders": true,
                "httpResponseBody": true,
            }))
            .send()
            .await?;

        let api_status = answer.status().as_u16();
        if (520..530).contains(&api_status) {
            return Err(FetchError::Transient(format!(
                "extraction API returned {} for {}",
                api_status, url
            )));
        }

        let answer: ExtractionAnswer = answer
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("extraction API answer: {}", e)))?;

        let status = answer.status_code.unwrap_or(api_status);
        tracing::info!("Extraction API status code for {}: {}", url, status);
        let final_url = answer.url.unwrap_or_else(|| url.to_string());

        if status != 200 {
            return Ok(HttpResponse::from_parts(&final_url, status, HashMap::new(), Vec::new()));
        }

        let body = match answer.http_response_body {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| FetchError::Malformed(format!("extraction API body: {}", e)))?,
            None => Vec::new(),
        };
        if body.len() as u64 > self.config.max_body_bytes {
            return Err(FetchError::TooLarge {
                limit: self.config.max_body_bytes,
                observed: body.len() as u64,
            });
        }

        let headers = answer
            .http_response_headers
            .into_iter()
            .map(|h| (h.name, h.value))
            .collect();
        Ok(HttpResponse::from_parts(&final_url, status, headers, body))
    }

    fn client_for(&self, key: ClientKey) -> Result<Client, FetchError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| FetchError::Build("client cache poisoned".to_string()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = self.build_client(key)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn build_client(&self, key: ClientKey) -> Result<Client, FetchError> {
        let multiplier = if key.slow {
            self.config.slow_multiplier.max(1)
        } else {
            1
        };

        let mut builder = Client::builder()
            .connect_timeout(self.config.connect_timeout * multiplier)
            .read_timeout(self.config.read_timeout * multiplier)
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .gzip(true)
            .brotli(true);

        if key.identify {
            builder = builder.user_agent(resolve_user_agent(
                self.config.user_agent.as_deref(),
                &self.config.contact_email,
            ));
            let mut headers = HeaderMap::new();
            let from = HeaderValue::from_str(&self.config.contact_email)
                .map_err(|e| FetchError::Build(format!("invalid contact email: {}", e)))?;
            headers.insert(FROM, from);
            builder = builder.default_headers(headers);
        }

        let proxy_url = match key.proxy {
            ProxyRoute::None => None,
            ProxyRoute::Stealth => self.config.stealth_proxy_url.as_deref(),
            ProxyRoute::StaticIp => self.config.static_ip_proxy_url.as_deref(),
        };
        if let Some(proxy_url) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy_url)?);
        }

        if !key.verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(bundle) = &self.config.ca_bundle {
            let pem = std::fs::read(bundle).map_err(|e| {
                FetchError::Build(format!("reading CA bundle {}: {}", bundle.display(), e))
            })?;
            for cert in Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(FetchError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::body::Body;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn small_cap_client(cap: u64) -> HttpClient {
        HttpClient::new(FetchConfig {
            max_body_bytes: cap,
            retry_backoff: Duration::from_millis(10),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_fetch_reads_body_and_headers() {
        let base = serve(Router::new().route(
            "/page",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html>hello</html>") }),
        ))
        .await;

        let client = HttpClient::new(FetchConfig::default());
        let response = client.get(&format!("{}/page", base)).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.text(), "<html>hello</html>");
    }

    #[tokio::test]
    async fn test_declared_length_over_cap_is_too_large() {
        let base = serve(Router::new().route(
            "/big",
            get(|| async { vec![b'a'; 4096] }),
        ))
        .await;

        let client = small_cap_client(1024);
        let err = client.get(&format!("{}/big", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, observed: 4096 }));
    }

    #[tokio::test]
    async fn test_streamed_100mb_body_is_too_large() {
        let base = serve(Router::new().route(
            "/stream",
            get(|| async {
                let chunks = futures::stream::iter(
                    (0..1600).map(|_| Ok::<_, std::io::Error>(vec![b'x'; 64 * 1024])),
                );
                Body::from_stream(chunks)
            }),
        ))
        .await;

        let client = HttpClient::new(FetchConfig::default());
        let err = client.get(&format!("{}/stream", base)).await.unwrap_err();
        match err {
            FetchError::TooLarge { limit, observed } => {
                assert_eq!(limit, DEFAULT_MAX_BODY_BYTES);
                assert!(observed > limit);
                assert!(observed <= limit + 1024 * 1024);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let base = serve(Router::new().route(
            "/moved",
            get(|| async { (axum::http::StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]) }),
        ))
        .await;

        let client = HttpClient::new(FetchConfig::default());
        let response = client.get(&format!("{}/moved", base)).await.unwrap();
        assert_eq!(response.status.as_u16(), 302);
        assert_eq!(response.location(), Some("/elsewhere"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = small_cap_client(1024);
        let err = client.get(&format!("http://{}/", addr)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_extraction_api_body_is_decoded() {
        let base = serve(Router::new().route(
            "/extract",
            post(|Json(req): Json<serde_json::Value>| async move {
                let body = base64::engine::general_purpose::STANDARD.encode("<html>rendered</html>");
                Json(serde_json::json!({
                    "url": req["url"],
                    "statusCode": 200,
                    "httpResponseBody": body,
                    "httpResponseHeaders": [{"name": "Content-Type", "value": "text/html"}],
                }))
                .into_response()
            }),
        ))
        .await;

        let client = HttpClient::new(FetchConfig {
            extraction_api_url: format!("{}/extract", base),
            extraction_api_key: Some("key".to_string()),
            ..Default::default()
        });
        let url = "https://onlinelibrary.wiley.com/doi/10.1002/abc";
        assert_eq!(client.profile_for(url), FetchProfile::ExtractionApi);

        let response = client.get(url).await.unwrap();
        assert_eq!(response.url, url);
        assert_eq!(response.text(), "<html>rendered</html>");
        assert_eq!(response.content_type(), Some("text/html"));
    }

    #[test]
    fn test_unconfigured_profiles_fall_back_to_direct() {
        let client = HttpClient::new(FetchConfig::default());
        assert_eq!(
            client.profile_for("https://www.nature.com/articles/x"),
            FetchProfile::Direct
        );
        assert_eq!(
            client.profile_for("https://doi.org/10.1016/j.x"),
            FetchProfile::Direct
        );
    }
}
