//! Redirect resolver: follows HTTP and business-logic redirects with two
//! independent hop caps.

mod audit;
mod rules;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use rules::{next_hop, BodyRule, Hop, HopKind, RedirectContext, BODY_RULES};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::http_client::{FetchError, FetchOptions, HttpClient, HttpResponse};

/// Hop caps for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectLimits {
    pub max_http_hops: u32,
    pub max_business_hops: u32,
}

impl Default for RedirectLimits {
    fn default() -> Self {
        Self {
            max_http_hops: 15,
            max_business_hops: 5,
        }
    }
}

/// The last response fetched and how many hops it took to get there.
#[derive(Debug)]
pub struct Resolved {
    pub response: HttpResponse,
    pub http_hops: u32,
    pub business_hops: u32,
}

impl Resolved {
    pub fn url(&self) -> &str {
        &self.response.url
    }
}

/// Follows redirects on top of the fetch layer.
#[derive(Clone)]
pub struct RedirectResolver {
    client: HttpClient,
    limits: RedirectLimits,
    audit: Arc<dyn AuditSink>,
}

impl RedirectResolver {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            limits: RedirectLimits::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_limits(mut self, limits: RedirectLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Fetch `url` and keep following redirects until no rule fires or a hop
    /// cap is reached. The last response is returned either way.
    pub async fn resolve(
        &self,
        url: &str,
        publisher: Option<&str>,
        opts: &FetchOptions,
    ) -> Result<Resolved, FetchError> {
        let ctx = RedirectContext { publisher };
        let opts = FetchOptions {
            skip_redirect_body: true,
            ..opts.clone()
        };

        let mut current = url.to_string();
        let mut http_hops = 0;
        let mut business_hops = 0;

        loop {
            let response = self.client.fetch(&current, &opts).await?;
            let redirect = response.is_redirect();

            let eligible = (redirect && http_hops < self.limits.max_http_hops)
                || (response.status.as_u16() == 200
                    && business_hops < self.limits.max_business_hops);

            let hop = if eligible {
                next_hop(&response, &ctx)
            } else {
                tracing::debug!(
                    "Hop caps reached for {} ({} http, {} business)",
                    url,
                    http_hops,
                    business_hops
                );
                None
            };

            let Some((kind, hop)) = hop else {
                return Ok(Resolved {
                    response,
                    http_hops,
                    business_hops,
                });
            };

            match kind {
                HopKind::Http => http_hops += 1,
                HopKind::BusinessLogic => business_hops += 1,
            }

            if hop.audit {
                self.audit.record(&AuditEvent {
                    at: chrono::Utc::now(),
                    user_agent: opts
                        .headers
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
                        .map(|(_, v)| v.clone()),
                    requested_url: current.clone(),
                    redirect_url: hop.target.clone(),
                });
            }

            current = hop.target;
        }
    }
}
