//! Rate limiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hosts that tolerate one request per second. Matched as hostname suffixes.
pub const COOPERATIVE_HOSTS: &[&str] = &[
    "citeseerx.ist.psu.edu",
    "www.ncbi.nlm.nih.gov",
    "pt.cision.com",
    "doaj.org",
    "hal.archives-ouvertes.fr",
    "figshare.com",
    "arxiv.org",
    "europepmc.org",
    "bibliotheques-specialisees.paris.fr",
    "nbn-resolving.de",
    "osti.gov",
    "zenodo.org",
    "kuleuven.be",
    "edoc.hu-berlin.de",
    "rug.nl",
];

/// Configuration for per-(endpoint, domain) request spacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub cooperative_hosts: Vec<String>,
    pub cooperative_interval_ms: u64,
    pub default_interval_ms: u64,
    /// Sleep between claim attempts.
    pub retry_sleep_ms: u64,
    /// Give up on a target after waiting this long.
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooperative_hosts: COOPERATIVE_HOSTS.iter().map(|h| h.to_string()).collect(),
            cooperative_interval_ms: 1_000,
            default_interval_ms: 10_000,
            retry_sleep_ms: 5_000,
            max_wait_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    /// Minimum spacing between requests to `netloc`.
    pub fn interval_for(&self, netloc: &str) -> Duration {
        let host = netloc.split(':').next().unwrap_or(netloc);
        let ms = if self.cooperative_hosts.iter().any(|h| host.ends_with(h.as_str())) {
            self.cooperative_interval_ms
        } else {
            self.default_interval_ms
        };
        Duration::from_millis(ms)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_for_host() {
        let config = RateLimitConfig::default();
        assert_eq!(config.interval_for("arxiv.org"), Duration::from_secs(1));
        assert_eq!(config.interval_for("lirias.kuleuven.be"), Duration::from_secs(1));
        assert_eq!(config.interval_for("www.rug.nl:443"), Duration::from_secs(1));
        assert_eq!(config.interval_for("repo.example.edu"), Duration::from_secs(10));
    }
}
