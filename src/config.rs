//! Configuration management.
//!
//! A config file (TOML, YAML or JSON) is folded into [`Settings`], whose
//! defaults carry every tuning constant. Environment variables override the
//! file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_client::FetchConfig;
use crate::priority::PriorityConfig;
use crate::rate_limit::RateLimitConfig;
use crate::redirect::RedirectLimits;
use crate::scheduler::SchedulerConfig;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "OAFINDER_CONFIG";

/// Default database filename.
const DEFAULT_DATABASE_FILENAME: &str = "oafinder.db";

/// Days between re-scrapes of a target whose last scrape failed.
pub const DEFAULT_STALENESS_DAYS: i64 = 7;

/// Errors loading configuration or rule files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} in {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Parse `contents` with the format implied by the file extension.
/// Unknown extensions are read as JSON.
pub fn parse_by_extension<T: DeserializeOwned>(path: &Path, contents: &str) -> Result<T, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let parse_error = |format: &'static str, message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        message,
    };
    match ext {
        "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string())),
        _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
    }
}

/// Read and parse a config or rule file.
pub async fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_by_extension(path, &contents)
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database holding the queue and the harvest index.
    pub database_path: PathBuf,
    pub fetch: FetchConfig,
    pub redirect: RedirectLimits,
    pub rate_limit: RateLimitConfig,
    /// Rate limit backend (None = in-memory, "redis://..." = Redis).
    pub rate_limit_backend: Option<String>,
    pub scheduler: SchedulerConfig,
    pub priority: PriorityConfig,
    /// Minimum days between re-scrapes of a target whose last scrape failed.
    pub staleness_days: i64,
    /// Extra manual overrides, keyed by DOI.
    pub manual_overrides: Option<PathBuf>,
    /// Extra reported-noncompliant URL fragments, keyed by DOI.
    pub noncompliant: Option<PathBuf>,
    /// Where fetched pages and PDFs are archived; nothing is kept when unset.
    pub archive_dir: Option<PathBuf>,
    pub europepmc_api_url: String,
    pub pdftotext_binary: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oafinder");

        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            fetch: FetchConfig::default(),
            redirect: RedirectLimits::default(),
            rate_limit: RateLimitConfig::default(),
            rate_limit_backend: None,
            scheduler: SchedulerConfig::default(),
            priority: PriorityConfig::default(),
            staleness_days: DEFAULT_STALENESS_DAYS,
            manual_overrides: None,
            noncompliant: None,
            archive_dir: None,
            europepmc_api_url: crate::pages::DEFAULT_EUROPEPMC_API_URL.to_string(),
            pdftotext_binary: None,
        }
    }
}

impl Settings {
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::days(self.staleness_days)
    }

    /// Settings as JSON, with credentials masked.
    pub fn summary(&self) -> serde_json::Value {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "********");
        serde_json::json!({
            "database_path": self.database_path,
            "fetch": {
                "max_body_bytes": self.fetch.max_body_bytes,
                "connect_timeout_secs": self.fetch.connect_timeout.as_secs(),
                "read_timeout_secs": self.fetch.read_timeout.as_secs(),
                "slow_multiplier": self.fetch.slow_multiplier,
                "max_attempts": self.fetch.max_attempts,
                "max_attempts_slow": self.fetch.max_attempts_slow,
                "contact_email": self.fetch.contact_email,
                "user_agent": self.fetch.user_agent,
                "stealth_proxy_url": mask(&self.fetch.stealth_proxy_url),
                "extraction_api_key": mask(&self.fetch.extraction_api_key),
                "static_ip_proxy_url": mask(&self.fetch.static_ip_proxy_url),
                "ca_bundle": self.fetch.ca_bundle,
            },
            "redirect": self.redirect,
            "rate_limit": self.rate_limit,
            "rate_limit_backend": self.rate_limit_backend,
            "scheduler": self.scheduler,
            "priority": self.priority,
            "staleness_days": self.staleness_days,
            "manual_overrides": self.manual_overrides,
            "noncompliant": self.noncompliant,
            "archive_dir": self.archive_dir,
            "europepmc_api_url": self.europepmc_api_url,
            "pdftotext_binary": self.pdftotext_binary,
        })
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(path) = get("DATABASE_PATH") {
            tracing::debug!("Using DATABASE_PATH from environment: {}", path);
            self.database_path = expand_path(&path, Path::new("."));
        }
        if let Some(backend) = get("RATE_LIMIT_BACKEND") {
            tracing::debug!("Using RATE_LIMIT_BACKEND from environment: {}", backend);
            self.rate_limit_backend = (backend != "memory").then_some(backend);
        }
        if let Some(workers) = get("SCRAPE_PROCS_PER_WORKER") {
            match workers.parse::<usize>() {
                Ok(n) if n > 0 => self.scheduler.workers = n,
                _ => tracing::warn!("Ignoring invalid SCRAPE_PROCS_PER_WORKER: {}", workers),
            }
        }
        if let Some(url) = get("STEALTH_PROXY_URL") {
            self.fetch.stealth_proxy_url = Some(url);
        }
        if let Some(key) = get("EXTRACTION_API_KEY") {
            self.fetch.extraction_api_key = Some(key);
        }
        if let Some(url) = get("STATIC_IP_PROXY_URL") {
            self.fetch.static_ip_proxy_url = Some(url);
        }
    }
}

/// Expand `~` and resolve relative paths against `base_dir`.
pub fn expand_path(path_str: &str, base_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Configuration file contents. Every field is optional; unset fields keep
/// the defaults in [`Settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Rate limit backend: "memory" or "redis://...".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth_proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip_proxy_url: Option<String>,
    /// PEM bundle trusted in addition to the system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_days: Option<i64>,
    /// Manual override file (TOML, YAML or JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_overrides: Option<String>,
    /// Reported-noncompliant registry file (TOML, YAML or JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncompliant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub europepmc_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdftotext: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = load_file(path).await?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref database) = self.database {
            settings.database_path = expand_path(database, base_dir);
        }
        if let Some(ref backend) = self.rate_limit_backend {
            settings.rate_limit_backend = (backend != "memory").then(|| backend.clone());
        }
        if let Some(bytes) = self.max_body_bytes {
            settings.fetch.max_body_bytes = bytes;
        }
        if let Some(secs) = self.connect_timeout_secs {
            settings.fetch.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout_secs {
            settings.fetch.read_timeout = Duration::from_secs(secs);
        }
        if let Some(ref email) = self.contact_email {
            settings.fetch.contact_email = email.clone();
        }
        if let Some(ref ua) = self.user_agent {
            settings.fetch.user_agent = Some(ua.clone());
        }
        if let Some(ref url) = self.stealth_proxy_url {
            settings.fetch.stealth_proxy_url = Some(url.clone());
        }
        if let Some(ref key) = self.extraction_api_key {
            settings.fetch.extraction_api_key = Some(key.clone());
        }
        if let Some(ref url) = self.static_ip_proxy_url {
            settings.fetch.static_ip_proxy_url = Some(url.clone());
        }
        if let Some(ref bundle) = self.ca_bundle {
            settings.fetch.ca_bundle = Some(expand_path(bundle, base_dir));
        }
        if let Some(redirect) = self.redirect {
            settings.redirect = redirect;
        }
        if let Some(ref rate_limit) = self.rate_limit {
            settings.rate_limit = rate_limit.clone();
        }
        if let Some(ref scheduler) = self.scheduler {
            settings.scheduler = scheduler.clone();
        }
        if let Some(ref priority) = self.priority {
            settings.priority = priority.clone();
        }
        if let Some(days) = self.staleness_days {
            settings.staleness_days = days;
        }
        if let Some(ref path) = self.manual_overrides {
            settings.manual_overrides = Some(expand_path(path, base_dir));
        }
        if let Some(ref path) = self.noncompliant {
            settings.noncompliant = Some(expand_path(path, base_dir));
        }
        if let Some(ref dir) = self.archive_dir {
            settings.archive_dir = Some(expand_path(dir, base_dir));
        }
        if let Some(ref url) = self.europepmc_api_url {
            settings.europepmc_api_url = url.clone();
        }
        if let Some(ref binary) = self.pdftotext {
            settings.pdftotext_binary = Some(binary.clone());
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (--config flag).
    pub config_path: Option<PathBuf>,
}

/// Default config locations, most preferred first.
fn default_config_candidates() -> Vec<PathBuf> {
    let Some(dir) = dirs::config_dir().map(|d| d.join("oafinder")) else {
        return Vec::new();
    };
    ["toml", "yaml", "yml", "json"]
        .iter()
        .map(|ext| dir.join(format!("config.{}", ext)))
        .collect()
}

/// Find the config file: `--config`, then `OAFINDER_CONFIG`, then the user
/// config directory.
fn discover_config_path(options: &LoadOptions) -> Option<PathBuf> {
    if let Some(ref path) = options.config_path {
        return Some(path.clone());
    }
    if let Some(path) = std::env::var(CONFIG_ENV).ok().filter(|s| !s.is_empty()) {
        return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
    }
    default_config_candidates().into_iter().find(|p| p.is_file())
}

/// Load settings with explicit options. Returns (Settings, Config).
///
/// A named config file that cannot be read is an error; without one the
/// built-in defaults apply.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    let config = match discover_config_path(&options) {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Config::load_from_path(&path).await?
        }
        None => Config::default(),
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_overrides(|name| std::env::var(name).ok());

    Ok((settings, config))
}
