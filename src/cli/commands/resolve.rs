//! Resolve a work bundle offline.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{load_file, Settings};
use crate::models::{ScrapeTarget, Work};
use crate::priority::refresh_priority;
use crate::producers::ManualOverrides;
use crate::resolve::{NoncompliantRegistry, Resolution, ResolutionEngine};

use super::print_json;

/// A work and the targets already harvested for it.
#[derive(Debug, Deserialize)]
struct Bundle {
    work: Work,
    #[serde(default)]
    targets: Vec<ScrapeTarget>,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    #[serde(flatten)]
    resolution: Resolution,
    refresh_priority: f64,
}

/// Engine with the built-in rule tables extended by the configured files.
async fn build_engine(settings: &Settings) -> anyhow::Result<ResolutionEngine> {
    let mut overrides = ManualOverrides::builtin();
    if let Some(ref path) = settings.manual_overrides {
        overrides.extend(ManualOverrides::load(path).await?);
    }

    let mut registry = NoncompliantRegistry::builtin();
    if let Some(ref path) = settings.noncompliant {
        registry.extend(NoncompliantRegistry::load(path).await?);
    }

    Ok(ResolutionEngine::new()
        .with_overrides(overrides)
        .with_registry(registry))
}

async fn resolve_bundle(settings: &Settings, path: &Path, now: DateTime<Utc>) -> anyhow::Result<ResolveReport> {
    let bundle: Bundle = load_file(path).await?;
    let work = bundle.work.normalized();
    let engine = build_engine(settings).await?;

    let resolution = engine.resolve(&work, &bundle.targets, now);
    let priority = refresh_priority(&work, resolution.oa_status, now, &settings.priority);
    Ok(ResolveReport {
        resolution,
        refresh_priority: priority,
    })
}

/// Print the resolution of the bundle at `path` and its refresh priority.
pub async fn cmd_resolve(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let report = resolve_bundle(settings, path, Utc::now()).await?;
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OaStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_bundle_uses_configured_overrides() {
        let dir = TempDir::new().unwrap();
        let overrides = dir.path().join("overrides.yaml");
        std::fs::write(
            &overrides,
            "10.5555/override-me:\n  pdf_url: https://repo.example.edu/override.pdf\n  version: accepted\n",
        )
        .unwrap();
        let bundle = dir.path().join("bundle.json");
        std::fs::write(
            &bundle,
            r#"{"work": {"doi": "https://doi.org/10.5555/OVERRIDE-ME", "issued": "2020-01-01"}, "targets": []}"#,
        )
        .unwrap();

        let settings = Settings {
            manual_overrides: Some(overrides),
            ..Settings::default()
        };
        let report = resolve_bundle(&settings, &bundle, Utc::now()).await.unwrap();
        assert_eq!(report.resolution.doi, "10.5555/override-me");
        assert!(report.resolution.is_oa);
        assert_eq!(report.resolution.oa_status, OaStatus::Green);
        assert_eq!(
            report.resolution.free_pdf_url.as_deref(),
            Some("https://repo.example.edu/override.pdf")
        );
        // never refreshed
        assert!(report.refresh_priority > 0.0);
    }

    #[tokio::test]
    async fn test_resolve_bundle_without_locations_is_closed() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("bundle.json");
        std::fs::write(&bundle, r#"{"work": {"doi": "10.5555/nothing-here"}}"#).unwrap();

        let report = resolve_bundle(&Settings::default(), &bundle, Utc::now()).await.unwrap();
        assert!(!report.resolution.is_oa);
        assert_eq!(report.resolution.oa_status, OaStatus::Closed);
        assert!(report.resolution.oa_locations.is_empty());
    }
}
