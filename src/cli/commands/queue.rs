//! Queue commands: import harvested targets and run the scrape workers.

use std::path::Path;
use std::sync::Arc;

use crate::config::{load_file, Settings};
use crate::models::ScrapeTarget;
use crate::rate_limit::{backend_from_spec, HostRateLimiter};
use crate::repository::SqliteStore;
use crate::scheduler::{import_targets, ImportSummary, RunOptions, Scheduler};
use crate::services::{MetricsSink, TracingMetricsSink};

use super::{build_scraper, print_json};

/// Fill in ids left blank in a targets file.
fn with_ids(mut targets: Vec<ScrapeTarget>) -> Vec<ScrapeTarget> {
    for target in &mut targets {
        if target.id.is_empty() {
            target.id =
                ScrapeTarget::compute_id(&target.url, target.pmh_id.as_deref(), target.endpoint_id.as_deref());
        }
    }
    targets
}

async fn import_file(settings: &Settings, path: &Path) -> anyhow::Result<ImportSummary> {
    let targets: Vec<ScrapeTarget> = load_file(path).await?;
    let targets = with_ids(targets);
    let store = SqliteStore::new(&settings.database_path)?;
    tracing::debug!("Importing {} targets from {}", targets.len(), path.display());
    Ok(import_targets(&store, &store, &targets, settings.staleness()).await?)
}

/// Store the targets in `path` and enqueue the ones due for a scrape.
pub async fn cmd_import_targets(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let summary = import_file(settings, path).await?;
    print_json(&summary)
}

/// Run the scheduler against the configured database.
pub async fn cmd_run_queue(
    settings: &Settings,
    chunk: Option<usize>,
    limit: Option<usize>,
    endpoint: Option<String>,
    once: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::new(&settings.database_path)?);
    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink);

    let backend_spec = settings.rate_limit_backend.as_deref().unwrap_or("memory");
    let backend = backend_from_spec(backend_spec).await?;
    let limiter = HostRateLimiter::new(backend, settings.rate_limit.clone());

    let scraper = Arc::new(build_scraper(settings, metrics.clone()));
    let scheduler = Scheduler::new(
        store.clone(),
        store,
        scraper,
        limiter,
        metrics,
        settings.scheduler.clone(),
    )
    .with_staleness(settings.staleness());

    let options = RunOptions {
        once,
        limit,
        endpoint,
        chunk_size: chunk,
    };
    tracing::info!(
        "Starting {} workers on {}",
        settings.scheduler.workers,
        settings.database_path.display()
    );
    let summary = scheduler.run(&options).await?;
    print_json(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::HarvestIndex;
    use crate::work_queue::QueueStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_import_file_fills_ids_and_enqueues() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "", "url": "https://repo.example.edu/record/1", "pmh_id": "oai:repo:1", "endpoint_id": "repo-1"},
                {"id": "fixed", "url": "https://repo.example.edu/record/2"}
            ]"#,
        )
        .unwrap();

        let settings = Settings {
            database_path: dir.path().join("queue.db"),
            ..Settings::default()
        };
        let summary = import_file(&settings, &path).await.unwrap();
        assert_eq!(summary.stored, 2);
        // no pmh id: excluded from scraping
        assert_eq!(summary.enqueued, 1);

        let store = SqliteStore::new(&settings.database_path).unwrap();
        let id = ScrapeTarget::compute_id("https://repo.example.edu/record/1", Some("oai:repo:1"), Some("repo-1"));
        assert!(store.get_target(&id).await.unwrap().is_some());
        assert!(store.get(&id).await.unwrap().is_some());
        assert!(store.get("fixed").await.unwrap().is_none());
    }
}
