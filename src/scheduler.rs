//! Scrape scheduler: claims host-fair batches from the queue, scrapes each
//! target in a bounded pool of supervised tasks, and commits the outcomes.
//!
//! A scrape that outlives the worker timeout is aborted and its target is
//! released unclaimed. Rate-limited and failed targets are released too;
//! nothing is penalised beyond the normal re-scrape schedule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::{QueueEntry, ScrapeOutcome, ScrapeTarget};
use crate::pages::PageScraper;
use crate::rate_limit::HostRateLimiter;
use crate::repository::HarvestIndex;
use crate::services::MetricsSink;
use crate::work_queue::{ClaimHandle, ClaimRequest, QueueError, QueueStore};

/// Pool and batch sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent scrapes per process.
    pub workers: usize,
    pub worker_timeout_secs: u64,
    /// Targets claimed per batch.
    pub chunk_size: usize,
    /// Targets per host in one batch.
    pub per_host: usize,
    /// Sleep when the queue has nothing to claim.
    pub idle_sleep_secs: u64,
    /// Extra attempts at writing a batch of outcomes.
    pub commit_retries: u32,
    /// Claims older than this belong to a dead worker.
    pub claim_ttl_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            worker_timeout_secs: 300,
            chunk_size: 100,
            per_host: 10,
            idle_sleep_secs: 5,
            commit_retries: 2,
            claim_ttl_secs: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_ttl_secs)
    }
}

/// Anything that can scrape a harvested target.
#[async_trait]
pub trait TargetScraper: Send + Sync {
    async fn scrape_target(&self, target: &ScrapeTarget) -> ScrapeOutcome;
}

#[async_trait]
impl TargetScraper for PageScraper {
    async fn scrape_target(&self, target: &ScrapeTarget) -> ScrapeOutcome {
        PageScraper::scrape_target(self, target).await
    }
}

/// How a run decides when to stop.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Process a single batch.
    pub once: bool,
    /// Stop after this many claimed targets.
    pub limit: Option<usize>,
    /// Only claim targets from this endpoint or host.
    pub endpoint: Option<String>,
    /// Override the configured chunk size.
    pub chunk_size: Option<usize>,
}

/// Counts for one run or batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub claimed: usize,
    pub scraped: usize,
    pub skipped: usize,
    pub rate_limited: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub commit_failures: usize,
}

impl RunSummary {
    fn add(&mut self, other: &RunSummary) {
        self.claimed += other.claimed;
        self.scraped += other.scraped;
        self.skipped += other.skipped;
        self.rate_limited += other.rate_limited;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
        self.commit_failures += other.commit_failures;
    }
}

#[derive(Debug)]
enum TargetResult {
    Scraped(ScrapeOutcome),
    /// Nothing to do for this target this pass; counts as finished.
    Skipped,
    RateLimited,
    TimedOut,
    Failed(String),
}

/// Supervised scrape worker pool.
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<dyn QueueStore>,
    index: Arc<dyn HarvestIndex>,
    scraper: Arc<dyn TargetScraper>,
    limiter: HostRateLimiter,
    metrics: Arc<dyn MetricsSink>,
    config: SchedulerConfig,
    worker_timeout: Duration,
    staleness: chrono::Duration,
}

impl Scheduler {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        index: Arc<dyn HarvestIndex>,
        scraper: Arc<dyn TargetScraper>,
        limiter: HostRateLimiter,
        metrics: Arc<dyn MetricsSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            worker_timeout: config.worker_timeout(),
            queue,
            index,
            scraper,
            limiter,
            metrics,
            config,
            staleness: chrono::Duration::days(crate::config::DEFAULT_STALENESS_DAYS),
        }
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Claim and process batches until the options say to stop.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, QueueError> {
        let mut total = RunSummary::default();
        loop {
            let mut chunk = options.chunk_size.unwrap_or(self.config.chunk_size).max(1);
            if let Some(limit) = options.limit {
                if total.claimed >= limit {
                    break;
                }
                chunk = chunk.min(limit - total.claimed);
            }

            let batch = self.run_batch(chunk, options.endpoint.as_deref()).await?;
            total.add(&batch);
            if options.once {
                break;
            }
            if batch.claimed == 0 {
                if options.limit.is_some() {
                    break;
                }
                tracing::debug!("Queue empty, sleeping {}s", self.config.idle_sleep_secs);
                tokio::time::sleep(Duration::from_secs(self.config.idle_sleep_secs)).await;
            }
        }
        tracing::info!(
            "Scheduler run finished: {} claimed, {} scraped, {} released",
            total.claimed,
            total.scraped,
            total.rate_limited + total.timed_out + total.failed
        );
        Ok(total)
    }

    /// Claim one batch, scrape it and commit the outcomes.
    pub async fn run_batch(&self, chunk_size: usize, endpoint: Option<&str>) -> Result<RunSummary, QueueError> {
        let mut request = ClaimRequest::new(chunk_size, self.config.per_host, self.config.claim_ttl());
        if let Some(endpoint) = endpoint {
            request = request.for_host(endpoint);
        }

        let handles = self.queue.claim(&request, Utc::now()).await?;
        let mut summary = RunSummary {
            claimed: handles.len(),
            ..RunSummary::default()
        };
        if handles.is_empty() {
            return Ok(summary);
        }
        self.metrics.incr("scheduler.claimed", handles.len() as u64);
        tracing::info!("Claimed {} targets", handles.len());

        let mut claims: HashMap<String, ClaimHandle> = handles
            .into_iter()
            .map(|handle| (handle.target_id().to_string(), handle))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_targets = HashMap::new();
        for target_id in claims.keys() {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let id = target_id.clone();
            let task = tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.process(&id).await,
                    Err(e) => TargetResult::Failed(format!("worker pool closed: {}", e)),
                };
                (id, result)
            });
            task_targets.insert(task.id(), target_id.clone());
        }

        let mut done = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => done.push(pair),
                Err(e) => match task_targets.remove(&e.id()) {
                    Some(target_id) => {
                        tracing::error!("Worker task for {} failed: {}", target_id, e);
                        done.push((target_id, TargetResult::Failed(format!("worker task failed: {}", e))));
                    }
                    None => tracing::error!("Worker task failed: {}", e),
                },
            }
        }

        let outcomes: Vec<(String, ScrapeOutcome)> = done
            .iter()
            .filter_map(|(target_id, result)| match result {
                TargetResult::Scraped(outcome) => Some((target_id.clone(), outcome.clone())),
                _ => None,
            })
            .collect();
        let committed = outcomes.is_empty() || self.commit(&outcomes).await;
        if !committed {
            summary.commit_failures += 1;
            self.metrics.incr("scheduler.commit_failed", 1);
        }

        for (target_id, result) in done {
            let Some(handle) = claims.remove(&target_id) else {
                continue;
            };
            let finished = match &result {
                TargetResult::Scraped(_) => {
                    summary.scraped += 1;
                    committed
                }
                TargetResult::Skipped => {
                    summary.skipped += 1;
                    true
                }
                TargetResult::RateLimited => {
                    summary.rate_limited += 1;
                    false
                }
                TargetResult::TimedOut => {
                    summary.timed_out += 1;
                    false
                }
                TargetResult::Failed(message) => {
                    tracing::warn!("Target {} failed: {}", target_id, message);
                    summary.failed += 1;
                    false
                }
            };
            let settled = if finished {
                self.queue.mark_finished(handle, Utc::now()).await
            } else {
                self.queue.release(handle).await
            };
            if let Err(e) = settled {
                tracing::warn!("Could not settle claim on {}: {}", target_id, e);
            }
        }

        // claims whose task could not be matched back to a target
        for (target_id, handle) in claims {
            if let Err(e) = self.queue.release(handle).await {
                tracing::warn!("Could not release claim on {}: {}", target_id, e);
            }
        }

        self.metrics.incr("scheduler.scraped", summary.scraped as u64);
        self.metrics.incr("scheduler.timed_out", summary.timed_out as u64);
        self.metrics.incr("scheduler.rate_limited", summary.rate_limited as u64);
        Ok(summary)
    }

    async fn process(&self, target_id: &str) -> TargetResult {
        let target = match self.index.get_target(target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::warn!("Queued target {} is not in the index", target_id);
                return TargetResult::Skipped;
            }
            Err(e) => return TargetResult::Failed(e.to_string()),
        };
        if !target.is_eligible(Utc::now(), self.staleness) {
            tracing::debug!("Target {} is not due for a scrape", target_id);
            return TargetResult::Skipped;
        }

        let permit = match self.limiter.acquire(target.endpoint_id.as_deref(), &target.url).await {
            Ok(Some(permit)) => permit,
            Ok(None) => return TargetResult::RateLimited,
            Err(e) => return TargetResult::Failed(format!("rate limiter: {}", e)),
        };

        let scraper = Arc::clone(&self.scraper);
        let job = target.clone();
        let mut task = tokio::spawn(async move { scraper.scrape_target(&job).await });
        let result = match tokio::time::timeout(self.worker_timeout, &mut task).await {
            Ok(Ok(outcome)) => TargetResult::Scraped(outcome),
            Ok(Err(e)) => TargetResult::Failed(format!("scrape task failed: {}", e)),
            Err(_) => {
                task.abort();
                tracing::warn!("Scrape of {} timed out after {:?}", target.url, self.worker_timeout);
                TargetResult::TimedOut
            }
        };

        if let Err(e) = self.limiter.finish(permit).await {
            tracing::warn!("Could not close rate limit window for {}: {}", target.url, e);
        }
        result
    }

    /// Write outcomes, retrying a bounded number of times. A batch that never
    /// commits is dropped and picked up again on a later pass.
    async fn commit(&self, outcomes: &[(String, ScrapeOutcome)]) -> bool {
        let attempts = self.config.commit_retries + 1;
        for attempt in 1..=attempts {
            match self.index.record_outcomes(outcomes, Utc::now()).await {
                Ok(()) => return true,
                Err(e) => tracing::warn!("Commit attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }
        tracing::error!("Dropping batch of {} outcomes after {} attempts", outcomes.len(), attempts);
        false
    }
}

/// Counts from [`import_targets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub stored: usize,
    pub enqueued: usize,
}

/// Store harvested targets and queue the ones that may be scraped now.
pub async fn import_targets(
    index: &dyn HarvestIndex,
    queue: &dyn QueueStore,
    targets: &[ScrapeTarget],
    staleness: chrono::Duration,
) -> Result<ImportSummary, QueueError> {
    let now = Utc::now();
    let mut summary = ImportSummary::default();
    for target in targets {
        index.upsert_target(target).await?;
        summary.stored += 1;
        if target.is_eligible(now, staleness) {
            queue
                .enqueue(QueueEntry::new(target.id.clone(), target.queue_host()))
                .await?;
            summary.enqueued += 1;
        }
    }
    tracing::info!("Imported {} targets, {} enqueued", summary.stored, summary.enqueued);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueState, PUBLISHER_EQUIVALENT_ENDPOINT_ID, PUBLISHER_EQUIVALENT_PMH_ID};
    use crate::rate_limit::{InMemoryRateLimitBackend, RateLimitConfig};
    use crate::repository::InMemoryHarvestIndex;
    use crate::services::MemoryMetricsSink;
    use crate::work_queue::InMemoryQueueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Finds a PDF at `<url>/file.pdf`. URLs containing "slow" hang and
    /// "busy" ones take a moment.
    struct FakeScraper;

    #[async_trait]
    impl TargetScraper for FakeScraper {
        async fn scrape_target(&self, target: &ScrapeTarget) -> ScrapeOutcome {
            if target.url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if target.url.contains("busy") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            ScrapeOutcome {
                pdf_url: Some(format!("{}/file.pdf", target.url)),
                ..ScrapeOutcome::default()
            }
        }
    }

    /// Fails every write.
    struct BrokenIndex {
        inner: InMemoryHarvestIndex,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl HarvestIndex for BrokenIndex {
        async fn upsert_target(&self, target: &ScrapeTarget) -> Result<(), QueueError> {
            self.inner.upsert_target(target).await
        }

        async fn get_target(&self, id: &str) -> Result<Option<ScrapeTarget>, QueueError> {
            self.inner.get_target(id).await
        }

        async fn targets_for_work(&self, work: &crate::models::Work) -> Result<Vec<ScrapeTarget>, QueueError> {
            self.inner.targets_for_work(work).await
        }

        async fn record_outcomes(
            &self,
            _outcomes: &[(String, ScrapeOutcome)],
            _now: chrono::DateTime<Utc>,
        ) -> Result<(), QueueError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Database("database is locked".into()))
        }
    }

    /// Panics while looking up targets whose URL contains "panic".
    struct PanickingIndex {
        inner: InMemoryHarvestIndex,
    }

    #[async_trait]
    impl HarvestIndex for PanickingIndex {
        async fn upsert_target(&self, target: &ScrapeTarget) -> Result<(), QueueError> {
            self.inner.upsert_target(target).await
        }

        async fn get_target(&self, id: &str) -> Result<Option<ScrapeTarget>, QueueError> {
            let target = self.inner.get_target(id).await?;
            if target.as_ref().is_some_and(|t| t.url.contains("panic")) {
                panic!("index lookup blew up on {}", id);
            }
            Ok(target)
        }

        async fn targets_for_work(&self, work: &crate::models::Work) -> Result<Vec<ScrapeTarget>, QueueError> {
            self.inner.targets_for_work(work).await
        }

        async fn record_outcomes(
            &self,
            outcomes: &[(String, ScrapeOutcome)],
            now: chrono::DateTime<Utc>,
        ) -> Result<(), QueueError> {
            self.inner.record_outcomes(outcomes, now).await
        }
    }

    fn limiter(interval_ms: u64) -> HostRateLimiter {
        HostRateLimiter::new(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig {
                cooperative_hosts: Vec::new(),
                cooperative_interval_ms: interval_ms,
                default_interval_ms: interval_ms,
                retry_sleep_ms: 10,
                max_wait_ms: 0,
            },
        )
    }

    fn target(url: &str, endpoint: &str) -> ScrapeTarget {
        ScrapeTarget::new(url, Some(&format!("oai:{}", url)), Some(endpoint))
    }

    struct Fixture {
        queue: InMemoryQueueStore,
        index: Arc<dyn HarvestIndex>,
        metrics: MemoryMetricsSink,
    }

    async fn fixture(index: Arc<dyn HarvestIndex>, targets: &[ScrapeTarget]) -> Fixture {
        let queue = InMemoryQueueStore::new();
        import_targets(index.as_ref(), &queue, targets, chrono::Duration::days(7))
            .await
            .unwrap();
        Fixture {
            queue,
            index,
            metrics: MemoryMetricsSink::new(),
        }
    }

    fn scheduler(f: &Fixture, interval_ms: u64) -> Scheduler {
        Scheduler::new(
            Arc::new(f.queue.clone()),
            Arc::clone(&f.index),
            Arc::new(FakeScraper),
            limiter(interval_ms),
            Arc::new(f.metrics.clone()),
            SchedulerConfig {
                workers: 4,
                ..SchedulerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_batch_scrapes_and_commits() {
        let targets = vec![
            target("https://repo-a.example.edu/1", "ep-a"),
            target("https://repo-b.example.edu/1", "ep-b"),
        ];
        let f = fixture(Arc::new(InMemoryHarvestIndex::new()), &targets).await;
        let summary = scheduler(&f, 0)
            .run(&RunOptions {
                once: true,
                ..RunOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.scraped, 2);
        for t in &targets {
            let stored = f.index.get_target(&t.id).await.unwrap().unwrap();
            assert_eq!(stored.scrape_pdf_url, Some(format!("{}/file.pdf", t.url)));
            assert!(stored.scrape_updated.is_some());
            let entry = f.queue.get(&t.id).await.unwrap().unwrap();
            assert_eq!(entry.state(), QueueState::Scraped);
        }
        assert_eq!(f.metrics.get("scheduler.scraped"), 2);
    }

    #[tokio::test]
    async fn test_timed_out_scrape_is_released() {
        let targets = vec![target("https://slow.example.edu/1", "ep-slow")];
        let f = fixture(Arc::new(InMemoryHarvestIndex::new()), &targets).await;
        let summary = scheduler(&f, 0)
            .with_worker_timeout(Duration::from_millis(50))
            .run_batch(10, None)
            .await
            .unwrap();

        assert_eq!(summary.timed_out, 1);
        let entry = f.queue.get(&targets[0].id).await.unwrap().unwrap();
        assert_eq!(entry.state(), QueueState::Pending);
        let stored = f.index.get_target(&targets[0].id).await.unwrap().unwrap();
        assert!(stored.scrape_updated.is_none());
    }

    #[tokio::test]
    async fn test_same_window_only_one_proceeds() {
        let targets = vec![
            target("https://busy.example.edu/1", "ep1"),
            target("https://busy.example.edu/2", "ep1"),
        ];
        let f = fixture(Arc::new(InMemoryHarvestIndex::new()), &targets).await;
        let summary = scheduler(&f, 60_000).run_batch(10, None).await.unwrap();

        assert_eq!(summary.scraped, 1);
        assert_eq!(summary.rate_limited, 1);
        let states: Vec<_> = futures::future::join_all(targets.iter().map(|t| f.queue.get(&t.id)))
            .await
            .into_iter()
            .map(|e| e.unwrap().unwrap().state())
            .collect();
        assert!(states.contains(&QueueState::Scraped));
        assert!(states.contains(&QueueState::Pending));
    }

    #[tokio::test]
    async fn test_publisher_equivalent_is_not_rate_limited() {
        let mut targets = Vec::new();
        for i in 0..3 {
            let mut t = ScrapeTarget::new(
                &format!("https://publisher.example.com/article/{}", i),
                Some(PUBLISHER_EQUIVALENT_PMH_ID),
                Some(PUBLISHER_EQUIVALENT_ENDPOINT_ID),
            );
            t.doi = Some(format!("10.1234/{}", i));
            targets.push(t);
        }
        let f = fixture(Arc::new(InMemoryHarvestIndex::new()), &targets).await;
        let summary = scheduler(&f, 60_000).run_batch(10, None).await.unwrap();
        assert_eq!(summary.scraped, 3);
        assert_eq!(summary.rate_limited, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_releases_batch() {
        let targets = vec![target("https://repo.example.edu/1", "ep1")];
        let broken = Arc::new(BrokenIndex {
            inner: InMemoryHarvestIndex::new(),
            writes: AtomicUsize::new(0),
        });
        let f = fixture(broken.clone(), &targets).await;
        let summary = scheduler(&f, 0).run_batch(10, None).await.unwrap();

        assert_eq!(summary.commit_failures, 1);
        assert_eq!(broken.writes.load(Ordering::SeqCst), 3);
        let entry = f.queue.get(&targets[0].id).await.unwrap().unwrap();
        assert_eq!(entry.state(), QueueState::Pending);
    }

    #[tokio::test]
    async fn test_panicked_worker_releases_its_target() {
        let targets = vec![
            target("https://panic.example.edu/1", "ep-panic"),
            target("https://repo.example.edu/1", "ep1"),
        ];
        let f = fixture(
            Arc::new(PanickingIndex {
                inner: InMemoryHarvestIndex::new(),
            }),
            &targets,
        )
        .await;
        let summary = scheduler(&f, 0).run_batch(10, None).await.unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.scraped, 1);
        let panicked = f.queue.get(&targets[0].id).await.unwrap().unwrap();
        assert_eq!(panicked.state(), QueueState::Pending);
        let scraped = f.queue.get(&targets[1].id).await.unwrap().unwrap();
        assert_eq!(scraped.state(), QueueState::Scraped);

        // released, so the next batch claims it again
        let again = scheduler(&f, 0).run_batch(10, None).await.unwrap();
        assert_eq!(again.claimed, 1);
        assert_eq!(again.failed, 1);
    }

    #[tokio::test]
    async fn test_endpoint_mode_and_limit() {
        let mut targets: Vec<_> = (0..5)
            .map(|i| target(&format!("https://big.example.edu/{}", i), "big"))
            .collect();
        targets.push(target("https://small.example.edu/1", "small"));
        let f = fixture(Arc::new(InMemoryHarvestIndex::new()), &targets).await;

        let summary = scheduler(&f, 0)
            .run(&RunOptions {
                endpoint: Some("big".into()),
                limit: Some(3),
                chunk_size: Some(2),
                ..RunOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.claimed, 3);
        let small = f.queue.get(&targets[5].id).await.unwrap().unwrap();
        assert_eq!(small.state(), QueueState::Pending);
    }

    #[tokio::test]
    async fn test_import_skips_ineligible_targets() {
        let index = InMemoryHarvestIndex::new();
        let queue = InMemoryQueueStore::new();
        let ok = target("https://repo.example.edu/1", "ep1");
        let no_pmh = ScrapeTarget::new("https://repo.example.edu/2", None, Some("ep1"));
        let mut recent_error = target("https://repo.example.edu/3", "ep1");
        recent_error.error = "timeout".into();
        recent_error.scrape_updated = Some(Utc::now() - chrono::Duration::days(1));

        let summary = import_targets(
            &index,
            &queue,
            &[ok.clone(), no_pmh.clone(), recent_error.clone()],
            chrono::Duration::days(7),
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { stored: 3, enqueued: 1 });
        assert!(queue.get(&ok.id).await.unwrap().is_some());
        assert!(queue.get(&no_pmh.id).await.unwrap().is_none());
        assert!(queue.get(&recent_error.id).await.unwrap().is_none());
    }
}
