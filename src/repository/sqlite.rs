//! SQLite store for the harvest index and the scrape queue.
//!
//! Each call opens its own connection on a blocking thread. Claims run
//! under `BEGIN IMMEDIATE`, which takes the write lock up front, so two
//! workers can never select the same rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{format_datetime, parse_datetime_opt, target_matches_work, HarvestIndex};
use crate::models::{QueueEntry, ScrapeOutcome, ScrapeTarget, Work};
use crate::utils::normalize;
use crate::work_queue::{ClaimHandle, ClaimRequest, QueueCounts, QueueError, QueueStore};

/// Open a database connection with proper concurrency settings.
fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

const CLAIM_SQL: &str = r#"
    WITH ranked AS (
        SELECT target_id, host,
            ROW_NUMBER() OVER (
                PARTITION BY host
                ORDER BY finished IS NOT NULL, finished, target_id
            ) AS host_rank
        FROM scrape_queue
        WHERE (started IS NULL OR started < ?1)
          AND (?2 IS NULL OR host = ?2)
    )
    SELECT target_id FROM ranked
    WHERE host_rank <= ?3
    ORDER BY host_rank, host
    LIMIT ?4
"#;

/// SQLite-backed harvest index and queue store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| QueueError::Connection(format!("{}: {}", parent.display(), e)))?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, QueueError> {
        open_db(&self.db_path)
            .map_err(|e| QueueError::Connection(format!("{}: {}", self.db_path.display(), e)))
    }

    fn init_schema(&self) -> Result<(), QueueError> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scrape_targets (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                doi TEXT,
                normalized_title TEXT,
                endpoint_id TEXT,
                data TEXT NOT NULL,
                scrape_updated TEXT,
                error TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_scrape_targets_doi ON scrape_targets(doi);
            CREATE INDEX IF NOT EXISTS idx_scrape_targets_title ON scrape_targets(normalized_title);

            CREATE TABLE IF NOT EXISTS scrape_queue (
                target_id TEXT PRIMARY KEY,
                host TEXT NOT NULL,
                started TEXT,
                finished TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scrape_queue_host ON scrape_queue(host, finished);
        "#,
        )?;
        Ok(())
    }

    /// Run `f` on a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connect()?;
            f(&mut conn)
        })
        .await?
    }
}

fn read_target(conn: &Connection, id: &str) -> Result<Option<ScrapeTarget>, QueueError> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM scrape_targets WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    data.map(|d| serde_json::from_str(&d))
        .transpose()
        .map_err(|e| QueueError::Other(format!("corrupt target {}: {}", id, e)))
}

fn write_target(conn: &Connection, target: &ScrapeTarget) -> Result<(), QueueError> {
    let data = serde_json::to_string(target)
        .map_err(|e| QueueError::Other(format!("serialize target {}: {}", target.id, e)))?;
    let title = target
        .normalized_title
        .as_deref()
        .map(normalize)
        .filter(|t| !t.is_empty());
    conn.execute(
        r#"
        INSERT INTO scrape_targets (id, url, doi, normalized_title, endpoint_id, data, scrape_updated, error)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            url = excluded.url,
            doi = excluded.doi,
            normalized_title = excluded.normalized_title,
            endpoint_id = excluded.endpoint_id,
            data = excluded.data,
            scrape_updated = excluded.scrape_updated,
            error = excluded.error
        "#,
        params![
            target.id,
            target.url,
            target.doi,
            title,
            target.endpoint_id,
            data,
            target.scrape_updated.map(format_datetime),
            target.error,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl HarvestIndex for SqliteStore {
    async fn upsert_target(&self, target: &ScrapeTarget) -> Result<(), QueueError> {
        let target = target.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut fresh = target;
            if let Some(existing) = read_target(&tx, &fresh.id)? {
                fresh.scrape_pdf_url = existing.scrape_pdf_url;
                fresh.scrape_metadata_url = existing.scrape_metadata_url;
                fresh.scrape_license = existing.scrape_license;
                fresh.scrape_version = existing.scrape_version;
                fresh.scrape_updated = existing.scrape_updated;
                fresh.error = existing.error;
            }
            write_target(&tx, &fresh)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_target(&self, id: &str) -> Result<Option<ScrapeTarget>, QueueError> {
        let id = id.to_string();
        self.with_conn(move |conn| read_target(conn, &id)).await
    }

    async fn targets_for_work(&self, work: &Work) -> Result<Vec<ScrapeTarget>, QueueError> {
        let work = work.clone();
        self.with_conn(move |conn| {
            let title = work.title.as_deref().map(normalize).unwrap_or_default();
            let mut stmt = conn.prepare(
                r#"
                SELECT data FROM scrape_targets
                WHERE doi = ?1 OR (?2 != '' AND normalized_title = ?2)
                ORDER BY id
                "#,
            )?;
            let rows = stmt
                .query_map(params![work.doi, title], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut targets = Vec::with_capacity(rows.len());
            for data in rows {
                match serde_json::from_str::<ScrapeTarget>(&data) {
                    Ok(target) if target_matches_work(&target, &work) => targets.push(target),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping unreadable target row: {}", e),
                }
            }
            Ok(targets)
        })
        .await
    }

    async fn record_outcomes(
        &self,
        outcomes: &[(String, ScrapeOutcome)],
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let outcomes = outcomes.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for (id, outcome) in outcomes {
                let mut target = read_target(&tx, &id)?.ok_or(QueueError::NotFound(id))?;
                target.apply_outcome(outcome, now);
                write_target(&tx, &target)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO scrape_queue (target_id, host, started, finished) VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.target_id,
                    entry.host,
                    entry.started.map(format_datetime),
                    entry.finished.map(format_datetime),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn claim(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimHandle>, QueueError> {
        let request = request.clone();
        let entries = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let expired_before = format_datetime(now - request.claim_ttl);
                let ids: Vec<String> = {
                    let mut stmt = tx.prepare(CLAIM_SQL)?;
                    let rows = stmt.query_map(
                        params![
                            expired_before,
                            request.host,
                            request.per_host_limit as i64,
                            request.chunk_size as i64,
                        ],
                        |row| row.get(0),
                    )?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };

                let started = format_datetime(now);
                let mut entries = Vec::with_capacity(ids.len());
                for id in ids {
                    tx.execute(
                        "UPDATE scrape_queue SET started = ?1 WHERE target_id = ?2",
                        params![started, id],
                    )?;
                    if let Some(entry) = read_entry(&tx, &id)? {
                        entries.push(entry);
                    }
                }
                tx.commit()?;
                Ok(entries)
            })
            .await?;

        Ok(entries.into_iter().map(ClaimHandle::new).collect())
    }

    async fn mark_finished(
        &self,
        handle: ClaimHandle,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let entry = handle.consume();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE scrape_queue SET started = NULL, finished = ?1 WHERE target_id = ?2",
                params![format_datetime(now), entry.target_id],
            )?;
            if updated == 0 {
                return Err(QueueError::NotFound(entry.target_id));
            }
            Ok(())
        })
        .await
    }

    async fn release(&self, handle: ClaimHandle) -> Result<(), QueueError> {
        let entry = handle.consume();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE scrape_queue SET started = NULL WHERE target_id = ?1",
                params![entry.target_id],
            )?;
            if updated == 0 {
                return Err(QueueError::NotFound(entry.target_id));
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, target_id: &str) -> Result<Option<QueueEntry>, QueueError> {
        let id = target_id.to_string();
        self.with_conn(move |conn| read_entry(conn, &id)).await
    }

    async fn counts(
        &self,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<QueueCounts, QueueError> {
        self.with_conn(move |conn| {
            let expired_before = format_datetime(now - claim_ttl);
            let (claimed, scraped, pending) = conn.query_row(
                r#"
                SELECT
                    COALESCE(SUM(started IS NOT NULL AND started >= ?1), 0),
                    COALESCE(SUM((started IS NULL OR started < ?1) AND finished IS NOT NULL), 0),
                    COALESCE(SUM((started IS NULL OR started < ?1) AND finished IS NULL), 0)
                FROM scrape_queue
                "#,
                params![expired_before],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )?;
            Ok(QueueCounts {
                pending: pending as u64,
                claimed: claimed as u64,
                scraped: scraped as u64,
            })
        })
        .await
    }
}

fn read_entry(conn: &Connection, id: &str) -> Result<Option<QueueEntry>, QueueError> {
    let row = conn
        .query_row(
            "SELECT target_id, host, started, finished FROM scrape_queue WHERE target_id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(target_id, host, started, finished)| QueueEntry {
        target_id,
        host,
        started: parse_datetime_opt(started),
        finished: parse_datetime_opt(finished),
    }))
}
