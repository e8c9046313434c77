use std::num::NonZeroUsize;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, Rows, params};
use tokio::sync::Mutex;
use tracing::debug;

use super::StoreError;
use crate::monitoring::types::{LogRecord, ProbeOutcome};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Append-only history of probe outcomes
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist `outcomes` as one atomic batch, assigning increasing ids in
    /// the given order. Returns once the batch is durable.
    async fn append(&self, outcomes: &[ProbeOutcome]) -> Result<(), StoreError>;

    /// At most `limit` records, newest first (`observed_at` then `id`, descending)
    async fn recent(&self, limit: NonZeroUsize) -> Result<Vec<LogRecord>, StoreError>;

    /// Every unreachable record, newest first
    async fn failures_only(&self) -> Result<Vec<LogRecord>, StoreError>;

    /// Delete records observed before `cutoff`, returning how many went.
    /// Only the retention task calls this.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

const SELECT_RECORD: &str =
    "SELECT id, target_name, target_address, reachable, latency_ms, observed_at FROM probe_logs";

/// LibSQL implementation of the probe log
///
/// Writes are serialized through `write_lock` and run in a single
/// transaction. Reads use their own pooled connections and, with the
/// database in WAL mode, only ever see fully committed batches.
pub struct SqliteLogStore {
    pool: LibsqlPool,
    write_lock: Mutex<()>,
}

impl SqliteLogStore {
    /// Open (or create) the log at `path` and bring its schema up to date
    pub async fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let database = libsql::Builder::new_local(path).build().await?;
        let pool = LibsqlPool::builder(LibsqlManager::new(database))
            .max_size(pool_size.max(1))
            .build()?;

        let conn = pool.get().await?;
        super::initialize_database(&conn).await?;
        drop(conn);

        debug!(path = %path.display(), pool_size, "Opened probe log");
        Ok(Self::new_from_pool(pool))
    }

    /// Create a store from an already migrated pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, write_lock: Mutex::new(()) }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, outcomes: &[ProbeOutcome]) -> Result<(), StoreError> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        for outcome in outcomes {
            tx.execute(
                "INSERT INTO probe_logs (target_name, target_address, reachable, latency_ms, observed_at) VALUES (?, ?, ?, ?, ?)",
                params![
                    outcome.target_name(),
                    outcome.target_address(),
                    i64::from(outcome.is_reachable()),
                    outcome.latency_ms(),
                    outcome.observed_at().timestamp_millis()
                ],
            )
            .await?;
        }

        // Dropping an uncommitted transaction rolls it back, so any `?` above
        // leaves nothing of this batch behind.
        tx.commit().await?;

        debug!(batch = outcomes.len(), "Committed probe batch");
        Ok(())
    }

    async fn recent(&self, limit: NonZeroUsize) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit.get()).unwrap_or(i64::MAX);

        let rows = conn
            .query(
                &format!("{SELECT_RECORD} ORDER BY observed_at DESC, id DESC LIMIT ?"),
                params![limit],
            )
            .await?;

        collect_records(rows).await
    }

    async fn failures_only(&self) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.get_conn().await?;

        let rows = conn
            .query(
                &format!("{SELECT_RECORD} WHERE reachable = 0 ORDER BY observed_at DESC, id DESC"),
                (),
            )
            .await?;

        collect_records(rows).await
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.get_conn().await?;

        let deleted = conn
            .execute(
                "DELETE FROM probe_logs WHERE observed_at < ?",
                params![cutoff.timestamp_millis()],
            )
            .await?;

        Ok(deleted)
    }
}

async fn collect_records(mut rows: Rows) -> Result<Vec<LogRecord>, StoreError> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(record_from_row(&row)?);
    }
    Ok(records)
}

fn record_from_row(row: &Row) -> Result<LogRecord, StoreError> {
    let id: i64 = row.get(0)?;
    let observed_ms: i64 = row.get(5)?;

    let observed_at = DateTime::from_timestamp_millis(observed_ms).ok_or_else(|| StoreError::Corrupt {
        id,
        reason: format!("observed_at {observed_ms} is out of range"),
    })?;

    let outcome = ProbeOutcome::from_parts(
        row.get(1)?,
        row.get(2)?,
        row.get::<i64>(3)? != 0,
        row.get(4)?,
        observed_at,
    )
    .ok_or_else(|| StoreError::Corrupt {
        id,
        reason: "latency_ms does not match the reachable flag".to_string(),
    })?;

    Ok(LogRecord { id, outcome })
}
