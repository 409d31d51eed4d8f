//! Repository layer for queue and record persistence.
//!
//! The crawler talks to storage only through [`QueueStore`] and [`RecordStore`].
//! SQLite implementations use rusqlite with WAL and run every statement on the
//! blocking pool; in-memory implementations back tests and dry runs.

mod memory;
mod queue;
mod records;
mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::models::{
    AuthorRecord, NewQueueEntry, Post, QueueEntry, QueueStats, RecordStats, ScrapedRecord,
};

pub use memory::{MemoryQueueStore, MemoryRecordStore};
pub use queue::SqliteQueueStore;
pub use records::SqliteRecordStore;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status value: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// The persisted frontier.
///
/// Implementations must guarantee that `enqueue` inserts a name at most once
/// and that a pending entry is handed to at most one `claim_*` caller.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a target unless its name is already known. Returns whether it was inserted.
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<bool>;

    /// Claim the highest-priority pending entry (oldest first on ties).
    async fn claim_next(&self, min_priority: i64) -> Result<Option<QueueEntry>>;

    /// Claim one named entry if it is pending.
    async fn claim_target(&self, name: &str) -> Result<Option<QueueEntry>>;

    /// Mark a processing entry completed. No-op on terminal entries.
    async fn complete(&self, id: i64) -> Result<()>;

    /// Mark a processing entry failed. No-op on terminal entries.
    async fn fail(&self, id: i64, reason: &str) -> Result<()>;

    /// Reset entries stuck in `processing` longer than `timeout` to `pending`.
    async fn recover_stale(&self, timeout: Duration) -> Result<usize>;

    async fn stats(&self) -> Result<QueueStats>;

    async fn get(&self, name: &str) -> Result<Option<QueueEntry>>;

    /// Pending entries in claim order, without claiming them.
    async fn get_pending(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>>;

    /// Move failed entries back to pending for another attempt.
    async fn requeue_failed(&self, limit: usize) -> Result<usize>;
}

/// Destination for scrape results and discovered authors.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_record(&self, record: &ScrapedRecord) -> Result<()>;

    /// Record a failed scrape for `target` so it is not picked up again.
    async fn mark_failed(&self, target: &str, reason: &str) -> Result<()>;

    /// Completed targets with at least `min_priority` audience and no record yet.
    async fn pending_targets(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>>;

    /// Insert or merge an author observed during discovery.
    async fn upsert_author(&self, author: &AuthorRecord) -> Result<()>;

    /// Save posts, ignoring ids already stored. Returns how many were new.
    async fn save_posts(&self, posts: &[Post]) -> Result<usize>;

    async fn record_stats(&self) -> Result<RecordStats>;
}

/// Open a database connection with proper concurrency settings.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

/// Run a closure against a fresh connection on the blocking pool.
pub(crate) async fn with_connection<T, F>(db_path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    let path: PathBuf = db_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut conn = connect(&path)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| RepositoryError::Other(format!("database task failed: {}", e)))?
}

/// Format a timestamp for storage. Fixed width so string order matches time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_format_orders_lexically() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2026-01-01T00:00:10Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(format_datetime(&earlier) < format_datetime(&later));
        assert_eq!(parse_datetime(&format_datetime(&earlier)), earlier);
    }

    #[test]
    fn test_parse_datetime_invalid_defaults_to_epoch() {
        assert_eq!(parse_datetime("not a date"), DateTime::UNIX_EPOCH);
    }
}
