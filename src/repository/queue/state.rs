//! Status transitions and statistics for the queue store.

use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::helpers::{row_to_entry, ENTRY_COLUMNS};
use crate::models::{QueueEntry, QueueStats, QueueStatus};
use crate::repository::{format_datetime, RepositoryError, Result};

/// Move a processing entry to `completed`.
pub fn complete(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE queue_entries SET status = 'completed', error_message = NULL, updated_at = ?1 \
         WHERE id = ?2 AND status = 'processing'",
        params![format_datetime(&Utc::now()), id],
    )?;
    if changed == 0 {
        ensure_exists(conn, id, QueueStatus::Completed)?;
    }
    Ok(())
}

/// Move a processing entry to `failed` with a reason.
pub fn fail(conn: &Connection, id: i64, reason: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE queue_entries SET status = 'failed', error_message = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = 'processing'",
        params![reason, format_datetime(&Utc::now()), id],
    )?;
    if changed == 0 {
        ensure_exists(conn, id, QueueStatus::Failed)?;
    }
    Ok(())
}

/// A transition that changed nothing is a no-op unless the row is missing.
fn ensure_exists(conn: &Connection, id: i64, target: QueueStatus) -> Result<()> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM queue_entries WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match status {
        None => Err(RepositoryError::NotFound(format!("queue entry {}", id))),
        Some(current) => {
            debug!(
                "Ignoring transition of entry {} to {} (currently {})",
                id, target, current
            );
            Ok(())
        }
    }
}

/// Reset entries stuck in `processing` for longer than `timeout`.
pub fn recover_stale(conn: &Connection, timeout: Duration) -> Result<usize> {
    let now = Utc::now();
    let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::days(36_500));
    let cutoff = now - timeout;

    let reset = conn.execute(
        "UPDATE queue_entries SET status = 'pending', updated_at = ?1 \
         WHERE status = 'processing' AND updated_at <= ?2",
        params![format_datetime(&now), format_datetime(&cutoff)],
    )?;

    if reset > 0 {
        info!("Recovered {} stale processing entries", reset);
    }
    Ok(reset)
}

/// Aggregate counts by status.
pub fn stats(conn: &Connection) -> Result<QueueStats> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queue_entries GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
    })?;

    let mut stats = QueueStats::default();
    for row in rows {
        let (status, count) = row?;
        let status = QueueStatus::from_str(&status)
            .ok_or_else(|| RepositoryError::InvalidStatus(status.clone()))?;
        stats.add(status, count);
    }
    Ok(stats)
}

/// Look up an entry by name.
pub fn get(conn: &Connection, name: &str) -> Result<Option<QueueEntry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {} FROM queue_entries WHERE name = ?1", ENTRY_COLUMNS),
            params![name],
            row_to_entry,
        )
        .optional()?;
    Ok(entry)
}

/// Move up to `limit` failed entries back to pending, largest first.
pub fn requeue_failed(conn: &Connection, limit: usize) -> Result<usize> {
    let requeued = conn.execute(
        r#"
        UPDATE queue_entries
        SET status = 'pending', error_message = NULL, updated_at = ?1
        WHERE id IN (
            SELECT id FROM queue_entries
            WHERE status = 'failed'
            ORDER BY priority_weight DESC, updated_at ASC
            LIMIT ?2
        )
        "#,
        params![format_datetime(&Utc::now()), limit as i64],
    )?;
    Ok(requeued)
}
