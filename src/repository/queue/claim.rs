//! Enqueue and claim operations for the queue store.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::helpers::{row_to_entry, ENTRY_COLUMNS};
use crate::models::{NewQueueEntry, QueueEntry, QueueStatus};
use crate::repository::{format_datetime, RepositoryError, Result};

/// Insert a target unless a row with the same name already exists.
pub fn enqueue(conn: &Connection, entry: &NewQueueEntry) -> Result<bool> {
    let name = crate::models::normalize_name(&entry.name);
    if name.is_empty() {
        return Err(RepositoryError::Other("target name is empty".to_string()));
    }
    let now = format_datetime(&Utc::now());
    let inserted = conn.execute(
        r#"
        INSERT OR IGNORE INTO queue_entries
            (name, status, priority_weight, discovered_from, discovered_via, created_at, updated_at)
        VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?5)
        "#,
        params![
            name,
            entry.priority_weight,
            entry.discovered_from,
            entry.discovered_via,
            now
        ],
    )?;
    Ok(inserted == 1)
}

/// Get pending entries in claim order without claiming them.
pub fn get_pending(conn: &Connection, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM queue_entries
        WHERE status = 'pending' AND priority_weight >= ?1
        ORDER BY priority_weight DESC, created_at ASC, id ASC
        LIMIT ?2
        "#,
        ENTRY_COLUMNS
    ))?;

    let entries = stmt
        .query_map(params![min_priority, limit as i64], row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Atomically claim the best pending entry at or above `min_priority`.
pub fn claim_next(conn: &Connection, min_priority: i64) -> Result<Option<QueueEntry>> {
    let select = format!(
        r#"
        SELECT {} FROM queue_entries
        WHERE status = 'pending' AND priority_weight >= ?1
        ORDER BY priority_weight DESC, created_at ASC, id ASC
        LIMIT 1
        "#,
        ENTRY_COLUMNS
    );
    claim_with(conn, &select, params![min_priority])
}

/// Atomically claim a single named entry if it is pending.
pub fn claim_target(conn: &Connection, name: &str) -> Result<Option<QueueEntry>> {
    let select = format!(
        "SELECT {} FROM queue_entries WHERE name = ?1 AND status = 'pending'",
        ENTRY_COLUMNS
    );
    claim_with(conn, &select, params![name])
}

/// Select one candidate and flip it to `processing` inside an immediate transaction.
///
/// The update is conditioned on `status = 'pending'` so a row that changed
/// between select and update is never handed out twice.
fn claim_with(
    conn: &Connection,
    select: &str,
    select_params: &[&dyn rusqlite::ToSql],
) -> Result<Option<QueueEntry>> {
    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<Option<QueueEntry>> = (|| {
        let candidate = conn
            .query_row(select, select_params, row_to_entry)
            .optional()?;

        let Some(mut entry) = candidate else {
            return Ok(None);
        };

        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE queue_entries SET status = 'processing', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
            params![format_datetime(&now), entry.id],
        )?;

        if changed != 1 {
            return Ok(None);
        }

        entry.status = QueueStatus::Processing;
        entry.updated_at = now;
        Ok(Some(entry))
    })();

    if result.is_ok() {
        conn.execute("COMMIT", [])?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }

    result
}
