//! Row parsing helpers for the queue store.

use crate::models::{QueueEntry, QueueStatus};
use crate::repository::parse_datetime;

/// Columns selected for every queue row, in `row_to_entry` order.
pub const ENTRY_COLUMNS: &str = "id, name, status, priority_weight, discovered_from, \
     discovered_via, error_message, created_at, updated_at";

/// Parse a database row into a QueueEntry.
pub fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    let status: String = row.get("status")?;
    Ok(QueueEntry {
        id: row.get("id")?,
        name: row.get("name")?,
        status: QueueStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown queue status '{}'", status).into(),
            )
        })?,
        priority_weight: row.get("priority_weight")?,
        discovered_from: row.get("discovered_from")?,
        discovered_via: row.get("discovered_via")?,
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}
