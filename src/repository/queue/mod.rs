//! SQLite-backed work queue.

mod claim;
mod helpers;
mod state;

pub(crate) use helpers::row_to_entry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::schema::init_schema;
use super::{connect, with_connection, QueueStore, Result};
use crate::models::{NewQueueEntry, QueueEntry, QueueStats};

/// SQLite-backed queue store.
///
/// Each operation opens its own connection; concurrent writers are serialized
/// by SQLite (`BEGIN IMMEDIATE` plus a 30s busy timeout).
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    db_path: PathBuf,
}

impl SqliteQueueStore {
    /// Open (creating if needed) the queue store at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    super::RepositoryError::Other(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        init_schema(&connect(&store.db_path)?)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<bool> {
        with_connection(&self.db_path, move |conn| claim::enqueue(conn, &entry)).await
    }

    async fn claim_next(&self, min_priority: i64) -> Result<Option<QueueEntry>> {
        with_connection(&self.db_path, move |conn| claim::claim_next(conn, min_priority)).await
    }

    async fn claim_target(&self, name: &str) -> Result<Option<QueueEntry>> {
        let name = crate::models::normalize_name(name);
        with_connection(&self.db_path, move |conn| claim::claim_target(conn, &name)).await
    }

    async fn complete(&self, id: i64) -> Result<()> {
        with_connection(&self.db_path, move |conn| state::complete(conn, id)).await
    }

    async fn fail(&self, id: i64, reason: &str) -> Result<()> {
        let reason = reason.to_string();
        with_connection(&self.db_path, move |conn| state::fail(conn, id, &reason)).await
    }

    async fn recover_stale(&self, timeout: Duration) -> Result<usize> {
        with_connection(&self.db_path, move |conn| state::recover_stale(conn, timeout)).await
    }

    async fn stats(&self) -> Result<QueueStats> {
        with_connection(&self.db_path, |conn| state::stats(conn)).await
    }

    async fn get(&self, name: &str) -> Result<Option<QueueEntry>> {
        let name = crate::models::normalize_name(name);
        with_connection(&self.db_path, move |conn| state::get(conn, &name)).await
    }

    async fn get_pending(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
        with_connection(&self.db_path, move |conn| {
            claim::get_pending(conn, limit, min_priority)
        })
        .await
    }

    async fn requeue_failed(&self, limit: usize) -> Result<usize> {
        with_connection(&self.db_path, move |conn| state::requeue_failed(conn, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueueStatus;
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteQueueStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteQueueStore::new(&dir.path().join("queue.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_case_insensitive() {
        let (_dir, store) = store();
        assert!(store.enqueue(NewQueueEntry::seed("Alpha", 10)).await.unwrap());
        assert!(!store.enqueue(NewQueueEntry::seed("alpha", 99)).await.unwrap());
        assert!(!store.enqueue(NewQueueEntry::seed("r/ALPHA", 1)).await.unwrap());

        let entry = store.get("ALPHA").await.unwrap().unwrap();
        assert_eq!(entry.priority_weight, 10);
        assert_eq!(store.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_age() {
        let (_dir, store) = store();
        for (name, weight) in [("low", 10), ("high", 50), ("mid", 30), ("mid2", 30)] {
            store.enqueue(NewQueueEntry::seed(name, weight)).await.unwrap();
        }

        let order: Vec<String> = {
            let mut names = Vec::new();
            while let Some(entry) = store.claim_next(0).await.unwrap() {
                assert_eq!(entry.status, QueueStatus::Processing);
                names.push(entry.name);
            }
            names
        };
        assert_eq!(order, vec!["high", "mid", "mid2", "low"]);
    }

    #[tokio::test]
    async fn test_claim_respects_min_priority() {
        let (_dir, store) = store();
        store.enqueue(NewQueueEntry::seed("small", 5)).await.unwrap();
        assert!(store.claim_next(10).await.unwrap().is_none());
        assert!(store.claim_next(5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminal_transitions_are_idempotent() {
        let (_dir, store) = store();
        store.enqueue(NewQueueEntry::seed("a", 1)).await.unwrap();
        let entry = store.claim_next(0).await.unwrap().unwrap();

        store.complete(entry.id).await.unwrap();
        store.complete(entry.id).await.unwrap();
        store.fail(entry.id, "late failure").await.unwrap();

        let after = store.get("a").await.unwrap().unwrap();
        assert_eq!(after.status, QueueStatus::Completed);
        assert!(after.error_message.is_none());
    }

    #[tokio::test]
    async fn test_complete_unknown_id_is_not_found() {
        let (_dir, store) = store();
        let err = store.complete(4242).await.unwrap_err();
        assert!(matches!(err, super::super::RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recover_stale_resets_processing() {
        let (_dir, store) = store();
        store.enqueue(NewQueueEntry::seed("stuck", 1)).await.unwrap();
        let claimed = store.claim_next(0).await.unwrap().unwrap();

        // Not stale yet under a generous timeout.
        assert_eq!(store.recover_stale(Duration::from_secs(3600)).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.recover_stale(Duration::ZERO).await.unwrap(), 1);

        let again = store.claim_next(0).await.unwrap().unwrap();
        assert_eq!(again.id, claimed.id);
    }

    #[tokio::test]
    async fn test_requeue_failed() {
        let (_dir, store) = store();
        store.enqueue(NewQueueEntry::seed("x", 1)).await.unwrap();
        let entry = store.claim_next(0).await.unwrap().unwrap();
        store.fail(entry.id, "blocked").await.unwrap();
        assert_eq!(store.stats().await.unwrap().failed, 1);

        assert_eq!(store.requeue_failed(10).await.unwrap(), 1);
        let pending = store.get_pending(10, 0).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].error_message.is_none());
    }

    #[tokio::test]
    async fn test_claim_target_only_pending() {
        let (_dir, store) = store();
        store.enqueue(NewQueueEntry::seed("named", 1)).await.unwrap();
        assert!(store.claim_target("Named").await.unwrap().is_some());
        assert!(store.claim_target("named").await.unwrap().is_none());
        assert!(store.claim_target("missing").await.unwrap().is_none());
    }
}
