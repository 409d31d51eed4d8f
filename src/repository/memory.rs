//! In-memory stores for single-process operation and tests.
//!
//! Same contracts as the SQLite stores; state is not persisted across restarts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{QueueStore, RecordStore, RepositoryError, Result};
use crate::models::{
    normalize_name, AuthorRecord, NewQueueEntry, Post, QueueEntry, QueueStats, QueueStatus,
    RecordStats, ScrapeStatus, ScrapedRecord,
};

#[derive(Debug, Default)]
struct QueueState {
    entries: BTreeMap<i64, QueueEntry>,
    by_name: HashMap<String, i64>,
    next_id: i64,
}

impl QueueState {
    /// Best pending entry under the claim ordering.
    fn best_pending(&self, min_priority: i64) -> Option<i64> {
        self.entries
            .values()
            .filter(|e| e.status == QueueStatus::Pending && e.priority_weight >= min_priority)
            .min_by(|a, b| {
                b.priority_weight
                    .cmp(&a.priority_weight)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|e| e.id)
    }

    fn mark_processing(&mut self, id: i64) -> Option<QueueEntry> {
        let entry = self.entries.get_mut(&id)?;
        if entry.status != QueueStatus::Pending {
            return None;
        }
        entry.status = QueueStatus::Processing;
        entry.updated_at = Utc::now();
        Some(entry.clone())
    }

    fn finish(&mut self, id: i64, status: QueueStatus, reason: Option<&str>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("queue entry {}", id)))?;
        if entry.status == QueueStatus::Processing {
            entry.status = status;
            entry.error_message = reason.map(|r| r.to_string());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// In-memory queue store.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<QueueState>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, in id order.
    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<bool> {
        let name = normalize_name(&entry.name);
        if name.is_empty() {
            return Err(RepositoryError::Other("target name is empty".to_string()));
        }
        let mut state = self.state.lock().await;
        if state.by_name.contains_key(&name) {
            return Ok(false);
        }
        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        state.by_name.insert(name.clone(), id);
        state.entries.insert(
            id,
            QueueEntry {
                id,
                name,
                status: QueueStatus::Pending,
                priority_weight: entry.priority_weight,
                discovered_from: entry.discovered_from,
                discovered_via: entry.discovered_via,
                error_message: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn claim_next(&self, min_priority: i64) -> Result<Option<QueueEntry>> {
        let mut state = self.state.lock().await;
        Ok(state
            .best_pending(min_priority)
            .and_then(|id| state.mark_processing(id)))
    }

    async fn claim_target(&self, name: &str) -> Result<Option<QueueEntry>> {
        let mut state = self.state.lock().await;
        let id = state.by_name.get(&normalize_name(name)).copied();
        Ok(id.and_then(|id| state.mark_processing(id)))
    }

    async fn complete(&self, id: i64) -> Result<()> {
        self.state
            .lock()
            .await
            .finish(id, QueueStatus::Completed, None)
    }

    async fn fail(&self, id: i64, reason: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .finish(id, QueueStatus::Failed, Some(reason))
    }

    async fn recover_stale(&self, timeout: Duration) -> Result<usize> {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::days(36_500));
        let cutoff = now - timeout;

        let mut state = self.state.lock().await;
        let mut reset = 0;
        for entry in state.entries.values_mut() {
            if entry.status == QueueStatus::Processing && entry.updated_at <= cutoff {
                entry.status = QueueStatus::Pending;
                entry.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for entry in state.entries.values() {
            stats.add(entry.status, 1);
        }
        Ok(stats)
    }

    async fn get(&self, name: &str) -> Result<Option<QueueEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .by_name
            .get(&normalize_name(name))
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn get_pending(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
        let state = self.state.lock().await;
        let mut pending: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|e| e.status == QueueStatus::Pending && e.priority_weight >= min_priority)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority_weight
                .cmp(&a.priority_weight)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn requeue_failed(&self, limit: usize) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut failed: Vec<(i64, i64)> = state
            .entries
            .values()
            .filter(|e| e.status == QueueStatus::Failed)
            .map(|e| (e.priority_weight, e.id))
            .collect();
        failed.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let now = Utc::now();
        let mut requeued = 0;
        for (_, id) in failed.into_iter().take(limit) {
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.status = QueueStatus::Pending;
                entry.error_message = None;
                entry.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}

#[derive(Debug, Default)]
struct RecordState {
    records: HashMap<String, ScrapedRecord>,
    authors: HashMap<String, AuthorRecord>,
    posts: HashMap<String, Post>,
}

/// In-memory record store, reading completed targets from a memory queue.
#[derive(Debug)]
pub struct MemoryRecordStore {
    queue: Arc<MemoryQueueStore>,
    state: Mutex<RecordState>,
}

impl MemoryRecordStore {
    pub fn new(queue: Arc<MemoryQueueStore>) -> Self {
        Self {
            queue,
            state: Mutex::new(RecordState::default()),
        }
    }

    pub async fn record(&self, target: &str) -> Option<ScrapedRecord> {
        self.state
            .lock()
            .await
            .records
            .get(&normalize_name(target))
            .cloned()
    }

    pub async fn author(&self, name: &str) -> Option<AuthorRecord> {
        self.state.lock().await.authors.get(name).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_record(&self, record: &ScrapedRecord) -> Result<()> {
        let key = normalize_name(&record.target);
        let mut state = self.state.lock().await;
        let merged = match state.records.remove(&key) {
            Some(existing) => ScrapedRecord {
                audience: record.audience.or(existing.audience),
                description: record.description.clone().or(existing.description),
                rules_count: record.rules_count.or(existing.rules_count),
                icon_url: record.icon_url.clone().or(existing.icon_url),
                classification: record.classification.clone().or(existing.classification),
                ..record.clone()
            },
            None => record.clone(),
        };
        state.records.insert(key, merged);
        Ok(())
    }

    async fn mark_failed(&self, target: &str, reason: &str) -> Result<()> {
        let key = normalize_name(target);
        let mut state = self.state.lock().await;
        let record = state
            .records
            .entry(key.clone())
            .or_insert_with(|| ScrapedRecord::new(&key));
        record.status = ScrapeStatus::Failed;
        record.error_message = Some(reason.to_string());
        record.scraped_at = Utc::now();
        Ok(())
    }

    async fn pending_targets(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
        let entries = self.queue.snapshot().await;
        let state = self.state.lock().await;
        let mut pending: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| {
                e.status == QueueStatus::Completed
                    && e.priority_weight >= min_priority
                    && !state.records.contains_key(&e.name)
            })
            .collect();
        pending.sort_by(|a, b| b.priority_weight.cmp(&a.priority_weight).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn upsert_author(&self, author: &AuthorRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.authors.get_mut(&author.name) {
            Some(existing) => {
                existing.total_karma = author.total_karma.or(existing.total_karma);
                existing.account_created_utc =
                    author.account_created_utc.or(existing.account_created_utc);
                existing.recent_post_count = author.recent_post_count;
                existing.posting_frequency = author.posting_frequency.or(existing.posting_frequency);
                existing
                    .external_links
                    .extend(author.external_links.iter().cloned());
                existing.targets.extend(author.targets.iter().cloned());
            }
            None => {
                state.authors.insert(author.name.clone(), author.clone());
            }
        }
        Ok(())
    }

    async fn save_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut saved = 0;
        for post in posts {
            if !state.posts.contains_key(&post.id) {
                state.posts.insert(post.id.clone(), post.clone());
                saved += 1;
            }
        }
        Ok(saved)
    }

    async fn record_stats(&self) -> Result<RecordStats> {
        let state = self.state.lock().await;
        let mut stats = RecordStats {
            records: state.records.len() as u64,
            authors: state.authors.len() as u64,
            posts: state.posts.len() as u64,
            ..Default::default()
        };
        for record in state.records.values() {
            match record.status {
                ScrapeStatus::Complete => stats.complete += 1,
                ScrapeStatus::Partial => stats.partial += 1,
                ScrapeStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_claim_ordering_and_uniqueness() {
        let store = MemoryQueueStore::new();
        for (name, weight) in [("a", 10), ("b", 50), ("c", 30)] {
            assert!(store.enqueue(NewQueueEntry::seed(name, weight)).await.unwrap());
        }
        assert!(!store.enqueue(NewQueueEntry::seed("B", 1)).await.unwrap());

        let mut weights = Vec::new();
        while let Some(entry) = store.claim_next(0).await.unwrap() {
            weights.push(entry.priority_weight);
        }
        assert_eq!(weights, vec![50, 30, 10]);
    }

    #[tokio::test]
    async fn test_memory_terminal_idempotent() {
        let store = MemoryQueueStore::new();
        store.enqueue(NewQueueEntry::seed("a", 1)).await.unwrap();
        let entry = store.claim_next(0).await.unwrap().unwrap();
        store.fail(entry.id, "boom").await.unwrap();
        store.complete(entry.id).await.unwrap();
        let after = store.get("a").await.unwrap().unwrap();
        assert_eq!(after.status, QueueStatus::Failed);
        assert_eq!(after.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_memory_record_merge_keeps_metadata() {
        let queue = Arc::new(MemoryQueueStore::new());
        let records = MemoryRecordStore::new(queue);
        let mut first = ScrapedRecord::new("alpha");
        first.audience = Some(700);
        records.upsert_record(&first).await.unwrap();

        let mut second = ScrapedRecord::new("alpha");
        second.weekly_visitors = Some(12);
        records.upsert_record(&second).await.unwrap();

        let merged = records.record("alpha").await.unwrap();
        assert_eq!(merged.audience, Some(700));
        assert_eq!(merged.weekly_visitors, Some(12));
    }
}
