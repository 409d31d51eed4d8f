//! Worker pool driving the discovery engine.
//!
//! Each worker claims a batch from the queue, processes it concurrently and
//! repeats until shutdown. The queue's claim is the only coordination
//! between workers, so any number of workers (or processes) can share one
//! store.

mod types;

pub use types::{
    BatchSummary, OrchestratorConfig, RunCounters, RunSummary, WorkerEvent,
};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::discovery::{DiscoveryEngine, DiscoveryReport};
use crate::error::{CrawlError, CrawlResult};
use crate::models::{normalize_name, NewQueueEntry, QueueEntry};
use crate::repository::QueueStore;
use crate::scrapers::egress::EgressProvider;

#[derive(Clone)]
pub struct Orchestrator {
    engine: DiscoveryEngine,
    queue: Arc<dyn QueueStore>,
    egress: Option<Arc<dyn EgressProvider>>,
    config: OrchestratorConfig,
    counters: Arc<RunCounters>,
    events: Option<mpsc::Sender<WorkerEvent>>,
}

impl Orchestrator {
    pub fn new(
        engine: DiscoveryEngine,
        queue: Arc<dyn QueueStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            egress: None,
            config,
            counters: Arc::new(RunCounters::default()),
            events: None,
        }
    }

    /// Egress rotated every `rotate_every` processed targets.
    pub fn with_egress(mut self, egress: Arc<dyn EgressProvider>) -> Self {
        self.egress = Some(egress);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<WorkerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Run workers until `shutdown` turns true. In-flight batches finish.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> anyhow::Result<RunSummary> {
        let workers = self.config.workers.max(1);
        info!(
            "Starting {} workers (batch {}, min priority {})",
            workers, self.config.batch_size, self.config.min_priority
        );

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let this = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { this.worker_loop(worker_id, shutdown).await })
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task panicked: {}", e);
            }
        }

        let summary = self.counters.snapshot();
        info!(
            "Run finished: {} completed, {} failed, {} discovered",
            summary.completed, summary.failed, summary.discovered
        );
        Ok(summary)
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        let engine = self.engine.for_worker();
        let mut last_recover: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if worker_id == 0
                && last_recover.map_or(true, |t| t.elapsed() >= self.config.recover_interval)
            {
                self.recover_stale().await;
                last_recover = Some(Instant::now());
            }

            let batch = match self.claim_batch().await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(worker_id, "Claim failed: {}", e);
                    if sleep_or_shutdown(self.config.loop_error_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                debug!(worker_id, "Queue empty, waiting {:?}", self.config.idle_wait);
                self.emit(WorkerEvent::Idle { worker_id }).await;
                if sleep_or_shutdown(self.config.idle_wait, &mut shutdown).await {
                    break;
                }
                continue;
            }

            debug!(worker_id, "Claimed {} targets", batch.len());
            let results = join_all(
                batch
                    .iter()
                    .map(|entry| self.process(&engine, worker_id, entry)),
            )
            .await;

            // Entries whose bookkeeping failed stay in processing until stale recovery.
            if let Some(e) = results.iter().find_map(|r| match r {
                Err(e @ CrawlError::Store(_)) => Some(e),
                _ => None,
            }) {
                error!(worker_id, "Queue update failed: {}", e);
                if sleep_or_shutdown(self.config.loop_error_backoff, &mut shutdown).await {
                    break;
                }
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn recover_stale(&self) {
        match self.queue.recover_stale(self.config.stale_timeout).await {
            Ok(0) => {}
            Ok(count) => {
                warn!("Recovered {} stale targets back to pending", count);
                self.counters.recovered.fetch_add(count, Ordering::Relaxed);
                self.emit(WorkerEvent::Recovered { count }).await;
            }
            Err(e) => warn!("Stale recovery failed: {}", e),
        }
    }

    async fn claim_batch(&self) -> CrawlResult<Vec<QueueEntry>> {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while batch.len() < self.config.batch_size.max(1) {
            match self.queue.claim_next(self.config.min_priority).await? {
                Some(entry) => batch.push(entry),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Process one claimed entry and update counters.
    async fn process(
        &self,
        engine: &DiscoveryEngine,
        worker_id: usize,
        entry: &QueueEntry,
    ) -> CrawlResult<DiscoveryReport> {
        self.emit(WorkerEvent::Started {
            worker_id,
            target: entry.name.clone(),
        })
        .await;

        let result = engine.process_claimed(entry).await;
        match &result {
            Ok(report) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .discovered
                    .fetch_add(report.targets_discovered, Ordering::Relaxed);
                self.counters
                    .authors
                    .fetch_add(report.authors_processed, Ordering::Relaxed);
                self.counters
                    .posts_saved
                    .fetch_add(report.posts_saved, Ordering::Relaxed);
                self.emit(WorkerEvent::Completed {
                    worker_id,
                    target: entry.name.clone(),
                    discovered: report.targets_discovered,
                    authors: report.authors_processed,
                })
                .await;
            }
            Err(e) if e.is_terminal_for_target() => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.emit(WorkerEvent::Failed {
                    worker_id,
                    target: entry.name.clone(),
                    error: e.to_string(),
                })
                .await;
            }
            Err(_) => {
                self.counters.deferred.fetch_add(1, Ordering::Relaxed);
                self.emit(WorkerEvent::Deferred {
                    worker_id,
                    target: entry.name.clone(),
                })
                .await;
            }
        }

        self.maybe_rotate().await;
        result
    }

    async fn maybe_rotate(&self) {
        let every = self.config.rotate_every;
        let processed = self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if every == 0 || processed % every != 0 {
            return;
        }
        if let Some(egress) = &self.egress {
            let fresh = egress.rotate().await;
            self.counters.rotations.fetch_add(1, Ordering::Relaxed);
            info!("Proactive egress rotation after {} targets: {}", processed, fresh.label);
            self.emit(WorkerEvent::Rotated {
                egress: fresh.label,
            })
            .await;
        }
    }

    /// Process the named targets once, enqueueing any that are unknown.
    ///
    /// Names that are already processing or terminal are skipped.
    pub async fn run_batch(&self, names: &[String]) -> anyhow::Result<BatchSummary> {
        let engine = self.engine.for_worker();
        let mut claimed = Vec::new();
        let mut skipped = Vec::new();

        for raw in names {
            let name = normalize_name(raw);
            if name.is_empty() {
                continue;
            }
            if self.queue.enqueue(NewQueueEntry::seed(&name, 0)).await? {
                debug!("Enqueued r/{} for batch", name);
            }
            match self.queue.claim_target(&name).await? {
                Some(entry) => claimed.push(entry),
                None => {
                    let status = self
                        .queue
                        .get(&name)
                        .await?
                        .map(|e| e.status.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    info!("Skipping r/{} ({})", name, status);
                    skipped.push(name);
                }
            }
        }

        join_all(claimed.iter().map(|entry| self.process(&engine, 0, entry))).await;

        Ok(BatchSummary {
            summary: self.counters.snapshot(),
            skipped,
        })
    }

    async fn emit(&self, event: WorkerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// Sleep for `wait`; returns true if shutdown was requested meanwhile.
async fn sleep_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryConfig, RelevancePolicy, TargetFilter};
    use crate::models::{QueueStatus, TargetInfo};
    use crate::repository::{MemoryQueueStore, MemoryRecordStore};
    use crate::scrapers::egress::DirectEgress;
    use crate::repository::RepositoryError;
    use crate::testing::{post, target, FakeSource};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Queue whose `complete` always fails, recording when entries are claimed.
    struct BrokenCompleteQueue {
        inner: Arc<MemoryQueueStore>,
        claimed_at: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl QueueStore for BrokenCompleteQueue {
        async fn enqueue(&self, entry: NewQueueEntry) -> crate::repository::Result<bool> {
            self.inner.enqueue(entry).await
        }

        async fn claim_next(
            &self,
            min_priority: i64,
        ) -> crate::repository::Result<Option<QueueEntry>> {
            let entry = self.inner.claim_next(min_priority).await?;
            if entry.is_some() {
                self.claimed_at.lock().unwrap().push(Instant::now());
            }
            Ok(entry)
        }

        async fn claim_target(&self, name: &str) -> crate::repository::Result<Option<QueueEntry>> {
            self.inner.claim_target(name).await
        }

        async fn complete(&self, _id: i64) -> crate::repository::Result<()> {
            Err(RepositoryError::Other("disk full".to_string()))
        }

        async fn fail(&self, id: i64, reason: &str) -> crate::repository::Result<()> {
            self.inner.fail(id, reason).await
        }

        async fn recover_stale(&self, timeout: Duration) -> crate::repository::Result<usize> {
            self.inner.recover_stale(timeout).await
        }

        async fn stats(&self) -> crate::repository::Result<crate::models::QueueStats> {
            self.inner.stats().await
        }

        async fn get(&self, name: &str) -> crate::repository::Result<Option<QueueEntry>> {
            self.inner.get(name).await
        }

        async fn get_pending(
            &self,
            limit: usize,
            min_priority: i64,
        ) -> crate::repository::Result<Vec<QueueEntry>> {
            self.inner.get_pending(limit, min_priority).await
        }

        async fn requeue_failed(&self, limit: usize) -> crate::repository::Result<usize> {
            self.inner.requeue_failed(limit).await
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            workers: 2,
            batch_size: 5,
            idle_wait: Duration::from_millis(10),
            loop_error_backoff: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn source() -> FakeSource {
        FakeSource::new()
            .with_target(target("alpha", 1000, true))
            .with_target(target("beta", 800, true))
            .with_target(TargetInfo {
                name: "gamma".to_string(),
                audience: 900,
                flagged: true,
                description: None,
            })
            .with_posts("alpha", vec![post("a1", "alpha", "u1", 1.0)])
            .with_posts("beta", vec![post("b1", "beta", "u2", 1.0)])
            .with_posts("gamma", vec![post("g1", "gamma", "u1", 2.0)])
            .with_author("u1", 10, vec![post("x1", "gamma", "u1", 3.0)])
            .with_author("u2", 10, Vec::new())
    }

    fn build(config: OrchestratorConfig) -> (Orchestrator, Arc<MemoryQueueStore>) {
        let queue = Arc::new(MemoryQueueStore::new());
        let records = Arc::new(MemoryRecordStore::new(Arc::clone(&queue)));
        let engine = DiscoveryEngine::new(
            Arc::new(source()),
            queue.clone(),
            records,
            DiscoveryConfig {
                filter: TargetFilter::new(100, RelevancePolicy::FlaggedOnly),
                ..Default::default()
            },
        );
        (Orchestrator::new(engine, queue.clone(), config), queue)
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_shutdown() {
        let (orchestrator, queue) = build(fast_config());
        queue
            .enqueue(NewQueueEntry::seed("alpha", 1000))
            .await
            .unwrap();
        queue.enqueue(NewQueueEntry::seed("beta", 800)).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let runner = orchestrator.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });

        for _ in 0..200 {
            let stats = queue.stats().await.unwrap();
            if stats.pending == 0 && stats.processing == 0 && stats.total == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.discovered, 1);
        let gamma = queue.get("gamma").await.unwrap().unwrap();
        assert_eq!(gamma.status, QueueStatus::Completed);
        assert_eq!(gamma.discovered_from.as_deref(), Some("alpha"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_backs_off_before_next_claim() {
        let inner = Arc::new(MemoryQueueStore::new());
        let queue = Arc::new(BrokenCompleteQueue {
            inner: Arc::clone(&inner),
            claimed_at: Mutex::new(Vec::new()),
        });
        let records = Arc::new(MemoryRecordStore::new(Arc::clone(&inner)));
        let engine = DiscoveryEngine::new(
            Arc::new(source()),
            queue.clone(),
            records,
            DiscoveryConfig {
                filter: TargetFilter::new(100, RelevancePolicy::FlaggedOnly),
                ..Default::default()
            },
        );
        let backoff = Duration::from_secs(30);
        let orchestrator = Orchestrator::new(
            engine,
            queue.clone(),
            OrchestratorConfig {
                workers: 1,
                batch_size: 1,
                idle_wait: Duration::from_secs(1),
                loop_error_backoff: backoff,
                ..Default::default()
            },
        );
        inner.enqueue(NewQueueEntry::seed("alpha", 1000)).await.unwrap();
        inner.enqueue(NewQueueEntry::seed("beta", 800)).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { orchestrator.run(rx).await });
        tokio::time::sleep(Duration::from_secs(45)).await;
        tx.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();

        let claimed_at = queue.claimed_at.lock().unwrap().clone();
        assert_eq!(claimed_at.len(), 2);
        assert!(claimed_at[1] - claimed_at[0] >= backoff);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, 0);
        let alpha = inner.get("alpha").await.unwrap().unwrap();
        assert_eq!(alpha.status, QueueStatus::Processing);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_processes_nothing() {
        let (orchestrator, queue) = build(fast_config());
        queue
            .enqueue(NewQueueEntry::seed("alpha", 1000))
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(true);
        let summary = orchestrator.run(rx).await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_proactive_rotation() {
        let egress = Arc::new(DirectEgress::new());
        let (orchestrator, _) = build(OrchestratorConfig {
            rotate_every: 2,
            ..fast_config()
        });
        let orchestrator = orchestrator.with_egress(egress.clone());

        let names = vec!["alpha".to_string(), "beta".to_string()];
        let batch = orchestrator.run_batch(&names).await.unwrap();
        assert_eq!(batch.summary.completed, 2);
        assert_eq!(batch.summary.rotations, 1);
        assert_eq!(egress.current().await.generation, 1);
    }

    #[tokio::test]
    async fn test_batch_skips_non_pending() {
        let (orchestrator, queue) = build(fast_config());
        queue
            .enqueue(NewQueueEntry::seed("alpha", 1000))
            .await
            .unwrap();
        let entry = queue.claim_next(0).await.unwrap().unwrap();
        queue.complete(entry.id).await.unwrap();

        let names = vec!["Alpha".to_string(), "beta".to_string(), "missing".to_string()];
        let batch = orchestrator.run_batch(&names).await.unwrap();

        assert_eq!(batch.skipped, vec!["alpha"]);
        assert_eq!(batch.summary.completed, 1);
        assert_eq!(batch.summary.failed, 1);
        let missing = queue.get("missing").await.unwrap().unwrap();
        assert_eq!(missing.status, QueueStatus::Failed);
    }
}
