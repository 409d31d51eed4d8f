//! End-to-end frontier expansion over a scripted platform.

use std::sync::Arc;

use frontier::discovery::{DiscoveryConfig, DiscoveryEngine, RelevancePolicy, TargetFilter};
use frontier::models::{NewQueueEntry, QueueStatus};
use frontier::repository::{
    MemoryQueueStore, MemoryRecordStore, QueueStore, RecordStore, SqliteQueueStore,
    SqliteRecordStore,
};
use frontier::services::orchestrator::{Orchestrator, OrchestratorConfig};
use frontier::testing::{post, target, FakeSource};
use tempfile::TempDir;

fn config() -> DiscoveryConfig {
    DiscoveryConfig {
        filter: TargetFilter::new(20, RelevancePolicy::Any),
        ..Default::default()
    }
}

/// u1 posts in `a`, and elsewhere in `c` (40 members) and `d` (5 members).
fn platform() -> FakeSource {
    FakeSource::new()
        .with_target(target("a", 100, false))
        .with_target(target("b", 10, false))
        .with_target(target("c", 40, false))
        .with_target(target("d", 5, false))
        .with_posts("a", vec![post("p1", "a", "u1", 1_700_000_000.0)])
        .with_posts("b", vec![post("p9", "b", "u9", 1_700_000_000.0)])
        .with_author(
            "u1",
            1200,
            vec![
                post("p2", "c", "u1", 1_700_000_100.0),
                post("p3", "d", "u1", 1_700_000_200.0),
            ],
        )
}

#[tokio::test]
async fn discovered_target_outranks_lighter_seed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frontier.db");
    let queue = Arc::new(SqliteQueueStore::new(&path).unwrap());
    let records = Arc::new(SqliteRecordStore::new(&path).unwrap());
    let engine = DiscoveryEngine::new(
        Arc::new(platform()),
        queue.clone(),
        records.clone(),
        config(),
    );

    queue.enqueue(NewQueueEntry::seed("a", 100)).await.unwrap();
    queue.enqueue(NewQueueEntry::seed("b", 10)).await.unwrap();

    let first = queue.claim_next(0).await.unwrap().unwrap();
    assert_eq!(first.name, "a");
    let report = engine.process_claimed(&first).await.unwrap();
    assert_eq!(report.targets_discovered, 1);
    assert_eq!(report.skipped_small, 1);

    assert_eq!(
        queue.get("a").await.unwrap().unwrap().status,
        QueueStatus::Completed
    );
    assert_eq!(
        queue.get("b").await.unwrap().unwrap().status,
        QueueStatus::Pending
    );
    let c = queue.get("c").await.unwrap().unwrap();
    assert_eq!(c.status, QueueStatus::Pending);
    assert_eq!(c.priority_weight, 40);
    assert_eq!(c.discovered_from.as_deref(), Some("a"));
    assert_eq!(c.discovered_via.as_deref(), Some("u1"));
    assert!(queue.get("d").await.unwrap().is_none());

    let next = queue.claim_next(0).await.unwrap().unwrap();
    assert_eq!(next.name, "c");

    let stats = records.record_stats().await.unwrap();
    assert_eq!(stats.authors, 1);
    assert_eq!(stats.posts, 3);
}

#[tokio::test]
async fn unknown_target_fails_and_known_targets_are_not_rediscovered() {
    let queue = Arc::new(MemoryQueueStore::new());
    let records = Arc::new(MemoryRecordStore::new(queue.clone()));
    let engine = DiscoveryEngine::new(
        Arc::new(platform()),
        queue.clone(),
        records.clone(),
        config(),
    );

    queue.enqueue(NewQueueEntry::seed("a", 100)).await.unwrap();
    queue.enqueue(NewQueueEntry::seed("c", 1)).await.unwrap();
    queue.enqueue(NewQueueEntry::seed("gone", 0)).await.unwrap();

    let orchestrator = Orchestrator::new(engine, queue.clone(), OrchestratorConfig::default());
    let batch = orchestrator
        .run_batch(&["a".to_string(), "gone".to_string()])
        .await
        .unwrap();

    assert_eq!(batch.summary.completed, 1);
    assert_eq!(batch.summary.failed, 1);
    assert_eq!(batch.summary.discovered, 0);

    // Seeded weight stands; discovery does not overwrite it.
    assert_eq!(queue.get("c").await.unwrap().unwrap().priority_weight, 1);
    assert_eq!(
        queue.get("gone").await.unwrap().unwrap().status,
        QueueStatus::Failed
    );

    let author = records.author("u1").await.unwrap();
    assert!(author.targets.contains("a"));
    assert!(author.targets.contains("c"));
}
