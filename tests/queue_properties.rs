//! Queue guarantees under concurrent access from independent store handles,
//! the way several crawler processes share one database file.

use std::collections::HashSet;
use std::sync::Arc;

use frontier::models::{NewQueueEntry, QueueStatus};
use frontier::repository::{QueueStore, SqliteQueueStore};
use tempfile::TempDir;

fn shared_stores(count: usize) -> (TempDir, Vec<Arc<SqliteQueueStore>>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");
    let stores = (0..count)
        .map(|_| Arc::new(SqliteQueueStore::new(&path).unwrap()))
        .collect();
    (dir, stores)
}

#[tokio::test]
async fn concurrent_enqueue_of_one_name_inserts_once() {
    let (_dir, stores) = shared_stores(6);
    let spellings = ["AskScience", "askscience", "r/askscience", "ASKSCIENCE", " askscience ", "r/AskScience"];

    let handles: Vec<_> = stores
        .iter()
        .zip(spellings)
        .map(|(store, name)| {
            let store = Arc::clone(store);
            tokio::spawn(async move { store.enqueue(NewQueueEntry::seed(name, 10)).await })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(stores[0].stats().await.unwrap().total, 1);
}

#[tokio::test]
async fn concurrent_claims_never_hand_out_an_entry_twice() {
    let (_dir, stores) = shared_stores(8);
    for i in 0..5 {
        stores[0]
            .enqueue(NewQueueEntry::seed(format!("target{}", i), i))
            .await
            .unwrap();
    }

    let handles: Vec<_> = stores
        .iter()
        .map(|store| {
            let store = Arc::clone(store);
            tokio::spawn(async move { store.claim_next(0).await })
        })
        .collect();

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(entry) = handle.await.unwrap().unwrap() {
            assert_eq!(entry.status, QueueStatus::Processing);
            claimed.push(entry.name);
        }
    }

    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), 5, "every entry claimed exactly once");
    assert_eq!(unique.len(), 5);
    assert_eq!(stores[0].stats().await.unwrap().processing, 5);
}

#[tokio::test]
async fn claims_follow_priority_weight() {
    let (_dir, stores) = shared_stores(1);
    let store = &stores[0];
    store.enqueue(NewQueueEntry::seed("low", 10)).await.unwrap();
    store.enqueue(NewQueueEntry::seed("high", 50)).await.unwrap();
    store.enqueue(NewQueueEntry::seed("mid", 30)).await.unwrap();

    let mut weights = Vec::new();
    while let Some(entry) = store.claim_next(0).await.unwrap() {
        weights.push(entry.priority_weight);
    }

    assert_eq!(weights, vec![50, 30, 10]);
}

#[tokio::test]
async fn abandoned_claims_come_back_after_recovery() {
    let (_dir, stores) = shared_stores(2);
    stores[0]
        .enqueue(NewQueueEntry::seed("orphan", 5))
        .await
        .unwrap();

    // First handle claims and then "crashes" without completing.
    let claimed = stores[0].claim_next(0).await.unwrap().unwrap();
    assert!(stores[1].claim_next(0).await.unwrap().is_none());

    let recovered = stores[1]
        .recover_stale(std::time::Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    let reclaimed = stores[1].claim_next(0).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, claimed.id);
}
