//! Breadth-first frontier expansion through cross-posting authors.
//!
//! For a claimed target the engine reads its recent posts, follows every
//! (non-sentinel) author to the other targets they post in, and enqueues the
//! ones that pass the admission filter. The queue's unique name constraint is
//! the only "already seen" check that counts; concurrent workers discovering
//! the same target are resolved by the store.

mod analysis;
mod config;
mod filter;
mod result;
mod seed;

pub use analysis::{
    build_author_record, dedupe_posts, extract_links, group_by_author, is_sentinel_author,
    posting_frequency, SENTINEL_AUTHORS,
};
pub use config::DiscoveryConfig;
pub use filter::{FilterVerdict, RelevancePolicy, TargetFilter};
pub use result::{DiscoveryReport, SeedReport};
pub use seed::Seeder;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::models::{AuthorProfile, NewQueueEntry, Post, QueueEntry};
use crate::repository::{QueueStore, RecordStore};
use crate::scrapers::ContentSource;

/// What one author contributed to a discovery pass.
struct AuthorOutcome {
    name: String,
    posts: Vec<Post>,
    targets: BTreeSet<String>,
}

/// Discovery engine. Clones share the source and stores; each clone made
/// with [`DiscoveryEngine::for_worker`] gets its own author semaphore.
#[derive(Clone)]
pub struct DiscoveryEngine {
    source: Arc<dyn ContentSource>,
    queue: Arc<dyn QueueStore>,
    records: Arc<dyn RecordStore>,
    config: DiscoveryConfig,
    author_permits: Arc<Semaphore>,
}

impl DiscoveryEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        queue: Arc<dyn QueueStore>,
        records: Arc<dyn RecordStore>,
        config: DiscoveryConfig,
    ) -> Self {
        let permits = config.author_concurrency.max(1);
        Self {
            source,
            queue,
            records,
            config,
            author_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// A copy with a fresh author semaphore, for one worker.
    pub fn for_worker(&self) -> Self {
        let mut engine = self.clone();
        engine.author_permits = Arc::new(Semaphore::new(self.config.author_concurrency.max(1)));
        engine
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run discovery on a claimed entry and record the terminal transition.
    ///
    /// Success completes the entry. Target-level errors fail it. Pool
    /// exhaustion and store errors leave it `processing` for stale recovery.
    pub async fn process_claimed(&self, entry: &QueueEntry) -> CrawlResult<DiscoveryReport> {
        match self.discover(entry).await {
            Ok(report) => {
                self.queue.complete(entry.id).await?;
                info!(
                    "r/{}: {} posts, {} authors ({} failed), {} new targets, {} skipped",
                    entry.name,
                    report.posts_seen,
                    report.authors_processed,
                    report.authors_failed,
                    report.targets_discovered,
                    report.skipped()
                );
                Ok(report)
            }
            Err(e) if e.is_terminal_for_target() => {
                warn!("r/{} failed: {}", entry.name, e);
                self.queue.fail(entry.id, &e.to_string()).await?;
                Err(e)
            }
            Err(e) => {
                warn!("r/{} left in processing: {}", entry.name, e);
                Err(e)
            }
        }
    }

    /// One discovery pass over `entry`. Does not transition the entry.
    pub async fn discover(&self, entry: &QueueEntry) -> CrawlResult<DiscoveryReport> {
        let target = entry.name.as_str();
        let mut report = DiscoveryReport::new(target);

        let posts = dedupe_posts(self.source.recent_posts(target, self.config.post_limit).await?);
        if posts.is_empty() {
            return Err(CrawlError::NoContent {
                target: target.to_string(),
            });
        }
        report.posts_seen = posts.len();
        report.posts_saved += self.records.save_posts(&posts).await?;

        let by_author = group_by_author(&posts);
        debug!("r/{}: {} unique authors", target, by_author.len());

        let outcomes = join_all(
            by_author
                .into_iter()
                .map(|(author, seen)| self.process_author(target, author, seen)),
        )
        .await;

        // First author to mention a target is recorded as its discoverer.
        let mut candidates: BTreeMap<String, String> = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.authors_processed += 1;
                    report.posts_saved += self.records.save_posts(&outcome.posts).await?;
                    for t in outcome.targets {
                        candidates.entry(t).or_insert_with(|| outcome.name.clone());
                    }
                }
                Err(CrawlError::Store(e)) => return Err(CrawlError::Store(e)),
                Err(_) => report.authors_failed += 1,
            }
        }
        candidates.remove(target);

        let mut unknown = Vec::new();
        for (name, via) in candidates {
            if self.queue.get(&name).await?.is_some() {
                report.skipped_known += 1;
            } else {
                unknown.push((name, via));
            }
        }

        let lookups = join_all(unknown.into_iter().map(|(name, via)| async move {
            let _permit = self.author_permits.acquire().await;
            let info = self.source.target_info(&name).await;
            (name, via, info)
        }))
        .await;

        for (name, via, info) in lookups {
            let info = match info {
                Ok(info) => info,
                Err(e) => {
                    debug!("Metadata lookup for r/{} failed: {}", name, e);
                    report.lookups_failed += 1;
                    continue;
                }
            };

            match self.config.filter.evaluate(&info) {
                FilterVerdict::TooSmall => report.skipped_small += 1,
                FilterVerdict::Irrelevant => report.skipped_irrelevant += 1,
                FilterVerdict::Accept => {
                    let new_entry = NewQueueEntry::discovered(&name, info.audience, target, &via);
                    if self.queue.enqueue(new_entry).await? {
                        info!(
                            "Discovered r/{} ({} members) via u/{} from r/{}",
                            name, info.audience, via, target
                        );
                        report.targets_discovered += 1;
                    } else {
                        report.skipped_known += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Profile and recent posts of one author, merged with what was seen in
    /// the seed target.
    async fn process_author(
        &self,
        target: &str,
        author: String,
        seen: Vec<Post>,
    ) -> CrawlResult<AuthorOutcome> {
        let _permit = self.author_permits.acquire().await;

        let profile: Option<AuthorProfile> = match self.source.author_profile(&author).await {
            Ok(profile) => Some(profile),
            Err(CrawlError::NotFound { .. }) => None,
            Err(e) => {
                debug!("Profile for u/{} failed: {}", author, e);
                return Err(e);
            }
        };

        let own = match self
            .source
            .author_posts(&author, self.config.author_post_limit)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                debug!("Posts for u/{} failed: {}", author, e);
                return Err(e);
            }
        };

        let posts = dedupe_posts(seen.into_iter().chain(own));
        let record = build_author_record(&author, profile.as_ref(), &posts, target);
        self.records.upsert_author(&record).await?;

        Ok(AuthorOutcome {
            name: author,
            targets: record.targets,
            posts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueueStatus;
    use crate::repository::{MemoryQueueStore, MemoryRecordStore};
    use crate::testing::{post, target, FakeSource};

    struct Harness {
        queue: Arc<MemoryQueueStore>,
        records: Arc<MemoryRecordStore>,
        engine: DiscoveryEngine,
        source: Arc<FakeSource>,
    }

    fn harness(source: FakeSource, relevance: RelevancePolicy) -> Harness {
        let source = Arc::new(source);
        let queue = Arc::new(MemoryQueueStore::new());
        let records = Arc::new(MemoryRecordStore::new(queue.clone()));
        let config = DiscoveryConfig {
            filter: TargetFilter::new(100, relevance),
            ..Default::default()
        };
        let engine = DiscoveryEngine::new(source.clone(), queue.clone(), records.clone(), config);
        Harness {
            queue,
            records,
            engine,
            source,
        }
    }

    async fn claim(h: &Harness, name: &str) -> QueueEntry {
        h.queue
            .enqueue(NewQueueEntry::seed(name, 1000))
            .await
            .unwrap();
        h.queue.claim_target(name).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sentinel_authors_are_not_followed() {
        let source = FakeSource::new()
            .with_target(target("seed", 1000, true))
            .with_posts(
                "seed",
                vec![
                    post("p1", "seed", "[deleted]", 1.0),
                    post("p2", "seed", "AutoModerator", 2.0),
                ],
            );
        let h = harness(source, RelevancePolicy::FlaggedOnly);
        let entry = claim(&h, "seed").await;

        let report = h.engine.process_claimed(&entry).await.unwrap();

        assert_eq!(report.posts_seen, 2);
        assert_eq!(report.authors_processed, 0);
        assert!(h.records.author("[deleted]").await.is_none());
    }

    #[tokio::test]
    async fn test_relevance_and_size_filters() {
        let source = FakeSource::new()
            .with_target(target("seed", 1000, true))
            .with_target(target("flagged", 500, true))
            .with_target(target("clean", 500, false))
            .with_target(target("tiny", 5, true))
            .with_posts("seed", vec![post("p1", "seed", "alice", 1.0)])
            .with_author(
                "alice",
                10,
                vec![
                    post("a1", "flagged", "alice", 2.0),
                    post("a2", "clean", "alice", 3.0),
                    post("a3", "tiny", "alice", 4.0),
                ],
            );
        let h = harness(source, RelevancePolicy::FlaggedOnly);
        let entry = claim(&h, "seed").await;

        let report = h.engine.process_claimed(&entry).await.unwrap();

        assert_eq!(report.targets_discovered, 1);
        assert_eq!(report.skipped_irrelevant, 1);
        assert_eq!(report.skipped_small, 1);
        let found = h.queue.get("flagged").await.unwrap().unwrap();
        assert_eq!(found.priority_weight, 500);
        assert_eq!(found.discovered_via.as_deref(), Some("alice"));
        assert!(h.queue.get("clean").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_known_targets_skip_metadata_lookup() {
        let source = FakeSource::new()
            .with_target(target("seed", 1000, true))
            .with_target(target("known", 500, true))
            .with_posts("seed", vec![post("p1", "seed", "bob", 1.0)])
            .with_author("bob", 1, vec![post("b1", "known", "bob", 2.0)]);
        let h = harness(source, RelevancePolicy::Any);
        h.queue
            .enqueue(NewQueueEntry::seed("known", 7))
            .await
            .unwrap();
        let entry = claim(&h, "seed").await;

        let report = h.engine.process_claimed(&entry).await.unwrap();

        assert_eq!(report.skipped_known, 1);
        assert!(!h.source.lookups().contains(&"known".to_string()));
        assert_eq!(h.queue.get("known").await.unwrap().unwrap().priority_weight, 7);
    }

    #[tokio::test]
    async fn test_failing_author_does_not_fail_target() {
        let source = FakeSource::new()
            .with_target(target("seed", 1000, true))
            .with_target(target("other", 400, true))
            .with_posts(
                "seed",
                vec![post("p1", "seed", "good", 1.0), post("p2", "seed", "bad", 2.0)],
            )
            .with_author("good", 1, vec![post("g1", "other", "good", 3.0)])
            .with_failing_author("bad");
        let h = harness(source, RelevancePolicy::FlaggedOnly);
        let entry = claim(&h, "seed").await;

        let report = h.engine.process_claimed(&entry).await.unwrap();

        assert_eq!(report.authors_processed, 1);
        assert_eq!(report.authors_failed, 1);
        assert_eq!(report.targets_discovered, 1);
        assert_eq!(
            h.queue.get("seed").await.unwrap().unwrap().status,
            QueueStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_empty_listing_fails_target() {
        let source = FakeSource::new().with_target(target("quiet", 1000, true));
        let h = harness(source, RelevancePolicy::Any);
        let entry = claim(&h, "quiet").await;

        let err = h.engine.process_claimed(&entry).await.unwrap_err();

        assert!(matches!(err, CrawlError::NoContent { .. }));
        let stored = h.queue.get("quiet").await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn test_author_record_collects_targets_and_links() {
        let mut linked = post("a1", "elsewhere", "carol", 86_400.0 * 3.0);
        linked.body = "shop at https://example.org/store".to_string();
        let source = FakeSource::new()
            .with_target(target("seed", 1000, true))
            .with_posts("seed", vec![post("p1", "seed", "carol", 86_400.0)])
            .with_author("carol", 42, vec![linked]);
        let h = harness(source, RelevancePolicy::Any);
        let entry = claim(&h, "seed").await;

        h.engine.process_claimed(&entry).await.unwrap();

        let author = h.records.author("carol").await.unwrap();
        assert_eq!(author.total_karma, Some(42));
        assert_eq!(author.recent_post_count, 2);
        assert!(author.targets.contains("seed"));
        assert!(author.targets.contains("elsewhere"));
        assert!(author
            .external_links
            .iter()
            .any(|l| l.starts_with("https://example.org")));
        assert_eq!(author.discovered_from.as_deref(), Some("seed"));
    }
}
