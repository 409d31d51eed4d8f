//! Bootstrapping the frontier from names or keyword search.

use std::sync::Arc;

use tracing::{info, warn};

use super::filter::TargetFilter;
use super::result::SeedReport;
use crate::error::CrawlResult;
use crate::models::{normalize_name, NewQueueEntry};
use crate::repository::QueueStore;
use crate::scrapers::ContentSource;

pub struct Seeder {
    queue: Arc<dyn QueueStore>,
    source: Arc<dyn ContentSource>,
}

impl Seeder {
    pub fn new(queue: Arc<dyn QueueStore>, source: Arc<dyn ContentSource>) -> Self {
        Self { queue, source }
    }

    /// Enqueue explicit names. The filter does not apply to operator choices;
    /// audience is looked up for the priority weight when `lookup` is set.
    pub async fn seed_names(&self, names: &[String], lookup: bool) -> CrawlResult<SeedReport> {
        let mut report = SeedReport::default();

        for raw in names {
            let name = normalize_name(raw);
            if name.is_empty() {
                report.rejected += 1;
                continue;
            }

            let weight = if lookup {
                match self.source.target_info(&name).await {
                    Ok(info) => info.audience,
                    Err(e) => {
                        warn!("Could not look up r/{}: {} (seeding with weight 0)", name, e);
                        0
                    }
                }
            } else {
                0
            };

            if self.queue.enqueue(NewQueueEntry::seed(&name, weight)).await? {
                info!("Seeded r/{} (weight {})", name, weight);
                report.inserted += 1;
            } else {
                report.already_known += 1;
            }
        }

        Ok(report)
    }

    /// Enqueue search results that pass `filter`.
    pub async fn seed_search(
        &self,
        query: &str,
        filter: &TargetFilter,
        limit: usize,
    ) -> CrawlResult<SeedReport> {
        let mut report = SeedReport::default();
        let found = self
            .source
            .search_targets(query, filter.relevance.includes_flagged(), limit)
            .await?;
        info!("Search '{}' returned {} targets", query, found.len());

        for info in found {
            if !filter.accepts(&info) {
                report.rejected += 1;
                continue;
            }
            if self
                .queue
                .enqueue(NewQueueEntry::seed(&info.name, info.audience))
                .await?
            {
                report.inserted += 1;
            } else {
                report.already_known += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::RelevancePolicy;
    use crate::repository::MemoryQueueStore;
    use crate::testing::{target, FakeSource};

    fn seeder(source: FakeSource) -> (Arc<MemoryQueueStore>, Seeder) {
        let queue = Arc::new(MemoryQueueStore::new());
        let seeder = Seeder::new(queue.clone(), Arc::new(source));
        (queue, seeder)
    }

    #[tokio::test]
    async fn test_seed_names_uses_looked_up_audience() {
        let source = FakeSource::new().with_target(target("big", 9000, false));
        let (queue, seeder) = seeder(source);
        let names = vec!["r/Big".to_string(), "missing".to_string(), "  ".to_string()];

        let report = seeder.seed_names(&names, true).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(queue.get("big").await.unwrap().unwrap().priority_weight, 9000);
        assert_eq!(queue.get("missing").await.unwrap().unwrap().priority_weight, 0);

        let again = seeder.seed_names(&names[..1], false).await.unwrap();
        assert_eq!(again.already_known, 1);
    }

    #[tokio::test]
    async fn test_seed_search_applies_filter() {
        let source = FakeSource::new()
            .with_target(target("gardening", 5000, false))
            .with_target(target("gardeningtips", 50, false))
            .with_target(target("gardeningafterdark", 3000, true));
        let (queue, seeder) = seeder(source);
        let filter = TargetFilter::new(100, RelevancePolicy::FlaggedOnly);

        let report = seeder.seed_search("gardening", &filter, 10).await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.rejected, 2);
        assert!(queue.get("gardeningafterdark").await.unwrap().is_some());
        assert!(queue.get("gardening").await.unwrap().is_none());
    }
}
