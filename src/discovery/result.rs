//! Discovery result types.

use serde::Serialize;

/// What one discovery pass over a target found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub target: String,
    pub posts_seen: usize,
    /// Posts newly stored (seed posts plus author posts).
    pub posts_saved: usize,
    pub authors_processed: usize,
    pub authors_failed: usize,
    /// Targets newly enqueued.
    pub targets_discovered: usize,
    pub skipped_known: usize,
    pub skipped_small: usize,
    pub skipped_irrelevant: usize,
    /// Metadata lookups that failed (private, banned, or network errors).
    pub lookups_failed: usize,
}

impl DiscoveryReport {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_known + self.skipped_small + self.skipped_irrelevant
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub already_known: usize,
    pub rejected: usize,
}
