//! Configuration for the discovery engine.

use serde::{Deserialize, Serialize};

use super::filter::TargetFilter;

/// Knobs for one discovery pass over a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Recent posts read from the claimed target.
    pub post_limit: usize,
    /// Recent submissions read per author.
    pub author_post_limit: usize,
    /// Simultaneous author fetches per worker.
    pub author_concurrency: usize,
    #[serde(flatten)]
    pub filter: TargetFilter,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            post_limit: 100,
            author_post_limit: 25,
            author_concurrency: 5,
            filter: TargetFilter::default(),
        }
    }
}
