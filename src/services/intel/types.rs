//! Metrics scraper types and events.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scrapers::platform::DEFAULT_BASE_URL;

/// Configuration for the metrics scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    /// Targets processed per run.
    pub limit: usize,
    /// Simultaneous browser sessions.
    pub concurrency: usize,
    /// Completed targets below this audience are not scraped.
    pub min_audience: i64,
    /// How long a task waits for a free identity.
    #[serde(with = "secs")]
    pub acquire_timeout: Duration,
    /// Site the rendered pages are loaded from.
    pub base_url: String,
    /// Recent posts handed to the classifier.
    pub classify_post_sample: usize,
    /// Fresh-egress sessions opened for one target after blocks or
    /// repeated rate limits.
    pub max_rotations: u32,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            concurrency: 3,
            min_audience: 5000,
            acquire_timeout: Duration::from_secs(30),
            base_url: DEFAULT_BASE_URL.to_string(),
            classify_post_sample: 10,
            max_rotations: 2,
        }
    }
}

impl IntelConfig {
    pub fn page_url(&self, target: &str) -> String {
        format!("{}/r/{}/", self.base_url.trim_end_matches('/'), target)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Events emitted while scraping.
#[derive(Debug, Clone)]
pub enum IntelEvent {
    Started { target: String },
    Saved { target: String, complete: bool },
    Failed { target: String, error: String },
    /// No identity freed up in time; the target is left for the next run.
    Deferred { target: String },
}

/// Result of one scraper run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntelSummary {
    pub attempted: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub deferred: usize,
}
