//! Results handed to the record store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a metrics scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    /// Every rendered metric was found.
    Complete,
    /// Some metrics are absent because the target does not expose them.
    Partial,
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(Self::Complete),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Structured judgement returned by the classification service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "reasoning")]
    pub rationale: String,
}

/// The externally visible result of scraping one target.
///
/// Metrics the target does not expose are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub target: String,
    pub display_name: String,
    pub audience: Option<i64>,
    pub weekly_visitors: Option<i64>,
    pub weekly_contributions: Option<i64>,
    pub competition_score: Option<f64>,
    pub description: Option<String>,
    pub rules_count: Option<i64>,
    pub icon_url: Option<String>,
    pub classification: Option<Classification>,
    pub status: ScrapeStatus,
    pub error_message: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Longest description kept on a record.
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

impl ScrapedRecord {
    /// An empty record for `target`; fields are filled in by the scraper.
    pub fn new(target: &str) -> Self {
        let target = super::normalize_name(target);
        Self {
            display_name: format!("r/{}", target),
            target,
            audience: None,
            weekly_visitors: None,
            weekly_contributions: None,
            competition_score: None,
            description: None,
            rules_count: None,
            icon_url: None,
            classification: None,
            status: ScrapeStatus::Partial,
            error_message: None,
            scraped_at: Utc::now(),
        }
    }

    /// Set the description, truncated on a character boundary.
    pub fn set_description(&mut self, description: &str) {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            self.description = None;
        } else {
            self.description = Some(trimmed.chars().take(MAX_DESCRIPTION_CHARS).collect());
        }
    }

    /// Whether none of the rendered metrics were extracted.
    pub fn has_no_metrics(&self) -> bool {
        self.weekly_visitors.is_none() && self.weekly_contributions.is_none()
    }

    /// Derive the competition score and status from the extracted metrics.
    pub fn finalize(&mut self) {
        self.competition_score = competition_score(self.weekly_contributions, self.weekly_visitors);
        self.status = if self.weekly_visitors.is_some()
            && self.weekly_contributions.is_some()
            && self.audience.is_some()
        {
            ScrapeStatus::Complete
        } else {
            ScrapeStatus::Partial
        };
    }
}

/// Contributions per visitor, rounded to six decimal places.
pub fn competition_score(contributions: Option<i64>, visitors: Option<i64>) -> Option<f64> {
    match (contributions, visitors) {
        (Some(c), Some(v)) if v > 0 => {
            let ratio = c as f64 / v as f64;
            Some((ratio * 1_000_000.0).round() / 1_000_000.0)
        }
        _ => None,
    }
}

/// An author observed while expanding the frontier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    pub total_karma: Option<i64>,
    pub account_created_utc: Option<f64>,
    pub recent_post_count: usize,
    /// Posts per day across the observed window.
    pub posting_frequency: Option<f64>,
    pub external_links: BTreeSet<String>,
    pub targets: BTreeSet<String>,
    pub discovered_from: Option<String>,
}

/// Record store counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordStats {
    pub records: u64,
    pub complete: u64,
    pub partial: u64,
    pub failed: u64,
    pub authors: u64,
    pub posts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competition_score_rounding() {
        assert_eq!(competition_score(Some(1), Some(3)), Some(0.333333));
        assert_eq!(competition_score(Some(50), Some(1000)), Some(0.05));
    }

    #[test]
    fn test_competition_score_missing() {
        assert_eq!(competition_score(None, Some(10)), None);
        assert_eq!(competition_score(Some(10), None), None);
        assert_eq!(competition_score(Some(10), Some(0)), None);
    }

    #[test]
    fn test_record_description_truncated() {
        let mut record = ScrapedRecord::new("r/Example");
        assert_eq!(record.target, "example");
        assert_eq!(record.display_name, "r/example");
        record.set_description(&"x".repeat(1500));
        assert_eq!(record.description.as_ref().map(|d| d.len()), Some(1000));
        record.set_description("   ");
        assert!(record.description.is_none());
    }

    #[test]
    fn test_finalize_status() {
        let mut record = ScrapedRecord::new("t");
        record.finalize();
        assert_eq!(record.status, ScrapeStatus::Partial);
        assert!(record.has_no_metrics());

        record.audience = Some(10_000);
        record.weekly_visitors = Some(2_000);
        record.weekly_contributions = Some(100);
        record.finalize();
        assert_eq!(record.status, ScrapeStatus::Complete);
        assert_eq!(record.competition_score, Some(0.05));
    }
}
