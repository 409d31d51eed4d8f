//! Work queue models.
//!
//! A queue entry is one discovery target. Entries are never deleted; their
//! status history is the audit trail of the crawl.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a queue entry.
///
/// Transitions only move forward: `pending -> processing -> {completed, failed}`.
/// The two exceptions are stale recovery (`processing -> pending`) and an
/// explicit operator requeue of failed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal for the crawl.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovery target awaiting or undergoing processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned identifier.
    pub id: i64,
    /// Target name, lower-cased. Unique across the queue.
    pub name: String,
    pub status: QueueStatus,
    /// Ordering weight (audience size).
    pub priority_weight: i64,
    /// Target this one was discovered from.
    pub discovered_from: Option<String>,
    /// Author whose activity led to the discovery.
    pub discovered_via: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for enqueueing a new target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewQueueEntry {
    pub name: String,
    pub priority_weight: i64,
    pub discovered_from: Option<String>,
    pub discovered_via: Option<String>,
}

impl NewQueueEntry {
    /// A seed target with no discovery lineage.
    pub fn seed(name: impl Into<String>, priority_weight: i64) -> Self {
        Self {
            name: normalize_name(&name.into()),
            priority_weight,
            discovered_from: None,
            discovered_via: None,
        }
    }

    /// A target discovered through an author's activity in another target.
    pub fn discovered(
        name: impl Into<String>,
        priority_weight: i64,
        from: impl Into<String>,
        via: impl Into<String>,
    ) -> Self {
        Self {
            name: normalize_name(&name.into()),
            priority_weight,
            discovered_from: Some(normalize_name(&from.into())),
            discovered_via: Some(via.into()),
        }
    }
}

/// Canonical form of a target name: trimmed, lower-cased, without an `r/` prefix.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches('/');
    let trimmed = trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("R/"))
        .unwrap_or(trimmed);
    trimmed.to_lowercase()
}

/// Aggregate queue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl QueueStats {
    /// Add one entry with the given status to the counts.
    pub fn add(&mut self, status: QueueStatus, count: u64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Completed => self.completed += count,
            QueueStatus::Failed => self.failed += count,
        }
        self.total += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_names() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
        ] {
            assert_eq!(QueueStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(QueueStatus::from_str("fetching"), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  r/SomeTarget "), "sometarget");
        assert_eq!(normalize_name("/r/Mixed"), "mixed");
        assert_eq!(normalize_name("plain"), "plain");
    }

    #[test]
    fn test_stats_add() {
        let mut stats = QueueStats::default();
        stats.add(QueueStatus::Pending, 3);
        stats.add(QueueStatus::Failed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 4);
    }
}
