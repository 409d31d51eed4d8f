//! Orchestrator configuration, counters and events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Worker pool knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub workers: usize,
    /// Entries claimed per worker iteration.
    pub batch_size: usize,
    /// Sleep when the queue has nothing claimable.
    pub idle_wait: Duration,
    /// Processing entries older than this are returned to pending.
    pub stale_timeout: Duration,
    pub recover_interval: Duration,
    /// Pause after a loop-level store error.
    pub loop_error_backoff: Duration,
    /// Rotate egress after this many processed targets. 0 disables.
    pub rotate_every: usize,
    pub min_priority: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 20,
            idle_wait: Duration::from_secs(60),
            stale_timeout: Duration::from_secs(30 * 60),
            recover_interval: Duration::from_secs(5 * 60),
            loop_error_backoff: Duration::from_secs(30),
            rotate_every: 7,
            min_priority: 0,
        }
    }
}

/// Progress events for display.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Started {
        worker_id: usize,
        target: String,
    },
    Completed {
        worker_id: usize,
        target: String,
        discovered: usize,
        authors: usize,
    },
    Failed {
        worker_id: usize,
        target: String,
        error: String,
    },
    /// Left in processing for stale recovery.
    Deferred {
        worker_id: usize,
        target: String,
    },
    Idle {
        worker_id: usize,
    },
    Recovered {
        count: usize,
    },
    Rotated {
        egress: String,
    },
}

/// Shared run counters.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    pub deferred: AtomicUsize,
    pub discovered: AtomicUsize,
    pub authors: AtomicUsize,
    pub posts_saved: AtomicUsize,
    pub recovered: AtomicUsize,
    pub rotations: AtomicUsize,
    /// Targets processed since start, drives proactive rotation.
    pub processed: AtomicUsize,
}

impl RunCounters {
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            authors: self.authors.load(Ordering::Relaxed),
            posts_saved: self.posts_saved.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

/// Totals for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub discovered: usize,
    pub authors: usize,
    pub posts_saved: usize,
    pub recovered: usize,
    pub rotations: usize,
}

/// Totals for an explicit batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub summary: RunSummary,
    /// Names that were not pending (already processing or terminal).
    pub skipped: Vec<String>,
}
