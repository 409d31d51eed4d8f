//! Per-domain rate limiting state.

use std::time::{Duration, Instant};

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Consecutive successes since last rate limit.
    pub consecutive_successes: u32,
    /// 403 responses since the last success or block rotation.
    pub consecutive_403s: u32,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
    /// Times the 403 threshold was crossed.
    pub block_events: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            consecutive_403s: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
            block_events: 0,
        }
    }

    /// Count a 403. Returns true (and resets the counter) when `threshold` is reached.
    pub fn add_403(&mut self, threshold: u32) -> bool {
        self.consecutive_403s += 1;
        self.consecutive_successes = 0;
        if self.consecutive_403s >= threshold.max(1) {
            self.consecutive_403s = 0;
            self.block_events += 1;
            true
        } else {
            false
        }
    }

    /// Time until this domain is ready for another request.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}
