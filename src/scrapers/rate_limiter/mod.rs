//! Adaptive per-domain rate limiter.
//!
//! Tracks request timing per domain and adapts delays based on responses.
//! Backs off on 429/5xx, gradually recovers on success, and counts
//! consecutive 403s so callers can tell a blocked egress IP from a single
//! inaccessible target.

mod backoff;
mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub use backoff::{backoff_delay, parse_retry_after, MAX_RETRY_AFTER};
pub use config::{DomainStats, RateLimitConfig, DEFAULT_BLOCK_THRESHOLD};
use domain_state::DomainState;

/// Adaptive rate limiter that tracks per-domain request timing.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    pub(crate) config: RateLimitConfig,
    pub(crate) domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark request as started.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay));
            state.last_request = Some(Instant::now());
            state.total_requests += 1;
        }

        Some(domain)
    }

    /// Report a successful request. Resets the 403 counter and may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;
            state.consecutive_403s = 0;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let new_delay = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = new_delay.max(self.config.min_delay);

                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    info!("Domain {} recovered from rate limit backoff", domain);
                } else {
                    debug!(
                        "Domain {} delay reduced to {:?}",
                        domain, state.current_delay
                    );
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Report a 403 response.
    ///
    /// Returns true when this 403 crossed the consecutive threshold, meaning the
    /// egress identity is likely blocked. The counter resets when that happens,
    /// so one crossing maps to exactly one rotation.
    pub async fn report_403(&self, domain: &str) -> bool {
        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.config.base_delay));

        if state.add_403(self.config.block_threshold) {
            warn!(
                "{} consecutive 403s from {}, treating egress as blocked",
                self.config.block_threshold, domain
            );
            true
        } else {
            debug!(
                "403 from {} ({} consecutive) - treating as access denied for this target",
                domain, state.consecutive_403s
            );
            false
        }
    }

    /// Report a definite rate limit hit (429) - increases delay.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;

            let new_delay = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
            );
            state.current_delay = new_delay.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx) - mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = new_delay.min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Current consecutive 403 count for a domain.
    pub async fn consecutive_403s(&self, domain: &str) -> u32 {
        let domains = self.domains.read().await;
        domains.get(domain).map(|s| s.consecutive_403s).unwrap_or(0)
    }

    /// Get statistics for all domains.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                        consecutive_403s: v.consecutive_403s,
                        block_events: v.block_events,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_limiter() -> RateLimiter {
        RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://www.example.com/r/rust/new.json"),
            Some("www.example.com".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_backoff_on_rate_limit() {
        let limiter = fast_limiter();
        limiter.acquire("https://example.com/1").await;
        limiter.report_rate_limit("example.com", 429).await;

        let stats = limiter.get_stats().await;
        let domain_stats = stats.get("example.com").unwrap();
        assert!(domain_stats.current_delay >= Duration::from_millis(200));
        assert!(domain_stats.in_backoff);
    }

    #[tokio::test]
    async fn test_403_threshold_and_reset_on_success() {
        let limiter = fast_limiter();
        limiter.acquire("https://example.com/a").await;

        assert!(!limiter.report_403("example.com").await);
        limiter.report_success("example.com").await;
        assert_eq!(limiter.consecutive_403s("example.com").await, 0);

        assert!(!limiter.report_403("example.com").await);
        assert!(limiter.report_403("example.com").await);
        assert_eq!(limiter.consecutive_403s("example.com").await, 0);

        let stats = limiter.get_stats().await;
        assert_eq!(stats["example.com"].block_events, 1);
    }
}
