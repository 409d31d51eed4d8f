//! Resilient fetch client: classification, backoff and egress rotation.
//!
//! Every request runs through a bounded retry loop. Responses are classified
//! into soft rate limits (rotate and wait), hard blocks (rotate only after the
//! consecutive-403 threshold) and generic errors (exponential backoff).

mod transport;
mod user_agent;

pub use transport::{RawResponse, ReqwestTransport, Transport};
pub use user_agent::{random_user_agent, resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::egress::EgressProvider;
use super::rate_limiter::{backoff_delay, parse_retry_after, RateLimiter};
use crate::error::{CrawlError, CrawlResult};
use crate::models::{FetchOutcome, FetchPayload};

/// Body fragments that mark an interstitial block page served with 200.
const BLOCK_MARKERS: &[&str] = &[
    "blocked by network security",
    "whoa there, pardner",
    "you've been blocked",
];

/// Retry knobs for [`ResilientClient::fetch`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Wait after a 429 without a usable Retry-After.
    pub rate_limit_wait: Duration,
    /// Wait after a threshold-crossing 403 and rotation.
    pub block_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(60),
            rate_limit_wait: Duration::from_secs(10),
            block_cooldown: Duration::from_secs(60),
        }
    }
}

/// Classify a raw response.
pub fn classify(response: RawResponse) -> FetchOutcome {
    match response.status {
        200..=299 => {
            if looks_blocked(&response.body) {
                FetchOutcome::Blocked { status: 403 }
            } else {
                FetchOutcome::Success(FetchPayload {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                })
            }
        }
        429 => FetchOutcome::RateLimited {
            retry_after: parse_retry_after(response.header("retry-after")),
        },
        403 => FetchOutcome::Blocked { status: 403 },
        404 | 410 => FetchOutcome::NotFound {
            status: response.status,
        },
        status => FetchOutcome::TransientError {
            status: Some(status),
            cause: format!("HTTP {}", status),
        },
    }
}

/// Whether an HTML body is a block interstitial.
pub fn looks_blocked(body: &str) -> bool {
    let head: String = body.chars().take(4096).collect::<String>().to_lowercase();
    BLOCK_MARKERS.iter().any(|m| head.contains(m))
}

/// HTTP client with per-domain pacing, classification and rotation.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    egress: Arc<dyn EgressProvider>,
    rate_limiter: RateLimiter,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        egress: Arc<dyn EgressProvider>,
        rate_limiter: RateLimiter,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            egress,
            rate_limiter,
            policy,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn egress(&self) -> &Arc<dyn EgressProvider> {
        &self.egress
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Rotate egress outside the retry loop (proactive rotation).
    pub async fn rotate(&self) {
        self.egress.rotate().await;
    }

    /// Fetch `url`, retrying per the classification rules.
    pub async fn fetch(&self, url: &str) -> CrawlResult<FetchPayload> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let egress = self.egress.current().await;
            let domain = self.rate_limiter.acquire(url).await;

            let outcome = match self.transport.get(url, &egress).await {
                Ok(raw) => classify(raw),
                Err(cause) => FetchOutcome::TransientError {
                    status: None,
                    cause,
                },
            };
            debug!(url, attempt, outcome = outcome.label(), egress = %egress.label, "fetched");

            match outcome {
                FetchOutcome::Success(payload) => {
                    if let Some(domain) = &domain {
                        self.rate_limiter.report_success(domain).await;
                    }
                    return Ok(payload);
                }
                FetchOutcome::NotFound { status } => {
                    return Err(CrawlError::NotFound {
                        url: url.to_string(),
                        status,
                    });
                }
                FetchOutcome::RateLimited { retry_after } => {
                    if let Some(domain) = &domain {
                        self.rate_limiter.report_rate_limit(domain, 429).await;
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(CrawlError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    let wait = retry_after.unwrap_or(self.policy.rate_limit_wait);
                    warn!(url, attempt, "Rate limited, rotating egress and waiting {:?}", wait);
                    self.egress.rotate().await;
                    tokio::time::sleep(wait).await;
                }
                FetchOutcome::Blocked { status } => {
                    let crossed = match &domain {
                        Some(domain) => self.rate_limiter.report_403(domain).await,
                        None => false,
                    };
                    if !crossed || attempt >= self.policy.max_attempts {
                        return Err(CrawlError::Blocked {
                            url: url.to_string(),
                            status,
                        });
                    }
                    warn!(
                        url,
                        attempt,
                        "Egress looks blocked, rotating and cooling down {:?}",
                        self.policy.block_cooldown
                    );
                    self.egress.rotate().await;
                    tokio::time::sleep(self.policy.block_cooldown).await;
                }
                FetchOutcome::TransientError { status, cause } => {
                    if let (Some(domain), Some(s)) = (&domain, status) {
                        if s >= 500 {
                            self.rate_limiter.report_server_error(domain).await;
                        }
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(CrawlError::TransientNetwork {
                            url: url.to_string(),
                            cause,
                        });
                    }
                    let wait =
                        backoff_delay(attempt - 1, self.policy.backoff_base, self.policy.backoff_cap);
                    debug!(url, attempt, "Transient error ({}), retrying in {:?}", cause, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Fetch and decode a JSON document.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> CrawlResult<T> {
        let payload = self.fetch(url).await?;
        serde_json::from_str(&payload.body).map_err(|e| CrawlError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert!(classify(RawResponse::new(200, "{}")).is_success());
        assert!(matches!(
            classify(RawResponse::new(404, "")),
            FetchOutcome::NotFound { status: 404 }
        ));
        assert!(matches!(
            classify(RawResponse::new(410, "")),
            FetchOutcome::NotFound { status: 410 }
        ));
        assert!(matches!(
            classify(RawResponse::new(403, "")),
            FetchOutcome::Blocked { status: 403 }
        ));
        assert!(matches!(
            classify(RawResponse::new(502, "")),
            FetchOutcome::TransientError { status: Some(502), .. }
        ));
    }

    #[test]
    fn test_classify_rate_limit_reads_retry_after() {
        let outcome = classify(RawResponse::new(429, "").with_header("Retry-After", "7"));
        match outcome {
            FetchOutcome::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_block_page_with_200_is_blocked() {
        let body = "<html><body>You've been blocked by network security.</body></html>";
        assert!(matches!(
            classify(RawResponse::new(200, body)),
            FetchOutcome::Blocked { .. }
        ));
    }
}
