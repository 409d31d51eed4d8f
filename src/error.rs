//! Error taxonomy for crawl operations.

use std::time::Duration;

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors surfaced by the fetch, browser and discovery layers.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Still rate limited after exhausting retries with rotation.
    #[error("rate limited fetching {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// Access refused (403 or a block page).
    #[error("blocked (HTTP {status}) fetching {url}")]
    Blocked { url: String, status: u16 },

    /// Transport failure or unexpected status after exhausting backoff.
    #[error("network error fetching {url}: {cause}")]
    TransientNetwork { url: String, cause: String },

    /// Target does not exist or is private.
    #[error("not found or private (HTTP {status}): {url}")]
    NotFound { url: String, status: u16 },

    /// Target listing came back empty (blocked, banned or dead target).
    #[error("no content returned for {target}")]
    NoContent { target: String },

    /// No identity became available before the acquire timeout.
    #[error("identity pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// Response body could not be decoded.
    #[error("failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl CrawlError {
    /// Whether this error should move the target to `failed`.
    pub fn is_terminal_for_target(&self) -> bool {
        !self.leaves_claim() && !matches!(self, Self::Store(_) | Self::Config(_))
    }

    /// Whether the target should stay `processing` for stale recovery
    /// instead of being failed now.
    pub fn leaves_claim(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Whether a retry with a different identity may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Blocked { .. }
                | Self::TransientNetwork { .. }
                | Self::PoolExhausted { .. }
        )
    }
}

/// Result alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
