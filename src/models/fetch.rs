//! Per-request fetch outcomes.

use std::collections::HashMap;
use std::time::Duration;

/// Body and metadata of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPayload {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchPayload {
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Classified result of a single request attempt.
///
/// Transient: drives the retry state machine and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(FetchPayload),
    /// 429. Carries the server's Retry-After hint when present.
    RateLimited { retry_after: Option<Duration> },
    /// 403, or a page carrying block markers.
    Blocked { status: u16 },
    /// 404/410. Terminal for the target.
    NotFound { status: u16 },
    /// Any other status or a transport failure.
    TransientError {
        status: Option<u16>,
        cause: String,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::Blocked { .. } => "blocked",
            Self::NotFound { .. } => "not_found",
            Self::TransientError { .. } => "transient_error",
        }
    }
}
