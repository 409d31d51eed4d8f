//! Data models for the frontier crawler.

mod content;
mod fetch;
mod identity;
mod queue;
mod record;

pub use content::{AuthorProfile, Post, TargetInfo};
pub use fetch::{FetchOutcome, FetchPayload};
pub use identity::{CredentialBundle, Identity, IdentityStats, SessionCookie};
pub use queue::{normalize_name, NewQueueEntry, QueueEntry, QueueStats, QueueStatus};
pub use record::{AuthorRecord, Classification, RecordStats, ScrapeStatus, ScrapedRecord};
