//! Platform content fetched during discovery.

use serde::{Deserialize, Serialize};

/// A content item posted by an author into a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Platform-assigned id, used as the dedupe key.
    pub id: String,
    /// Target the post was made in (lower-cased).
    pub target: String,
    pub author: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: i64,
    /// Content-policy flag set on the post.
    #[serde(default)]
    pub flagged: bool,
    /// Creation time, seconds since the epoch.
    pub created_utc: f64,
}

/// An author's public profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub name: String,
    pub total_karma: i64,
    pub created_utc: Option<f64>,
    pub icon_url: Option<String>,
    pub bio: Option<String>,
}

/// Metadata describing a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    /// Audience size (subscriber count).
    pub audience: i64,
    /// Content-policy flag on the target.
    pub flagged: bool,
    pub description: Option<String>,
}
