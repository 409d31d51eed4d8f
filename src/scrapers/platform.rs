//! Platform content source over the public JSON listing endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http_client::ResilientClient;
use crate::error::{CrawlError, CrawlResult};
use crate::models::{normalize_name, AuthorProfile, Post, TargetInfo};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// Listing endpoints return at most this many items per page.
const PAGE_SIZE: usize = 100;

/// Everything the discovery and metrics paths read from the platform.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Most recent posts in a target, newest first.
    async fn recent_posts(&self, target: &str, limit: usize) -> CrawlResult<Vec<Post>>;

    async fn author_profile(&self, author: &str) -> CrawlResult<AuthorProfile>;

    /// Most recent submissions by an author across all targets.
    async fn author_posts(&self, author: &str, limit: usize) -> CrawlResult<Vec<Post>>;

    async fn target_info(&self, target: &str) -> CrawlResult<TargetInfo>;

    /// Rule titles posted by a target's moderators.
    async fn target_rules(&self, target: &str) -> CrawlResult<Vec<String>>;

    async fn search_targets(
        &self,
        query: &str,
        include_flagged: bool,
        limit: usize,
    ) -> CrawlResult<Vec<TargetInfo>>;
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    #[serde(default)]
    kind: String,
    data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostData {
    id: String,
    subreddit: String,
    author: String,
    title: String,
    selftext: Option<String>,
    url: Option<String>,
    permalink: Option<String>,
    score: i64,
    upvote_ratio: Option<f64>,
    num_comments: i64,
    over_18: bool,
    created_utc: f64,
}

impl PostData {
    fn into_post(self, fallback_target: &str) -> Post {
        let target = if self.subreddit.is_empty() {
            fallback_target.to_string()
        } else {
            normalize_name(&self.subreddit)
        };
        Post {
            id: self.id,
            target,
            author: self.author,
            title: self.title,
            body: self.selftext.unwrap_or_default(),
            url: self.url.filter(|u| !u.is_empty()),
            permalink: self
                .permalink
                .map(|p| format!("{}{}", DEFAULT_BASE_URL, p)),
            score: self.score,
            upvote_ratio: self.upvote_ratio,
            num_comments: self.num_comments,
            flagged: self.over_18,
            created_utc: self.created_utc,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserAbout {
    data: UserData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserData {
    name: String,
    link_karma: i64,
    comment_karma: i64,
    created_utc: Option<f64>,
    icon_img: Option<String>,
    subreddit: Option<UserSubreddit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserSubreddit {
    public_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetAbout {
    data: TargetData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TargetData {
    display_name: String,
    subscribers: Option<i64>,
    over18: bool,
    public_description: Option<String>,
    subreddit_type: Option<String>,
}

impl TargetData {
    fn into_info(self, fallback: &str) -> TargetInfo {
        let name = if self.display_name.is_empty() {
            fallback.to_string()
        } else {
            normalize_name(&self.display_name)
        };
        TargetInfo {
            name,
            audience: self.subscribers.unwrap_or(0),
            flagged: self.over18,
            description: self.public_description.filter(|d| !d.trim().is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RulesDoc {
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Default, Deserialize)]
struct Rule {
    #[serde(default)]
    short_name: String,
}

/// Strip query noise from avatar URLs.
fn clean_icon(url: Option<String>) -> Option<String> {
    url.and_then(|u| u.split('?').next().map(|s| s.to_string()))
        .filter(|u| !u.is_empty())
}

/// JSON API client for the platform.
#[derive(Clone)]
pub struct PlatformClient {
    client: ResilientClient,
    base_url: String,
}

impl PlatformClient {
    pub fn new(client: ResilientClient) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: ResilientClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Human-facing URL of a target page.
    pub fn target_url(&self, target: &str) -> String {
        format!("{}/r/{}/", self.base_url, target)
    }
}

#[async_trait]
impl ContentSource for PlatformClient {
    async fn recent_posts(&self, target: &str, limit: usize) -> CrawlResult<Vec<Post>> {
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let page = (limit - posts.len()).min(PAGE_SIZE);
            let mut url = format!("{}/r/{}/new.json?limit={}", self.base_url, target, page);
            if let Some(cursor) = &after {
                url.push_str(&format!("&after={}", urlencoding::encode(cursor)));
            }

            let listing: Listing<PostData> = self.client.fetch_json(&url).await?;
            if listing.data.children.is_empty() {
                break;
            }
            posts.extend(
                listing
                    .data
                    .children
                    .into_iter()
                    .filter(|t| t.kind.is_empty() || t.kind == "t3")
                    .map(|t| t.data.into_post(target)),
            );

            match listing.data.after {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        posts.truncate(limit);
        debug!("Fetched {} posts from r/{}", posts.len(), target);
        Ok(posts)
    }

    async fn author_profile(&self, author: &str) -> CrawlResult<AuthorProfile> {
        let url = format!("{}/user/{}/about.json", self.base_url, author);
        let about: UserAbout = self.client.fetch_json(&url).await?;
        let data = about.data;
        Ok(AuthorProfile {
            name: if data.name.is_empty() {
                author.to_string()
            } else {
                data.name
            },
            total_karma: data.link_karma + data.comment_karma,
            created_utc: data.created_utc,
            icon_url: clean_icon(data.icon_img),
            bio: data
                .subreddit
                .and_then(|s| s.public_description)
                .filter(|b| !b.trim().is_empty()),
        })
    }

    async fn author_posts(&self, author: &str, limit: usize) -> CrawlResult<Vec<Post>> {
        let url = format!(
            "{}/user/{}/submitted.json?limit={}&sort=new",
            self.base_url, author, limit
        );
        let listing: Listing<PostData> = self.client.fetch_json(&url).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter(|t| t.kind == "t3")
            .map(|t| t.data.into_post(""))
            .filter(|p| !p.target.is_empty())
            .collect())
    }

    async fn target_info(&self, target: &str) -> CrawlResult<TargetInfo> {
        let url = format!("{}/r/{}/about.json", self.base_url, target);
        let about: TargetAbout = self.client.fetch_json(&url).await?;
        if about.data.subreddit_type.as_deref() == Some("private") {
            return Err(CrawlError::NotFound { url, status: 403 });
        }
        Ok(about.data.into_info(target))
    }

    async fn target_rules(&self, target: &str) -> CrawlResult<Vec<String>> {
        let url = format!("{}/r/{}/about/rules.json", self.base_url, target);
        let doc: RulesDoc = self.client.fetch_json(&url).await?;
        Ok(doc.rules.into_iter().map(|r| r.short_name).collect())
    }

    async fn search_targets(
        &self,
        query: &str,
        include_flagged: bool,
        limit: usize,
    ) -> CrawlResult<Vec<TargetInfo>> {
        let mut found = Vec::new();
        let mut after: Option<String> = None;

        while found.len() < limit {
            let page = (limit - found.len()).min(PAGE_SIZE);
            let mut url = format!(
                "{}/subreddits/search.json?q={}&include_over_18={}&limit={}",
                self.base_url,
                urlencoding::encode(query),
                if include_flagged { "on" } else { "off" },
                page
            );
            if let Some(cursor) = &after {
                url.push_str(&format!("&after={}", urlencoding::encode(cursor)));
            }

            let listing: Listing<TargetData> = self.client.fetch_json(&url).await?;
            if listing.data.children.is_empty() {
                break;
            }
            found.extend(
                listing
                    .data
                    .children
                    .into_iter()
                    .map(|t| t.data.into_info("")),
            );
            match listing.data.after {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        found.retain(|t| !t.name.is_empty());
        found.truncate(limit);
        Ok(found)
    }
}
