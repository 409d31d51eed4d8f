//! In-memory fakes for the crawler's external seams.
//!
//! Used by unit tests and by the integration tests under `tests/`, which can
//! only reach public items.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{CrawlError, CrawlResult};
use crate::models::{AuthorProfile, Post, TargetInfo};
use crate::scrapers::browser::{NavigationMode, PageLoad, PageLoader};
use crate::scrapers::egress::EgressIdentity;
use crate::scrapers::{ContentSource, RawResponse, Transport};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a post with the fields discovery looks at.
pub fn post(id: &str, target: &str, author: &str, created_utc: f64) -> Post {
    Post {
        id: id.to_string(),
        target: target.to_lowercase(),
        author: author.to_string(),
        title: format!("post {}", id),
        body: String::new(),
        url: None,
        permalink: None,
        score: 1,
        upvote_ratio: None,
        num_comments: 0,
        flagged: false,
        created_utc,
    }
}

pub fn target(name: &str, audience: i64, flagged: bool) -> TargetInfo {
    TargetInfo {
        name: name.to_lowercase(),
        audience,
        flagged,
        description: None,
    }
}

#[derive(Default)]
struct SourceState {
    targets: HashMap<String, TargetInfo>,
    rules: HashMap<String, Vec<String>>,
    target_posts: HashMap<String, Vec<Post>>,
    author_posts: HashMap<String, Vec<Post>>,
    profiles: HashMap<String, AuthorProfile>,
    failing_authors: Vec<String>,
    lookups: Vec<String>,
}

/// Scripted [`ContentSource`]. Unknown targets are `NotFound`, unknown
/// authors have no posts.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(self, info: TargetInfo) -> Self {
        lock(&self.state).targets.insert(info.name.clone(), info);
        self
    }

    pub fn with_rules(self, target: &str, rules: &[&str]) -> Self {
        lock(&self.state).rules.insert(
            target.to_lowercase(),
            rules.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn with_posts(self, target: &str, posts: Vec<Post>) -> Self {
        lock(&self.state)
            .target_posts
            .insert(target.to_lowercase(), posts);
        self
    }

    pub fn with_author(self, author: &str, karma: i64, posts: Vec<Post>) -> Self {
        {
            let mut state = lock(&self.state);
            state.profiles.insert(
                author.to_string(),
                AuthorProfile {
                    name: author.to_string(),
                    total_karma: karma,
                    ..Default::default()
                },
            );
            state.author_posts.insert(author.to_string(), posts);
        }
        self
    }

    /// Profile and post requests for `author` fail with a transient error.
    pub fn with_failing_author(self, author: &str) -> Self {
        lock(&self.state).failing_authors.push(author.to_string());
        self
    }

    /// Targets whose metadata was requested, in order.
    pub fn lookups(&self) -> Vec<String> {
        lock(&self.state).lookups.clone()
    }

    fn author_error(author: &str) -> CrawlError {
        CrawlError::TransientNetwork {
            url: format!("fake://user/{}", author),
            cause: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn recent_posts(&self, target: &str, limit: usize) -> CrawlResult<Vec<Post>> {
        let state = lock(&self.state);
        let key = target.to_lowercase();
        match state.target_posts.get(&key) {
            Some(posts) => Ok(posts.iter().take(limit).cloned().collect()),
            None if state.targets.contains_key(&key) => Ok(Vec::new()),
            None => Err(CrawlError::NotFound {
                url: format!("fake://r/{}", key),
                status: 404,
            }),
        }
    }

    async fn author_profile(&self, author: &str) -> CrawlResult<AuthorProfile> {
        let state = lock(&self.state);
        if state.failing_authors.iter().any(|a| a == author) {
            return Err(Self::author_error(author));
        }
        state
            .profiles
            .get(author)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound {
                url: format!("fake://user/{}", author),
                status: 404,
            })
    }

    async fn author_posts(&self, author: &str, limit: usize) -> CrawlResult<Vec<Post>> {
        let state = lock(&self.state);
        if state.failing_authors.iter().any(|a| a == author) {
            return Err(Self::author_error(author));
        }
        Ok(state
            .author_posts
            .get(author)
            .map(|p| p.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn target_info(&self, target: &str) -> CrawlResult<TargetInfo> {
        let mut state = lock(&self.state);
        let key = target.to_lowercase();
        state.lookups.push(key.clone());
        state
            .targets
            .get(&key)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound {
                url: format!("fake://r/{}", key),
                status: 404,
            })
    }

    async fn target_rules(&self, target: &str) -> CrawlResult<Vec<String>> {
        Ok(lock(&self.state)
            .rules
            .get(&target.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn search_targets(
        &self,
        query: &str,
        include_flagged: bool,
        limit: usize,
    ) -> CrawlResult<Vec<TargetInfo>> {
        let query = query.to_lowercase();
        let state = lock(&self.state);
        let mut found: Vec<TargetInfo> = state
            .targets
            .values()
            .filter(|t| t.name.contains(&query))
            .filter(|t| include_flagged || !t.flagged)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.audience.cmp(&a.audience).then(a.name.cmp(&b.name)));
        found.truncate(limit);
        Ok(found)
    }
}

/// Scripted [`Transport`]. Each call pops the next response; an empty
/// script answers 200 with an empty JSON object.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Result<RawResponse, String>>>,
    calls: Mutex<Vec<(String, u64)>>,
}

impl FakeTransport {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<RawResponse, String>>,
    {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(url, egress generation)` for every request made.
    pub fn calls(&self) -> Vec<(String, u64)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, egress: &EgressIdentity) -> Result<RawResponse, String> {
        lock(&self.calls).push((url.to_string(), egress.generation));
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::new(200, "{}")))
    }
}

/// Scripted [`PageLoader`]. An exhausted script is a browser error.
#[derive(Default)]
pub struct FakePageLoader {
    script: Mutex<VecDeque<CrawlResult<PageLoad>>>,
    loads: Mutex<Vec<(String, NavigationMode)>>,
    closed: Mutex<bool>,
}

impl FakePageLoader {
    pub fn new<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = CrawlResult<PageLoad>>,
    {
        Self {
            script: Mutex::new(pages.into_iter().collect()),
            ..Default::default()
        }
    }

    /// A 200 page with `html`.
    pub fn page(html: &str) -> CrawlResult<PageLoad> {
        Ok(PageLoad {
            status: 200,
            html: html.to_string(),
            final_url: "fake://page".to_string(),
        })
    }

    pub fn status(status: u16, html: &str) -> CrawlResult<PageLoad> {
        Ok(PageLoad {
            status,
            html: html.to_string(),
            final_url: "fake://page".to_string(),
        })
    }

    pub fn loads(&self) -> Vec<(String, NavigationMode)> {
        lock(&self.loads).clone()
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

#[async_trait]
impl PageLoader for FakePageLoader {
    async fn load(&self, url: &str, mode: NavigationMode) -> CrawlResult<PageLoad> {
        lock(&self.loads).push((url.to_string(), mode));
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(CrawlError::Browser("no scripted page left".to_string())))
    }

    async fn close(&self) {
        *lock(&self.closed) = true;
    }
}
