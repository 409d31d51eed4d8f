//! Author activity analysis: grouping, dedupe, links and posting cadence.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{AuthorProfile, AuthorRecord, Post};

/// Authors that stand for removed content or platform automation.
pub const SENTINEL_AUTHORS: &[&str] = &["[deleted]", "[removed]", "AutoModerator"];

/// Links into these domains are the platform itself, not external presence.
pub const PLATFORM_DOMAINS: &[&str] = &[
    "reddit.com",
    "redd.it",
    "redditmedia.com",
    "redditstatic.com",
    "reddituploads.com",
];

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\)\]]+"#).expect("valid regex"));

const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn is_sentinel_author(name: &str) -> bool {
    name.trim().is_empty()
        || SENTINEL_AUTHORS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name.trim()))
}

fn is_platform_link(link: &str) -> bool {
    let host = match url::Url::parse(link) {
        Ok(u) => match u.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return true,
        },
        Err(_) => return true,
    };
    PLATFORM_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
}

/// External links in free text, in first-seen order, without duplicates.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']))
        .filter(|link| !is_platform_link(link))
        .filter(|link| seen.insert(link.to_string()))
        .map(|link| link.to_string())
        .collect()
}

/// External links across a post's title, body and link URL.
pub fn post_links(post: &Post) -> Vec<String> {
    let mut text = format!("{} {}", post.title, post.body);
    if let Some(url) = &post.url {
        text.push(' ');
        text.push_str(url);
    }
    extract_links(&text)
}

/// Posts grouped by author, sentinel authors excluded.
pub fn group_by_author(posts: &[Post]) -> BTreeMap<String, Vec<Post>> {
    let mut grouped: BTreeMap<String, Vec<Post>> = BTreeMap::new();
    for post in posts.iter().filter(|p| !is_sentinel_author(&p.author)) {
        grouped.entry(post.author.clone()).or_default().push(post.clone());
    }
    grouped
}

/// Keep the first occurrence of every post id.
pub fn dedupe_posts(posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Posts per day over the span the posts cover (at least one day).
pub fn posting_frequency(posts: &[Post]) -> Option<f64> {
    let times: Vec<f64> = posts
        .iter()
        .map(|p| p.created_utc)
        .filter(|t| *t > 0.0)
        .collect();
    if times.is_empty() {
        return None;
    }
    let oldest = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let newest = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span_days = ((newest - oldest) / SECONDS_PER_DAY).max(1.0);
    Some(((times.len() as f64 / span_days) * 100.0).round() / 100.0)
}

/// Targets an author has posted in.
pub fn targets_of(posts: &[Post]) -> BTreeSet<String> {
    posts
        .iter()
        .map(|p| p.target.clone())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Summarize an author's observed activity.
pub fn build_author_record(
    name: &str,
    profile: Option<&AuthorProfile>,
    posts: &[Post],
    discovered_from: &str,
) -> AuthorRecord {
    let mut external_links: BTreeSet<String> = posts.iter().flat_map(post_links).collect();
    if let Some(bio) = profile.and_then(|p| p.bio.as_deref()) {
        external_links.extend(extract_links(bio));
    }

    AuthorRecord {
        name: name.to_string(),
        total_karma: profile.map(|p| p.total_karma),
        account_created_utc: profile.and_then(|p| p.created_utc),
        recent_post_count: posts.len(),
        posting_frequency: posting_frequency(posts),
        external_links,
        targets: targets_of(posts),
        discovered_from: Some(discovered_from.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, target: &str, author: &str, created: f64) -> Post {
        Post {
            id: id.to_string(),
            target: target.to_string(),
            author: author.to_string(),
            title: String::new(),
            body: String::new(),
            url: None,
            permalink: None,
            score: 0,
            upvote_ratio: None,
            num_comments: 0,
            flagged: true,
            created_utc: created,
        }
    }

    #[test]
    fn test_sentinels_are_case_insensitive() {
        assert!(is_sentinel_author("[deleted]"));
        assert!(is_sentinel_author("automoderator"));
        assert!(is_sentinel_author(""));
        assert!(!is_sentinel_author("u1"));
    }

    #[test]
    fn test_group_by_author_skips_sentinels() {
        let posts = vec![
            post("1", "a", "u1", 1.0),
            post("2", "a", "[removed]", 2.0),
            post("3", "a", "u1", 3.0),
            post("4", "a", "u2", 4.0),
        ];
        let grouped = group_by_author(&posts);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["u1"].len(), 2);
    }

    #[test]
    fn test_extract_links_excludes_platform() {
        let links = extract_links(
            "find me at https://example.net/me. also https://www.reddit.com/r/x and https://example.net/me",
        );
        assert_eq!(links, vec!["https://example.net/me".to_string()]);
    }

    #[test]
    fn test_posting_frequency_uses_span_floor_of_one_day() {
        let burst = vec![post("1", "a", "u", 1000.0), post("2", "a", "u", 2000.0)];
        assert_eq!(posting_frequency(&burst), Some(2.0));

        let spread = vec![
            post("1", "a", "u", 0.5),
            post("2", "a", "u", 0.5 + 4.0 * SECONDS_PER_DAY),
        ];
        assert_eq!(posting_frequency(&spread), Some(0.5));
        assert_eq!(posting_frequency(&[]), None);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let posts = dedupe_posts(vec![
            post("1", "a", "u", 1.0),
            post("1", "b", "u", 1.0),
            post("2", "c", "u", 1.0),
        ]);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].target, "a");
    }

    #[test]
    fn test_build_author_record() {
        let mut p = post("1", "gamma", "u1", 10.0);
        p.body = "shop: https://shop.example.com/u1".to_string();
        let profile = AuthorProfile {
            name: "u1".to_string(),
            total_karma: 1234,
            created_utc: Some(5.0),
            icon_url: None,
            bio: Some("links https://links.example.org/u1".to_string()),
        };
        let record = build_author_record("u1", Some(&profile), &[p, post("2", "delta", "u1", 20.0)], "alpha");
        assert_eq!(record.total_karma, Some(1234));
        assert_eq!(record.recent_post_count, 2);
        assert_eq!(record.external_links.len(), 2);
        assert!(record.targets.contains("gamma") && record.targets.contains("delta"));
        assert_eq!(record.discovered_from.as_deref(), Some("alpha"));
    }
}
