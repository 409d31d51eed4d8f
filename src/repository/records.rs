//! SQLite-backed record store for scrape results, authors and posts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::queue::row_to_entry;
use super::schema::init_schema;
use super::{connect, format_datetime, with_connection, RecordStore, Result};
use crate::models::{
    normalize_name, AuthorRecord, Post, QueueEntry, RecordStats, ScrapeStatus, ScrapedRecord,
};

/// Record store sharing the queue's database file.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        init_schema(&connect(&store.db_path)?)?;
        Ok(store)
    }
}

fn upsert_record(conn: &Connection, record: &ScrapedRecord) -> Result<()> {
    let classification = record
        .classification
        .as_ref()
        .map(|c| serde_json::to_string(c).unwrap_or_default());

    conn.execute(
        r#"
        INSERT INTO target_records (
            target, display_name, audience, weekly_visitors, weekly_contributions,
            competition_score, description, rules_count, icon_url, classification,
            scrape_status, error_message, scraped_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(target) DO UPDATE SET
            display_name = excluded.display_name,
            audience = COALESCE(excluded.audience, target_records.audience),
            weekly_visitors = excluded.weekly_visitors,
            weekly_contributions = excluded.weekly_contributions,
            competition_score = excluded.competition_score,
            description = COALESCE(excluded.description, target_records.description),
            rules_count = COALESCE(excluded.rules_count, target_records.rules_count),
            icon_url = COALESCE(excluded.icon_url, target_records.icon_url),
            classification = COALESCE(excluded.classification, target_records.classification),
            scrape_status = excluded.scrape_status,
            error_message = excluded.error_message,
            scraped_at = excluded.scraped_at
        "#,
        params![
            normalize_name(&record.target),
            record.display_name,
            record.audience,
            record.weekly_visitors,
            record.weekly_contributions,
            record.competition_score,
            record.description,
            record.rules_count,
            record.icon_url,
            classification,
            record.status.as_str(),
            record.error_message,
            format_datetime(&record.scraped_at),
        ],
    )?;
    Ok(())
}

fn mark_failed(conn: &Connection, target: &str, reason: &str) -> Result<()> {
    let target = normalize_name(target);
    conn.execute(
        r#"
        INSERT INTO target_records (target, display_name, scrape_status, error_message, scraped_at)
        VALUES (?1, ?2, 'failed', ?3, ?4)
        ON CONFLICT(target) DO UPDATE SET
            scrape_status = 'failed',
            error_message = excluded.error_message,
            scraped_at = excluded.scraped_at
        "#,
        params![
            target,
            format!("r/{}", target),
            reason,
            format_datetime(&Utc::now())
        ],
    )?;
    Ok(())
}

fn pending_targets(conn: &Connection, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT q.id, q.name, q.status, q.priority_weight, q.discovered_from,
               q.discovered_via, q.error_message, q.created_at, q.updated_at
        FROM queue_entries q
        LEFT JOIN target_records r ON r.target = q.name
        WHERE q.status = 'completed'
          AND q.priority_weight >= ?1
          AND r.target IS NULL
        ORDER BY q.priority_weight DESC, q.id ASC
        LIMIT ?2
        "#,
    )?;
    let entries = stmt
        .query_map(params![min_priority, limit as i64], row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn decode_set(json: &str) -> BTreeSet<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn encode_set(set: &BTreeSet<String>) -> String {
    serde_json::to_string(set).unwrap_or_else(|_| "[]".to_string())
}

/// Insert an author or merge link and target sets into the existing row.
fn upsert_author(conn: &Connection, author: &AuthorRecord) -> Result<()> {
    let now = format_datetime(&Utc::now());
    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<()> = (|| {
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT external_links, targets FROM authors WHERE name = ?1",
                params![author.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (mut links, mut targets) = existing
            .map(|(l, t)| (decode_set(&l), decode_set(&t)))
            .unwrap_or_default();
        links.extend(author.external_links.iter().cloned());
        targets.extend(author.targets.iter().cloned());

        conn.execute(
            r#"
            INSERT INTO authors (
                name, total_karma, account_created_utc, recent_post_count, posting_frequency,
                external_links, targets, discovered_from, first_seen_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(name) DO UPDATE SET
                total_karma = COALESCE(excluded.total_karma, authors.total_karma),
                account_created_utc = COALESCE(excluded.account_created_utc, authors.account_created_utc),
                recent_post_count = excluded.recent_post_count,
                posting_frequency = COALESCE(excluded.posting_frequency, authors.posting_frequency),
                external_links = excluded.external_links,
                targets = excluded.targets,
                updated_at = excluded.updated_at
            "#,
            params![
                author.name,
                author.total_karma,
                author.account_created_utc,
                author.recent_post_count as i64,
                author.posting_frequency,
                encode_set(&links),
                encode_set(&targets),
                author.discovered_from,
                now,
            ],
        )?;
        Ok(())
    })();

    if result.is_ok() {
        conn.execute("COMMIT", [])?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }
    result
}

fn save_posts(conn: &mut Connection, posts: &[Post]) -> Result<usize> {
    let now = format_datetime(&Utc::now());
    let tx = conn.transaction()?;
    let mut saved = 0;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT OR IGNORE INTO posts (
                id, target, author, title, body, url, permalink, score,
                upvote_ratio, num_comments, flagged, created_utc, saved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )?;
        for post in posts {
            saved += stmt.execute(params![
                post.id,
                normalize_name(&post.target),
                post.author,
                post.title,
                post.body,
                post.url,
                post.permalink,
                post.score,
                post.upvote_ratio,
                post.num_comments,
                post.flagged as i32,
                post.created_utc,
                now,
            ])?;
        }
    }
    tx.commit()?;
    Ok(saved)
}

fn record_stats(conn: &Connection) -> Result<RecordStats> {
    let mut stats = RecordStats::default();
    {
        let mut stmt =
            conn.prepare("SELECT scrape_status, COUNT(*) FROM target_records GROUP BY scrape_status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.records += count;
            match ScrapeStatus::from_str(&status) {
                Some(ScrapeStatus::Complete) => stats.complete += count,
                Some(ScrapeStatus::Partial) => stats.partial += count,
                Some(ScrapeStatus::Failed) => stats.failed += count,
                None => {}
            }
        }
    }
    stats.authors = conn.query_row("SELECT COUNT(*) FROM authors", [], |row| {
        row.get::<_, i64>(0)
    })? as u64;
    stats.posts =
        conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get::<_, i64>(0))? as u64;
    Ok(stats)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert_record(&self, record: &ScrapedRecord) -> Result<()> {
        let record = record.clone();
        with_connection(&self.db_path, move |conn| upsert_record(conn, &record)).await
    }

    async fn mark_failed(&self, target: &str, reason: &str) -> Result<()> {
        let (target, reason) = (target.to_string(), reason.to_string());
        with_connection(&self.db_path, move |conn| mark_failed(conn, &target, &reason)).await
    }

    async fn pending_targets(&self, limit: usize, min_priority: i64) -> Result<Vec<QueueEntry>> {
        with_connection(&self.db_path, move |conn| {
            pending_targets(conn, limit, min_priority)
        })
        .await
    }

    async fn upsert_author(&self, author: &AuthorRecord) -> Result<()> {
        let author = author.clone();
        with_connection(&self.db_path, move |conn| upsert_author(conn, &author)).await
    }

    async fn save_posts(&self, posts: &[Post]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        let posts = posts.to_vec();
        with_connection(&self.db_path, move |conn| save_posts(conn, &posts)).await
    }

    async fn record_stats(&self) -> Result<RecordStats> {
        with_connection(&self.db_path, |conn| record_stats(conn)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewQueueEntry;
    use crate::repository::{QueueStore, SqliteQueueStore};
    use tempfile::TempDir;

    fn stores() -> (TempDir, SqliteQueueStore, SqliteRecordStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontier.db");
        let queue = SqliteQueueStore::new(&path).unwrap();
        let records = SqliteRecordStore::new(&path).unwrap();
        (dir, queue, records)
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            target: "alpha".to_string(),
            author: "u1".to_string(),
            title: "hello".to_string(),
            body: String::new(),
            url: None,
            permalink: None,
            score: 1,
            upvote_ratio: None,
            num_comments: 0,
            flagged: false,
            created_utc: 1_700_000_000.0,
        }
    }

    #[tokio::test]
    async fn test_pending_targets_excludes_scraped() {
        let (_dir, queue, records) = stores();
        for (name, weight) in [("big", 9000), ("small", 100), ("done", 8000)] {
            queue.enqueue(NewQueueEntry::seed(name, weight)).await.unwrap();
            let entry = queue.claim_target(name).await.unwrap().unwrap();
            queue.complete(entry.id).await.unwrap();
        }
        records.mark_failed("done", "blocked").await.unwrap();

        let pending = records.pending_targets(10, 5000).await.unwrap();
        let names: Vec<_> = pending.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["big"]);
    }

    #[tokio::test]
    async fn test_upsert_record_keeps_known_fields() {
        let (_dir, _queue, records) = stores();
        let mut record = ScrapedRecord::new("alpha");
        record.audience = Some(1000);
        record.set_description("first");
        records.upsert_record(&record).await.unwrap();

        let mut second = ScrapedRecord::new("alpha");
        second.weekly_visitors = Some(50);
        records.upsert_record(&second).await.unwrap();

        let stats = records.record_stats().await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.partial, 1);
    }

    #[tokio::test]
    async fn test_save_posts_ignores_duplicates() {
        let (_dir, _queue, records) = stores();
        assert_eq!(records.save_posts(&[post("p1"), post("p2")]).await.unwrap(), 2);
        assert_eq!(records.save_posts(&[post("p2"), post("p3")]).await.unwrap(), 1);
        assert_eq!(records.record_stats().await.unwrap().posts, 3);
    }

    #[tokio::test]
    async fn test_upsert_author_merges_sets() {
        let (_dir, _queue, records) = stores();
        let mut author = AuthorRecord {
            name: "u1".to_string(),
            ..Default::default()
        };
        author.targets.insert("alpha".to_string());
        records.upsert_author(&author).await.unwrap();

        author.targets.clear();
        author.targets.insert("beta".to_string());
        author.external_links.insert("https://example.com".to_string());
        records.upsert_author(&author).await.unwrap();

        let conn = connect(&_dir.path().join("frontier.db")).unwrap();
        let targets: String = conn
            .query_row("SELECT targets FROM authors WHERE name = 'u1'", [], |r| r.get(0))
            .unwrap();
        let merged = decode_set(&targets);
        assert!(merged.contains("alpha") && merged.contains("beta"));
        assert_eq!(records.record_stats().await.unwrap().authors, 1);
    }
}
