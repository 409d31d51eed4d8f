//! Database schema shared by the queue and record stores.

use rusqlite::Connection;

use super::Result;

/// Create all tables and indexes if they do not exist.
pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Discovery frontier
        CREATE TABLE IF NOT EXISTS queue_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL COLLATE NOCASE UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            priority_weight INTEGER NOT NULL DEFAULT 0,

            -- Discovery lineage
            discovered_from TEXT,
            discovered_via TEXT,

            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Scraped metrics per target
        CREATE TABLE IF NOT EXISTS target_records (
            target TEXT PRIMARY KEY COLLATE NOCASE,
            display_name TEXT NOT NULL,
            audience INTEGER,
            weekly_visitors INTEGER,
            weekly_contributions INTEGER,
            competition_score REAL,
            description TEXT,
            rules_count INTEGER,
            icon_url TEXT,
            classification TEXT,
            scrape_status TEXT NOT NULL,
            error_message TEXT,
            scraped_at TEXT NOT NULL
        );

        -- Authors seen while expanding the frontier
        CREATE TABLE IF NOT EXISTS authors (
            name TEXT PRIMARY KEY COLLATE NOCASE,
            total_karma INTEGER,
            account_created_utc REAL,
            recent_post_count INTEGER NOT NULL DEFAULT 0,
            posting_frequency REAL,
            external_links TEXT NOT NULL DEFAULT '[]',
            targets TEXT NOT NULL DEFAULT '[]',
            discovered_from TEXT,
            first_seen_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            target TEXT NOT NULL,
            author TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            url TEXT,
            permalink TEXT,
            score INTEGER NOT NULL DEFAULT 0,
            upvote_ratio REAL,
            num_comments INTEGER NOT NULL DEFAULT 0,
            flagged INTEGER NOT NULL DEFAULT 0,
            created_utc REAL NOT NULL,
            saved_at TEXT NOT NULL
        );

        -- Indexes for efficient queries
        CREATE INDEX IF NOT EXISTS idx_queue_claim
            ON queue_entries(status, priority_weight DESC, created_at ASC);
        CREATE INDEX IF NOT EXISTS idx_queue_stale
            ON queue_entries(updated_at) WHERE status = 'processing';
        CREATE INDEX IF NOT EXISTS idx_records_status
            ON target_records(scrape_status);
        CREATE INDEX IF NOT EXISTS idx_posts_author
            ON posts(author);
        CREATE INDEX IF NOT EXISTS idx_posts_target
            ON posts(target);
    "#,
    )?;
    Ok(())
}
