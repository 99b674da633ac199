use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, posts, comments, votes)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                picture     TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                last_login  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE posts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                content         TEXT NOT NULL,
                category        TEXT NOT NULL DEFAULT 'general',
                author_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                author_name     TEXT NOT NULL,
                author_email    TEXT NOT NULL DEFAULT '',
                upvotes         INTEGER NOT NULL DEFAULT 0,
                downvotes       INTEGER NOT NULL DEFAULT 0,
                comment_count   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (upvotes >= 0 AND downvotes >= 0)
            );

            CREATE INDEX idx_posts_created ON posts(created_at);

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                upvotes     INTEGER NOT NULL DEFAULT 0,
                downvotes   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (upvotes >= 0 AND downvotes >= 0)
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            -- user_id is an opaque identity owned by the caller; no FK.
            CREATE TABLE votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                entity_type TEXT NOT NULL CHECK (entity_type IN ('post', 'comment')),
                entity_id   INTEGER NOT NULL,
                vote_type   TEXT NOT NULL CHECK (vote_type IN ('upvote', 'downvote')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, entity_type, entity_id)
            );

            CREATE INDEX idx_votes_entity ON votes(entity_type, entity_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
