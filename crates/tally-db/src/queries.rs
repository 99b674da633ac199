use crate::models::{CommentRow, NewPost, PostRow, UserRow};
use crate::{Database, StoreError, counters, ledger};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tally_types::api::{CleanupReport, TableStats};
use tally_types::{EntityKind, EntityRef, VoteTransition};
use tracing::{debug, info};

/// Posts younger than this are never pruned by [`Database::cleanup_old_posts`].
pub const MIN_CLEANUP_DAYS: u32 = 30;

const POST_COLUMNS: &str = "id, title, content, category, author_id, author_name, author_email,
     upvotes, downvotes, comment_count, created_at, updated_at";

const COMMENT_COLUMNS: &str =
    "id, post_id, author_id, content, upvotes, downvotes, created_at, updated_at";

/// What [`Database::delete_user`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPurge {
    pub posts: usize,
    pub comments: usize,
    pub votes: usize,
}

impl Database {
    // -- Users --

    /// Insert a user, or refresh name/picture/last_login if the id exists.
    pub fn upsert_user(&self, id: &str, email: &str, name: &str, picture: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, picture) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                     name = excluded.name,
                     picture = excluded.picture,
                     last_login = datetime('now')",
                rusqlite::params![id, email, name, picture],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, name, picture, created_at, last_login FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            name: row.get(2)?,
                            picture: row.get(3)?,
                            created_at: row.get(4)?,
                            last_login: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })?)
    }

    /// Remove a user and everything that hangs off them.
    ///
    /// The user's posts and comments go with their votes. Votes the user cast
    /// on other people's entities are retracted, so those counters drop.
    pub fn delete_user(&self, id: &str) -> Result<UserPurge> {
        let purge = self.with_tx(|tx| {
            let mut purge = UserPurge::default();

            for post_id in ids_where(tx, "SELECT id FROM posts WHERE author_id = ?1", id)? {
                purge_post(tx, post_id)?;
                purge.posts += 1;
            }

            for comment_id in ids_where(tx, "SELECT id FROM comments WHERE author_id = ?1", id)? {
                purge_comment(tx, comment_id)?;
                purge.comments += 1;
            }

            for vote in ledger::votes_by_user(tx, id)? {
                if let Some(removed) = ledger::remove(tx, id, vote.entity)? {
                    let (up, down) = VoteTransition::Retracted { vote_type: removed }.deltas();
                    counters::apply_delta(tx, vote.entity, up, down)?;
                    purge.votes += 1;
                }
            }

            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(purge)
        })?;

        info!(
            "Deleted user {} ({} posts, {} comments, {} votes retracted)",
            id, purge.posts, purge.comments, purge.votes
        );
        Ok(purge)
    }

    // -- Posts --

    /// Create a post with zeroed counters, returning its id.
    pub fn create_post(&self, post: &NewPost<'_>) -> Result<i64> {
        let id = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (title, content, category, author_id, author_name, author_email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    post.title,
                    post.content,
                    post.category,
                    post.author_id,
                    post.author_name,
                    post.author_email
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!("Created post {} by {}", id, post.author_name);
        Ok(id)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        Ok(self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
            Ok(conn.query_row(&sql, [id], map_post).optional()?)
        })?)
    }

    /// Newest first.
    pub fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        Ok(self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                POST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?)
    }

    /// Delete a post together with its comments and every vote on either.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let existed = self.with_tx(|tx| purge_post(tx, id))?;
        if existed {
            info!("Deleted post {}", id);
        }
        Ok(existed)
    }

    /// Prune posts older than `days_old` days. With `dry_run` only counts.
    pub fn cleanup_old_posts(&self, days_old: u32, dry_run: bool) -> Result<CleanupReport> {
        if days_old < MIN_CLEANUP_DAYS {
            return Err(StoreError::InvalidInput(format!(
                "days_old must be at least {} to prevent accidental deletion",
                MIN_CLEANUP_DAYS
            ))
            .into());
        }

        let cutoff = format!("-{} days", days_old);
        let report = self.with_tx(|tx| {
            let ids = ids_where(
                tx,
                "SELECT id FROM posts WHERE created_at < datetime('now', ?1)",
                &cutoff,
            )?;

            let mut deleted = 0;
            if !dry_run {
                for id in &ids {
                    if purge_post(tx, *id)? {
                        deleted += 1;
                    }
                }
            }

            Ok(CleanupReport { days_old, dry_run, matched: ids.len(), deleted })
        })?;

        info!(
            "Cleanup: {} posts older than {} days matched, {} deleted{}",
            report.matched,
            days_old,
            report.deleted,
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }

    // -- Comments --

    /// Create a comment on `post_id` and bump the post's comment_count.
    pub fn create_comment(&self, post_id: i64, author_id: &str, content: &str) -> Result<i64> {
        let id = self.with_tx(|tx| {
            let bumped = tx.execute(
                "UPDATE posts SET comment_count = comment_count + 1, updated_at = datetime('now')
                 WHERE id = ?1",
                [post_id],
            )?;
            if bumped == 0 {
                return Err(StoreError::EntityMissing(EntityRef::post(post_id)));
            }

            tx.execute(
                "INSERT INTO comments (post_id, author_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![post_id, author_id, content],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        debug!("Created comment {} on post {}", id, post_id);
        Ok(id)
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        Ok(self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS);
            Ok(conn.query_row(&sql, [id], map_comment).optional()?)
        })?)
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        let existed = self.with_tx(|tx| purge_comment(tx, id))?;
        if existed {
            info!("Deleted comment {}", id);
        }
        Ok(existed)
    }

    // -- Existence / stats --

    pub fn entity_exists(&self, entity: EntityRef) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", entity.kind.table());
            Ok(conn.query_row(&sql, [entity.id], |row| row.get(0))?)
        })
    }

    pub fn stats(&self) -> Result<TableStats> {
        Ok(self.with_conn(|conn| {
            let count = |table: &str| -> Result<i64, StoreError> {
                let sql = format!("SELECT COUNT(*) FROM {}", table);
                Ok(conn.query_row(&sql, [], |row| row.get(0))?)
            };

            Ok(TableStats {
                users: count("users")?,
                posts: count("posts")?,
                comments: count("comments")?,
                votes: count("votes")?,
            })
        })?)
    }
}

/// Cascade for one post: votes on its comments, the comments, votes on the
/// post, then the post. Counters are not adjusted since their rows go too.
fn purge_post(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    for comment_id in ids_where(conn, "SELECT id FROM comments WHERE post_id = ?1", &id)? {
        ledger::purge_entity(conn, EntityRef::comment(comment_id))?;
    }
    conn.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;

    let votes = ledger::purge_entity(conn, EntityRef::post(id))?;
    let n = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;

    debug!("Purged post {} ({} votes)", id, votes);
    Ok(n > 0)
}

fn purge_comment(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    let post_id: Option<i64> = conn
        .query_row("SELECT post_id FROM comments WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;

    let Some(post_id) = post_id else {
        return Ok(false);
    };

    ledger::purge_entity(conn, EntityRef::new(EntityKind::Comment, id))?;
    conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
    conn.execute(
        "UPDATE posts SET comment_count = MAX(comment_count - 1, 0) WHERE id = ?1",
        [post_id],
    )?;
    Ok(true)
}

fn ids_where<P: rusqlite::ToSql + ?Sized>(
    conn: &Connection,
    sql: &str,
    param: &P,
) -> Result<Vec<i64>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([param], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        author_id: row.get(4)?,
        author_name: row.get(5)?,
        author_email: row.get(6)?,
        upvotes: row.get(7)?,
        downvotes: row.get(8)?,
        comment_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        upvotes: row.get(4)?,
        downvotes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
