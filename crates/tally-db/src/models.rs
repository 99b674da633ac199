//! Database row types: these map directly to SQLite rows.
//! Distinct from tally-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tally_types::{EntityKind, EntityRef, Vote, VoteType};

use crate::StoreError;

/// Format SQLite's `datetime('now')` writes.
pub const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub created_at: String,
    pub last_login: String,
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub category: &'a str,
    pub author_id: &'a str,
    pub author_name: &'a str,
    pub author_email: &'a str,
}

pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub content: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct VoteRow {
    pub id: i64,
    pub user_id: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub vote_type: String,
    pub created_at: String,
}

impl TryFrom<VoteRow> for Vote {
    type Error = StoreError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        let kind: EntityKind = row
            .entity_type
            .parse()
            .map_err(|e| StoreError::CorruptRow(format!("vote {}: {}", row.id, e)))?;
        let vote_type: VoteType = row
            .vote_type
            .parse()
            .map_err(|e| StoreError::CorruptRow(format!("vote {}: {}", row.id, e)))?;

        Ok(Vote {
            user_id: row.user_id,
            entity: EntityRef::new(kind, row.entity_id),
            vote_type,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(value, SQLITE_DATETIME)
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::CorruptRow(format!("timestamp {:?}: {}", value, e)))
}
