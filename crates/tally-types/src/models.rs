use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::VoteTransition;

/// Which table a votable entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Comment,
}

impl EntityKind {
    /// Value stored in `votes.entity_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
        }
    }

    /// Table carrying the `upvotes`/`downvotes` counters for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Post => "posts",
            EntityKind::Comment => "comments",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(EntityKind::Post),
            "comment" => Ok(EntityKind::Comment),
            other => Err(ParseError::EntityKind(other.to_string())),
        }
    }
}

/// A votable target: a post or a comment, by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn post(id: i64) -> Self {
        Self::new(EntityKind::Post, id)
    }

    pub fn comment(id: i64) -> Self {
        Self::new(EntityKind::Comment, id)
    }

    /// Row ids are assigned by SQLite AUTOINCREMENT and start at 1.
    pub fn is_valid(&self) -> bool {
        self.id > 0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }

    /// Numeric form used by clients that send `1` / `-1`.
    pub fn from_i8(value: i8) -> Result<Self, ParseError> {
        match value {
            1 => Ok(VoteType::Upvote),
            -1 => Ok(VoteType::Downvote),
            other => Err(ParseError::VoteType(other.to_string())),
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upvote" | "up" => Ok(VoteType::Upvote),
            "downvote" | "down" => Ok(VoteType::Downvote),
            _ => Err(ParseError::VoteType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown vote type: {0:?}")]
    VoteType(String),

    #[error("unknown entity kind: {0:?}")]
    EntityKind(String),
}

/// One user's current stance on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: String,
    pub entity: EntityRef,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

/// Denormalized counters stored on a post or comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteCounts {
    pub fn new(upvotes: i64, downvotes: i64) -> Self {
        Self { upvotes, downvotes }
    }

    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// Outcome of a cast or retract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResult {
    pub entity: EntityRef,
    pub previous: Option<VoteType>,
    pub current: Option<VoteType>,
    pub transition: VoteTransition,
    pub counts: VoteCounts,
}

impl VoteResult {
    pub fn changed(&self) -> bool {
        self.transition != VoteTransition::Unchanged
    }
}
