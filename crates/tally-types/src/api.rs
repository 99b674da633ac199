use serde::{Deserialize, Serialize};

use crate::models::{EntityRef, VoteCounts, VoteResult, VoteType};

// -- Votes --

/// Body an HTTP layer accepts for a cast. `vote_type` stays a string so
/// malformed values reach the service and come back as invalid input.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastVoteRequest {
    pub vote_type: String,
}

/// What a client sees after voting or when loading an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteResponse {
    pub entity: EntityRef,
    pub user_vote: Option<VoteType>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
}

impl VoteResponse {
    pub fn new(entity: EntityRef, user_vote: Option<VoteType>, counts: VoteCounts) -> Self {
        Self {
            entity,
            user_vote,
            upvotes: counts.upvotes,
            downvotes: counts.downvotes,
            score: counts.score(),
        }
    }
}

impl From<&VoteResult> for VoteResponse {
    fn from(result: &VoteResult) -> Self {
        Self::new(result.entity, result.current, result.counts)
    }
}

// -- Maintenance --

/// One entity whose stored counters disagreed with the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftReport {
    pub entity: EntityRef,
    pub stored: VoteCounts,
    pub recomputed: VoteCounts,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableStats {
    pub users: i64,
    pub posts: i64,
    pub comments: i64,
    pub votes: i64,
}

/// Outcome of an old-post cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub days_old: u32,
    pub dry_run: bool,
    pub matched: usize,
    pub deleted: usize,
}
