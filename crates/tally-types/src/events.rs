use serde::{Deserialize, Serialize};

use crate::models::VoteType;

/// Edge taken in the per-(user, entity) vote state machine.
///
/// States are "no vote", "upvoted" and "downvoted". Every state can reach
/// every other one; casting the vote a user already holds is `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum VoteTransition {
    /// No row was written
    Unchanged,

    /// NoVote -> Upvoted / Downvoted
    Cast { vote_type: VoteType },

    /// Upvoted <-> Downvoted, in one step
    Flipped { from: VoteType, to: VoteType },

    /// Upvoted / Downvoted -> NoVote
    Retracted { vote_type: VoteType },
}

impl VoteTransition {
    pub fn between(previous: Option<VoteType>, current: Option<VoteType>) -> Self {
        match (previous, current) {
            (None, None) => VoteTransition::Unchanged,
            (None, Some(vote_type)) => VoteTransition::Cast { vote_type },
            (Some(vote_type), None) => VoteTransition::Retracted { vote_type },
            (Some(from), Some(to)) if from == to => VoteTransition::Unchanged,
            (Some(from), Some(to)) => VoteTransition::Flipped { from, to },
        }
    }

    /// Signed (upvote, downvote) counter adjustments for this edge.
    pub fn deltas(&self) -> (i64, i64) {
        fn unit(vote_type: VoteType, sign: i64) -> (i64, i64) {
            match vote_type {
                VoteType::Upvote => (sign, 0),
                VoteType::Downvote => (0, sign),
            }
        }

        match *self {
            VoteTransition::Unchanged => (0, 0),
            VoteTransition::Cast { vote_type } => unit(vote_type, 1),
            VoteTransition::Retracted { vote_type } => unit(vote_type, -1),
            VoteTransition::Flipped { from, to } => {
                let (up_out, down_out) = unit(from, -1);
                let (up_in, down_in) = unit(to, 1);
                (up_out + up_in, down_out + down_in)
            }
        }
    }
}
