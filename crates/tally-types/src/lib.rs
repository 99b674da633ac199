pub mod api;
pub mod events;
pub mod models;

pub use events::VoteTransition;
pub use models::{EntityKind, EntityRef, ParseError, Vote, VoteCounts, VoteResult, VoteType};
