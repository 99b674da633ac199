use tally_db::StoreError;
use tally_types::{EntityRef, ParseError};
use thiserror::Error;

/// Errors reported to callers of the vote service.
///
/// `InvalidInput` and `EntityNotFound` are rejected before any write and
/// should not be retried. `Storage` carries the underlying failure as-is;
/// check [`VoteError::is_transient`] before retrying it.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityRef),

    #[error(transparent)]
    Storage(StoreError),
}

impl VoteError {
    pub fn is_transient(&self) -> bool {
        match self {
            VoteError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for VoteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntityMissing(entity) => VoteError::EntityNotFound(entity),
            StoreError::InvalidInput(msg) => VoteError::InvalidInput(msg),
            other => VoteError::Storage(other),
        }
    }
}

impl From<ParseError> for VoteError {
    fn from(err: ParseError) -> Self {
        VoteError::InvalidInput(err.to_string())
    }
}
