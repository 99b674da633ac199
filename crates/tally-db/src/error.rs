use rusqlite::ErrorCode;
use tally_types::EntityRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("{0} does not exist")]
    EntityMissing(EntityRef),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    /// True for lock contention the caller may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}
