use std::sync::Arc;

use tally_db::{Database, StoreError};
use tally_types::EntityRef;

/// Answers whether a post or comment exists.
///
/// Owned by whatever manages posts and comments; the vote service asks it
/// before accepting a vote.
pub trait EntityDirectory: Send + Sync {
    fn exists(&self, entity: EntityRef) -> Result<bool, StoreError>;
}

impl EntityDirectory for Database {
    fn exists(&self, entity: EntityRef) -> Result<bool, StoreError> {
        self.entity_exists(entity)
    }
}

impl<T: EntityDirectory + ?Sized> EntityDirectory for Arc<T> {
    fn exists(&self, entity: EntityRef) -> Result<bool, StoreError> {
        (**self).exists(entity)
    }
}
