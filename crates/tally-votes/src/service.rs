use std::sync::Arc;

use rusqlite::Connection;
use tally_db::{Database, StoreError, counters, ledger};
use tally_types::api::{CastVoteRequest, DriftReport, VoteResponse};
use tally_types::{EntityRef, Vote, VoteCounts, VoteResult, VoteTransition, VoteType};
use tracing::{debug, warn};

use crate::directory::EntityDirectory;
use crate::error::VoteError;

/// Public entry point for voting.
///
/// Owns every write to the `votes` table and to the `upvotes`/`downvotes`
/// counters. Each cast or retract runs as one transaction: the ledger row
/// and the counter delta commit together or not at all.
pub struct VoteService<D = Arc<Database>> {
    db: Arc<Database>,
    directory: D,
}

impl VoteService<Arc<Database>> {
    /// Service whose existence checks read the same database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { directory: db.clone(), db }
    }
}

impl<D: EntityDirectory> VoteService<D> {
    pub fn with_directory(db: Arc<Database>, directory: D) -> Self {
        Self { db, directory }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn cast_vote(
        &self,
        user_id: &str,
        entity: EntityRef,
        vote_type: VoteType,
    ) -> Result<VoteResult, VoteError> {
        validate(user_id, entity)?;

        if !self.directory.exists(entity)? {
            return Err(VoteError::EntityNotFound(entity));
        }

        let result = self.db.with_tx(|tx| {
            let (previous, current) = ledger::upsert(tx, user_id, entity, vote_type)?;
            let transition = VoteTransition::between(previous, Some(current));

            let counts = match transition {
                VoteTransition::Unchanged => {
                    counters::get(tx, entity)?.ok_or(StoreError::EntityMissing(entity))?
                }
                _ => apply_transition(tx, entity, transition)?,
            };

            Ok(VoteResult { entity, previous, current: Some(current), transition, counts })
        })?;

        debug!(user_id, %entity, transition = ?result.transition, "cast vote");
        Ok(result)
    }

    /// Cast from a raw request body; an unknown `vote_type` is invalid input.
    pub fn cast_vote_request(
        &self,
        user_id: &str,
        entity: EntityRef,
        req: &CastVoteRequest,
    ) -> Result<VoteResponse, VoteError> {
        let vote_type: VoteType = req.vote_type.parse()?;
        let result = self.cast_vote(user_id, entity, vote_type)?;
        Ok(VoteResponse::from(&result))
    }

    /// Remove the user's vote. Retracting a vote that does not exist is a
    /// no-op, not an error.
    pub fn retract_vote(&self, user_id: &str, entity: EntityRef) -> Result<VoteResult, VoteError> {
        validate(user_id, entity)?;

        let result = self.db.with_tx(|tx| {
            let removed = ledger::remove(tx, user_id, entity)?;
            let transition = VoteTransition::between(removed, None);

            let counts = match removed {
                Some(_) => apply_transition(tx, entity, transition)?,
                None => counters::get(tx, entity)?.ok_or(StoreError::EntityMissing(entity))?,
            };

            Ok(VoteResult { entity, previous: removed, current: None, transition, counts })
        })?;

        debug!(user_id, %entity, transition = ?result.transition, "retract vote");
        Ok(result)
    }

    pub fn get_vote_state(&self, user_id: &str, entity: EntityRef) -> Result<Option<VoteType>, VoteError> {
        Ok(self.get_vote(user_id, entity)?.map(|v| v.vote_type))
    }

    pub fn get_vote(&self, user_id: &str, entity: EntityRef) -> Result<Option<Vote>, VoteError> {
        validate(user_id, entity)?;
        Ok(self.db.with_conn(|conn| ledger::get(conn, user_id, entity))?)
    }

    /// Stored counters. Matches [`VoteService::recompute`] outside of an
    /// in-flight write.
    pub fn get_counts(&self, entity: EntityRef) -> Result<VoteCounts, VoteError> {
        let counts = self.db.with_conn(|conn| counters::get(conn, entity))?;
        counts.ok_or(VoteError::EntityNotFound(entity))
    }

    /// Counters plus the caller's own vote, for rendering.
    pub fn vote_summary(&self, user_id: &str, entity: EntityRef) -> Result<VoteResponse, VoteError> {
        let user_vote = self.get_vote_state(user_id, entity)?;
        let counts = self.get_counts(entity)?;
        Ok(VoteResponse::new(entity, user_vote, counts))
    }

    /// Full recount from the ledger; does not modify stored counters.
    pub fn recompute(&self, entity: EntityRef) -> Result<VoteCounts, VoteError> {
        Ok(self.db.with_conn(|conn| counters::recompute(conn, entity))?)
    }

    pub fn reconcile(&self, entity: EntityRef) -> Result<Option<DriftReport>, VoteError> {
        Ok(self.db.with_tx(|tx| counters::reconcile(tx, entity))?)
    }

    pub fn reconcile_all(&self) -> Result<Vec<DriftReport>, VoteError> {
        let reports = self.db.with_tx(|tx| counters::reconcile_all(tx))?;
        if !reports.is_empty() {
            warn!("Reconciliation repaired {} drifted entities", reports.len());
        }
        Ok(reports)
    }

    pub fn votes_for_entity(&self, entity: EntityRef) -> Result<Vec<Vote>, VoteError> {
        Ok(self.db.with_conn(|conn| ledger::votes_for_entity(conn, entity))?)
    }

    pub fn votes_by_user(&self, user_id: &str) -> Result<Vec<Vote>, VoteError> {
        Ok(self.db.with_conn(|conn| ledger::votes_by_user(conn, user_id))?)
    }
}

/// Apply the counter delta for `transition`; on drift, repair from the ledger
/// in the same transaction.
fn apply_transition(
    conn: &Connection,
    entity: EntityRef,
    transition: VoteTransition,
) -> Result<VoteCounts, StoreError> {
    let (up, down) = transition.deltas();
    let update = counters::apply_delta(conn, entity, up, down)?;

    if !update.clamped {
        return Ok(update.counts);
    }

    match counters::reconcile(conn, entity)? {
        Some(report) => Ok(report.recomputed),
        None => Ok(update.counts),
    }
}

fn validate(user_id: &str, entity: EntityRef) -> Result<(), VoteError> {
    if user_id.trim().is_empty() {
        return Err(VoteError::InvalidInput("user_id must not be empty".into()));
    }
    if !entity.is_valid() {
        return Err(VoteError::InvalidInput(format!("invalid entity id {}", entity)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tally_db::models::NewPost;

    fn setup() -> (VoteService, EntityRef) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_user("author", "author@example.com", "Author", None).unwrap();
        let id = db
            .create_post(&NewPost {
                title: "t",
                content: "c",
                category: "general",
                author_id: "author",
                author_name: "Author",
                author_email: "author@example.com",
            })
            .unwrap();
        (VoteService::new(db), EntityRef::post(id))
    }

    /// Directory that records which entities it was asked about.
    struct FixedDirectory {
        known: HashSet<EntityRef>,
        asked: Mutex<Vec<EntityRef>>,
    }

    impl EntityDirectory for FixedDirectory {
        fn exists(&self, entity: EntityRef) -> Result<bool, StoreError> {
            self.asked.lock().unwrap().push(entity);
            Ok(self.known.contains(&entity))
        }
    }

    #[test]
    fn unknown_entity_rejected_before_write() {
        let (svc, post) = setup();
        let ghost = EntityRef::comment(77);

        let err = svc.cast_vote("u1", ghost, VoteType::Upvote).unwrap_err();
        assert!(matches!(err, VoteError::EntityNotFound(e) if e == ghost));
        assert!(svc.votes_by_user("u1").unwrap().is_empty());
        assert_eq!(svc.get_counts(post).unwrap(), VoteCounts::default());
    }

    #[test]
    fn invalid_input_rejected() {
        let (svc, post) = setup();
        assert!(matches!(svc.cast_vote("", post, VoteType::Upvote), Err(VoteError::InvalidInput(_))));
        assert!(matches!(
            svc.cast_vote("u1", EntityRef::post(-4), VoteType::Upvote),
            Err(VoteError::InvalidInput(_))
        ));

        let bad = CastVoteRequest { vote_type: "sideways".into() };
        assert!(matches!(svc.cast_vote_request("u1", post, &bad), Err(VoteError::InvalidInput(_))));
        assert_eq!(svc.get_vote_state("u1", post).unwrap(), None);
    }

    #[test]
    fn custom_directory_is_consulted() {
        let (svc, post) = setup();
        let directory = FixedDirectory {
            known: HashSet::from([post]),
            asked: Mutex::new(Vec::new()),
        };
        let svc = VoteService::with_directory(svc.database().clone(), directory);

        svc.cast_vote("u1", post, VoteType::Upvote).unwrap();
        assert!(svc.cast_vote("u1", EntityRef::post(post.id + 1), VoteType::Upvote).is_err());
        assert_eq!(svc.directory.asked.lock().unwrap().len(), 2);
    }

    #[test]
    fn directory_says_yes_but_row_is_gone() {
        let (svc, post) = setup();
        let ghost = EntityRef::post(post.id + 100);
        let directory = FixedDirectory {
            known: HashSet::from([ghost]),
            asked: Mutex::new(Vec::new()),
        };
        let svc = VoteService::with_directory(svc.database().clone(), directory);

        let err = svc.cast_vote("u1", ghost, VoteType::Downvote).unwrap_err();
        assert!(matches!(err, VoteError::EntityNotFound(_)));
        // ledger insert was rolled back with the failed counter update
        assert!(svc.votes_for_entity(ghost).unwrap().is_empty());
    }

    #[test]
    fn drift_is_repaired_on_clamp() {
        let (svc, post) = setup();
        svc.cast_vote("u1", post, VoteType::Upvote).unwrap();
        svc.cast_vote("u2", post, VoteType::Upvote).unwrap();

        // Simulate a counter that lost writes.
        svc.database()
            .with_conn_mut(|conn| {
                conn.execute("UPDATE posts SET upvotes = 0 WHERE id = ?1", [post.id])?;
                Ok(())
            })
            .unwrap();

        let result = svc.retract_vote("u1", post).unwrap();
        assert_eq!(result.counts, VoteCounts::new(1, 0));
        assert_eq!(svc.get_counts(post).unwrap(), svc.recompute(post).unwrap());
    }

    #[test]
    fn summary_includes_own_vote() {
        let (svc, post) = setup();
        svc.cast_vote("u1", post, VoteType::Downvote).unwrap();
        svc.cast_vote("u2", post, VoteType::Upvote).unwrap();
        svc.cast_vote("u3", post, VoteType::Upvote).unwrap();

        let summary = svc.vote_summary("u1", post).unwrap();
        assert_eq!(summary.user_vote, Some(VoteType::Downvote));
        assert_eq!((summary.upvotes, summary.downvotes, summary.score), (2, 1, 1));
    }
}
