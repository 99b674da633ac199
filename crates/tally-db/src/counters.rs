//! Aggregate counter maintenance for `posts` and `comments`.
//!
//! The `upvotes`/`downvotes` columns are a cache of the ledger. They are only
//! written from here, always inside the transaction that changed the ledger.

use rusqlite::{Connection, OptionalExtension};
use tally_types::api::DriftReport;
use tally_types::{EntityKind, EntityRef, VoteCounts};
use tracing::{info, warn};

use crate::StoreError;

/// Result of [`apply_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    pub counts: VoteCounts,
    /// A counter would have gone negative and was held at zero.
    pub clamped: bool,
}

/// Stored counters, or `None` if the entity row does not exist.
pub fn get(conn: &Connection, entity: EntityRef) -> Result<Option<VoteCounts>, StoreError> {
    let sql = format!("SELECT upvotes, downvotes FROM {} WHERE id = ?1", entity.kind.table());
    let counts = conn
        .query_row(&sql, [entity.id], |row| Ok(VoteCounts::new(row.get(0)?, row.get(1)?)))
        .optional()?;
    Ok(counts)
}

/// Adjust the entity's counters by signed deltas.
///
/// A result below zero means the counters drifted from the ledger; the
/// value is clamped to zero and `clamped` is set so the caller can repair
/// with [`reconcile`].
pub fn apply_delta(
    conn: &Connection,
    entity: EntityRef,
    upvote_delta: i64,
    downvote_delta: i64,
) -> Result<CounterUpdate, StoreError> {
    let current = get(conn, entity)?.ok_or(StoreError::EntityMissing(entity))?;

    let raw_up = current.upvotes + upvote_delta;
    let raw_down = current.downvotes + downvote_delta;
    let clamped = raw_up < 0 || raw_down < 0;

    if clamped {
        warn!(
            entity_type = entity.kind.as_str(),
            entity_id = entity.id,
            upvote_delta,
            downvote_delta,
            upvotes = current.upvotes,
            downvotes = current.downvotes,
            "ConsistencyWarning: counter would go negative, clamping at zero"
        );
    }

    let counts = VoteCounts::new(raw_up.max(0), raw_down.max(0));
    if counts != current {
        write(conn, entity, counts)?;
    }

    Ok(CounterUpdate { counts, clamped })
}

/// Full recount from the ledger.
pub fn recompute(conn: &Connection, entity: EntityRef) -> Result<VoteCounts, StoreError> {
    let counts = conn.query_row(
        "SELECT
             COUNT(CASE WHEN vote_type = 'upvote' THEN 1 END),
             COUNT(CASE WHEN vote_type = 'downvote' THEN 1 END)
         FROM votes
         WHERE entity_type = ?1 AND entity_id = ?2",
        rusqlite::params![entity.kind.as_str(), entity.id],
        |row| Ok(VoteCounts::new(row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

/// Overwrite stored counters with the recount if they differ.
pub fn reconcile(conn: &Connection, entity: EntityRef) -> Result<Option<DriftReport>, StoreError> {
    let stored = get(conn, entity)?.ok_or(StoreError::EntityMissing(entity))?;
    let recomputed = recompute(conn, entity)?;

    if stored == recomputed {
        return Ok(None);
    }

    write(conn, entity, recomputed)?;
    info!(
        "Reconciled {}: stored {}/{} -> {}/{}",
        entity, stored.upvotes, stored.downvotes, recomputed.upvotes, recomputed.downvotes
    );

    Ok(Some(DriftReport { entity, stored, recomputed }))
}

/// Reconcile every post and comment.
pub fn reconcile_all(conn: &Connection) -> Result<Vec<DriftReport>, StoreError> {
    let mut reports = Vec::new();

    for kind in [EntityKind::Post, EntityKind::Comment] {
        let sql = format!("SELECT id FROM {} ORDER BY id", kind.table());
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for id in ids {
            if let Some(report) = reconcile(conn, EntityRef::new(kind, id))? {
                reports.push(report);
            }
        }
    }

    Ok(reports)
}

fn write(conn: &Connection, entity: EntityRef, counts: VoteCounts) -> Result<(), StoreError> {
    let sql = format!(
        "UPDATE {} SET upvotes = ?1, downvotes = ?2 WHERE id = ?3",
        entity.kind.table()
    );
    let n = conn.execute(&sql, rusqlite::params![counts.upvotes, counts.downvotes, entity.id])?;
    if n == 0 {
        return Err(StoreError::EntityMissing(entity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger, migrations};
    use tally_types::VoteType;

    fn conn_with_post() -> (Connection, EntityRef) {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, name) VALUES ('a', 'a@example.com', 'A');
             INSERT INTO posts (title, content, author_id, author_name) VALUES ('t', 'c', 'a', 'A');",
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        (conn, EntityRef::post(id))
    }

    #[test]
    fn delta_adjusts_both_counters() {
        let (conn, post) = conn_with_post();

        let update = apply_delta(&conn, post, 2, 1).unwrap();
        assert_eq!(update.counts, VoteCounts::new(2, 1));
        assert!(!update.clamped);

        let update = apply_delta(&conn, post, -1, 1).unwrap();
        assert_eq!(update.counts, VoteCounts::new(1, 2));
        assert_eq!(get(&conn, post).unwrap(), Some(VoteCounts::new(1, 2)));
    }

    #[test]
    fn negative_result_is_clamped_and_flagged() {
        let (conn, post) = conn_with_post();

        let update = apply_delta(&conn, post, -1, 0).unwrap();
        assert!(update.clamped);
        assert_eq!(update.counts, VoteCounts::new(0, 0));
    }

    #[test]
    fn missing_entity_is_reported() {
        let (conn, _) = conn_with_post();
        let ghost = EntityRef::comment(99);

        assert!(matches!(apply_delta(&conn, ghost, 1, 0), Err(StoreError::EntityMissing(e)) if e == ghost));
        assert_eq!(get(&conn, ghost).unwrap(), None);
    }

    #[test]
    fn reconcile_repairs_drift() {
        let (mut conn, post) = conn_with_post();
        let tx = conn.transaction().unwrap();
        ledger::upsert(&tx, "u1", post, VoteType::Upvote).unwrap();
        ledger::upsert(&tx, "u2", post, VoteType::Downvote).unwrap();
        ledger::upsert(&tx, "u3", post, VoteType::Upvote).unwrap();
        tx.commit().unwrap();

        assert_eq!(recompute(&conn, post).unwrap(), VoteCounts::new(2, 1));

        let report = reconcile(&conn, post).unwrap().unwrap();
        assert_eq!(report.stored, VoteCounts::new(0, 0));
        assert_eq!(report.recomputed, VoteCounts::new(2, 1));
        assert_eq!(get(&conn, post).unwrap(), Some(VoteCounts::new(2, 1)));

        assert!(reconcile(&conn, post).unwrap().is_none());
        assert!(reconcile_all(&conn).unwrap().is_empty());
    }
}
