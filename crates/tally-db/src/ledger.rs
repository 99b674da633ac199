//! Vote ledger: the authoritative one-row-per-(user, entity) record.
//!
//! Reads take any connection. Writes take a [`Transaction`] so the ledger
//! change and its counter delta always commit together; open one with
//! [`Database::with_tx`](crate::Database::with_tx).

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tally_types::{EntityRef, Vote, VoteType};

use crate::StoreError;
use crate::models::VoteRow;

const VOTE_COLUMNS: &str = "id, user_id, entity_type, entity_id, vote_type, created_at";

pub fn get(conn: &Connection, user_id: &str, entity: EntityRef) -> Result<Option<Vote>, StoreError> {
    let sql = format!(
        "SELECT {} FROM votes WHERE user_id = ?1 AND entity_type = ?2 AND entity_id = ?3",
        VOTE_COLUMNS
    );

    let row = conn
        .query_row(&sql, rusqlite::params![user_id, entity.kind.as_str(), entity.id], map_vote_row)
        .optional()?;

    row.map(Vote::try_from).transpose()
}

/// Record `vote_type` for the pair, returning `(previous, new)`.
///
/// The write is a single `INSERT .. ON CONFLICT DO UPDATE` keyed on the
/// unique `(user_id, entity_type, entity_id)` index, so two upserts for the
/// same pair can never produce two rows. Re-casting the held type writes
/// nothing. A flip keeps the row's original `created_at`.
pub fn upsert(
    tx: &Transaction<'_>,
    user_id: &str,
    entity: EntityRef,
    vote_type: VoteType,
) -> Result<(Option<VoteType>, VoteType), StoreError> {
    validate(user_id, entity)?;

    let previous = get(tx, user_id, entity)?.map(|v| v.vote_type);
    if previous == Some(vote_type) {
        return Ok((previous, vote_type));
    }

    tx.execute(
        "INSERT INTO votes (user_id, entity_type, entity_id, vote_type)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, entity_type, entity_id)
         DO UPDATE SET vote_type = excluded.vote_type",
        rusqlite::params![user_id, entity.kind.as_str(), entity.id, vote_type.as_str()],
    )?;

    Ok((previous, vote_type))
}

/// Delete the pair's row if present, returning the removed type.
pub fn remove(
    tx: &Transaction<'_>,
    user_id: &str,
    entity: EntityRef,
) -> Result<Option<VoteType>, StoreError> {
    validate(user_id, entity)?;

    let removed: Option<String> = tx
        .query_row(
            "DELETE FROM votes
             WHERE user_id = ?1 AND entity_type = ?2 AND entity_id = ?3
             RETURNING vote_type",
            rusqlite::params![user_id, entity.kind.as_str(), entity.id],
            |row| row.get(0),
        )
        .optional()?;

    removed
        .map(|raw| {
            raw.parse::<VoteType>()
                .map_err(|e| StoreError::CorruptRow(format!("vote on {}: {}", entity, e)))
        })
        .transpose()
}

pub fn votes_for_entity(conn: &Connection, entity: EntityRef) -> Result<Vec<Vote>, StoreError> {
    let sql = format!(
        "SELECT {} FROM votes WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
        VOTE_COLUMNS
    );
    collect_votes(conn, &sql, rusqlite::params![entity.kind.as_str(), entity.id])
}

pub fn votes_by_user(conn: &Connection, user_id: &str) -> Result<Vec<Vote>, StoreError> {
    let sql = format!("SELECT {} FROM votes WHERE user_id = ?1 ORDER BY id", VOTE_COLUMNS);
    collect_votes(conn, &sql, rusqlite::params![user_id])
}

/// Drop every vote on `entity`. Used when the entity itself is deleted, so
/// no counters are touched.
pub fn purge_entity(conn: &Connection, entity: EntityRef) -> Result<usize, StoreError> {
    let n = conn.execute(
        "DELETE FROM votes WHERE entity_type = ?1 AND entity_id = ?2",
        rusqlite::params![entity.kind.as_str(), entity.id],
    )?;
    Ok(n)
}

fn validate(user_id: &str, entity: EntityRef) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("user_id must not be empty".into()));
    }
    if !entity.is_valid() {
        return Err(StoreError::InvalidInput(format!("invalid entity id {}", entity)));
    }
    Ok(())
}

fn collect_votes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Vote>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_vote_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Vote::try_from).collect()
}

fn map_vote_row(row: &Row<'_>) -> rusqlite::Result<VoteRow> {
    Ok(VoteRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        vote_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run(&conn).unwrap();
        conn
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM votes", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn upsert_replaces_instead_of_duplicating() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let post = EntityRef::post(1);

        let (prev, new) = upsert(&tx, "u1", post, VoteType::Upvote).unwrap();
        assert_eq!(prev, None);
        assert_eq!(new, VoteType::Upvote);

        let (prev, new) = upsert(&tx, "u1", post, VoteType::Downvote).unwrap();
        assert_eq!(prev, Some(VoteType::Upvote));
        assert_eq!(new, VoteType::Downvote);

        assert_eq!(row_count(&tx), 1);
        assert_eq!(get(&tx, "u1", post).unwrap().unwrap().vote_type, VoteType::Downvote);
    }

    #[test]
    fn recasting_same_type_reports_it_as_previous() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let post = EntityRef::post(3);

        upsert(&tx, "u1", post, VoteType::Upvote).unwrap();
        let (prev, new) = upsert(&tx, "u1", post, VoteType::Upvote).unwrap();
        assert_eq!(prev, Some(VoteType::Upvote));
        assert_eq!(new, VoteType::Upvote);
        assert_eq!(row_count(&tx), 1);
    }

    #[test]
    fn dropped_transaction_discards_the_write() {
        let mut conn = conn();
        {
            let tx = conn.transaction().unwrap();
            upsert(&tx, "u1", EntityRef::post(4), VoteType::Downvote).unwrap();
        }
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn same_id_different_kind_is_a_different_key() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        upsert(&tx, "u1", EntityRef::post(5), VoteType::Upvote).unwrap();
        upsert(&tx, "u1", EntityRef::comment(5), VoteType::Downvote).unwrap();

        assert_eq!(row_count(&tx), 2);
        assert_eq!(votes_by_user(&tx, "u1").unwrap().len(), 2);
        assert_eq!(votes_for_entity(&tx, EntityRef::comment(5)).unwrap().len(), 1);
    }

    #[test]
    fn remove_reports_what_was_removed() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let post = EntityRef::post(2);

        assert_eq!(remove(&tx, "u1", post).unwrap(), None);

        upsert(&tx, "u1", post, VoteType::Downvote).unwrap();
        assert_eq!(remove(&tx, "u1", post).unwrap(), Some(VoteType::Downvote));
        assert!(get(&tx, "u1", post).unwrap().is_none());
        assert_eq!(row_count(&tx), 0);
    }

    #[test]
    fn rejects_empty_user_and_bad_entity() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        assert!(matches!(
            upsert(&tx, "  ", EntityRef::post(1), VoteType::Upvote),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            upsert(&tx, "u1", EntityRef::post(0), VoteType::Upvote),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(remove(&tx, "", EntityRef::post(1)), Err(StoreError::InvalidInput(_))));
        assert_eq!(row_count(&tx), 0);
    }

    #[test]
    fn purge_entity_leaves_other_entities() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        upsert(&tx, "u1", EntityRef::post(1), VoteType::Upvote).unwrap();
        upsert(&tx, "u2", EntityRef::post(1), VoteType::Upvote).unwrap();
        upsert(&tx, "u1", EntityRef::post(2), VoteType::Upvote).unwrap();

        assert_eq!(purge_entity(&tx, EntityRef::post(1)).unwrap(), 2);
        assert_eq!(row_count(&tx), 1);
    }
}
