//! Durable message queue rows: the `queue_messages` table.
//!
//! A claimed message stays in the table, hidden until its visibility
//! deadline passes. Deleting it is the acknowledgement.

use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub id: i64,
    pub queue: String,
    pub payload: String,
    pub enqueued_at: String,
    pub visible_at: i64,
    pub deliveries: i64,
}

impl QueueRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            queue: row.get("queue")?,
            payload: row.get("payload")?,
            enqueued_at: row.get("enqueued_at")?,
            visible_at: row.get("visible_at")?,
            deliveries: row.get("deliveries")?,
        })
    }
}

/// Appends a message, visible immediately. Returns its id.
pub fn enqueue(
    db: &Database,
    queue: &str,
    payload: &str,
    enqueued_at: &str,
    now_ms: i64,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue_messages (queue, payload, enqueued_at, visible_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![queue, payload, enqueued_at, now_ms],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Claims the oldest visible message of `queue`, hiding it for
/// `visibility_ms`. The read and the hide happen in one write transaction
/// so two processes never claim the same delivery.
pub fn claim_next(
    db: &Database,
    queue: &str,
    now_ms: i64,
    visibility_ms: i64,
) -> Result<Option<QueueRow>, DatabaseError> {
    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let row = tx
            .query_row(
                "SELECT * FROM queue_messages WHERE queue = ?1 AND visible_at <= ?2
                 ORDER BY visible_at ASC, id ASC LIMIT 1",
                params![queue, now_ms],
                QueueRow::from_row,
            )
            .optional()?;

        let claimed = match row {
            Some(mut row) => {
                row.visible_at = now_ms.saturating_add(visibility_ms);
                row.deliveries += 1;
                tx.execute(
                    "UPDATE queue_messages SET visible_at = ?2, deliveries = ?3 WHERE id = ?1",
                    params![row.id, row.visible_at, row.deliveries],
                )?;
                Some(row)
            }
            None => None,
        };
        tx.commit()?;
        Ok(claimed)
    })
}

/// Removes a message. Returns whether it was still present.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM queue_messages WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Makes a claimed message visible again at `visible_at`.
pub fn release(db: &Database, id: i64, visible_at: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_messages SET visible_at = ?2 WHERE id = ?1",
            params![id, visible_at],
        )?;
        Ok(changed > 0)
    })
}

/// Counts every message of a queue, claimed or not.
pub fn count(db: &Database, queue: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE queue = ?1",
            params![queue],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
