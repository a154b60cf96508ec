//! File entry repository: the `file_entries` table.
//!
//! `seq` records insertion order, which is also archive write order.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryRow {
    pub job_id: String,
    pub archive_id: i64,
    pub source: String,
    pub entry_path: String,
    pub size: i64,
    pub state: String,
    pub seq: i64,
}

impl FileEntryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            archive_id: row.get("archive_id")?,
            source: row.get("source")?,
            entry_path: row.get("entry_path")?,
            size: row.get("size")?,
            state: row.get("state")?,
            seq: row.get("seq")?,
        })
    }
}

pub fn insert_with(conn: &Connection, entry: &FileEntryRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO file_entries (job_id, archive_id, source, entry_path, size, state, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.job_id,
            entry.archive_id,
            entry.source,
            entry.entry_path,
            entry.size,
            entry.state,
            entry.seq,
        ],
    )?;
    Ok(())
}

pub fn find(
    db: &Database,
    job_id: &str,
    archive_id: i64,
    source: &str,
) -> Result<Option<FileEntryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM file_entries WHERE job_id = ?1 AND archive_id = ?2 AND source = ?3",
                params![job_id, archive_id, source],
                FileEntryRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Files of one archive in write order.
pub fn list_for_archive(
    db: &Database,
    job_id: &str,
    archive_id: i64,
) -> Result<Vec<FileEntryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM file_entries WHERE job_id = ?1 AND archive_id = ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id, archive_id], FileEntryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Sets the state of a single file entry.
pub fn update_state(
    db: &Database,
    job_id: &str,
    archive_id: i64,
    source: &str,
    state: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE file_entries SET state = ?4 WHERE job_id = ?1 AND archive_id = ?2 AND source = ?3",
            params![job_id, archive_id, source, state],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "file_entries",
                key: format!("{}/{}/{}", job_id, archive_id, source),
            });
        }
        Ok(())
    })
}

/// Sets the state of every file of an archive, returning the number of
/// rows touched.
pub fn update_state_for_archive(
    db: &Database,
    job_id: &str,
    archive_id: i64,
    state: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE file_entries SET state = ?3 WHERE job_id = ?1 AND archive_id = ?2",
            params![job_id, archive_id, state],
        )?;
        Ok(changed)
    })
}
