//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub job_id: String,
    pub user_name: String,
    pub format: String,
    pub max_archive_size: i64,
    pub num_files: i64,
    pub total_size: i64,
    pub num_archives: i64,
    pub state: String,
    pub submitted_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            user_name: row.get("user_name")?,
            format: row.get("format")?,
            max_archive_size: row.get("max_archive_size")?,
            num_files: row.get("num_files")?,
            total_size: row.get("total_size")?,
            num_archives: row.get("num_archives")?,
            state: row.get("state")?,
            submitted_at: row.get("submitted_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a new job row on an already-locked connection.
pub fn insert_with(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (job_id, user_name, format, max_archive_size, num_files, total_size,
         num_archives, state, submitted_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            job.job_id,
            job.user_name,
            job.format,
            job.max_archive_size,
            job.num_files,
            job.total_size,
            job.num_archives,
            job.state,
            job.submitted_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_with(conn, job))
}

/// Updates an existing job row. All fields except `job_id` and
/// `submitted_at` are overwritten.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET user_name=?2, format=?3, max_archive_size=?4, num_files=?5,
             total_size=?6, num_archives=?7, state=?8, completed_at=?9
             WHERE job_id=?1",
            params![
                job.job_id,
                job.user_name,
                job.format,
                job.max_archive_size,
                job.num_files,
                job.total_size,
                job.num_archives,
                job.state,
                job.completed_at,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "jobs",
                key: job.job_id.clone(),
            });
        }
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, job_id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE job_id = ?1",
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists every job ID, oldest submission first.
pub fn list_ids(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT job_id FROM jobs ORDER BY submitted_at ASC, job_id ASC")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Lists jobs whose state is not one of `states`, newest first.
pub fn list_excluding_states(db: &Database, states: &[&str]) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=states.len()).map(|i| format!("?{}", i)).collect();
        let sql = if states.is_empty() {
            "SELECT * FROM jobs ORDER BY submitted_at DESC".to_string()
        } else {
            format!(
                "SELECT * FROM jobs WHERE state NOT IN ({}) ORDER BY submitted_at DESC",
                placeholders.join(", ")
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(states.iter()), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given state.
pub fn count_by_state(db: &Database, state: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE state = ?1",
            params![state],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes a job; archive and file rows cascade. Returns whether a row
/// was removed.
pub fn delete(db: &Database, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
        Ok(changed > 0)
    })
}
