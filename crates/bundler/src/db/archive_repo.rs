//! Archive job repository: the `archive_jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw archive job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJobRow {
    pub job_id: String,
    pub archive_id: i64,
    pub format: String,
    pub archive_path: String,
    pub hash_path: String,
    pub size: i64,
    pub num_files: i64,
    pub state: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub host_name: Option<String>,
    pub worker_name: Option<String>,
}

impl ArchiveJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            archive_id: row.get("archive_id")?,
            format: row.get("format")?,
            archive_path: row.get("archive_path")?,
            hash_path: row.get("hash_path")?,
            size: row.get("size")?,
            num_files: row.get("num_files")?,
            state: row.get("state")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            host_name: row.get("host_name")?,
            worker_name: row.get("worker_name")?,
        })
    }
}

pub fn insert_with(conn: &Connection, archive: &ArchiveJobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO archive_jobs (job_id, archive_id, format, archive_path, hash_path, size,
         num_files, state, started_at, completed_at, host_name, worker_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            archive.job_id,
            archive.archive_id,
            archive.format,
            archive.archive_path,
            archive.hash_path,
            archive.size,
            archive.num_files,
            archive.state,
            archive.started_at,
            archive.completed_at,
            archive.host_name,
            archive.worker_name,
        ],
    )?;
    Ok(())
}

/// Overwrites every mutable column of an archive job.
pub fn update(db: &Database, archive: &ArchiveJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE archive_jobs SET format=?3, archive_path=?4, hash_path=?5, size=?6,
             num_files=?7, state=?8, started_at=?9, completed_at=?10, host_name=?11,
             worker_name=?12
             WHERE job_id=?1 AND archive_id=?2",
            params![
                archive.job_id,
                archive.archive_id,
                archive.format,
                archive.archive_path,
                archive.hash_path,
                archive.size,
                archive.num_files,
                archive.state,
                archive.started_at,
                archive.completed_at,
                archive.host_name,
                archive.worker_name,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "archive_jobs",
                key: format!("{}/{}", archive.job_id, archive.archive_id),
            });
        }
        Ok(())
    })
}

pub fn find(
    db: &Database,
    job_id: &str,
    archive_id: i64,
) -> Result<Option<ArchiveJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM archive_jobs WHERE job_id = ?1 AND archive_id = ?2",
                params![job_id, archive_id],
                ArchiveJobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All archives of a job in archive id order.
pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<ArchiveJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM archive_jobs WHERE job_id = ?1 ORDER BY archive_id ASC")?;
        let rows = stmt
            .query_map(params![job_id], ArchiveJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRow};

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        job_repo::insert(
            &db,
            &JobRow {
                job_id: "job".to_string(),
                user_name: "u".to_string(),
                format: "zip".to_string(),
                max_archive_size: 100,
                num_files: 0,
                total_size: 0,
                num_archives: 2,
                state: "NOT_STARTED".to_string(),
                submitted_at: "2026-01-01T00:00:00+00:00".to_string(),
                completed_at: None,
            },
        )
        .unwrap();
        db
    }

    fn sample_archive(id: i64) -> ArchiveJobRow {
        ArchiveJobRow {
            job_id: "job".to_string(),
            archive_id: id,
            format: "zip".to_string(),
            archive_path: format!("/staging/job/archive_{}.zip", id),
            hash_path: format!("/staging/job/archive_{}.zip.sha1", id),
            size: 0,
            num_files: 2,
            state: "NOT_STARTED".to_string(),
            started_at: None,
            completed_at: None,
            host_name: None,
            worker_name: None,
        }
    }

    fn insert(db: &Database, row: &ArchiveJobRow) {
        db.with_conn(|conn| insert_with(conn, row)).unwrap();
    }

    #[test]
    fn test_insert_find_and_list_in_order() {
        let db = test_db();
        insert(&db, &sample_archive(2));
        insert(&db, &sample_archive(1));

        assert_eq!(find(&db, "job", 1).unwrap().unwrap(), sample_archive(1));
        assert!(find(&db, "job", 3).unwrap().is_none());

        let ids: Vec<i64> = list_for_job(&db, "job")
            .unwrap()
            .iter()
            .map(|r| r.archive_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_update_claim_fields() {
        let db = test_db();
        insert(&db, &sample_archive(1));

        let mut row = sample_archive(1);
        row.state = "IN_PROGRESS".to_string();
        row.started_at = Some("2026-01-01T00:00:05+00:00".to_string());
        row.host_name = Some("node-a".to_string());
        row.worker_name = Some("worker-0".to_string());
        update(&db, &row).unwrap();

        assert_eq!(find(&db, "job", 1).unwrap().unwrap(), row);
    }

    #[test]
    fn test_update_missing_archive() {
        let db = test_db();
        let err = update(&db, &sample_archive(9)).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { table: "archive_jobs", .. }));
    }

    #[test]
    fn test_archive_requires_job() {
        let db = test_db();
        let mut orphan = sample_archive(1);
        orphan.job_id = "missing".to_string();
        assert!(db.with_conn(|conn| insert_with(conn, &orphan)).is_err());
    }
}
