//! `JobStore` backed by the SQLite repositories.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::JobStore;
use crate::db::archive_repo::{self, ArchiveJobRow};
use crate::db::file_entry_repo::{self, FileEntryRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::error::StoreError;
use crate::model::{ArchiveFormat, ArchiveJob, FileEntry, Job, JobState};

const TERMINAL_JOB_STATES: [&str; 3] = ["COMPLETE", "ERROR", "INVALID_REQUEST"];

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_timestamp(s: &str, field: &str, job_id: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(job_id, format!("{} '{}': {}", field, s, e)))
}

fn parse_optional_timestamp(
    s: Option<&str>,
    field: &str,
    job_id: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| parse_timestamp(s, field, job_id)).transpose()
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn invalid(job_id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidRecord {
        job_id: job_id.to_string(),
        reason: reason.into(),
    }
}

fn parse_state(s: &str, job_id: &str) -> Result<JobState, StoreError> {
    s.parse().map_err(|e| invalid(job_id, format!("{}", e)))
}

fn parse_format(s: &str, job_id: &str) -> Result<ArchiveFormat, StoreError> {
    s.parse().map_err(|e| invalid(job_id, format!("{}", e)))
}

fn to_unsigned<T: TryFrom<i64>>(value: i64, field: &str, job_id: &str) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| invalid(job_id, format!("{} out of range: {}", field, value)))
}

fn to_signed<T: TryInto<i64>>(value: T, field: &str, job_id: &str) -> Result<i64, StoreError> {
    value
        .try_into()
        .map_err(|_| invalid(job_id, format!("{} does not fit in a database integer", field)))
}

// ─── Row conversion ─────────────────────────────────────────────────────────

fn file_from_row(row: FileEntryRow) -> Result<FileEntry, StoreError> {
    Ok(FileEntry {
        archive_id: to_unsigned(row.archive_id, "archive_id", &row.job_id)?,
        size: to_unsigned(row.size, "size", &row.job_id)?,
        state: parse_state(&row.state, &row.job_id)?,
        source: row.source,
        entry_path: row.entry_path,
        job_id: row.job_id,
    })
}

fn file_to_row(file: &FileEntry, seq: usize) -> Result<FileEntryRow, StoreError> {
    Ok(FileEntryRow {
        job_id: file.job_id.clone(),
        archive_id: i64::from(file.archive_id),
        source: file.source.clone(),
        entry_path: file.entry_path.clone(),
        size: to_signed(file.size, "size", &file.job_id)?,
        state: file.state.as_str().to_string(),
        seq: to_signed(seq, "seq", &file.job_id)?,
    })
}

fn archive_from_row(row: ArchiveJobRow, files: Vec<FileEntry>) -> Result<ArchiveJob, StoreError> {
    Ok(ArchiveJob {
        archive_id: to_unsigned(row.archive_id, "archive_id", &row.job_id)?,
        format: parse_format(&row.format, &row.job_id)?,
        archive: PathBuf::from(row.archive_path),
        hash: PathBuf::from(row.hash_path),
        size: to_unsigned(row.size, "size", &row.job_id)?,
        num_files: to_unsigned(row.num_files, "num_files", &row.job_id)?,
        state: parse_state(&row.state, &row.job_id)?,
        started_at: parse_optional_timestamp(row.started_at.as_deref(), "started_at", &row.job_id)?,
        completed_at: parse_optional_timestamp(
            row.completed_at.as_deref(),
            "completed_at",
            &row.job_id,
        )?,
        host_name: row.host_name,
        worker_name: row.worker_name,
        job_id: row.job_id,
        files,
    })
}

fn archive_to_row(archive: &ArchiveJob) -> Result<ArchiveJobRow, StoreError> {
    Ok(ArchiveJobRow {
        job_id: archive.job_id.clone(),
        archive_id: i64::from(archive.archive_id),
        format: archive.format.as_str().to_string(),
        archive_path: archive.archive.to_string_lossy().into_owned(),
        hash_path: archive.hash.to_string_lossy().into_owned(),
        size: to_signed(archive.size, "size", &archive.job_id)?,
        num_files: i64::from(archive.num_files),
        state: archive.state.as_str().to_string(),
        started_at: archive.started_at.map(format_timestamp),
        completed_at: archive.completed_at.map(format_timestamp),
        host_name: archive.host_name.clone(),
        worker_name: archive.worker_name.clone(),
    })
}

fn job_from_row(row: JobRow, archives: Vec<ArchiveJob>) -> Result<Job, StoreError> {
    Ok(Job {
        user_name: row.user_name,
        format: parse_format(&row.format, &row.job_id)?,
        max_archive_size: to_unsigned(row.max_archive_size, "max_archive_size", &row.job_id)?,
        num_files: to_unsigned(row.num_files, "num_files", &row.job_id)?,
        total_size: to_unsigned(row.total_size, "total_size", &row.job_id)?,
        num_archives: to_unsigned(row.num_archives, "num_archives", &row.job_id)?,
        state: parse_state(&row.state, &row.job_id)?,
        submitted_at: parse_timestamp(&row.submitted_at, "submitted_at", &row.job_id)?,
        completed_at: parse_optional_timestamp(
            row.completed_at.as_deref(),
            "completed_at",
            &row.job_id,
        )?,
        job_id: row.job_id,
        archives,
    })
}

fn job_to_row(job: &Job) -> Result<JobRow, StoreError> {
    Ok(JobRow {
        job_id: job.job_id.clone(),
        user_name: job.user_name.clone(),
        format: job.format.as_str().to_string(),
        max_archive_size: to_signed(job.max_archive_size, "max_archive_size", &job.job_id)?,
        num_files: to_signed(job.num_files, "num_files", &job.job_id)?,
        total_size: to_signed(job.total_size, "total_size", &job.job_id)?,
        num_archives: i64::from(job.num_archives),
        state: job.state.as_str().to_string(),
        submitted_at: format_timestamp(job.submitted_at),
        completed_at: job.completed_at.map(format_timestamp),
    })
}

// ─── SqliteJobStore ─────────────────────────────────────────────────────────

/// Job store over a shared [`Database`].
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn load_files(&self, job_id: &str, archive_id: i64) -> Result<Vec<FileEntry>, StoreError> {
        file_entry_repo::list_for_archive(&self.db, job_id, archive_id)?
            .into_iter()
            .map(file_from_row)
            .collect()
    }

    fn load_archives(&self, job_id: &str) -> Result<Vec<ArchiveJob>, StoreError> {
        archive_repo::list_for_job(&self.db, job_id)?
            .into_iter()
            .map(|row| {
                let files = self.load_files(&row.job_id, row.archive_id)?;
                archive_from_row(row, files)
            })
            .collect()
    }

    fn load_job(&self, row: JobRow) -> Result<Job, StoreError> {
        let archives = self.load_archives(&row.job_id)?;
        job_from_row(row, archives)
    }
}

impl JobStore for SqliteJobStore {
    fn get_archive_job(
        &self,
        job_id: &str,
        archive_id: u32,
    ) -> Result<Option<ArchiveJob>, StoreError> {
        let Some(row) = archive_repo::find(&self.db, job_id, i64::from(archive_id))? else {
            return Ok(None);
        };
        let files = self.load_files(job_id, row.archive_id)?;
        archive_from_row(row, files).map(Some)
    }

    fn update_archive_job(&self, archive: &ArchiveJob) -> Result<(), StoreError> {
        archive_repo::update(&self.db, &archive_to_row(archive)?)?;
        Ok(())
    }

    fn get_file_entry(
        &self,
        job_id: &str,
        archive_id: u32,
        source: &str,
    ) -> Result<Option<FileEntry>, StoreError> {
        file_entry_repo::find(&self.db, job_id, i64::from(archive_id), source)?
            .map(file_from_row)
            .transpose()
    }

    fn update_file_entry_state(
        &self,
        job_id: &str,
        archive_id: u32,
        source: &str,
        state: JobState,
    ) -> Result<(), StoreError> {
        file_entry_repo::update_state(
            &self.db,
            job_id,
            i64::from(archive_id),
            source,
            state.as_str(),
        )?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        job_repo::find_by_id(&self.db, job_id)?
            .map(|row| self.load_job(row))
            .transpose()
    }

    fn persist_job(&self, job: &Job) -> Result<(), StoreError> {
        let job_row = job_to_row(job)?;
        let mut archive_rows = Vec::with_capacity(job.archives.len());
        let mut file_rows = Vec::with_capacity(job.num_files as usize);
        for archive in &job.archives {
            archive_rows.push(archive_to_row(archive)?);
            for (seq, file) in archive.files.iter().enumerate() {
                file_rows.push(file_to_row(file, seq)?);
            }
        }

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            job_repo::insert_with(&tx, &job_row)?;
            for row in &archive_rows {
                archive_repo::insert_with(&tx, row)?;
            }
            for row in &file_rows {
                file_entry_repo::insert_with(&tx, row)?;
            }
            tx.commit().map_err(DatabaseError::from)
        })?;

        log::debug!(
            "Persisted job {} with {} archive(s) and {} file(s)",
            job.job_id,
            archive_rows.len(),
            file_rows.len()
        );
        Ok(())
    }

    fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        job_repo::update(&self.db, &job_to_row(job)?)?;
        Ok(())
    }

    fn list_incomplete_jobs(&self) -> Result<Vec<Job>, StoreError> {
        job_repo::list_excluding_states(&self.db, &TERMINAL_JOB_STATES)?
            .into_iter()
            .map(|row| self.load_job(row))
            .collect()
    }

    fn list_job_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(job_repo::list_ids(&self.db)?)
    }

    fn delete_job(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(job_repo::delete(&self.db, job_id)?)
    }
}
