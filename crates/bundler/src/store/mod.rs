//! The durable record store the pipeline reads and writes.
//!
//! Workers read-modify-write whole archive records, while file states are
//! changed one at a time through `update_file_entry_state`. Callers must
//! re-read an archive after its files changed out-of-band.

pub mod sqlite;

pub use sqlite::SqliteJobStore;

use crate::error::StoreError;
use crate::model::{ArchiveJob, FileEntry, Job, JobState};

pub trait JobStore: Send + Sync {
    /// Loads an archive with its file manifest in write order.
    fn get_archive_job(&self, job_id: &str, archive_id: u32)
        -> Result<Option<ArchiveJob>, StoreError>;

    /// Persists the archive-level fields. File entries are left untouched.
    fn update_archive_job(&self, archive: &ArchiveJob) -> Result<(), StoreError>;

    fn get_file_entry(
        &self,
        job_id: &str,
        archive_id: u32,
        source: &str,
    ) -> Result<Option<FileEntry>, StoreError>;

    fn update_file_entry_state(
        &self,
        job_id: &str,
        archive_id: u32,
        source: &str,
        state: JobState,
    ) -> Result<(), StoreError>;

    /// Loads a job with its whole archive and file hierarchy.
    fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Inserts a job and all of its archives and files atomically.
    fn persist_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Persists the job-level fields only.
    fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Jobs not yet in a terminal state, newest first.
    fn list_incomplete_jobs(&self) -> Result<Vec<Job>, StoreError>;

    fn list_job_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Removes a job and everything it owns. Returns whether it existed.
    fn delete_job(&self, job_id: &str) -> Result<bool, StoreError>;
}
