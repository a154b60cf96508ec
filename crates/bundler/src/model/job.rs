//! Domain records for the job / archive / file hierarchy.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::ArchiveFormat;
use super::state::{derive_job_state, JobState};

/// One source file placed into one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub job_id: String,
    pub archive_id: u32,
    /// Source location as supplied, e.g. `/data/a.txt` or `s3://bucket/a.txt`.
    pub source: String,
    /// Relative path of the file inside the archive.
    pub entry_path: String,
    pub size: u64,
    pub state: JobState,
}

impl FileEntry {
    pub fn new(
        job_id: impl Into<String>,
        archive_id: u32,
        source: impl Into<String>,
        entry_path: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            archive_id,
            source: source.into(),
            entry_path: entry_path.into(),
            size,
            state: JobState::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == JobState::Complete
    }
}

/// One physical output archive and its ordered file manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveJob {
    pub job_id: String,
    pub archive_id: u32,
    pub format: ArchiveFormat,
    /// Output archive location.
    pub archive: PathBuf,
    /// Side-car file holding the archive's hex digest.
    pub hash: PathBuf,
    pub size: u64,
    pub num_files: u32,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub host_name: Option<String>,
    pub worker_name: Option<String>,
    /// Files in archive write order.
    pub files: Vec<FileEntry>,
}

impl ArchiveJob {
    pub fn files_complete(&self) -> usize {
        self.files.iter().filter(|f| f.is_complete()).count()
    }

    pub fn size_complete(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.is_complete())
            .map(|f| f.size)
            .sum()
    }

    /// Sum of the planned file sizes (before the on-disk size correction).
    pub fn planned_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// One client request, possibly producing several archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub user_name: String,
    pub format: ArchiveFormat,
    /// Maximum archive size in bytes.
    pub max_archive_size: u64,
    pub num_files: u64,
    pub total_size: u64,
    pub num_archives: u32,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub archives: Vec<ArchiveJob>,
}

impl Job {
    /// A job rejected at intake: terminal, with no archives.
    pub fn invalid_request(
        job_id: impl Into<String>,
        user_name: impl Into<String>,
        format: ArchiveFormat,
        max_archive_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            user_name: user_name.into(),
            format,
            max_archive_size,
            num_files: 0,
            total_size: 0,
            num_archives: 0,
            state: JobState::InvalidRequest,
            submitted_at: now,
            completed_at: Some(now),
            archives: Vec::new(),
        }
    }

    /// State implied by the archives currently attached to this job.
    pub fn derived_state(&self) -> JobState {
        derive_job_state(self.archives.iter().map(|a| a.state))
    }

    pub fn archives_complete(&self) -> usize {
        self.archives
            .iter()
            .filter(|a| a.state == JobState::Complete)
            .count()
    }

    pub fn files_complete(&self) -> usize {
        self.archives.iter().map(ArchiveJob::files_complete).sum()
    }

    pub fn size_complete(&self) -> u64 {
        self.archives.iter().map(ArchiveJob::size_complete).sum()
    }
}
