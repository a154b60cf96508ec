//! Service-wide totals across every job in the store.

use serde::{Deserialize, Serialize};

use crate::model::{Job, JobState};

/// Running totals over all known jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerMetrics {
    pub num_jobs: u64,
    pub jobs_not_started: u64,
    pub jobs_in_progress: u64,
    pub jobs_complete: u64,
    pub jobs_error: u64,
    pub jobs_invalid_request: u64,
    pub num_archives: u64,
    pub archives_complete: u64,
    pub num_files: u64,
    pub files_complete: u64,
    /// Planned bytes across every job.
    pub total_size: u64,
    pub size_complete: u64,
}

impl BundlerMetrics {
    pub fn record(&mut self, job: &Job) {
        self.num_jobs += 1;
        match job.state {
            JobState::NotStarted => self.jobs_not_started += 1,
            JobState::InProgress => self.jobs_in_progress += 1,
            JobState::Complete => self.jobs_complete += 1,
            JobState::Error => self.jobs_error += 1,
            JobState::InvalidRequest => self.jobs_invalid_request += 1,
        }
        self.num_archives += u64::from(job.num_archives);
        self.archives_complete += job.archives_complete() as u64;
        self.num_files += job.num_files;
        self.files_complete += job.files_complete() as u64;
        self.total_size += job.total_size;
        self.size_complete += job.size_complete();
    }

    /// Jobs that reached `COMPLETE`, `ERROR` or `INVALID_REQUEST`.
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_complete + self.jobs_error + self.jobs_invalid_request
    }
}
