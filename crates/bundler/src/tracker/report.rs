//! Point-in-time progress report for a job.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ArchiveJob, Job, JobState};

/// Summary of one completed archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub archive_id: u32,
    pub archive: PathBuf,
    pub hash: PathBuf,
    pub size: u64,
    pub num_files: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub elapsed_time: u64,
}

impl From<&ArchiveJob> for ArchiveSummary {
    fn from(archive: &ArchiveJob) -> Self {
        Self {
            archive_id: archive.archive_id,
            archive: archive.archive.clone(),
            hash: archive.hash.clone(),
            size: archive.size,
            num_files: archive.num_files,
            host_name: archive.host_name.clone(),
            worker_name: archive.worker_name.clone(),
            elapsed_time: elapsed_millis(archive.started_at, archive.completed_at, Utc::now()),
        }
    }
}

/// Job progress as reported to polling clients.
///
/// Archive counters serialize as `threads` / `threads_complete` to stay
/// compatible with existing status consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub user_name: String,
    pub state: JobState,
    #[serde(default)]
    pub num_files: u64,
    #[serde(default)]
    pub files_complete: u64,
    #[serde(rename = "size", default)]
    pub total_size: u64,
    #[serde(default)]
    pub size_complete: u64,
    #[serde(rename = "threads", default)]
    pub num_archives: u32,
    #[serde(rename = "threads_complete", default)]
    pub archives_complete: u32,
    /// Always equal to `archives_complete`: a hash is written before an
    /// archive is marked complete.
    #[serde(default)]
    pub hashes_complete: u32,
    /// Milliseconds since submission, frozen at completion.
    #[serde(rename = "elapsed_time", default)]
    pub elapsed_time_ms: u64,
    #[serde(default)]
    pub archives: Vec<ArchiveSummary>,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        Self::at(job, Utc::now())
    }

    /// Builds the report as observed at `now`.
    pub fn at(job: &Job, now: DateTime<Utc>) -> Self {
        if job.archives.is_empty() && job.state != JobState::InvalidRequest {
            log::error!("Job {} has no archive jobs", job.job_id);
        }

        let completed: Vec<&ArchiveJob> = job
            .archives
            .iter()
            .filter(|a| a.state == JobState::Complete)
            .collect();
        let archives_complete = completed.len() as u32;

        Self {
            job_id: job.job_id.clone(),
            user_name: job.user_name.clone(),
            state: job.state,
            num_files: job.num_files,
            files_complete: job.files_complete() as u64,
            total_size: job.total_size,
            size_complete: job.size_complete(),
            num_archives: job.num_archives,
            archives_complete,
            hashes_complete: archives_complete,
            elapsed_time_ms: elapsed_millis(Some(job.submitted_at), job.completed_at, now),
            archives: completed.into_iter().map(ArchiveSummary::from).collect(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

fn elapsed_millis(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    let Some(start) = start else {
        return 0;
    };
    let end = end.unwrap_or(now);
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
