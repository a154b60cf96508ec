//! Lifecycle states shared by jobs, archives and file entries.

use serde::{Deserialize, Serialize};

/// State of a job, an archive job or a single file entry.
///
/// `InvalidRequest` is only ever assigned to a [`Job`](super::Job) whose
/// request was rejected before any archive was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    NotStarted,
    InProgress,
    Complete,
    Error,
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job state: {0}")]
pub struct UnknownState(pub String);

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::NotStarted => "NOT_STARTED",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Complete => "COMPLETE",
            JobState::Error => "ERROR",
            JobState::InvalidRequest => "INVALID_REQUEST",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Error | JobState::InvalidRequest
        )
    }

    /// Whether an archive job may move from `self` to `next`.
    ///
    /// Re-claiming an `InProgress` archive is allowed so that a redelivered
    /// work message can rebuild an archive whose worker died mid-build.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (NotStarted, Error)
                | (InProgress, InProgress)
                | (InProgress, Complete)
                | (InProgress, Error)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = UnknownState;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NOT_STARTED" => Ok(JobState::NotStarted),
            "IN_PROGRESS" => Ok(JobState::InProgress),
            "COMPLETE" => Ok(JobState::Complete),
            "ERROR" => Ok(JobState::Error),
            "INVALID_REQUEST" => Ok(JobState::InvalidRequest),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Rolls the states of a job's archives up into the job's own state.
///
/// - no archives: `InvalidRequest`
/// - every archive complete: `Complete`
/// - anything still pending or running: `NotStarted` if nothing has begun,
///   otherwise `InProgress`
/// - otherwise (all terminal, at least one failed): `Error`
pub fn derive_job_state<I>(children: I) -> JobState
where
    I: IntoIterator<Item = JobState>,
{
    let mut total = 0usize;
    let mut not_started = 0usize;
    let mut in_progress = 0usize;
    let mut complete = 0usize;

    for state in children {
        total += 1;
        match state {
            JobState::NotStarted => not_started += 1,
            JobState::InProgress => in_progress += 1,
            JobState::Complete => complete += 1,
            JobState::Error | JobState::InvalidRequest => {}
        }
    }

    if total == 0 {
        JobState::InvalidRequest
    } else if complete == total {
        JobState::Complete
    } else if not_started == total {
        JobState::NotStarted
    } else if not_started + in_progress > 0 {
        JobState::InProgress
    } else {
        JobState::Error
    }
}
