//! Archive progress broadcaster for real-time build status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stage of an archive build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePhase {
    Started,
    FileCompleted,
    Hashing,
    Completed,
    Failed,
}

impl std::fmt::Display for ArchivePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchivePhase::Started => write!(f, "Started"),
            ArchivePhase::FileCompleted => write!(f, "File completed"),
            ArchivePhase::Hashing => write!(f, "Hashing"),
            ArchivePhase::Completed => write!(f, "Completed"),
            ArchivePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for one archive of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveProgressEvent {
    pub job_id: String,
    pub archive_id: u32,
    pub phase: ArchivePhase,
    /// Files written so far.
    pub files_complete: u32,
    pub num_files: u32,
    pub timestamp: DateTime<Utc>,
    /// Entry just written (set on `FileCompleted`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_path: Option<String>,
    /// Final archive size in bytes (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Hex digest of the archive (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArchiveProgressEvent {
    pub fn new(job_id: &str, archive_id: u32, phase: ArchivePhase) -> Self {
        Self {
            job_id: job_id.to_string(),
            archive_id,
            phase,
            files_complete: 0,
            num_files: 0,
            timestamp: Utc::now(),
            entry_path: None,
            size: None,
            hash: None,
            error: None,
        }
    }

    pub fn started(job_id: &str, archive_id: u32, num_files: u32) -> Self {
        Self {
            num_files,
            ..Self::new(job_id, archive_id, ArchivePhase::Started)
        }
    }

    pub fn file_completed(
        job_id: &str,
        archive_id: u32,
        entry_path: &str,
        files_complete: u32,
        num_files: u32,
    ) -> Self {
        Self {
            files_complete,
            num_files,
            entry_path: Some(entry_path.to_string()),
            ..Self::new(job_id, archive_id, ArchivePhase::FileCompleted)
        }
    }

    pub fn completed(job_id: &str, archive_id: u32, num_files: u32, size: u64, hash: &str) -> Self {
        Self {
            files_complete: num_files,
            num_files,
            size: Some(size),
            hash: Some(hash.to_string()),
            ..Self::new(job_id, archive_id, ArchivePhase::Completed)
        }
    }

    pub fn failed(job_id: &str, archive_id: u32, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(job_id, archive_id, ArchivePhase::Failed)
        }
    }
}

/// Receives progress from an archive worker.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ArchiveProgressEvent);
}

/// No-op reporter for unit tests and headless workers.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ArchiveProgressEvent) {}
}

/// Broadcasts archive progress events for streaming.
#[derive(Clone)]
pub struct ArchiveProgressBroadcaster {
    sender: Arc<broadcast::Sender<ArchiveProgressEvent>>,
}

impl ArchiveProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: ArchiveProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ArchiveProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressReporter for ArchiveProgressBroadcaster {
    fn report(&self, event: ArchiveProgressEvent) {
        self.send(event);
    }
}
