//! Processing of a single archive work message.

use std::sync::Arc;

use log::{error, info, warn};

use crate::archive::{archiver_for, ArchiveElement};
use crate::broadcast::{ArchivePhase, ArchiveProgressEvent, NoopProgress, ProgressReporter};
use crate::config::BundlerConfig;
use crate::dispatch::{ArchiveMessage, MessageQueue};
use crate::error::{ArchiveError, HashError, StoreError};
use crate::hash::{self, HashAlgorithm};
use crate::model::{ArchiveJob, JobState};
use crate::store::JobStore;
use crate::tracker::{Claim, StateTracker, WorkerIdentity};

/// Worker name used before a pool assigns per-thread names.
pub const DEFAULT_WORKER_NAME: &str = "worker";

/// What happened to one work message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Archive and side-car written; the archive is `COMPLETE`.
    Completed { size: u64, digest: String },
    /// The build or hash failed; the archive is `ERROR`.
    Failed { error: String },
    /// The archive was already terminal; nothing was rebuilt.
    Skipped { state: JobState },
    /// The archive never became visible in the store.
    NotFound,
    /// The store could not be reached; the archive state is unknown.
    Abandoned { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub message: ArchiveMessage,
    pub status: OutcomeStatus,
}

impl ArchiveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }
}

#[derive(Debug, thiserror::Error)]
enum BuildFailure {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("failed to record file completion: {0}")]
    Tracking(StoreError),
}

/// Builds archives for work messages and reports their completion.
///
/// Failures never escape `process`; they end up in the returned outcome and
/// in the archive's persisted state.
#[derive(Clone)]
pub struct ArchiveWorker {
    tracker: StateTracker,
    notifier: Arc<dyn MessageQueue>,
    hash_algorithm: HashAlgorithm,
    identity: WorkerIdentity,
    progress: Arc<dyn ProgressReporter>,
}

impl ArchiveWorker {
    pub fn new(
        tracker: StateTracker,
        notifier: Arc<dyn MessageQueue>,
        hash_algorithm: HashAlgorithm,
        identity: WorkerIdentity,
    ) -> Self {
        Self {
            tracker,
            notifier,
            hash_algorithm,
            identity,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Worker stamped with the configured node name, reading through the
    /// configured retry policy.
    pub fn from_config(
        config: &BundlerConfig,
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn MessageQueue>,
    ) -> Self {
        Self::new(
            StateTracker::new(store, config.retry.into()),
            notifier,
            config.hash_algorithm,
            WorkerIdentity::new(config.node_name(), DEFAULT_WORKER_NAME),
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Same worker under a different name, for pool threads.
    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.identity.worker_name = worker_name.into();
        self
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn process(&self, message: &ArchiveMessage) -> ArchiveOutcome {
        let span = tracing::info_span!(
            "archive",
            job_id = %message.job_id,
            archive_id = message.archive_id,
            worker = %self.identity.worker_name
        );
        let _enter = span.enter();

        let status = match self.tracker.claim_archive(
            &message.job_id,
            message.archive_id,
            &self.identity,
        ) {
            Ok(Claim::Claimed(archive)) => self.build(archive),
            Ok(Claim::AlreadyFinished(state)) => {
                info!("Archive {} already {}, not rebuilding", message, state);
                OutcomeStatus::Skipped { state }
            }
            Ok(Claim::NotFound) => {
                error!("Dropping work for {}: archive not found", message);
                return ArchiveOutcome {
                    message: message.clone(),
                    status: OutcomeStatus::NotFound,
                };
            }
            Err(e) => {
                error!("Abandoning {}: {}", message, e);
                return ArchiveOutcome {
                    message: message.clone(),
                    status: OutcomeStatus::Abandoned {
                        error: e.to_string(),
                    },
                };
            }
        };

        self.notify(message);
        ArchiveOutcome {
            message: message.clone(),
            status,
        }
    }

    fn build(&self, archive: ArchiveJob) -> OutcomeStatus {
        let job_id = archive.job_id.as_str();
        let archive_id = archive.archive_id;
        info!(
            "Building {} archive {} with {} file(s)",
            archive.format,
            archive.archive.display(),
            archive.files.len()
        );
        self.progress.report(ArchiveProgressEvent::started(
            job_id,
            archive_id,
            archive.num_files,
        ));

        let result = self.write_archive(&archive);
        let size = file_size(&archive);

        let (state, status) = match result {
            Ok(digest) => (
                JobState::Complete,
                OutcomeStatus::Completed {
                    size: size.unwrap_or(0),
                    digest,
                },
            ),
            Err(e) => {
                error!("Archive {}/{} failed: {}", job_id, archive_id, e);
                self.progress
                    .report(ArchiveProgressEvent::failed(job_id, archive_id, &e.to_string()));
                (
                    JobState::Error,
                    OutcomeStatus::Failed {
                        error: e.to_string(),
                    },
                )
            }
        };

        match self
            .tracker
            .finish_archive(job_id, archive_id, state, size)
        {
            Ok(Some(finished)) => {
                if let OutcomeStatus::Completed { size, digest } = &status {
                    info!(
                        "Archive {}/{} complete: {} bytes, {} {}",
                        job_id, archive_id, size, self.hash_algorithm, digest
                    );
                    self.progress.report(ArchiveProgressEvent::completed(
                        job_id,
                        archive_id,
                        finished.num_files,
                        *size,
                        digest,
                    ));
                }
                status
            }
            Ok(None) => status,
            Err(e) => {
                error!(
                    "Unable to record final state of {}/{}: {}",
                    job_id, archive_id, e
                );
                OutcomeStatus::Abandoned {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Writes the archive and its side-car, returning the digest.
    fn write_archive(&self, archive: &ArchiveJob) -> Result<String, BuildFailure> {
        let elements: Vec<ArchiveElement> = archive.files.iter().map(ArchiveElement::from).collect();
        let archiver = archiver_for(archive.format);

        let mut tracking_error: Option<StoreError> = None;
        let mut files_complete = 0u32;
        let mut on_complete = |element: &ArchiveElement| {
            files_complete += 1;
            if let Err(e) =
                self.tracker
                    .mark_file_complete(&archive.job_id, archive.archive_id, &element.location)
            {
                warn!("Failed to mark {} complete: {}", element.location, e);
                tracking_error.get_or_insert(e);
            }
            self.progress.report(ArchiveProgressEvent::file_completed(
                &archive.job_id,
                archive.archive_id,
                &element.entry_path,
                files_complete,
                archive.num_files,
            ));
        };

        archiver.build(&elements, &archive.archive, &mut on_complete)?;
        if let Some(e) = tracking_error {
            return Err(BuildFailure::Tracking(e));
        }

        self.progress.report(ArchiveProgressEvent::new(
            &archive.job_id,
            archive.archive_id,
            ArchivePhase::Hashing,
        ));
        Ok(hash::write_sidecar(
            &archive.archive,
            &archive.hash,
            self.hash_algorithm,
        )?)
    }

    fn notify(&self, message: &ArchiveMessage) {
        if let Err(e) = self.notifier.publish(message) {
            error!(
                "Failed to publish completion of {} to '{}': {}",
                message,
                self.notifier.name(),
                e
            );
        }
    }
}

fn file_size(archive: &ArchiveJob) -> Option<u64> {
    std::fs::metadata(&archive.archive).ok().map(|m| m.len())
}
