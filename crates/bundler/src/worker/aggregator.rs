//! Consumer of completion notices that keeps job states current.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::dispatch::{ArchiveMessage, MessageQueue};
use crate::error::{QueueError, StoreError};
use crate::model::Job;
use crate::tracker::StateTracker;

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Recomputes a job's state from the store whenever one of its archives
/// reports completion. Notices may arrive in any order and more than once;
/// each one triggers a full recomputation, so neither matters.
pub struct CompletionAggregator {
    tracker: StateTracker,
    queue: Arc<dyn MessageQueue>,
}

impl CompletionAggregator {
    pub fn new(tracker: StateTracker, queue: Arc<dyn MessageQueue>) -> Self {
        Self { tracker, queue }
    }

    /// Applies one completion notice.
    pub fn handle(&self, message: &ArchiveMessage) -> Result<Option<Job>, StoreError> {
        let span = tracing::info_span!(
            "aggregate",
            job_id = %message.job_id,
            archive_id = message.archive_id
        );
        let _enter = span.enter();

        let job = self.tracker.refresh_job_state(&message.job_id)?;
        if let Some(job) = &job {
            debug!(
                "Job {} after {}: {} ({}/{} archives complete)",
                job.job_id,
                message,
                job.state,
                job.archives_complete(),
                job.num_archives
            );
            if job.state.is_terminal() {
                info!("Job {} finished as {}", job.job_id, job.state);
            }
        }
        Ok(job)
    }

    /// Waits up to `timeout` for one notice and applies it. Returns whether a
    /// notice was handled. A notice whose store update failed is left
    /// unacknowledged for redelivery.
    pub fn poll(&self, timeout: Duration) -> Result<bool, QueueError> {
        let Some(delivery) = self.queue.receive(timeout)? else {
            return Ok(false);
        };

        match self.handle(&delivery.message) {
            Ok(_) => self.queue.acknowledge(&delivery)?,
            Err(e) => error!("Failed to aggregate {}: {}", delivery.message, e),
        }
        Ok(true)
    }

    /// Applies every notice currently queued. Returns how many were handled.
    pub fn drain(&self) -> usize {
        let mut handled = 0;
        loop {
            match self.poll(Duration::ZERO) {
                Ok(true) => handled += 1,
                Ok(false) => break,
                Err(e) => {
                    warn!("Stopped draining '{}': {}", self.queue.name(), e);
                    break;
                }
            }
        }
        handled
    }

    /// Loops until `shutdown` is set or the queue closes.
    pub fn run(&self, shutdown: &AtomicBool) {
        info!("Aggregating completions from '{}'", self.queue.name());
        while !shutdown.load(Ordering::Relaxed) {
            match self.poll(RECEIVE_TIMEOUT) {
                Ok(_) => {}
                Err(QueueError::Closed(_)) => break,
                Err(e) => {
                    error!("Failed to receive completion notice: {}", e);
                    std::thread::sleep(RECEIVE_TIMEOUT);
                }
            }
        }
        info!("Completion aggregator stopped");
    }
}
