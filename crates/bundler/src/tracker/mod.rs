//! Job / archive / file state machine on top of a [`JobStore`].
//!
//! File entries only ever move from `NOT_STARTED` to `COMPLETE`. Archives move
//! through `NOT_STARTED → IN_PROGRESS → COMPLETE | ERROR`. A job's state is
//! always recomputed from its archives, except for `INVALID_REQUEST`, which is
//! assigned once at intake.

pub mod metrics;
pub mod report;

pub use metrics::BundlerMetrics;
pub use report::{ArchiveSummary, JobReport};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::error::StoreError;
use crate::model::{ArchiveJob, Job, JobState};
use crate::store::JobStore;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry for reads that may race store replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-reads after the initial miss.
    pub max_attempts: u32,
    /// Pause before each re-read.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Longest time a caller can be blocked by this policy.
    pub fn max_wait(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Identity stamped onto an archive when a worker claims it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub host_name: String,
    pub worker_name: String,
}

impl WorkerIdentity {
    pub fn new(host_name: impl Into<String>, worker_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            worker_name: worker_name.into(),
        }
    }
}

/// Result of trying to claim an archive for building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The archive is now `IN_PROGRESS` and owned by the caller.
    Claimed(ArchiveJob),
    /// The archive already reached a terminal state; the work is a duplicate.
    AlreadyFinished(JobState),
    /// The archive could not be found even after retrying.
    NotFound,
}

#[derive(Clone)]
pub struct StateTracker {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl StateTracker {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Reads an archive, re-reading on a miss until the retry budget runs
    /// out. Store failures are not retried.
    pub fn find_archive_job_with_retry(
        &self,
        job_id: &str,
        archive_id: u32,
    ) -> Result<Option<ArchiveJob>, StoreError> {
        let mut attempt = 0;
        loop {
            if let Some(archive) = self.store.get_archive_job(job_id, archive_id)? {
                if attempt > 0 {
                    log::info!(
                        "Archive {}/{} became visible after {} retr{}",
                        job_id,
                        archive_id,
                        attempt,
                        if attempt == 1 { "y" } else { "ies" }
                    );
                }
                return Ok(Some(archive));
            }

            if attempt >= self.retry.max_attempts {
                log::error!(
                    "Archive {}/{} not found after {} retries",
                    job_id,
                    archive_id,
                    self.retry.max_attempts
                );
                return Ok(None);
            }

            attempt += 1;
            log::warn!(
                "Archive {}/{} not found, retry {} of {} in {:?}",
                job_id,
                archive_id,
                attempt,
                self.retry.max_attempts,
                self.retry.delay
            );
            thread::sleep(self.retry.delay);
        }
    }

    /// Moves an archive to `IN_PROGRESS` and stamps the claiming worker.
    ///
    /// A redelivered message for an archive stuck in `IN_PROGRESS` reclaims
    /// it and resets its files so the rebuild starts from scratch.
    pub fn claim_archive(
        &self,
        job_id: &str,
        archive_id: u32,
        identity: &WorkerIdentity,
    ) -> Result<Claim, StoreError> {
        let Some(mut archive) = self.find_archive_job_with_retry(job_id, archive_id)? else {
            return Ok(Claim::NotFound);
        };

        if !archive.state.can_transition_to(JobState::InProgress) {
            log::warn!(
                "Archive {}/{} is already {}, skipping",
                job_id,
                archive_id,
                archive.state
            );
            return Ok(Claim::AlreadyFinished(archive.state));
        }

        if archive.state == JobState::InProgress {
            log::warn!(
                "Archive {}/{} was left in progress by {}, rebuilding",
                job_id,
                archive_id,
                archive.worker_name.as_deref().unwrap_or("an unknown worker")
            );
            for file in archive.files.iter_mut().filter(|f| f.is_complete()) {
                self.store.update_file_entry_state(
                    job_id,
                    archive_id,
                    &file.source,
                    JobState::NotStarted,
                )?;
                file.state = JobState::NotStarted;
            }
        }

        archive.state = JobState::InProgress;
        archive.started_at = Some(Utc::now());
        archive.completed_at = None;
        archive.host_name = Some(identity.host_name.clone());
        archive.worker_name = Some(identity.worker_name.clone());
        self.store.update_archive_job(&archive)?;

        Ok(Claim::Claimed(archive))
    }

    /// Marks one file of an archive as written.
    pub fn mark_file_complete(
        &self,
        job_id: &str,
        archive_id: u32,
        source: &str,
    ) -> Result<(), StoreError> {
        self.store
            .update_file_entry_state(job_id, archive_id, source, JobState::Complete)
    }

    /// Re-reads an archive and records its terminal state and on-disk size.
    ///
    /// Returns `None` if the archive disappeared (e.g. its job was deleted).
    pub fn finish_archive(
        &self,
        job_id: &str,
        archive_id: u32,
        state: JobState,
        size: Option<u64>,
    ) -> Result<Option<ArchiveJob>, StoreError> {
        let Some(mut archive) = self.store.get_archive_job(job_id, archive_id)? else {
            log::error!(
                "Archive {}/{} vanished before it could be finished",
                job_id,
                archive_id
            );
            return Ok(None);
        };

        if archive.state.can_transition_to(state) {
            archive.state = state;
            archive.completed_at = Some(Utc::now());
        } else {
            log::warn!(
                "Archive {}/{} cannot move from {} to {}",
                job_id,
                archive_id,
                archive.state,
                state
            );
        }
        if let Some(size) = size {
            archive.size = size;
        }
        self.store.update_archive_job(&archive)?;
        Ok(Some(archive))
    }

    /// Recomputes a job's state from its archives and persists it if it
    /// changed. `INVALID_REQUEST` jobs are left alone.
    pub fn refresh_job_state(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let Some(mut job) = self.store.get_job(job_id)? else {
            log::warn!("Job {} not found while refreshing its state", job_id);
            return Ok(None);
        };

        if job.state == JobState::InvalidRequest {
            return Ok(Some(job));
        }

        let derived = job.derived_state();
        if derived != job.state {
            log::info!("Job {} moved from {} to {}", job_id, job.state, derived);
            job.state = derived;
            job.completed_at = if derived.is_terminal() {
                Some(Utc::now())
            } else {
                None
            };
            self.store.update_job(&job)?;
        }
        Ok(Some(job))
    }

    /// Builds a progress report for a job, if it exists.
    pub fn report(&self, job_id: &str) -> Result<Option<JobReport>, StoreError> {
        Ok(self.store.get_job(job_id)?.map(|job| JobReport::from_job(&job)))
    }

    /// Totals across every job in the store. Jobs deleted mid-scan are
    /// skipped.
    pub fn metrics(&self) -> Result<BundlerMetrics, StoreError> {
        let mut metrics = BundlerMetrics::default();
        for job_id in self.store.list_job_ids()? {
            if let Some(job) = self.store.get_job(&job_id)? {
                metrics.record(&job);
            }
        }
        log::debug!(
            "Metrics over {} job(s): {} of {} archives complete",
            metrics.num_jobs,
            metrics.archives_complete,
            metrics.num_archives
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{ArchiveFormat, FileEntry};
    use crate::store::SqliteJobStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Hides archives for the first `misses` reads.
    struct LaggyStore {
        inner: SqliteJobStore,
        misses: u32,
        reads: AtomicU32,
    }

    impl JobStore for LaggyStore {
        fn get_archive_job(
            &self,
            job_id: &str,
            archive_id: u32,
        ) -> Result<Option<ArchiveJob>, StoreError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            if read < self.misses {
                return Ok(None);
            }
            self.inner.get_archive_job(job_id, archive_id)
        }
        fn update_archive_job(&self, archive: &ArchiveJob) -> Result<(), StoreError> {
            self.inner.update_archive_job(archive)
        }
        fn get_file_entry(
            &self,
            job_id: &str,
            archive_id: u32,
            source: &str,
        ) -> Result<Option<FileEntry>, StoreError> {
            self.inner.get_file_entry(job_id, archive_id, source)
        }
        fn update_file_entry_state(
            &self,
            job_id: &str,
            archive_id: u32,
            source: &str,
            state: JobState,
        ) -> Result<(), StoreError> {
            self.inner.update_file_entry_state(job_id, archive_id, source, state)
        }
        fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
            self.inner.get_job(job_id)
        }
        fn persist_job(&self, job: &Job) -> Result<(), StoreError> {
            self.inner.persist_job(job)
        }
        fn update_job(&self, job: &Job) -> Result<(), StoreError> {
            self.inner.update_job(job)
        }
        fn list_incomplete_jobs(&self) -> Result<Vec<Job>, StoreError> {
            self.inner.list_incomplete_jobs()
        }
        fn list_job_ids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_job_ids()
        }
        fn delete_job(&self, job_id: &str) -> Result<bool, StoreError> {
            self.inner.delete_job(job_id)
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(1))
    }

    fn sample_job() -> Job {
        let archive = |id: u32| ArchiveJob {
            job_id: "job".to_string(),
            archive_id: id,
            format: ArchiveFormat::Tar,
            archive: PathBuf::from(format!("/out/archive_{}.tar", id)),
            hash: PathBuf::from(format!("/out/archive_{}.tar.sha1", id)),
            size: 20,
            num_files: 2,
            state: JobState::NotStarted,
            started_at: None,
            completed_at: None,
            host_name: None,
            worker_name: None,
            files: vec![
                FileEntry::new("job", id, format!("/src/{}/a", id), "a", 10),
                FileEntry::new("job", id, format!("/src/{}/b", id), "b", 10),
            ],
        };
        Job {
            job_id: "job".to_string(),
            user_name: "erin".to_string(),
            format: ArchiveFormat::Tar,
            max_archive_size: 20,
            num_files: 4,
            total_size: 40,
            num_archives: 2,
            state: JobState::NotStarted,
            submitted_at: Utc::now(),
            completed_at: None,
            archives: vec![archive(1), archive(2)],
        }
    }

    fn laggy(misses: u32) -> (Arc<LaggyStore>, StateTracker) {
        let inner = SqliteJobStore::new(Database::open_in_memory().unwrap());
        inner.persist_job(&sample_job()).unwrap();
        let store = Arc::new(LaggyStore {
            inner,
            misses,
            reads: AtomicU32::new(0),
        });
        let tracker = StateTracker::new(store.clone(), fast_retry());
        (store, tracker)
    }

    fn tracker() -> StateTracker {
        laggy(0).1
    }

    fn identity() -> WorkerIdentity {
        WorkerIdentity::new("node-a", "worker-0")
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.max_wait(), Duration::from_secs(25));
    }

    #[test]
    fn test_found_on_third_read() {
        let (store, tracker) = laggy(2);
        let archive = tracker.find_archive_job_with_retry("job", 1).unwrap();
        assert!(archive.is_some());
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_bound() {
        let (store, tracker) = laggy(100);
        assert!(tracker.find_archive_job_with_retry("job", 1).unwrap().is_none());
        assert_eq!(store.reads.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_claim_stamps_identity() {
        let tracker = tracker();
        let Claim::Claimed(archive) = tracker.claim_archive("job", 1, &identity()).unwrap() else {
            panic!("expected claim");
        };
        assert_eq!(archive.state, JobState::InProgress);

        let stored = tracker.store().get_archive_job("job", 1).unwrap().unwrap();
        assert_eq!(stored.state, JobState::InProgress);
        assert_eq!(stored.host_name.as_deref(), Some("node-a"));
        assert_eq!(stored.worker_name.as_deref(), Some("worker-0"));
        assert!(stored.started_at.is_some());
    }

    #[test]
    fn test_claim_missing_archive() {
        let tracker = tracker();
        assert_eq!(
            tracker.claim_archive("job", 9, &identity()).unwrap(),
            Claim::NotFound
        );
    }

    #[test]
    fn test_claim_terminal_archive_is_skipped() {
        let tracker = tracker();
        tracker.claim_archive("job", 1, &identity()).unwrap();
        tracker
            .finish_archive("job", 1, JobState::Complete, Some(99))
            .unwrap();

        assert_eq!(
            tracker.claim_archive("job", 1, &identity()).unwrap(),
            Claim::AlreadyFinished(JobState::Complete)
        );
    }

    #[test]
    fn test_reclaim_resets_file_states() {
        let tracker = tracker();
        tracker.claim_archive("job", 1, &identity()).unwrap();
        tracker.mark_file_complete("job", 1, "/src/1/a").unwrap();

        let Claim::Claimed(archive) = tracker
            .claim_archive("job", 1, &WorkerIdentity::new("node-b", "worker-3"))
            .unwrap()
        else {
            panic!("expected reclaim");
        };
        assert_eq!(archive.files_complete(), 0);
        let stored = tracker.store().get_archive_job("job", 1).unwrap().unwrap();
        assert_eq!(stored.files_complete(), 0);
        assert_eq!(stored.host_name.as_deref(), Some("node-b"));
    }

    #[test]
    fn test_finish_sees_file_updates_and_corrects_size() {
        let tracker = tracker();
        tracker.claim_archive("job", 1, &identity()).unwrap();
        tracker.mark_file_complete("job", 1, "/src/1/a").unwrap();
        tracker.mark_file_complete("job", 1, "/src/1/b").unwrap();

        let archive = tracker
            .finish_archive("job", 1, JobState::Complete, Some(10_240))
            .unwrap()
            .unwrap();
        assert_eq!(archive.state, JobState::Complete);
        assert_eq!(archive.size, 10_240);
        assert_eq!(archive.files_complete(), 2);
        assert!(archive.completed_at.is_some());
    }

    #[test]
    fn test_terminal_archive_only_takes_size_correction() {
        let tracker = tracker();
        tracker.claim_archive("job", 1, &identity()).unwrap();
        tracker.finish_archive("job", 1, JobState::Error, None).unwrap();

        let archive = tracker
            .finish_archive("job", 1, JobState::Complete, Some(1))
            .unwrap()
            .unwrap();
        assert_eq!(archive.state, JobState::Error);
        assert_eq!(archive.size, 1);
    }

    #[test]
    fn test_job_state_follows_archives() {
        let tracker = tracker();
        assert_eq!(
            tracker.refresh_job_state("job").unwrap().unwrap().state,
            JobState::NotStarted
        );

        tracker.claim_archive("job", 1, &identity()).unwrap();
        assert_eq!(
            tracker.refresh_job_state("job").unwrap().unwrap().state,
            JobState::InProgress
        );

        tracker.finish_archive("job", 1, JobState::Error, None).unwrap();
        assert_eq!(
            tracker.refresh_job_state("job").unwrap().unwrap().state,
            JobState::InProgress
        );

        tracker.claim_archive("job", 2, &identity()).unwrap();
        tracker.finish_archive("job", 2, JobState::Complete, None).unwrap();
        let job = tracker.refresh_job_state("job").unwrap().unwrap();
        assert_eq!(job.state, JobState::Error);
        assert!(job.completed_at.is_some());

        let stored = tracker.store().get_job("job").unwrap().unwrap();
        assert_eq!(stored.state, JobState::Error);
    }

    #[test]
    fn test_metrics_roll_up_jobs() {
        let tracker = tracker();
        tracker
            .store()
            .persist_job(&Job::invalid_request("rejected", "erin", ArchiveFormat::Zip, 0))
            .unwrap();

        tracker.claim_archive("job", 1, &identity()).unwrap();
        tracker.mark_file_complete("job", 1, "/src/1/a").unwrap();
        tracker.mark_file_complete("job", 1, "/src/1/b").unwrap();
        tracker.finish_archive("job", 1, JobState::Complete, None).unwrap();
        tracker.refresh_job_state("job").unwrap();

        let metrics = tracker.metrics().unwrap();
        assert_eq!(metrics.num_jobs, 2);
        assert_eq!(metrics.jobs_in_progress, 1);
        assert_eq!(metrics.jobs_invalid_request, 1);
        assert_eq!(metrics.jobs_finished(), 1);
        assert_eq!(metrics.num_archives, 2);
        assert_eq!(metrics.archives_complete, 1);
        assert_eq!(metrics.num_files, 4);
        assert_eq!(metrics.files_complete, 2);
        assert_eq!(metrics.total_size, 40);
        assert_eq!(metrics.size_complete, 20);
    }

    #[test]
    fn test_report_for_missing_job() {
        let tracker = tracker();
        assert!(tracker.report("nope").unwrap().is_none());
        assert_eq!(tracker.report("job").unwrap().unwrap().num_archives, 2);
    }
}
