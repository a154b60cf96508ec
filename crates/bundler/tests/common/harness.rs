//! Test harness for isolated end-to-end runs.
//!
//! `TestHarness` owns a temporary directory with `input/` and `staging/`
//! subdirectories, an in-memory database and in-process work and tracker
//! queues, and wires the factory, workers and aggregator together the way a
//! deployment would.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use bundler::dispatch::{ChannelQueue, MessageQueue};
use bundler::error::StoreError;
use bundler::hash::HashAlgorithm;
use bundler::model::{ArchiveJob, FileEntry, Job, JobState};
use bundler::storage::StagingArea;
use bundler::store::{JobStore, SqliteJobStore};
use bundler::tracker::{RetryPolicy, StateTracker, WorkerIdentity};
use bundler::worker::{ArchiveOutcome, ArchiveWorker, CompletionAggregator};
use bundler::{Database, EntryPathResolver, JobFactory};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub store: Arc<SqliteJobStore>,
    pub work_queue: Arc<ChannelQueue>,
    pub tracker_queue: Arc<ChannelQueue>,
    pub hash_algorithm: HashAlgorithm,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Sha1)
    }

    pub fn with_algorithm(hash_algorithm: HashAlgorithm) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let staging_dir = temp_dir.path().join("staging");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&staging_dir).expect("Failed to create staging dir");

        let db = Database::open_in_memory().expect("Failed to open database");

        Self {
            temp_dir,
            input_dir,
            staging_dir,
            store: Arc::new(SqliteJobStore::new(db)),
            work_queue: Arc::new(ChannelQueue::new(bundler::dispatch::WORK_QUEUE)),
            tracker_queue: Arc::new(ChannelQueue::new(bundler::dispatch::TRACKER_QUEUE)),
            hash_algorithm,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` under the input directory, creating parents.
    pub fn write_input(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create input subdir");
        }
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Writes a file of exactly `size` bytes with position-dependent content.
    pub fn write_sized(&self, relative: &str, size: usize) -> PathBuf {
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        self.write_input(relative, &content)
    }

    pub fn factory(&self, exclusions: &[&str]) -> JobFactory {
        JobFactory::new(
            self.store.clone(),
            self.work_queue.clone(),
            StagingArea::new(&self.staging_dir),
            EntryPathResolver::new(exclusions.iter().copied()),
            self.hash_algorithm,
        )
    }

    pub fn tracker(&self) -> StateTracker {
        StateTracker::new(self.store.clone(), fast_retry())
    }

    pub fn worker(&self, worker_name: &str) -> ArchiveWorker {
        self.worker_on(self.tracker(), worker_name)
    }

    pub fn worker_on(&self, tracker: StateTracker, worker_name: &str) -> ArchiveWorker {
        ArchiveWorker::new(
            tracker,
            self.tracker_queue.clone(),
            self.hash_algorithm,
            WorkerIdentity::new("test-host", worker_name),
        )
    }

    pub fn aggregator(&self) -> CompletionAggregator {
        CompletionAggregator::new(self.tracker(), self.tracker_queue.clone())
    }

    /// Processes every queued work message on the calling thread.
    pub fn run_work_queue(&self, worker: &ArchiveWorker) -> Vec<ArchiveOutcome> {
        let mut outcomes = Vec::new();
        while let Some(delivery) = self
            .work_queue
            .receive(Duration::ZERO)
            .expect("work queue closed")
        {
            outcomes.push(worker.process(&delivery.message));
            self.work_queue
                .acknowledge(&delivery)
                .expect("Failed to acknowledge work");
        }
        outcomes
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.store
            .get_job(job_id)
            .expect("store read failed")
            .expect("job missing")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_millis(5))
}

/// Store whose first `misses` archive reads come back empty, like a replica
/// that has not caught up with a fresh write yet.
pub struct LaggyStore {
    inner: Arc<dyn JobStore>,
    misses: u32,
    reads: AtomicU32,
}

impl LaggyStore {
    pub fn new(inner: Arc<dyn JobStore>, misses: u32) -> Self {
        Self {
            inner,
            misses,
            reads: AtomicU32::new(0),
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
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
        self.inner
            .update_file_entry_state(job_id, archive_id, source, state)
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
