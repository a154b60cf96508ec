//! Turns a bundle request into a persisted job and one work message per
//! planned archive.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::BundlerConfig;
use crate::dispatch::{ArchiveMessage, MessageQueue};
use crate::entry_path::EntryPathResolver;
use crate::error::{Result, ValidationError};
use crate::hash::HashAlgorithm;
use crate::model::{ArchiveFormat, ArchiveJob, FileEntry, Job, JobState};
use crate::partition::{partition, Group, Weighted};
use crate::storage::{hash_path, validate_job_id, StagingArea};
use crate::store::JobStore;

pub const BYTES_PER_MEGABYTE: u64 = 1_048_576;
pub const DEFAULT_MAX_ARCHIVE_SIZE_MB: i64 = 400;

/// A client's request to bundle a set of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    /// Generated when absent.
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    /// The factory's default format when absent.
    #[serde(default)]
    pub format: Option<ArchiveFormat>,
    /// Maximum size of each output archive, in megabytes. The factory's
    /// default when absent.
    #[serde(default)]
    pub max_size_mb: Option<i64>,
    /// Base name for output archives; `archive` when absent.
    #[serde(default)]
    pub output_filename: Option<String>,
    #[serde(default)]
    pub files: Vec<RequestedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedFile {
    pub location: String,
    pub size: u64,
    /// Explicit path inside the archive; derived from `location` when absent.
    #[serde(default)]
    pub entry_path: Option<String>,
}

impl RequestedFile {
    pub fn new(location: impl Into<String>, size: u64) -> Self {
        Self {
            location: location.into(),
            size,
            entry_path: None,
        }
    }

    pub fn with_entry_path(mut self, entry_path: impl Into<String>) -> Self {
        self.entry_path = Some(entry_path.into());
        self
    }
}

impl Weighted for RequestedFile {
    fn weight(&self) -> u64 {
        self.size
    }
}

pub struct JobFactory {
    store: Arc<dyn JobStore>,
    work_queue: Arc<dyn MessageQueue>,
    staging: StagingArea,
    resolver: EntryPathResolver,
    hash_algorithm: HashAlgorithm,
    default_format: ArchiveFormat,
    default_max_size_mb: i64,
}

impl JobFactory {
    pub fn new(
        store: Arc<dyn JobStore>,
        work_queue: Arc<dyn MessageQueue>,
        staging: StagingArea,
        resolver: EntryPathResolver,
        hash_algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            store,
            work_queue,
            staging,
            resolver,
            hash_algorithm,
            default_format: ArchiveFormat::default(),
            default_max_size_mb: DEFAULT_MAX_ARCHIVE_SIZE_MB,
        }
    }

    pub fn from_config(
        config: &BundlerConfig,
        store: Arc<dyn JobStore>,
        work_queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self::new(
            store,
            work_queue,
            StagingArea::new(&config.staging_directory),
            EntryPathResolver::new(config.exclude_path_prefixes.iter()),
            config.hash_algorithm,
        )
        .with_defaults(config.default_archive_format, config.max_archive_size_mb)
    }

    /// Format and archive size applied to requests that leave them out.
    pub fn with_defaults(mut self, format: ArchiveFormat, max_size_mb: i64) -> Self {
        self.default_format = format;
        self.default_max_size_mb = max_size_mb;
        self
    }

    pub fn resolver(&self) -> &EntryPathResolver {
        &self.resolver
    }

    /// Plans, persists and dispatches a job.
    ///
    /// A request that fails validation is still persisted, as a terminal
    /// `INVALID_REQUEST` job with no archives, and nothing is dispatched.
    pub fn create_job(&self, request: BundleRequest) -> Result<Job> {
        let job_id = request
            .job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let span = tracing::info_span!("create_job", job_id = %job_id);
        let _enter = span.enter();

        let format = request.format.unwrap_or(self.default_format);
        let max_size_mb = request.max_size_mb.unwrap_or(self.default_max_size_mb);

        if let Err(e) = validate(&job_id, max_size_mb, &request.files) {
            warn!("Rejecting bundle request {}: {}", job_id, e);
            let job =
                Job::invalid_request(job_id, request.user_name, format, max_bytes(max_size_mb));
            self.store.persist_job(&job)?;
            return Ok(job);
        }

        let max_archive_size = max_bytes(max_size_mb);
        let files = collapse_duplicates(request.files);
        let groups = partition(files, max_archive_size, format)?;

        let archives = groups
            .into_iter()
            .map(|group| self.plan_archive(&job_id, request.output_filename.as_deref(), group))
            .collect::<Result<Vec<ArchiveJob>>>()?;

        let job = Job {
            job_id: job_id.clone(),
            user_name: request.user_name,
            format,
            max_archive_size,
            num_files: archives.iter().map(|a| u64::from(a.num_files)).sum(),
            total_size: archives.iter().map(|a| a.size).sum(),
            num_archives: archives.len() as u32,
            state: JobState::NotStarted,
            submitted_at: Utc::now(),
            completed_at: None,
            archives,
        };

        self.store.persist_job(&job)?;

        for archive in &job.archives {
            self.work_queue
                .publish(&ArchiveMessage::new(&job.job_id, archive.archive_id))?;
        }

        info!(
            "Created job {} for '{}': {} files, {} bytes in {} {} archive(s)",
            job.job_id,
            job.user_name,
            job.num_files,
            job.total_size,
            job.num_archives,
            job.format
        );
        Ok(job)
    }

    /// Removes a job's staged artifacts and then its records. Returns
    /// whether the job was known to the store.
    pub fn delete_job(&self, job_id: &str) -> Result<bool> {
        if validate_job_id(job_id).is_ok() {
            self.staging.remove_job(job_id)?;
        }
        let existed = self.store.delete_job(job_id)?;
        if existed {
            info!("Deleted job {}", job_id);
        }
        Ok(existed)
    }

    /// Lists every regular file under `base_dir`, with entry paths rooted at
    /// `archive_path`.
    pub fn expand_directory(
        &self,
        base_dir: &Path,
        archive_path: &str,
    ) -> std::result::Result<Vec<RequestedFile>, ValidationError> {
        let base = base_dir.to_string_lossy();
        let mut files = Vec::new();

        for entry in WalkDir::new(base_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ValidationError::Unreadable {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| base_dir.to_path_buf()),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| ValidationError::Unreadable {
                path: entry.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            let location = entry.path().to_string_lossy().into_owned();
            let entry_path = self
                .resolver
                .resolve_with_base(&location, &base, archive_path);
            files.push(RequestedFile {
                location,
                size: metadata.len(),
                entry_path: Some(entry_path),
            });
        }

        debug!(
            "Expanded '{}' into {} file(s)",
            base_dir.display(),
            files.len()
        );
        Ok(files)
    }

    fn plan_archive(
        &self,
        job_id: &str,
        output_filename: Option<&str>,
        group: Group<RequestedFile>,
    ) -> Result<ArchiveJob> {
        let archive = self
            .staging
            .archive_path(job_id, output_filename, group.archive_id, group.format)?;
        let hash = hash_path(&archive, self.hash_algorithm);

        let mut used: HashSet<String> = HashSet::with_capacity(group.items.len());
        let files: Vec<FileEntry> = group
            .items
            .into_iter()
            .map(|file| {
                let resolved = self
                    .resolver
                    .resolve_entry(&file.location, file.entry_path.as_deref());
                let entry_path = unique_entry_path(&self.resolver, &mut used, resolved);
                FileEntry::new(job_id, group.archive_id, file.location, entry_path, file.size)
            })
            .collect();

        Ok(ArchiveJob {
            job_id: job_id.to_string(),
            archive_id: group.archive_id,
            format: group.format,
            archive,
            hash,
            size: group.total_size,
            num_files: files.len() as u32,
            state: JobState::NotStarted,
            started_at: None,
            completed_at: None,
            host_name: None,
            worker_name: None,
            files,
        })
    }
}

fn validate(
    job_id: &str,
    max_size_mb: i64,
    files: &[RequestedFile],
) -> std::result::Result<(), ValidationError> {
    if validate_job_id(job_id).is_err() {
        return Err(ValidationError::InvalidJobId(job_id.to_string()));
    }
    if files.is_empty() {
        return Err(ValidationError::EmptyFileList);
    }
    if max_size_mb <= 0 {
        return Err(ValidationError::NonPositiveSize(max_size_mb));
    }
    if let Some(index) = files.iter().position(|f| f.location.trim().is_empty()) {
        return Err(ValidationError::BlankLocation { index });
    }
    Ok(())
}

fn max_bytes(max_size_mb: i64) -> u64 {
    u64::try_from(max_size_mb)
        .unwrap_or(0)
        .saturating_mul(BYTES_PER_MEGABYTE)
}

/// Keeps the first request for each source location.
fn collapse_duplicates(files: Vec<RequestedFile>) -> Vec<RequestedFile> {
    let mut seen = HashSet::with_capacity(files.len());
    let before = files.len();
    let kept: Vec<RequestedFile> = files
        .into_iter()
        .filter(|f| seen.insert(f.location.clone()))
        .collect();
    if kept.len() != before {
        debug!("Dropped {} duplicate source(s)", before - kept.len());
    }
    kept
}

fn unique_entry_path(
    resolver: &EntryPathResolver,
    used: &mut HashSet<String>,
    entry_path: String,
) -> String {
    if used.insert(entry_path.clone()) {
        return entry_path;
    }
    let mut n = 1;
    loop {
        let candidate = resolver.numbered(&entry_path, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
