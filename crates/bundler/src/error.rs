use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Reasons a bundle request is rejected before any archive is planned.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Job identifier '{0}' may only use letters, digits, '-', '_' and '.'")]
    InvalidJobId(String),

    #[error("Request contains no files to bundle")]
    EmptyFileList,

    #[error("Maximum archive size must be positive, got {0} MB")]
    NonPositiveSize(i64),

    #[error("File at index {index} has a blank location")]
    BlankLocation { index: usize },

    #[error("Unable to read '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("No files supplied to partition")]
    EmptyInput,

    #[error("Maximum archive size must be greater than zero bytes")]
    InvalidLimit,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to write archive '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open source '{location}': {source}")]
    OpenSource {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported source scheme '{scheme}' for '{location}'")]
    UnsupportedScheme { location: String, scheme: String },

    #[error("Zip encoding failed for '{path}': {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Entry '{entry}' is {size} bytes, which exceeds the {format} entry size limit")]
    EntryTooLarge {
        entry: String,
        size: u64,
        format: &'static str,
    },

    #[error("Source '{location}' yielded {actual} bytes, expected {expected}")]
    ShortRead {
        location: String,
        expected: u64,
        actual: u64,
    },
}

#[derive(Error, Debug)]
pub enum HashError {
    #[error("Source '{0}' does not exist")]
    MissingSource(PathBuf),

    #[error("Failed to read '{path}' for hashing: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write hash file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Cannot hash non-local location '{0}'")]
    UnsupportedLocation(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove directory '{path}': {source}")]
    RemoveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job identifier for a staging directory: '{0}'")]
    InvalidJobId(String),
}

/// Failures talking to the durable job store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(crate::db::DatabaseError),

    /// The store could not be reached. Nothing was read or written.
    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid record for job '{job_id}': {reason}")]
    InvalidRecord { job_id: String, reason: String },
}

impl From<crate::db::DatabaseError> for StoreError {
    fn from(e: crate::db::DatabaseError) -> Self {
        if e.is_unavailable() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Database(e)
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue '{0}' is closed")]
    Closed(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Malformed message {id} on queue '{queue}': {reason}")]
    Malformed {
        queue: String,
        id: i64,
        reason: String,
    },

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Failed to dispatch work: {0}")]
    Dispatch(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, BundlerError>;
