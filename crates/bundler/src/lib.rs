pub mod archive;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod entry_path;
pub mod error;
pub mod factory;
pub mod hash;
pub mod location;
pub mod logging;
pub mod model;
pub mod partition;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod worker;

pub use broadcast::{ArchiveProgressBroadcaster, ArchiveProgressEvent, ProgressReporter};
pub use config::{load_config, BundlerConfig};
pub use db::Database;
pub use dispatch::{ArchiveMessage, ChannelQueue, MessageQueue, SqliteQueue};
pub use entry_path::EntryPathResolver;
pub use error::{
    ArchiveError, BundlerError, ConfigError, HashError, PartitionError, QueueError, Result,
    StorageError, StoreError, ValidationError, WorkerError,
};
pub use factory::{BundleRequest, JobFactory, RequestedFile};
pub use hash::HashAlgorithm;
pub use model::{ArchiveFormat, ArchiveJob, FileEntry, Job, JobState};
pub use store::{JobStore, SqliteJobStore};
pub use tracker::{BundlerMetrics, RetryPolicy, StateTracker, WorkerIdentity};
pub use worker::{ArchiveWorker, CompletionAggregator, WorkerPool};
