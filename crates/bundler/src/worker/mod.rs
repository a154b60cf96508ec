pub mod aggregator;
pub mod archiver;
pub mod pool;

pub use aggregator::CompletionAggregator;
pub use archiver::{ArchiveOutcome, ArchiveWorker, OutcomeStatus};
pub use pool::WorkerPool;
