//! Broadcasting of archive build progress for real-time streaming.

pub mod archive_progress;

pub use archive_progress::{
    ArchivePhase, ArchiveProgressBroadcaster, ArchiveProgressEvent, NoopProgress,
    ProgressReporter,
};
