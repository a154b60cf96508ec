//! Job, archive and file records plus their lifecycle states.

pub mod format;
pub mod job;
pub mod state;

pub use format::ArchiveFormat;
pub use job::{ArchiveJob, FileEntry, Job};
pub use state::{derive_job_state, JobState, UnknownState};
