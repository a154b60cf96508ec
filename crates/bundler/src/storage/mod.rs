pub mod staging;

pub use staging::{hash_path, validate_job_id, StagingArea};
