use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Identifies one archive of one job. Used both as the work message sent to
/// archive workers and as the completion notice they send back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveMessage {
    pub job_id: String,
    pub archive_id: u32,
}

impl ArchiveMessage {
    pub fn new(job_id: impl Into<String>, archive_id: u32) -> Self {
        Self {
            job_id: job_id.into(),
            archive_id,
        }
    }

    pub fn to_json(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for ArchiveMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.job_id, self.archive_id)
    }
}
