use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::hash::HashAlgorithm;
use crate::model::ArchiveFormat;
use crate::tracker::RetryPolicy;

/// Upper bound on configured path-prefix exclusions.
pub const MAX_EXCLUSIONS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerConfig {
    pub version: String,
    pub staging_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub exclude_path_prefixes: Vec<String>,
    #[serde(default)]
    pub default_archive_format: ArchiveFormat,
    #[serde(default = "default_max_archive_size_mb")]
    pub max_archive_size_mb: i64,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_archive_size_mb() -> i64 {
    400
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl BundlerConfig {
    /// Configured database location, falling back to the per-user default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }

    /// Name this process stamps on the archives it builds.
    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.trim().is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    crate::tracker::DEFAULT_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    crate::tracker::DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Reads exclusions from flat `exclude_path_prefix_<n>` properties, also
/// accepting a `bundler.` key prefix. Indices are scanned in order up to
/// [`MAX_EXCLUSIONS`]; blank values are skipped.
pub fn exclusions_from_properties(properties: &HashMap<String, String>) -> Vec<String> {
    (0..MAX_EXCLUSIONS)
        .filter_map(|i| {
            let key = format!("exclude_path_prefix_{}", i);
            properties
                .get(&key)
                .or_else(|| properties.get(&format!("bundler.{}", key)))
        })
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
