use std::path::Path;

use crate::config::schema::{BundlerConfig, MAX_EXCLUSIONS};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BundlerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<BundlerConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: BundlerConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express.
pub fn validate_config(config: &BundlerConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.staging_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "staging_directory must not be blank".to_string(),
        });
    }

    if config.max_archive_size_mb <= 0 {
        return Err(ConfigError::Validation {
            message: format!(
                "max_archive_size_mb must be positive, got {}",
                config.max_archive_size_mb
            ),
        });
    }

    if config.exclude_path_prefixes.len() > MAX_EXCLUSIONS {
        return Err(ConfigError::Validation {
            message: format!(
                "At most {} exclude_path_prefixes are supported, got {}",
                MAX_EXCLUSIONS,
                config.exclude_path_prefixes.len()
            ),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be > 0".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use crate::model::ArchiveFormat;
    use std::time::Duration;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "staging_directory": "/staging",
            "database_path": "/var/lib/bundler/bundler.db",
            "exclude_path_prefixes": ["/mnt/raster", "/mnt/fbga"],
            "default_archive_format": "tar.bz2",
            "max_archive_size_mb": 100,
            "hash_algorithm": "SHA256",
            "worker_count": 4,
            "node_name": "builder-1",
            "retry": { "max_attempts": 3, "delay_ms": 250 },
            "logging": { "level": "debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.staging_directory, "/staging");
        assert_eq!(config.exclude_path_prefixes, vec!["/mnt/raster", "/mnt/fbga"]);
        assert_eq!(config.default_archive_format, ArchiveFormat::TarBzip2);
        assert_eq!(config.max_archive_size_mb, 100);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.node_name(), "builder-1");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 250);
        assert!(config.logging.json);
    }

    #[test]
    fn test_defaults_applied() {
        let config =
            load_config_from_str(r#"{ "version": "1.0", "staging_directory": "/staging" }"#)
                .unwrap();
        assert_eq!(config.default_archive_format, ArchiveFormat::Zip);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha1);
        assert_eq!(config.worker_count, num_cpus::get());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_ms, 5000);
        assert_eq!(config.logging.level, "info");
        assert!(config.exclude_path_prefixes.is_empty());

        let policy: crate::tracker::RetryPolicy = config.retry.into();
        assert_eq!(policy.max_wait(), Duration::from_secs(25));
    }

    #[test]
    fn test_invalid_version() {
        let result =
            load_config_from_str(r#"{ "version": "2.0", "staging_directory": "/staging" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_missing_staging_directory() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_format_rejected_by_schema() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "staging_directory": "/s", "default_archive_format": "rar" }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_non_positive_size() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "staging_directory": "/s", "max_archive_size_mb": 0 }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_zero_workers() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "staging_directory": "/s", "worker_count": 0 }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_too_many_exclusions() {
        let prefixes: Vec<String> = (0..=MAX_EXCLUSIONS).map(|i| format!("/p{}", i)).collect();
        let json = serde_json::json!({
            "version": "1.0",
            "staging_directory": "/s",
            "exclude_path_prefixes": prefixes,
        });
        let result = load_config_from_str(&json.to_string());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/definitely/not/here/bundler.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
