//! Builders for bundle requests used across integration tests.

#![allow(dead_code)]

use std::path::Path;

use bundler::factory::{BundleRequest, RequestedFile};
use bundler::model::ArchiveFormat;

pub struct RequestBuilder {
    job_id: Option<String>,
    user_name: String,
    format: Option<ArchiveFormat>,
    max_size_mb: Option<i64>,
    output_filename: Option<String>,
    files: Vec<RequestedFile>,
}

impl RequestBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
            user_name: "tester".to_string(),
            format: Some(ArchiveFormat::Zip),
            max_size_mb: Some(400),
            output_filename: None,
            files: Vec::new(),
        }
    }

    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn max_size_mb(mut self, max_size_mb: i64) -> Self {
        self.max_size_mb = Some(max_size_mb);
        self
    }

    /// Leaves format and size for the factory to fill in.
    pub fn factory_defaults(mut self) -> Self {
        self.format = None;
        self.max_size_mb = None;
        self
    }

    pub fn output_filename(mut self, name: &str) -> Self {
        self.output_filename = Some(name.to_string());
        self
    }

    /// Adds an on-disk file, using its real size.
    pub fn file(mut self, path: &Path) -> Self {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.files
            .push(RequestedFile::new(path.to_string_lossy(), size));
        self
    }

    /// Adds a file with a declared size, whether or not it exists.
    pub fn declared(mut self, location: &str, size: u64) -> Self {
        self.files.push(RequestedFile::new(location, size));
        self
    }

    pub fn files(mut self, files: Vec<RequestedFile>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn build(self) -> BundleRequest {
        BundleRequest {
            job_id: self.job_id,
            user_name: self.user_name,
            format: self.format,
            max_size_mb: self.max_size_mb,
            output_filename: self.output_filename,
            files: self.files,
        }
    }
}
