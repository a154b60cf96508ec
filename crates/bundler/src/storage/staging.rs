use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::hash::HashAlgorithm;
use crate::model::ArchiveFormat;

const DEFAULT_BASE_NAME: &str = "archive";

/// Output locations for archives and their hash side-cars.
///
/// Layout: `<root>/<job_id>/<base>_<archive_id>.<ext>` with the side-car at
/// `<same path>.<hash ext>`.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of `job_id`, created on demand.
    pub fn job_directory(&self, job_id: &str) -> Result<PathBuf, StorageError> {
        validate_job_id(job_id)?;
        let dir = self.root.join(job_id);
        self.ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Deterministic archive location for one archive of a job.
    pub fn archive_path(
        &self,
        job_id: &str,
        output_filename: Option<&str>,
        archive_id: u32,
        format: ArchiveFormat,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.job_directory(job_id)?;
        let base = output_filename
            .map(sanitize_base_name)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());
        Ok(dir.join(format!("{}_{}.{}", base, archive_id, format.extension())))
    }

    /// Removes every artifact of `job_id`. Missing directories are ignored.
    pub fn remove_job(&self, job_id: &str) -> Result<(), StorageError> {
        validate_job_id(job_id)?;
        let dir = self.root.join(job_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveDirectory {
                path: dir,
                source: e,
            }),
        }
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Side-car location for `archive`: the archive path plus the algorithm's
/// extension.
pub fn hash_path(archive: &Path, algorithm: HashAlgorithm) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".");
    name.push(algorithm.extension());
    PathBuf::from(name)
}

/// Accepts ids usable as a single directory name.
pub fn validate_job_id(job_id: &str) -> Result<(), StorageError> {
    let valid = !job_id.is_empty()
        && job_id != "."
        && job_id != ".."
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidJobId(job_id.to_string()))
    }
}

/// Keeps a client-supplied base name to a safe single path segment.
fn sanitize_base_name(name: &str) -> String {
    let name = name.trim();
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
