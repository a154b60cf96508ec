//! Archive format strategies.
//!
//! Every strategy writes its elements in order, one entry per element, and
//! calls the completion callback after each entry has been fully written.
//! A failed build leaves the output in an undefined state.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::ArchiveError;
use crate::location::SourceLocation;
use crate::model::{ArchiveFormat, FileEntry};

pub mod cpio;
pub mod tar;
pub mod zip;

pub use self::cpio::CpioArchiver;
pub use self::tar::{TarArchiver, TarCompression};
pub use self::zip::ZipArchiver;

/// One file to be written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveElement {
    pub location: String,
    pub entry_path: String,
    pub size: u64,
}

impl ArchiveElement {
    pub fn new(location: impl Into<String>, entry_path: impl Into<String>, size: u64) -> Self {
        Self {
            location: location.into(),
            entry_path: entry_path.into(),
            size,
        }
    }
}

impl From<&FileEntry> for ArchiveElement {
    fn from(entry: &FileEntry) -> Self {
        Self::new(entry.source.clone(), entry.entry_path.clone(), entry.size)
    }
}

/// Builds one archive in a specific container format.
pub trait Archiver: Send + Sync {
    fn format(&self) -> ArchiveFormat;

    /// Writes `elements` to `output` in order. Any file already at `output`
    /// is removed first. `on_complete` runs once per element after its bytes
    /// are written and never for an element that failed.
    fn build(
        &self,
        elements: &[ArchiveElement],
        output: &Path,
        on_complete: &mut dyn FnMut(&ArchiveElement),
    ) -> Result<(), ArchiveError>;
}

/// Selects the strategy for `format`.
pub fn archiver_for(format: ArchiveFormat) -> Box<dyn Archiver> {
    match format {
        ArchiveFormat::Tar => Box::new(TarArchiver::new(TarCompression::None)),
        ArchiveFormat::TarGzip => Box::new(TarArchiver::new(TarCompression::Gzip)),
        ArchiveFormat::TarBzip2 => Box::new(TarArchiver::new(TarCompression::Bzip2)),
        ArchiveFormat::Zip => Box::new(ZipArchiver::new()),
        ArchiveFormat::Cpio => Box::new(CpioArchiver::new()),
    }
}

/// Removes any previous output and opens a fresh buffered file.
pub(crate) fn create_output(output: &Path) -> Result<BufWriter<File>, ArchiveError> {
    let write_err = |e| ArchiveError::Write {
        path: output.to_path_buf(),
        source: e,
    };

    match std::fs::remove_file(output) {
        Ok(()) => log::debug!("Removed existing archive {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e)),
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    File::create(output).map(BufWriter::new).map_err(write_err)
}

/// An opened source with the metadata needed for an entry header.
pub(crate) struct OpenedSource {
    pub file: File,
    pub len: u64,
    pub mtime: u64,
}

pub(crate) fn open_source(element: &ArchiveElement) -> Result<OpenedSource, ArchiveError> {
    let location = SourceLocation::parse(&element.location);
    let file = location.open()?;
    let metadata = file.metadata().map_err(|e| ArchiveError::OpenSource {
        location: element.location.clone(),
        source: e,
    })?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if metadata.len() != element.size {
        log::debug!(
            "Size of {} changed since planning: {} -> {} bytes",
            element.location,
            element.size,
            metadata.len()
        );
    }
    Ok(OpenedSource {
        file,
        len: metadata.len(),
        mtime,
    })
}

/// Flushes and syncs the finished archive.
pub(crate) fn finish_output(mut writer: BufWriter<File>, output: &Path) -> Result<(), ArchiveError> {
    let write_err = |e| ArchiveError::Write {
        path: output.to_path_buf(),
        source: e,
    };
    writer.flush().map_err(write_err)?;
    let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)
}

/// Logs and reports whether there is anything to write.
pub(crate) fn has_elements(elements: &[ArchiveElement], output: &Path) -> bool {
    if elements.is_empty() {
        log::warn!(
            "There are no input files to process, archive {} not created",
            output.display()
        );
        return false;
    }
    true
}
