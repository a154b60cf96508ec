use std::io::{Read, Write};
use std::path::Path;

use ::tar::{Builder, EntryType, Header};
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;

use super::{create_output, finish_output, has_elements, open_source, ArchiveElement, Archiver};
use crate::error::ArchiveError;
use crate::model::ArchiveFormat;

/// Compression wrapped around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
}

/// Writes ustar/GNU tar archives, optionally compressed.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    compression: TarCompression,
}

impl TarArchiver {
    pub fn new(compression: TarCompression) -> Self {
        Self { compression }
    }
}

impl Archiver for TarArchiver {
    fn format(&self) -> ArchiveFormat {
        match self.compression {
            TarCompression::None => ArchiveFormat::Tar,
            TarCompression::Gzip => ArchiveFormat::TarGzip,
            TarCompression::Bzip2 => ArchiveFormat::TarBzip2,
        }
    }

    fn build(
        &self,
        elements: &[ArchiveElement],
        output: &Path,
        on_complete: &mut dyn FnMut(&ArchiveElement),
    ) -> Result<(), ArchiveError> {
        if !has_elements(elements, output) {
            return Ok(());
        }
        let started = std::time::Instant::now();
        let write_err = |e| ArchiveError::Write {
            path: output.to_path_buf(),
            source: e,
        };

        let file = create_output(output)?;
        let file = match self.compression {
            TarCompression::None => write_entries(file, elements, output, on_complete)?,
            TarCompression::Gzip => {
                let encoder = GzEncoder::new(file, flate2::Compression::default());
                write_entries(encoder, elements, output, on_complete)?
                    .finish()
                    .map_err(write_err)?
            }
            TarCompression::Bzip2 => {
                let encoder = BzEncoder::new(file, bzip2::Compression::default());
                write_entries(encoder, elements, output, on_complete)?
                    .finish()
                    .map_err(write_err)?
            }
        };
        finish_output(file, output)?;

        log::debug!(
            "Archive {} ({} entries) created in {} ms",
            output.display(),
            elements.len(),
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

fn write_entries<W: Write>(
    writer: W,
    elements: &[ArchiveElement],
    output: &Path,
    on_complete: &mut dyn FnMut(&ArchiveElement),
) -> Result<W, ArchiveError> {
    let write_err = |e| ArchiveError::Write {
        path: output.to_path_buf(),
        source: e,
    };
    let mut builder = Builder::new(writer);

    for element in elements {
        let source = open_source(element)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(source.len);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(source.mtime);

        let mut data = source.file.take(source.len);
        builder
            .append_data(&mut header, &element.entry_path, &mut data)
            .map_err(write_err)?;
        if data.limit() > 0 {
            return Err(ArchiveError::ShortRead {
                location: element.location.clone(),
                expected: source.len,
                actual: source.len - data.limit(),
            });
        }

        on_complete(element);
    }

    builder.into_inner().map_err(write_err)
}
