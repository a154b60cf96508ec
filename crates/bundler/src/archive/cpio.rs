//! SVR4 "newc" cpio writer.
//!
//! Layout per entry: a 110 byte ASCII header (`070701` followed by thirteen
//! 8-digit hex fields), the NUL-terminated name padded to a 4 byte
//! boundary, then the file data padded to a 4 byte boundary. The archive
//! ends with an entry named `TRAILER!!!`.

use std::io::{self, Read, Write};
use std::path::Path;

use super::{create_output, finish_output, has_elements, open_source, ArchiveElement, Archiver};
use crate::error::ArchiveError;
use crate::model::ArchiveFormat;

const NEWC_MAGIC: &str = "070701";
const TRAILER_NAME: &str = "TRAILER!!!";
const HEADER_LEN: usize = 110;
const MODE_REGULAR_FILE: u32 = 0o100644;

/// Streaming newc encoder.
pub struct CpioWriter<W: Write> {
    inner: W,
    next_ino: u32,
}

impl<W: Write> CpioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, next_ino: 1 }
    }

    /// Appends one regular file of exactly `size` bytes read from `data`.
    /// Returns the number of bytes copied.
    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        size: u32,
        mtime: u32,
        data: &mut R,
    ) -> io::Result<u64> {
        let ino = self.next_ino;
        self.next_ino = self.next_ino.wrapping_add(1);
        self.write_header(name, ino, MODE_REGULAR_FILE, 1, mtime, size)?;

        let copied = io::copy(&mut data.take(size as u64), &mut self.inner)?;
        self.pad(copied as usize)?;
        Ok(copied)
    }

    /// Writes the trailer entry and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_header(TRAILER_NAME, 0, 0, 1, 0, 0)?;
        Ok(self.inner)
    }

    fn write_header(
        &mut self,
        name: &str,
        ino: u32,
        mode: u32,
        nlink: u32,
        mtime: u32,
        size: u32,
    ) -> io::Result<()> {
        let namesize = name.len() + 1;
        let header = format!(
            "{}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
            NEWC_MAGIC,
            ino,
            mode,
            0, // uid
            0, // gid
            nlink,
            mtime,
            size,
            0, // devmajor
            0, // devminor
            0, // rdevmajor
            0, // rdevminor
            namesize,
            0, // check
        );
        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(&[0])?;
        self.pad(HEADER_LEN + namesize)
    }

    fn pad(&mut self, written: usize) -> io::Result<()> {
        let padding = (4 - written % 4) % 4;
        self.inner.write_all(&[0u8; 3][..padding])
    }
}

/// Writes uncompressed newc cpio archives.
#[derive(Debug, Clone, Default)]
pub struct CpioArchiver;

impl CpioArchiver {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for CpioArchiver {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Cpio
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
        let write_err = |e| ArchiveError::Write {
            path: output.to_path_buf(),
            source: e,
        };

        let mut writer = CpioWriter::new(create_output(output)?);

        for element in elements {
            let mut source = open_source(element)?;
            let size = u32::try_from(source.len).map_err(|_| ArchiveError::EntryTooLarge {
                entry: element.entry_path.clone(),
                size: source.len,
                format: "cpio",
            })?;
            let mtime = u32::try_from(source.mtime).unwrap_or(u32::MAX);

            let copied = writer
                .append_file(&element.entry_path, size, mtime, &mut source.file)
                .map_err(write_err)?;
            if copied != source.len {
                return Err(ArchiveError::ShortRead {
                    location: element.location.clone(),
                    expected: source.len,
                    actual: copied,
                });
            }

            on_complete(element);
        }

        let file = writer.finish().map_err(write_err)?;
        finish_output(file, output)?;
        log::debug!(
            "Archive {} ({} entries) created",
            output.display(),
            elements.len()
        );
        Ok(())
    }
}
