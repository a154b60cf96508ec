use std::io::Read;
use std::path::Path;

use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};

use super::{create_output, finish_output, has_elements, open_source, ArchiveElement, Archiver};
use crate::error::ArchiveError;
use crate::model::ArchiveFormat;

/// Entries at or above this size need ZIP64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Writes deflate-compressed zip archives.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for ZipArchiver {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
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
        let zip_err = |e| ArchiveError::Zip {
            path: output.to_path_buf(),
            source: e,
        };

        let mut writer = ZipWriter::new(create_output(output)?);
        let base_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        for element in elements {
            let source = open_source(element)?;
            let options = base_options.large_file(source.len >= ZIP64_THRESHOLD);

            writer
                .start_file(element.entry_path.as_str(), options)
                .map_err(zip_err)?;

            let mut data = source.file.take(source.len);
            let copied = std::io::copy(&mut data, &mut writer).map_err(|e| ArchiveError::Write {
                path: output.to_path_buf(),
                source: e,
            })?;
            if copied != source.len {
                return Err(ArchiveError::ShortRead {
                    location: element.location.clone(),
                    expected: source.len,
                    actual: copied,
                });
            }

            on_complete(element);
        }

        let file = writer.finish().map_err(zip_err)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{elements, missing_element};
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_zip_round_trip_preserves_order_and_contents() {
        let dir = TempDir::new().unwrap();
        let big = vec![b'z'; 200_000];
        let elements = elements(
            &dir,
            &[
                ("alpha.txt", b"alpha".as_slice()),
                ("big.txt", big.as_slice()),
                ("gamma.txt", b"gamma".as_slice()),
            ],
        );
        let output = dir.path().join("out.zip");

        let mut completed = Vec::new();
        ZipArchiver::new()
            .build(&elements, &output, &mut |e| completed.push(e.entry_path.clone()))
            .unwrap();
        assert_eq!(completed.len(), 3);

        let mut archive = ::zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["data/alpha.txt", "data/big.txt", "data/gamma.txt"]);

        let mut entry = archive.by_name("data/big.txt").unwrap();
        assert_eq!(entry.size(), 200_000);
        assert!(entry.compressed_size() < entry.size());
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, big);
    }

    #[test]
    fn test_failure_stops_callbacks() {
        let dir = TempDir::new().unwrap();
        let mut elements = elements(&dir, &[("a.txt", b"a".as_slice())]);
        elements.push(missing_element(dir.path()));
        let output = dir.path().join("broken.zip");

        let mut calls = 0;
        let result = ZipArchiver::new().build(&elements, &output, &mut |_| calls += 1);
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
