//! Streaming file digests and integrity side-car files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::HashError;
use crate::location::SourceLocation;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    Md5,
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Side-car file extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "MD5" => Ok(HashAlgorithm::Md5),
            "SHA1" => Ok(HashAlgorithm::Sha1),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(HashError::UnknownAlgorithm(value.to_string())),
        }
    }
}

/// Hex digest of everything `reader` yields.
pub fn hash_reader<R: Read>(reader: &mut R, algorithm: HashAlgorithm) -> std::io::Result<String> {
    match algorithm {
        HashAlgorithm::Md5 => digest_reader::<Md5, _>(reader),
        HashAlgorithm::Sha1 => digest_reader::<Sha1, _>(reader),
        HashAlgorithm::Sha256 => digest_reader::<Sha256, _>(reader),
        HashAlgorithm::Sha384 => digest_reader::<Sha384, _>(reader),
        HashAlgorithm::Sha512 => digest_reader::<Sha512, _>(reader),
    }
}

fn digest_reader<D: Digest, R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex digest of the file at `path`, streamed in fixed-size chunks.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    if !path.exists() {
        return Err(HashError::MissingSource(path.to_path_buf()));
    }
    let mut file = File::open(path).map_err(|e| HashError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    hash_reader(&mut file, algorithm).map_err(|e| HashError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Like [`hash_file`] but for a source location; a missing source yields
/// `Ok(None)` rather than an error.
pub fn hash_location(location: &str, algorithm: HashAlgorithm) -> Result<Option<String>, HashError> {
    let parsed = SourceLocation::parse(location);
    let path = parsed
        .local_path()
        .ok_or_else(|| HashError::UnsupportedLocation(location.to_string()))?;

    match hash_file(&path, algorithm) {
        Ok(digest) => Ok(Some(digest)),
        Err(HashError::MissingSource(missing)) => {
            log::warn!(
                "Unable to hash '{}': file does not exist",
                missing.display()
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Hashes `archive` and writes the hex digest as the entire contents of
/// `sidecar`. Returns the digest.
pub fn write_sidecar(
    archive: &Path,
    sidecar: &Path,
    algorithm: HashAlgorithm,
) -> Result<String, HashError> {
    let digest = hash_file(archive, algorithm)?;
    std::fs::write(sidecar, digest.as_bytes()).map_err(|e| HashError::Write {
        path: sidecar.to_path_buf(),
        source: e,
    })?;
    log::debug!(
        "Wrote {} digest of {} to {}",
        algorithm,
        archive.display(),
        sidecar.display()
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "abc.txt", b"abc");

        let cases = [
            (HashAlgorithm::Md5, "900150983cd24fb0d6963f7d28e17f72"),
            (HashAlgorithm::Sha1, "a9993e364706816aba3e25717850c26c9cd0d89d"),
            (
                HashAlgorithm::Sha256,
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ),
            (
                HashAlgorithm::Sha384,
                "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7",
            ),
            (
                HashAlgorithm::Sha512,
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f",
            ),
        ];

        for (algorithm, expected) in cases {
            let digest = hash_file(&path, algorithm).unwrap();
            assert_eq!(digest, expected, "{}", algorithm);
            assert_eq!(digest.len(), algorithm.hex_len());
        }
    }

    #[test]
    fn test_streams_files_larger_than_buffer() {
        let dir = TempDir::new().unwrap();
        let contents = vec![0x5au8; READ_BUFFER_SIZE * 3 + 17];
        let path = write(&dir, "big.bin", &contents);

        let streamed = hash_file(&path, HashAlgorithm::Sha256).unwrap();
        let direct = hex::encode(Sha256::digest(&contents));
        assert_eq!(streamed, direct);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.bin");

        assert!(matches!(
            hash_file(&missing, HashAlgorithm::Sha1),
            Err(HashError::MissingSource(_))
        ));
        let result = hash_location(&missing.to_string_lossy(), HashAlgorithm::Sha1).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_hash_location_accepts_file_uri() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.txt", b"");
        let uri = format!("file://{}", path.display());
        assert_eq!(
            hash_location(&uri, HashAlgorithm::Sha1).unwrap().as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }

    #[test]
    fn test_hash_location_rejects_remote() {
        assert!(matches!(
            hash_location("s3://bucket/key", HashAlgorithm::Md5),
            Err(HashError::UnsupportedLocation(_))
        ));
    }

    #[test]
    fn test_write_sidecar() {
        let dir = TempDir::new().unwrap();
        let archive = write(&dir, "a.tar", b"abc");
        let sidecar = dir.path().join("a.tar.md5");

        let digest = write_sidecar(&archive, &sidecar, HashAlgorithm::Md5).unwrap();
        assert_eq!(std::fs::read_to_string(&sidecar).unwrap(), digest);
        assert_eq!(digest, "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("sha-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("SHA_512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha1);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&HashAlgorithm::Sha384).unwrap(), "\"SHA384\"");
        let parsed: HashAlgorithm = serde_json::from_str("\"MD5\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Md5);
    }
}
