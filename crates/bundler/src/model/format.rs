use serde::{Deserialize, Serialize};

/// Container format of an output archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGzip,
    #[serde(rename = "tar.bz2")]
    TarBzip2,
    #[default]
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "cpio")]
    Cpio,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown archive format: {0}")]
pub struct UnknownFormat(pub String);

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::Tar,
        ArchiveFormat::TarGzip,
        ArchiveFormat::TarBzip2,
        ArchiveFormat::Zip,
        ArchiveFormat::Cpio,
    ];

    /// Canonical name, also used as the persisted value.
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGzip => "tar.gz",
            ArchiveFormat::TarBzip2 => "tar.bz2",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Cpio => "cpio",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, ArchiveFormat::Tar | ArchiveFormat::Cpio)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = UnknownFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "tar" => Ok(ArchiveFormat::Tar),
            "tar.gz" | "tgz" | "targz" | "gzip" => Ok(ArchiveFormat::TarGzip),
            "tar.bz2" | "bz2" | "bzip2" | "tarbz2" => Ok(ArchiveFormat::TarBzip2),
            "zip" => Ok(ArchiveFormat::Zip),
            "cpio" => Ok(ArchiveFormat::Cpio),
            _ => Err(UnknownFormat(value.to_string())),
        }
    }
}
