//! Source locations: bare paths and `scheme://authority/path` URIs.

use std::fs::File;
use std::path::PathBuf;

use crate::error::ArchiveError;

/// A parsed source location.
///
/// Local files may be given as bare paths or `file:` URIs. Object storage
/// locations (`s3://host/key`) are parsed so their path can feed entry path
/// resolution, but they cannot be opened by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    raw: String,
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some((scheme, rest)) = split_scheme(trimmed) {
            let (authority, path) = match rest.strip_prefix("//") {
                Some(after) => match after.find('/') {
                    Some(idx) => (Some(&after[..idx]), &after[idx..]),
                    None => (Some(after), "/"),
                },
                None => (None, rest),
            };
            let path = percent_decode(path);
            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{}", path)
            };
            return Self {
                raw: trimmed.to_string(),
                scheme: Some(scheme.to_ascii_lowercase()),
                authority: authority.filter(|a| !a.is_empty()).map(str::to_string),
                path,
            };
        }

        Self {
            raw: trimmed.to_string(),
            scheme: None,
            authority: None,
            path: trimmed.replace('\\', "/"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Path component with any scheme and authority removed.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        matches!(self.scheme.as_deref(), None | Some("file"))
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        if self.is_local() {
            Some(PathBuf::from(&self.path))
        } else {
            None
        }
    }

    /// Opens the location for streaming reads.
    pub fn open(&self) -> Result<File, ArchiveError> {
        let path = self
            .local_path()
            .ok_or_else(|| ArchiveError::UnsupportedScheme {
                location: self.raw.clone(),
                scheme: self.scheme.clone().unwrap_or_default(),
            })?;
        File::open(&path).map_err(|e| ArchiveError::OpenSource {
            location: self.raw.clone(),
            source: e,
        })
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits `scheme:/rest`. Single-letter schemes are treated as Windows drive
/// letters and rejected, as is anything not followed by a path.
fn split_scheme(value: &str) -> Option<(&str, &str)> {
    let idx = value.find(':')?;
    let scheme = &value[..idx];
    let rest = &value[idx + 1..];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2 || !first.is_ascii_alphabetic() || !rest.starts_with('/') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, rest))
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
