//! Computes where each source file lands inside an archive.

use crate::location::SourceLocation;

/// Longest entry path, in bytes, that every supported format can store in a
/// single header without extensions.
pub const MAX_ENTRY_PATH_LENGTH: usize = 100;

/// Maps absolute source locations to archive-relative entry paths.
///
/// Exclusions are tested in configured order against the location's path
/// (scheme and authority removed) and only the first matching prefix is
/// removed.
#[derive(Debug, Clone)]
pub struct EntryPathResolver {
    exclusions: Vec<String>,
    max_length: usize,
}

impl Default for EntryPathResolver {
    fn default() -> Self {
        Self {
            exclusions: Vec::new(),
            max_length: MAX_ENTRY_PATH_LENGTH,
        }
    }
}

impl EntryPathResolver {
    pub fn new<I, S>(exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exclusions = exclusions
            .into_iter()
            .filter_map(|prefix| normalize_exclusion(prefix.as_ref()))
            .collect();
        Self {
            exclusions,
            max_length: MAX_ENTRY_PATH_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Entry path for `location` using the configured exclusions.
    pub fn resolve(&self, location: &str) -> String {
        let location = SourceLocation::parse(location);
        let relative = self.strip_exclusion(location.path());
        self.enforce_length_limit(relative)
    }

    /// Entry path for a file discovered under `base_dir`: the base directory
    /// is removed and `archive_path` is prepended. Locations outside
    /// `base_dir` fall back to the exclusion rule.
    pub fn resolve_with_base(&self, location: &str, base_dir: &str, archive_path: &str) -> String {
        let location = SourceLocation::parse(location);
        let path = location.path();
        let base_location = SourceLocation::parse(base_dir);
        let base = base_location.path().trim_end_matches('/');

        let relative = if !base.is_empty() && is_within(path, base) {
            &path[base.len()..]
        } else {
            self.strip_exclusion(path)
        };

        let prefix = archive_path.replace('\\', "/");
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            self.enforce_length_limit(relative)
        } else {
            let joined = format!("{}/{}", prefix, trim_separators(relative));
            self.enforce_length_limit(&joined)
        }
    }

    /// A caller-supplied entry path, with leading separators removed.
    pub fn normalize_supplied(&self, entry_path: &str) -> String {
        self.enforce_length_limit(&entry_path.replace('\\', "/"))
    }

    /// Uses `supplied` when it is non-blank, otherwise resolves `location`.
    pub fn resolve_entry(&self, location: &str, supplied: Option<&str>) -> String {
        match supplied.map(str::trim).filter(|s| !s.is_empty()) {
            Some(entry_path) => self.normalize_supplied(entry_path),
            None => self.resolve(location),
        }
    }

    /// Fits `path` into the length budget. Leading directories are dropped
    /// first; if the file name alone is still too long it is truncated
    /// keeping its extension.
    pub fn enforce_length_limit(&self, path: &str) -> String {
        let path = trim_separators(path);
        if path.len() <= self.max_length {
            return path.to_string();
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file, dirs)) = segments.split_last() else {
            return String::new();
        };

        let mut start = 0;
        while start < dirs.len() && joined_len(&dirs[start..], file) > self.max_length {
            start += 1;
        }

        if start == dirs.len() {
            return self.truncate_filename(file);
        }

        let mut kept: Vec<&str> = dirs[start..].to_vec();
        kept.push(file);
        kept.join("/")
    }

    /// Shortens a bare file name to the length budget, preserving its
    /// extension.
    pub fn truncate_filename(&self, filename: &str) -> String {
        if filename.len() <= self.max_length {
            return filename.to_string();
        }
        let ext = extension(filename);
        if ext.len() >= self.max_length {
            return truncate_at_boundary(filename, self.max_length).to_string();
        }
        let stem = &filename[..filename.len() - ext.len()];
        let keep = self.max_length - ext.len();
        format!("{}{}", truncate_at_boundary(stem, keep), ext)
    }

    /// Variant of `entry_path` with `<n>_` prefixed to its file name, used to
    /// keep entry paths unique within one archive.
    pub fn numbered(&self, entry_path: &str, n: usize) -> String {
        let entry_path = trim_separators(entry_path);
        let renamed = match entry_path.rfind('/') {
            Some(idx) => format!(
                "{}/{}_{}",
                &entry_path[..idx],
                n,
                &entry_path[idx + 1..]
            ),
            None => format!("{}_{}", n, entry_path),
        };
        self.enforce_length_limit(&renamed)
    }

    fn strip_exclusion<'a>(&self, path: &'a str) -> &'a str {
        self.exclusions
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
            .map(|prefix| &path[prefix.len()..])
            .unwrap_or(path)
    }
}

/// Extension of the final path segment including the dot, or `""`.
pub fn extension(path: &str) -> &str {
    let name = match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    };
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

fn normalize_exclusion(prefix: &str) -> Option<String> {
    let prefix = prefix.trim().replace('\\', "/");
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return None;
    }
    if prefix.starts_with('/') {
        Some(prefix.to_string())
    } else {
        Some(format!("/{}", prefix))
    }
}

fn is_within(path: &str, base: &str) -> bool {
    path.starts_with(base) && matches!(path.as_bytes().get(base.len()), None | Some(b'/'))
}

fn trim_separators(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn joined_len(dirs: &[&str], file: &str) -> usize {
    dirs.iter().map(|d| d.len() + 1).sum::<usize>() + file.len()
}

fn truncate_at_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EntryPathResolver {
        EntryPathResolver::new(["/mnt/raster", "/mnt/fbga", "/mnt/nonstd"])
    }

    const DIGITS_40: &str = "0123456789012345678901234567890123456789";

    #[test]
    fn test_exclusion_prefixes_are_removed() {
        let r = resolver();
        for prefix in ["/mnt/raster", "/mnt/fbga", "/mnt/nonstd"] {
            let path = format!("{}/bogus/fake/faux/sham/file.txt", prefix);
            assert_eq!(r.resolve(&path), "bogus/fake/faux/sham/file.txt");
        }
        assert_eq!(r.resolve("/mnt/raster/bogus/fake/file.txt"), "bogus/fake/file.txt");
    }

    #[test]
    fn test_object_storage_uri_normalizes_like_path() {
        let r = resolver();
        for prefix in ["/mnt/raster", "/mnt/fbga", "/mnt/nonstd"] {
            let uri = format!("s3://s3.amazonaws.com{}/bogus/fake/faux/sham/file.txt", prefix);
            assert_eq!(r.resolve(&uri), "bogus/fake/faux/sham/file.txt");
        }
    }

    #[test]
    fn test_unmatched_path_only_loses_leading_separator() {
        assert_eq!(resolver().resolve("/data/file.txt"), "data/file.txt");
    }

    #[test]
    fn test_first_match_wins() {
        let r = EntryPathResolver::new(["/mnt", "/mnt/raster"]);
        assert_eq!(r.resolve("/mnt/raster/a.txt"), "raster/a.txt");
    }

    #[test]
    fn test_only_one_exclusion_is_removed() {
        let r = EntryPathResolver::new(["/a", "/b"]);
        assert_eq!(r.resolve("/a/b/c.txt"), "b/c.txt");
    }

    #[test]
    fn test_exclusions_are_normalized() {
        let r = EntryPathResolver::new(["mnt/raster/", "  ", "/"]);
        assert_eq!(r.exclusions(), &["/mnt/raster".to_string()]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let r = resolver();
        let long = format!("/abcd/efgh/ijkl/{}{}0123456789.txt", DIGITS_40, DIGITS_40);
        let inputs = [
            "/mnt/raster/bogus/fake/file.txt",
            "s3://s3.amazonaws.com/mnt/fbga/x/y.tif",
            "/plain/file",
            long.as_str(),
        ];
        for input in inputs {
            let once = r.resolve(input);
            assert_eq!(r.resolve(&once), once, "{}", input);
            assert!(!once.starts_with('/'));
        }
    }

    #[test]
    fn test_base_directory_and_archive_path() {
        let r = resolver();
        assert_eq!(
            r.resolve_with_base("/mnt/bogus/fake/faux/sham/file.txt", "/mnt/bogus/fake", "/vvod"),
            "vvod/faux/sham/file.txt"
        );
        assert_eq!(
            r.resolve_with_base(
                "s3://s3.amazonaws.com/mnt/bogus/fake/faux/sham/file.txt",
                "/mnt/bogus/fake",
                "/vvod"
            ),
            "vvod/faux/sham/file.txt"
        );
    }

    #[test]
    fn test_base_directory_without_archive_path() {
        let r = resolver();
        assert_eq!(
            r.resolve_with_base("/data/in/a/b.txt", "/data/in/", ""),
            "a/b.txt"
        );
    }

    #[test]
    fn test_base_directory_requires_segment_boundary() {
        let r = resolver();
        assert_eq!(
            r.resolve_with_base("/data/inbox/b.txt", "/data/in", "out/"),
            "out/data/inbox/b.txt"
        );
    }

    #[test]
    fn test_supplied_entry_path_used_as_is() {
        let r = resolver();
        assert_eq!(
            r.resolve_entry("/mnt/raster/x.txt", Some("/custom/name.txt")),
            "custom/name.txt"
        );
        assert_eq!(r.resolve_entry("/mnt/raster/x.txt", Some("  ")), "x.txt");
        assert_eq!(r.resolve_entry("/mnt/raster/x.txt", None), "x.txt");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("blah.tar.gz"), ".gz");
        assert_eq!(extension("file_with_no_extension"), "");
        assert_eq!(extension("/tmp/dir1/dir2/blah.txt"), ".txt");
        assert_eq!(extension("/tmp/dir.d/file"), "");
    }

    #[test]
    fn test_truncate_filename() {
        let filename = format!("{}{}01234567890123456789ABCDEFGHIJK.txt", DIGITS_40, DIGITS_40);
        let expected = format!(
            "{}{}0123456789012345.txt",
            DIGITS_40, DIGITS_40
        );
        let truncated = resolver().truncate_filename(&filename);
        assert_eq!(truncated, expected);
        assert_eq!(truncated.len(), MAX_ENTRY_PATH_LENGTH);
    }

    #[test]
    fn test_length_limit_drops_leading_directories() {
        let path = format!("/abcd/efgh/ijkl/{}{}0123456789.txt", DIGITS_40, DIGITS_40);
        let expected = format!("ijkl/{}{}0123456789.txt", DIGITS_40, DIGITS_40);
        assert_eq!(resolver().enforce_length_limit(&path), expected);
    }

    #[test]
    fn test_length_limit_truncates_long_filename_last() {
        let name = format!("{}{}{}.dat", DIGITS_40, DIGITS_40, DIGITS_40);
        let path = format!("/deep/dir/{}", name);
        let limited = resolver().enforce_length_limit(&path);
        assert_eq!(limited.len(), MAX_ENTRY_PATH_LENGTH);
        assert!(limited.ends_with(".dat"));
        assert!(!limited.contains('/'));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let r = EntryPathResolver::default().with_max_length(10);
        let truncated = r.truncate_filename("ééééééééé.txt");
        assert!(truncated.len() <= 10);
        assert!(truncated.ends_with(".txt"));
        assert_eq!(truncated, "ééé.txt");
    }

    #[test]
    fn test_numbered_prefixes_file_name() {
        let r = resolver();
        assert_eq!(r.numbered("a/b/file.txt", 1), "a/b/1_file.txt");
        assert_eq!(r.numbered("file.txt", 2), "2_file.txt");

        let long = format!("{}{}{}.txt", DIGITS_40, DIGITS_40, DIGITS_40);
        let numbered = r.numbered(&long, 3);
        assert!(numbered.starts_with("3_"));
        assert!(numbered.ends_with(".txt"));
        assert!(numbered.len() <= MAX_ENTRY_PATH_LENGTH);
    }
}
