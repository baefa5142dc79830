// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use tracing::warn;

/// Paths inside a finished build directory.
///
/// ```text
/// <root>/build/<product-dir>-components
/// <root>/build/<repo>-version
/// <root>/build/<repo>-gitrev
/// <root>/build/logs/<product-dir>/*.log
/// <root>/build/logs/<product-dir>/<platform>/summary.json
/// <root>/build/logs/<product-dir>/<platform>/<module>.test.xml
/// ```
#[derive(Clone, Debug)]
pub struct BuildLayout {
    root: Utf8PathBuf,
}

impl BuildLayout {
    /// Creates a layout rooted at the given build directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the build root. Generated files are relative to this.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the directory holding version stamps and component lists.
    pub fn build_dir(&self) -> Utf8PathBuf {
        self.root.join("build")
    }

    /// Returns the component list for a product.
    pub fn component_list(&self, product_dir: &str) -> Utf8PathBuf {
        self.build_dir().join(format!("{product_dir}-components"))
    }

    /// Returns the version stamp for a repository.
    pub fn version_stamp(&self, repo: &str) -> Utf8PathBuf {
        self.build_dir().join(format!("{repo}-version"))
    }

    /// Returns the git revision stamp for a repository.
    pub fn gitrev_stamp(&self, repo: &str) -> Utf8PathBuf {
        self.build_dir().join(format!("{repo}-gitrev"))
    }

    /// Returns the log directory for a product.
    pub fn product_log_dir(&self, product_dir: &str) -> Utf8PathBuf {
        self.build_dir().join("logs").join(product_dir)
    }

    /// Returns the per-platform log directory for a product.
    pub fn platform_log_dir(&self, product_dir: &str, platform: &str) -> Utf8PathBuf {
        self.product_log_dir(product_dir).join(platform)
    }

    /// Returns the summary document written by a structured platform.
    pub fn summary_document(&self, product_dir: &str, platform: &str) -> Utf8PathBuf {
        self.platform_log_dir(product_dir, platform)
            .join("summary.json")
    }
}

/// Lists the entries of a directory by file name, sorted. A missing directory has no entries.
///
/// Entries whose names are not valid UTF-8 are skipped with a warning.
pub(crate) fn sorted_dir_entries(dir: &Utf8Path) -> io::Result<Vec<(String, bool)>> {
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                warn!("skipping entry in {dir}: {error}");
                continue;
            }
            Err(error) => return Err(error),
        };
        let is_dir = entry.file_type()?.is_dir();
        out.push((entry.file_name().to_owned(), is_dir));
    }
    out.sort_unstable();
    Ok(out)
}

/// Returns the first line of a file, without its line terminator.
pub(crate) fn read_first_line(path: &Utf8Path) -> io::Result<String> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .next()
        .unwrap_or_default()
        .trim_end_matches('\r')
        .to_owned())
}

/// Truncates to at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

/// Returns the last `max` characters.
pub(crate) fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((index, _)) => &s[index..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn char_truncation() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(tail_chars("héllo", 4), "éllo");
        assert_eq!(tail_chars("héllo", 5), "héllo");
    }

    #[test]
    fn dir_entries() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        std::fs::create_dir(dir.path().join("b")).expect("created dir");
        std::fs::write(dir.path().join("a.log"), "").expect("wrote file");
        let entries = sorted_dir_entries(dir.path()).expect("listed dir");
        assert_eq!(
            entries,
            [("a.log".to_owned(), false), ("b".to_owned(), true)]
        );
        let missing = sorted_dir_entries(&dir.path().join("missing")).expect("missing is empty");
        assert!(missing.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_entries_are_skipped() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = Utf8TempDir::new().expect("created temp dir");
        std::fs::write(dir.path().join("em.test.xml"), "").expect("wrote file");
        std::fs::write(
            dir.path().as_std_path().join(OsStr::from_bytes(b"stray-\xff.txt")),
            "",
        )
        .expect("wrote file");
        let entries = sorted_dir_entries(dir.path()).expect("listed dir");
        assert_eq!(entries, [("em.test.xml".to_owned(), false)]);
    }

    #[test]
    fn layout_paths() {
        let layout = BuildLayout::new("/builds/.new");
        assert_eq!(
            layout.summary_document("imp", "fast8"),
            "/builds/.new/build/logs/imp/fast8/summary.json"
        );
        assert_eq!(layout.component_list("imp"), "/builds/.new/build/imp-components");
    }
}
