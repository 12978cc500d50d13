use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

use crate::error::{Error, Result};

/// A discovered source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the scanned root.
    pub relative_path: PathBuf,
    /// The root as given by the caller joined with `relative_path`.
    pub path: PathBuf,
}

impl DiscoveredFile {
    /// Identifier used for this file in state and chunk metadata.
    pub fn doc_id(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Pattern matched against file names, case-insensitively.
const DOCUMENT_PATTERN: &str = "*.txt";

fn document_matcher() -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(DOCUMENT_PATTERN)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::Config(format!("invalid document pattern: {e}")))?;
    Ok(glob.compile_matcher())
}

/// Recursively walk a directory and discover `.txt` documents.
///
/// Results are sorted by relative path. Symlinked files are followed;
/// symlinked directories are not. A subdirectory that cannot be listed is
/// skipped with a warning; an unreadable root is an error.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let matcher = document_matcher()?;
    let mut results = Vec::new();
    for entry in std::fs::read_dir(root)? {
        visit_entry(root, entry, &matcher, &mut results);
    }
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    matcher: &GlobMatcher,
    results: &mut Vec<DiscoveredFile>,
) {
    let entries = match std::fs::read_dir(current) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %current.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries {
        visit_entry(root, entry, matcher, results);
    }
}

fn visit_entry(
    root: &Path,
    entry: std::io::Result<std::fs::DirEntry>,
    matcher: &GlobMatcher,
    results: &mut Vec<DiscoveredFile>,
) {
    let (entry, file_type) = match entry.and_then(|e| {
        let file_type = e.file_type()?;
        Ok((e, file_type))
    }) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "skipping unreadable directory entry");
            return;
        }
    };
    let path = entry.path();

    if file_type.is_dir() {
        walk_dir(root, &path, matcher, results);
        return;
    }

    let is_file = if file_type.is_symlink() {
        // Broken links are ignored.
        std::fs::metadata(&path).is_ok_and(|m| m.is_file())
    } else {
        file_type.is_file()
    };

    if is_file && matcher.is_match(entry.file_name()) {
        let relative_path =
            path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        results.push(DiscoveredFile {
            relative_path,
            path,
        });
    }
}
