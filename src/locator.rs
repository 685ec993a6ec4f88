use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find the first file named exactly `filename` (case-sensitive) under `root`.
///
/// The walk is depth-first with entries of each directory visited in file
/// name order, so the result is stable across platforms when an archive
/// ships several matching files. Unreadable subtrees are skipped.
pub fn find(root: &Path, filename: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == filename)
        .map(|entry| entry.into_path())
}
