//! Expands directories on the command line into media files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Checks if a file's extension is in `extensions` (case-insensitive).
///
/// Extensions are given with their leading dot, e.g. `.mkv`.
pub fn has_media_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let dotted = format!(".{}", ext.to_lowercase());
            extensions.iter().any(|e| e.to_lowercase() == dotted)
        })
        .unwrap_or(false)
}

/// Replaces every directory in `inputs` with the media files inside it.
///
/// Plain files are passed through untouched, whatever their extension.
/// Directories are walked one level deep, or fully when `recursive` is set;
/// hidden subdirectories are never entered. Files found in a directory come
/// back sorted by path.
pub fn expand_inputs(inputs: &[PathBuf], extensions: &[String], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(input)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // the root may itself be a dot directory
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && entry.file_name().to_string_lossy().starts_with('.'))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_media_extension(entry.path(), extensions) {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files
}
