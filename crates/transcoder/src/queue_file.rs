//! Pending-queue file: one path per line.
//!
//! Read at startup as a source of candidates, rewritten after the run with
//! whatever was not completed.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for pending-queue file operations
#[derive(Debug, Error)]
pub enum QueueFileError {
    #[error("Failed to read queue file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to update queue file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What happened to the file after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueFileAction {
    /// Dry run or missing file
    Untouched,
    /// Remaining paths written back
    Rewritten { remaining: usize },
    /// Every listed path completed
    Removed,
}

/// Reads the listed paths, skipping blank lines.
///
/// A missing file is not an error: it yields no paths and a warning.
pub fn files_from_file(path: &Path) -> Result<Vec<PathBuf>, QueueFileError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(file = %path.display(), "queue file not found");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(QueueFileError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Completed paths are absolute; listed ones may be relative to the working
/// directory.
fn is_completed(listed: &Path, completed: &HashSet<PathBuf>) -> bool {
    completed.contains(listed)
        || std::path::absolute(listed).is_ok_and(|abs| completed.contains(&abs))
}

/// Drops completed paths from the file, keeping the rest in order.
///
/// The file is deleted once nothing is left, and never touched in dry-run.
pub fn cleanup_queuefile(
    path: &Path,
    completed: &HashSet<PathBuf>,
    dry_run: bool,
) -> Result<QueueFileAction, QueueFileError> {
    if dry_run || !path.exists() {
        return Ok(QueueFileAction::Untouched);
    }

    let listed = files_from_file(path)?;
    let remaining: Vec<&PathBuf> = listed
        .iter()
        .filter(|p| !is_completed(p, completed))
        .collect();
    let write_err = |source| QueueFileError::Write {
        path: path.to_path_buf(),
        source,
    };

    if remaining.is_empty() {
        fs::remove_file(path).map_err(write_err)?;
        tracing::info!(file = %path.display(), "queue file finished, removed");
        return Ok(QueueFileAction::Removed);
    }

    let mut content = String::new();
    for entry in &remaining {
        content.push_str(&entry.to_string_lossy());
        content.push('\n');
    }
    fs::write(path, content).map_err(write_err)?;
    tracing::info!(file = %path.display(), remaining = remaining.len(), "queue file updated");

    Ok(QueueFileAction::Rewritten {
        remaining: remaining.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn completed(paths: &[&str]) -> HashSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_files_from_file_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("queue.txt");
        fs::write(&file, "/media/a.mkv\n\n  /media/b.mkv  \n").unwrap();

        assert_eq!(
            files_from_file(&file).unwrap(),
            vec![PathBuf::from("/media/a.mkv"), PathBuf::from("/media/b.mkv")]
        );
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(files_from_file(&dir.path().join("none.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_keeps_unfinished_in_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("queue.txt");
        fs::write(&file, "/m/c.mkv\n/m/a.mkv\n/m/d.mkv\n/m/b.mkv\n").unwrap();

        let action = cleanup_queuefile(&file, &completed(&["/m/a.mkv", "/m/b.mkv"]), false).unwrap();

        assert_eq!(action, QueueFileAction::Rewritten { remaining: 2 });
        assert_eq!(fs::read_to_string(&file).unwrap(), "/m/c.mkv\n/m/d.mkv\n");
    }

    #[test]
    fn test_cleanup_matches_relative_lines() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("queue.txt");
        fs::write(&file, "media/a.mkv\n/m/b.mkv\n").unwrap();
        let done = std::path::absolute("media/a.mkv").unwrap();

        let action = cleanup_queuefile(&file, &HashSet::from([done]), false).unwrap();

        assert_eq!(action, QueueFileAction::Rewritten { remaining: 1 });
        assert_eq!(fs::read_to_string(&file).unwrap(), "/m/b.mkv\n");
    }

    #[test]
    fn test_cleanup_removes_finished_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("queue.txt");
        fs::write(&file, "/m/a.mkv\n/m/b.mkv\n").unwrap();

        let action = cleanup_queuefile(&file, &completed(&["/m/a.mkv", "/m/b.mkv"]), false).unwrap();

        assert_eq!(action, QueueFileAction::Removed);
        assert!(!file.exists());
    }

    #[test]
    fn test_cleanup_dry_run_untouched() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("queue.txt");
        fs::write(&file, "/m/a.mkv\n/m/b.mkv\n/m/c.mkv\n").unwrap();

        let action = cleanup_queuefile(&file, &completed(&["/m/a.mkv", "/m/b.mkv"]), true).unwrap();

        assert_eq!(action, QueueFileAction::Untouched);
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "/m/a.mkv\n/m/b.mkv\n/m/c.mkv\n"
        );
    }
}
