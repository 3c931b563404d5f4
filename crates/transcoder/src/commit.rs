//! Output placement and the commit step.
//!
//! Encoders write to a temporary path first. Once the output has been
//! accepted it is moved to its final destination and, unless the original is
//! kept, the source is removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while committing an encode.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Moving the encoded output into place failed.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// The output is in place but the source could not be removed.
    #[error("Failed to remove source {}: {source}", path.display())]
    RemoveSource {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn bare_extension(extension: &str) -> &str {
    extension.trim_start_matches('.')
}

/// Whether two paths name the same file system entry.
///
/// Paths that cannot be resolved (usually because they do not exist yet) are
/// compared as given.
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Where the encoder writes while it runs.
///
/// With a scratch directory the output is `<tmp_dir>/<stem><extension>`;
/// otherwise it sits beside the source as `<source>.<ext>.tmp` so the source
/// is never clobbered mid-encode.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use transcode_queue::commit::temp_output_path;
///
/// let out = temp_output_path(Path::new("/media/film.avi"), ".mkv", None);
/// assert_eq!(out, PathBuf::from("/media/film.mkv.tmp"));
/// ```
pub fn temp_output_path(source: &Path, extension: &str, tmp_dir: Option<&Path>) -> PathBuf {
    match tmp_dir {
        Some(dir) => {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            dir.join(format!("{}.{}", stem, bare_extension(extension)))
        }
        None => source.with_extension(format!("{}.tmp", bare_extension(extension))),
    }
}

/// `film.mkv` + `_processed` -> `film_processed.mkv`
pub fn add_processed_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Final location for a committed output.
///
/// # Arguments
/// * `source` - The file that was encoded
/// * `extension` - Profile output extension, e.g. `.mkv`
/// * `dest_dir` - Destination directory, already created, or None for in place
/// * `keep_original` - Whether the source survives the commit
/// * `suffix` - Appended to the stem when the output would sit next to a kept source
pub fn resolve_destination(
    source: &Path,
    extension: &str,
    dest_dir: Option<&Path>,
    keep_original: bool,
    suffix: &str,
) -> PathBuf {
    let renamed = source.with_extension(bare_extension(extension));

    match dest_dir {
        Some(dir) => {
            let target = match renamed.file_name() {
                Some(name) => dir.join(name),
                None => dir.to_path_buf(),
            };
            let beside_source = source.parent().is_some_and(|parent| same_path(parent, dir));
            if keep_original && beside_source {
                add_processed_suffix(&target, suffix)
            } else {
                target
            }
        }
        None if keep_original => add_processed_suffix(&renamed, suffix),
        None => renamed,
    }
}

/// Makes sure the destination directory exists and returns it resolved.
///
/// A directory that cannot be created degrades to the directory holding the
/// temporary output, with a warning.
pub fn prepare_destination_dir(dest_dir: &Path, temp_output: &Path) -> PathBuf {
    match fs::create_dir_all(dest_dir) {
        Ok(()) => fs::canonicalize(dest_dir).unwrap_or_else(|_| dest_dir.to_path_buf()),
        Err(e) => {
            let fallback = temp_output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            tracing::warn!(
                dest = %dest_dir.display(),
                fallback = %fallback.display(),
                error = %e,
                "destination folder cannot be created, using the temp output folder"
            );
            fallback
        }
    }
}

/// Moves `from` to `to`, replacing anything already at `to`.
///
/// Tries a rename first and falls back to [`copy_replace`] when the two
/// paths are on different filesystems.
pub fn move_output(from: &Path, to: &Path) -> Result<(), CommitError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_replace(from, to)
}

/// Copies `from` next to `to`, renames the copy over `to`, then removes `from`.
///
/// `to` is only ever replaced by a complete copy. When any step before the
/// rename fails the staged copy is dropped and `to` keeps its old content.
pub fn copy_replace(from: &Path, to: &Path) -> Result<(), CommitError> {
    let wrap = |source: io::Error| CommitError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let dir = match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir).map_err(wrap)?;
    let mut input = fs::File::open(from).map_err(wrap)?;
    io::copy(&mut input, staged.as_file_mut()).map_err(wrap)?;
    staged.as_file().sync_all().map_err(wrap)?;
    let permissions = input.metadata().map_err(wrap)?.permissions();
    fs::set_permissions(staged.path(), permissions).map_err(wrap)?;

    staged.persist(to).map_err(|e| wrap(e.error))?;
    fs::remove_file(from).map_err(wrap)?;
    Ok(())
}

/// Moves the accepted output into place and drops the source if asked to.
///
/// The source is left alone when it resolves to the destination, since the
/// move already replaced it.
pub fn commit_output(
    temp_output: &Path,
    destination: &Path,
    source: &Path,
    keep_original: bool,
) -> Result<(), CommitError> {
    move_output(temp_output, destination)?;
    tracing::info!(
        from = %temp_output.display(),
        to = %destination.display(),
        "output moved into place"
    );

    if !keep_original && !same_path(destination, source) {
        fs::remove_file(source).map_err(|e| CommitError::RemoveSource {
            path: source.to_path_buf(),
            source: e,
        })?;
        tracing::info!(file = %source.display(), "source removed");
    }

    Ok(())
}
