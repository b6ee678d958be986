//! Append-only writes into a snapshot's working tree.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::archive_path::ArchivePath;
use crate::error::WriteError;
use crate::models::ArchiveEntry;

/// Create the entry's directory chain under `workdir`. Safe to repeat.
pub fn ensure_dir(workdir: &Path, path: &ArchivePath) -> Result<PathBuf, WriteError> {
    let dir = workdir.join(path.dir());
    fs::create_dir_all(&dir).map_err(|source| {
        tracing::error!(dir = %dir.display(), error = %source, "create_dir_all failed");
        WriteError::CreateDir {
            path: dir.clone(),
            source,
        }
    })?;
    Ok(dir)
}

/// Append `entry` to the file at `path`, creating it if needed.
///
/// Existing bytes are never touched. Returns the absolute file path.
pub fn append_entry(
    workdir: &Path,
    path: &ArchivePath,
    entry: &ArchiveEntry,
) -> Result<PathBuf, WriteError> {
    let file_path = ensure_dir(workdir, path)?.join(path.file_name());

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&file_path)
        .map_err(|source| {
            tracing::error!(file = %file_path.display(), error = %source, "open failed");
            WriteError::Open {
                path: file_path.clone(),
                source,
            }
        })?;

    file.write_all(entry.to_string().as_bytes())
        .map_err(|source| {
            tracing::error!(file = %file_path.display(), error = %source, "write failed");
            WriteError::Write {
                path: file_path.clone(),
                source,
            }
        })?;

    // Dropping a File discards close errors, so flush them out here.
    file.sync_all().map_err(|source| {
        tracing::error!(file = %file_path.display(), error = %source, "close failed");
        WriteError::Close {
            path: file_path.clone(),
            source,
        }
    })?;

    tracing::debug!(file = %file_path.display(), "entry appended");
    Ok(file_path)
}
