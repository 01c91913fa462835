//! Crash-safe file replacement.
//!
//! Data is written to a uniquely named sibling of the target path, then
//! `commit` flushes, fsyncs and renames it over the target. Readers of the
//! target path see either the previous or the new complete content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageError;

/// A file that becomes visible at its path only on [`commit`](Self::commit).
///
/// Dropping it uncommitted removes the temporary file.
#[derive(Debug)]
pub struct AtomicFile {
    path: PathBuf,
    temp_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl AtomicFile {
    /// Creates the temporary file next to `path` with permission bits
    /// `mode` (ignored on non-Unix platforms).
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the temporary file cannot be created or
    /// its permissions cannot be set.
    pub fn open(path: impl Into<PathBuf>, mode: u32) -> Result<Self, StorageError> {
        let path = path.into();

        let Some(file_name) = path.file_name() else {
            return Err(StorageError::io(
                "open",
                path.clone(),
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            ));
        };

        let mut temp_name = file_name.to_os_string();
        temp_name.push(format!(".tmp.{}", Uuid::new_v4().simple()));
        let temp_path = path.with_file_name(temp_name);

        let file = create_temp(&temp_path, mode)?;

        Ok(Self {
            path,
            temp_path: Some(temp_path),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// The path the content is committed to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary file, until committed.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// Flushes, fsyncs and closes the temporary file, then renames it onto
    /// the target path.
    ///
    /// This is the commit point: once it returns `Ok`, the new content is
    /// durable and visible.
    ///
    /// # Errors
    /// Returns `StorageError::Io` naming the failed step. The temporary file
    /// is removed when `self` is dropped.
    pub fn commit(mut self) -> Result<(), StorageError> {
        let temp_path = self.temp_path.clone().ok_or(StorageError::NotOpen)?;
        let writer = self.writer.take().ok_or(StorageError::NotOpen)?;

        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io("flush", temp_path.clone(), e.into_error()))?;

        file.sync_all()
            .map_err(|e| StorageError::io("fsync", temp_path.clone(), e))?;

        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| StorageError::io("rename", self.path.clone(), e))?;

        self.temp_path = None;
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "atomic file already committed"))
    }
}

#[cfg(unix)]
fn create_temp(temp_path: &Path, mode: u32) -> Result<File, StorageError> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(temp_path)
        .map_err(|e| StorageError::io("create", temp_path, e))?;

    // The umask may have stripped bits from `mode`.
    file.set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| StorageError::io("chmod", temp_path, e))?;

    Ok(file)
}

#[cfg(not(unix))]
fn create_temp(temp_path: &Path, _mode: u32) -> Result<File, StorageError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .map_err(|e| StorageError::io("create", temp_path, e))
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        // Close before unlinking.
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            // Best effort: the caller is already handling whatever made it
            // abandon this file.
            let _ = fs::remove_file(temp_path);
        }
    }
}
