//! The objects file currently being written.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::StorageError;
use crate::storage::{AtomicFile, ObjectRecord};

/// Holds at most one open objects file and serializes writes to it.
///
/// Writes from several threads never interleave within a record.
#[derive(Debug, Default)]
pub struct ConfigCompilerContext {
    objects_file: Mutex<Option<AtomicFile>>,
}

impl ConfigCompilerContext {
    /// Creates a context with no open file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn file(&self) -> MutexGuard<'_, Option<AtomicFile>> {
        self.objects_file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new objects file at `path`. A file that was still open is
    /// abandoned.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the temporary file cannot be created.
    pub fn open_objects_file(&self, path: impl Into<PathBuf>, mode: u32) -> Result<(), StorageError> {
        let file = AtomicFile::open(path, mode)?;
        debug!(path = %file.path().display(), "opened objects file");
        *self.file() = Some(file);
        Ok(())
    }

    /// Whether an objects file is being written.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file().is_some()
    }

    /// Appends `record`; does nothing if no objects file is open.
    ///
    /// # Errors
    /// Returns a storage error if encoding or writing fails.
    pub fn write_object(&self, record: &ObjectRecord) -> Result<(), StorageError> {
        let mut guard = self.file();
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        let path = file.path().to_path_buf();
        record.write_to(file, &path)
    }

    /// Abandons the open objects file; the target path is left untouched.
    pub fn cancel_objects_file(&self) {
        if let Some(file) = self.file().take() {
            debug!(path = %file.path().display(), "cancelled objects file");
        }
    }

    /// Commits the open objects file to its path.
    ///
    /// # Errors
    /// Returns `StorageError::NotOpen` if no file is open, or the commit
    /// failure. The file is closed either way.
    pub fn finish_objects_file(&self) -> Result<(), StorageError> {
        let file = self.file().take().ok_or(StorageError::NotOpen)?;
        file.commit()
    }
}
