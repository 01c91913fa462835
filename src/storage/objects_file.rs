//! The objects file: one netstring-framed JSON record per committed object.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::debug_info::DebugInfo;
use crate::error::StorageError;
use crate::value::Dictionary;

use super::netstring;

/// A materialized config object as persisted for the runtime to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Object type, e.g. `Dependency`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Object name, unique per type.
    pub name: String,
    /// Evaluated attributes.
    pub properties: Dictionary,
    /// Declaration site of the item that produced the object.
    #[serde(default)]
    pub debug_info: DebugInfo,
}

impl ObjectRecord {
    /// Appends this record as one netstring frame.
    ///
    /// # Errors
    /// Returns `StorageError::Serialization` if the properties cannot be
    /// encoded and `StorageError::Io` if the write fails.
    pub fn write_to(&self, writer: &mut impl Write, path: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        netstring::write_netstring(writer, &json).map_err(|e| StorageError::io("write", path, e))
    }
}

/// Iterates the records of an objects file until EOF.
///
/// Stops after the first error.
#[derive(Debug)]
pub struct ObjectsFileReader<R> {
    reader: R,
    path: PathBuf,
    failed: bool,
}

impl ObjectsFileReader<BufReader<File>> {
    /// Opens `path` for reading.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| StorageError::io("open", path.clone(), e))?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> ObjectsFileReader<R> {
    /// Wraps an already open stream; `path` is only used in errors.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<ObjectRecord>, StorageError> {
        let payload = match netstring::read_netstring(&mut self.reader) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.classify(e)),
        };

        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                reason: format!("invalid object record: {e}"),
            })
    }

    fn classify(&self, err: io::Error) -> StorageError {
        match err.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => StorageError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            },
            _ => StorageError::io("read", self.path.clone(), err),
        }
    }
}

impl<R: BufRead> Iterator for ObjectsFileReader<R> {
    type Item = Result<ObjectRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.read_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads every record of the objects file at `path`.
///
/// # Errors
/// Returns `StorageError::Io` if the file cannot be read and
/// `StorageError::Corrupt` for a truncated or malformed record.
pub fn read_objects_file(path: impl AsRef<Path>) -> Result<Vec<ObjectRecord>, StorageError> {
    ObjectsFileReader::open(path.as_ref())?.collect()
}
