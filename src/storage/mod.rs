//! On-disk output of a config commit.
//!
//! - [`AtomicFile`]: temp-file + fsync + rename writer
//! - [`netstring`]: `<len>:<payload>,` framing
//! - [`ObjectRecord`] and [`read_objects_file`]: the objects file format

mod atomic_file;
pub mod netstring;
mod objects_file;

pub use atomic_file::AtomicFile;
pub use objects_file::{read_objects_file, ObjectRecord, ObjectsFileReader};
