//! Config items and the commit of materialized objects to disk.
//!
//! ```text
//! ConfigItemBuilder ──compile──▶ ConfigItem ──register──▶ ItemRegistry
//!                                                            │
//!                  CommitPipeline (exclusive lock held)      │ commit_items
//!                          │                                 ▼
//!                          └──▶ ConfigCompilerContext ──▶ AtomicFile ──▶ objects file
//! ```

mod context;
mod item;
mod pipeline;

pub use context::ConfigCompilerContext;
pub use item::{CommitSummary, ConfigItem, ConfigItemBuilder, ItemRegistry};
pub use pipeline::CommitPipeline;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Where and how the objects file is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitConfig {
    /// Final path of the objects file.
    pub objects_path: PathBuf,
    /// Permission bits of the objects file.
    pub file_mode: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            objects_path: PathBuf::from("objects.debug"),
            file_mode: 0o600,
        }
    }
}

impl CommitConfig {
    /// Commit config writing to `objects_path` with the default mode.
    #[must_use]
    pub fn new(objects_path: impl Into<PathBuf>) -> Self {
        Self {
            objects_path: objects_path.into(),
            ..Self::default()
        }
    }

    /// Sets the permission bits.
    #[must_use]
    pub const fn with_file_mode(mut self, file_mode: u32) -> Self {
        self.file_mode = file_mode;
        self
    }

    /// Checks the config before any file is touched.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidCommitConfig` if the path has no file
    /// name or the mode has bits outside `0o7777`.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.objects_path.file_name().is_none() {
            return Err(ConfigError::InvalidCommitConfig {
                reason: format!("objects path '{}' has no file name", self.objects_path.display()),
            });
        }

        if self.file_mode & !0o7777 != 0 {
            return Err(ConfigError::InvalidCommitConfig {
                reason: format!("file mode {:o} is not a permission mask", self.file_mode),
            });
        }

        Ok(self)
    }
}
