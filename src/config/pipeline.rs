//! Commit of registered items to the objects file.

use tracing::{error, info};

use crate::error::{ApplyResult, ConfigError, StorageError};
use crate::ipc::ConfigObjectsLock;

use super::{CommitConfig, CommitSummary, ConfigCompilerContext, ItemRegistry};

/// Writes the objects file while holding the config objects lock
/// exclusively, so that no other process reads or writes config objects
/// until the new file is in place or abandoned.
#[derive(Debug)]
pub struct CommitPipeline {
    config: CommitConfig,
    context: ConfigCompilerContext,
}

impl CommitPipeline {
    /// # Errors
    /// Returns `ConfigError::InvalidCommitConfig` if `config` is invalid.
    pub fn new(config: CommitConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.validate()?,
            context: ConfigCompilerContext::new(),
        })
    }

    /// Validated commit settings.
    #[must_use]
    pub const fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// Context holding the objects file being written.
    #[must_use]
    pub const fn context(&self) -> &ConfigCompilerContext {
        &self.context
    }

    /// Commits every item of `registry`.
    ///
    /// On any failure the temporary file is removed, the previous objects
    /// file, if any, stays in place and `registry` keeps its items. The
    /// committed items are removed from `registry` only after the new file
    /// has replaced the old one.
    ///
    /// # Errors
    /// Returns the lock, item or storage error that aborted the commit.
    pub fn commit(&self, lock: &ConfigObjectsLock, registry: &ItemRegistry) -> ApplyResult<CommitSummary> {
        let path = &self.config.objects_path;

        let _guard = lock
            .lock_exclusive()
            .map_err(|e| StorageError::io("lock", path.clone(), e))?;

        if let Err(e) = self.context.open_objects_file(path.clone(), self.config.file_mode) {
            error!(error = %e, "Could not create temporary objects file");
            return Err(e.into());
        }

        let summary = match registry.commit_items(&self.context) {
            Ok(summary) => summary,
            Err(e) => {
                self.context.cancel_objects_file();
                return Err(e);
            }
        };

        self.context.finish_objects_file()?;
        registry.discard_committed(summary.committed + summary.ignored);

        info!(
            path = %path.display(),
            committed = summary.committed,
            ignored = summary.ignored,
            "Committed {} config objects",
            summary.committed
        );

        Ok(summary)
    }
}
