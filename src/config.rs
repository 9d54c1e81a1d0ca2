//! Indexer configuration
//!
//! Defines where transient extraction happens and how entries are classified.

use crate::classify::{DEFAULT_TIMEOUT, FILE_COMMAND};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for an [`Indexer`](crate::indexer::Indexer)
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Base directory for scratch space (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,

    /// Classification binary, a path or a name looked up in `PATH`
    pub file_command: Option<PathBuf>,

    /// Time allowed for one classification
    pub classify_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            file_command: None,
            classify_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl IndexerConfig {
    /// Classification binary to run
    pub fn file_command(&self) -> &Path {
        self.file_command
            .as_deref()
            .unwrap_or_else(|| Path::new(FILE_COMMAND))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.scratch_dir {
            if !dir.exists() {
                return Err(ConfigError::ScratchDirNotFound(dir.clone()));
            }
            if !dir.is_dir() {
                return Err(ConfigError::ScratchDirNotDirectory(dir.clone()));
            }
        }

        if self.classify_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Scratch directory not found: {0}")]
    ScratchDirNotFound(PathBuf),

    #[error("Scratch path is not a directory: {0}")]
    ScratchDirNotDirectory(PathBuf),

    #[error("Classification timeout must be greater than zero")]
    ZeroTimeout,
}
