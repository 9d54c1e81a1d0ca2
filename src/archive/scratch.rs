//! Transient extraction storage.
//!
//! Every extracted entry gets its own uniquely named directory. The directory
//! is owned by a [`TempDir`] and disappears when the owner is dropped, which
//! happens once the entry (and everything nested inside it) has been indexed.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tempfile::TempDir;

/// Prefix for every scratch directory, so leftovers are easy to spot.
pub const SCRATCH_PREFIX: &str = "recursive_archive_indexer_";

/// Hands out self-cleaning scratch directories.
#[derive(Debug, Clone, Default)]
pub struct ScratchSpace {
    base: Option<PathBuf>,
}

impl ScratchSpace {
    /// Scratch space under the system temp directory.
    pub fn system() -> Self {
        Self { base: None }
    }

    /// Scratch space under `base` (for example a dedicated volume).
    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    /// Acquire a fresh, uniquely named directory.
    pub fn acquire(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        match &self.base {
            Some(base) => builder
                .tempdir_in(base)
                .with_context(|| format!("Failed to create scratch directory in {}", base.display())),
            None => builder
                .tempdir()
                .context("Failed to create scratch directory"),
        }
    }
}
