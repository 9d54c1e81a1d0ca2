//! Flattened indexing results.
//!
//! A [`Manifest`] is built level by level: every container level pushes its own
//! entries, absorbing each child level's manifest right after the child's
//! recursion returns so the final order is pre-order.

use serde::{Deserialize, Serialize};

/// Metadata for one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Ancestor names joined by `/`
    pub logical_path: String,
    pub size_uncompressed: u64,
    /// `None` when the container does not record it
    pub size_compressed: Option<u64>,
    /// Classifier output, or `N/A`
    pub type_description: String,
    pub sha256: String,
    pub md5: String,
}

/// Every file found under one submission, plus the number of entry-level
/// failures encountered anywhere in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: Vec<Entry>,
    error_count: u64,
}

impl Manifest {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Logical paths in manifest order.
    pub fn logical_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.logical_path.as_str())
    }
}

/// Accumulates one level's results.
#[derive(Debug, Default)]
pub(crate) struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.manifest.entries.push(entry);
    }

    pub fn record_failure(&mut self) {
        self.manifest.error_count += 1;
    }

    /// Append a child level's entries and errors after what is already here.
    pub fn absorb(&mut self, child: Manifest) {
        self.manifest.entries.extend(child.entries);
        self.manifest.error_count += child.error_count;
    }

    pub fn finish(self) -> Manifest {
        self.manifest
    }
}
