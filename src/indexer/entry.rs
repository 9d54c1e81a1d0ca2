//! Turns one extracted file into a manifest [`Entry`].

use super::manifest::Entry;

use crate::classify::{describe_or_placeholder, TypeClassifier};
use crate::fingerprint::fingerprint_file;

use anyhow::{Context, Result};
use std::path::Path;

/// Fingerprint, classify and measure the file at `path`.
///
/// Only fingerprinting and metadata failures are errors; classification
/// failures degrade to the placeholder description.
pub fn process(
    classifier: &dyn TypeClassifier,
    path: &Path,
    logical_path: String,
    size_compressed: Option<u64>,
) -> Result<Entry> {
    let fingerprint = fingerprint_file(path)?;
    let type_description = describe_or_placeholder(classifier, path);

    let size_uncompressed = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    Ok(Entry {
        logical_path,
        size_uncompressed,
        size_compressed,
        type_description,
        sha256: fingerprint.sha256,
        md5: fingerprint.md5,
    })
}
