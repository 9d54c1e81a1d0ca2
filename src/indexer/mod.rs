//! Recursive indexing.
//!
//! [`Indexer::index`] sniffs the submitted file, opens it with the matching
//! [`ArchiveReader`] and walks it. Each extracted entry is recorded first and
//! then, while depth remains, treated as a container in its own right before
//! the next sibling is touched:
//!
//! ```text
//! outer.zip            remaining_depth = D
//!   a.txt              recorded, sniffed, not a container
//!   b.zip              recorded, then expanded with D - 1
//!     b.zip/c.txt
//!   d.txt
//! ```
//!
//! Failures below the root (an entry that cannot be extracted, hashed, or
//! opened as the container it looks like) are logged, counted in the
//! manifest's `error_count` and skipped. Only failing to open the root itself
//! is returned as an error.

pub mod entry;
pub mod manifest;

pub use manifest::{Entry, Manifest};

use manifest::ManifestBuilder;

use crate::archive::{self, sniff_path, ArchiveReader, ExtractedEntry, Format, ScratchSpace};
use crate::classify::{describe_or_placeholder, FileCommand, TypeClassifier};
use crate::config::IndexerConfig;
use crate::paths;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, debug_span, info, warn};

/// Position of one container level in the nesting tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionContext {
    /// Levels that may still be expanded, this one included
    pub remaining_depth: u32,
    /// Logical path of the container being expanded (empty at the root)
    pub path_prefix: String,
}

impl RecursionContext {
    pub fn root(max_depth: u32) -> Self {
        Self {
            remaining_depth: max_depth,
            path_prefix: String::new(),
        }
    }

    /// Context for expanding the entry `name` found at this level.
    pub fn child(&self, name: &str) -> Self {
        Self {
            remaining_depth: self.remaining_depth.saturating_sub(1),
            path_prefix: paths::join_logical(&self.path_prefix, name),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_depth == 0
    }
}

/// Result of indexing one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The submission is a container of `format`
    Indexed { format: Format, manifest: Manifest },
    /// The submission is not a recognised container
    Unsupported,
}

impl IndexOutcome {
    pub fn format(&self) -> Option<Format> {
        match self {
            IndexOutcome::Indexed { format, .. } => Some(*format),
            IndexOutcome::Unsupported => None,
        }
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            IndexOutcome::Indexed { manifest, .. } => Some(manifest),
            IndexOutcome::Unsupported => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, IndexOutcome::Unsupported)
    }
}

/// Recursive archive indexer.
///
/// Holds no per-submission state; one instance can index any number of files.
pub struct Indexer {
    scratch: ScratchSpace,
    classifier: Box<dyn TypeClassifier + Send + Sync>,
}

impl Indexer {
    /// Create an indexer that classifies entries with the `file` utility.
    pub fn new(config: IndexerConfig) -> Result<Self> {
        let classifier = FileCommand::new(config.file_command(), config.classify_timeout);
        Self::with_classifier(config, classifier)
    }

    /// Create an indexer with a custom classifier.
    pub fn with_classifier(
        config: IndexerConfig,
        classifier: impl TypeClassifier + Send + Sync + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let scratch = match config.scratch_dir {
            Some(dir) => ScratchSpace::in_dir(dir),
            None => ScratchSpace::system(),
        };

        Ok(Self {
            scratch,
            classifier: Box::new(classifier),
        })
    }

    /// Type description of a file, `N/A` if classification fails.
    pub fn describe(&self, path: &Path) -> String {
        describe_or_placeholder(self.classifier.as_ref(), path)
    }

    /// Index the file at `source`, expanding at most `max_depth` levels.
    pub fn index(&self, source: &Path, max_depth: u32) -> Result<IndexOutcome> {
        let format = sniff_path(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;

        let Some(format) = format else {
            info!("{} is not a supported container", source.display());
            return Ok(IndexOutcome::Unsupported);
        };

        let root = RecursionContext::root(max_depth);
        if root.is_exhausted() {
            debug!("max depth is 0, not expanding {}", source.display());
            return Ok(IndexOutcome::Indexed {
                format,
                manifest: Manifest::default(),
            });
        }

        info!("Indexing {} as {}", source.display(), format);
        let mut reader = archive::open(format, source)?;
        let manifest = self.expand(reader.as_mut(), &root);

        info!(
            "Indexed {}: {} entries, {} errors",
            source.display(),
            manifest.len(),
            manifest.error_count()
        );
        Ok(IndexOutcome::Indexed { format, manifest })
    }

    /// Index a stream submitted as `file_name`.
    ///
    /// The stream is spooled to scratch under the submitted name so suffix
    /// based detection still applies.
    pub fn index_reader<R: Read>(&self, mut reader: R, file_name: &str, max_depth: u32) -> Result<IndexOutcome> {
        let dir = self.scratch.acquire()?;
        let path = dir.path().join(paths::transient_file_name(file_name));

        {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            io::copy(&mut reader, &mut writer)
                .with_context(|| format!("Failed to receive '{}'", file_name))?;
            writer
                .flush()
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        self.index(&path, max_depth)
    }

    /// Walk one opened container; never fails, every failure is counted.
    fn expand(&self, reader: &mut dyn ArchiveReader, ctx: &RecursionContext) -> Manifest {
        let span = debug_span!(
            "level",
            prefix = %ctx.path_prefix,
            remaining_depth = ctx.remaining_depth
        );
        let _enter = span.enter();

        let mut builder = ManifestBuilder::new();
        let walked = reader.walk(&self.scratch, &mut |item| match item {
            Ok(extracted) => self.visit(extracted, ctx, &mut builder),
            Err(e) => {
                warn!("Failed to extract entry under '{}': {:#}", ctx.path_prefix, e);
                builder.record_failure();
            }
        });

        if let Err(e) = walked {
            warn!("Stopped enumerating '{}': {:#}", ctx.path_prefix, e);
            builder.record_failure();
        }

        builder.finish()
    }

    /// Record one entry, then expand it. The entry's scratch directory is
    /// released when this returns.
    fn visit(&self, extracted: ExtractedEntry, ctx: &RecursionContext, builder: &mut ManifestBuilder) {
        let child = ctx.child(&extracted.name);

        match entry::process(
            self.classifier.as_ref(),
            &extracted.path,
            child.path_prefix.clone(),
            extracted.size_compressed,
        ) {
            Ok(entry) => builder.push(entry),
            Err(e) => {
                warn!("Failed to process '{}': {:#}", child.path_prefix, e);
                builder.record_failure();
                return;
            }
        }

        match self.descend(&extracted.path, &child) {
            Ok(subtree) => builder.absorb(subtree),
            Err(e) => {
                warn!("Failed to expand '{}': {:#}", child.path_prefix, e);
                builder.record_failure();
            }
        }
    }

    /// Expand the file at `path` if depth remains and it is a container.
    fn descend(&self, path: &Path, ctx: &RecursionContext) -> Result<Manifest> {
        if ctx.is_exhausted() {
            debug!("depth exhausted at '{}'", ctx.path_prefix);
            return Ok(Manifest::default());
        }

        let Some(format) = sniff_path(path)
            .with_context(|| format!("Failed to sniff {}", path.display()))?
        else {
            return Ok(Manifest::default());
        };

        debug!("expanding '{}' as {}", ctx.path_prefix, format);
        let mut reader = archive::open(format, path)?;
        Ok(self.expand(reader.as_mut(), ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifyError;
    use std::io::Cursor;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    struct Fixed;

    impl TypeClassifier for Fixed {
        fn describe(&self, _path: &Path) -> Result<String, ClassifyError> {
            Ok("data".to_string())
        }
    }

    fn zip_bytes(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default())?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn indexer(scratch: &Path) -> Result<Indexer> {
        let config = IndexerConfig {
            scratch_dir: Some(scratch.to_path_buf()),
            ..Default::default()
        };
        Indexer::with_classifier(config, Fixed)
    }

    #[test]
    fn test_context_child() {
        let root = RecursionContext::root(2);
        let child = root.child("b.zip");
        assert_eq!(child.path_prefix, "b.zip");
        assert_eq!(child.remaining_depth, 1);

        let grandchild = child.child("c.tar");
        assert_eq!(grandchild.path_prefix, "b.zip/c.tar");
        assert!(grandchild.is_exhausted());
        assert!(grandchild.child("x").is_exhausted());
    }

    #[test]
    fn test_zero_depth_returns_empty_manifest_for_container() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("outer.zip");
        std::fs::write(&path, zip_bytes(&[("a.txt", &b"hi"[..])])?)?;

        let outcome = indexer(dir.path())?.index(&path, 0)?;
        assert_eq!(outcome.format(), Some(Format::Zip));
        assert!(outcome.manifest().is_some_and(Manifest::is_empty));
        Ok(())
    }

    #[test]
    fn test_plain_file_is_unsupported() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"just text")?;

        let outcome = indexer(dir.path())?.index(&path, 5)?;
        assert!(outcome.is_unsupported());
        Ok(())
    }

    #[test]
    fn test_missing_root_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        assert!(indexer(dir.path())?.index(&dir.path().join("gone.zip"), 5).is_err());
        Ok(())
    }

    #[test]
    fn test_broken_nested_container_counted_and_recorded() -> Result<()> {
        // Looks like a zip by magic but has no central directory
        let fake_zip: &[u8] = b"PK\x03\x04 truncated";
        let outer = zip_bytes(&[("bad.zip", fake_zip), ("ok.txt", &b"fine"[..])])?;

        let dir = tempdir()?;
        let path = dir.path().join("outer.zip");
        std::fs::write(&path, outer)?;

        let outcome = indexer(dir.path())?.index(&path, 3)?;
        let manifest = outcome.manifest().expect("zip is supported");
        assert_eq!(manifest.logical_paths().collect::<Vec<_>>(), vec!["bad.zip", "ok.txt"]);
        assert_eq!(manifest.error_count(), 1);
        Ok(())
    }

    #[test]
    fn test_index_reader_keeps_suffix() -> Result<()> {
        let dir = tempdir()?;

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "inner.txt", &b"abc"[..])?;
        let tar_bytes = builder.into_inner()?;

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes)?;
        let upload = gz.finish()?;

        let outcome = indexer(dir.path())?.index_reader(Cursor::new(upload), "upload.tar.gz", 2)?;
        assert_eq!(outcome.format(), Some(Format::Tar(archive::Codec::Gzip)));

        let manifest = outcome.manifest().expect("tar is supported");
        assert_eq!(manifest.entries()[0].logical_path, "inner.txt");
        assert_eq!(manifest.entries()[0].size_uncompressed, 3);
        assert_eq!(manifest.entries()[0].size_compressed, None);
        Ok(())
    }

    #[test]
    fn test_scratch_released_after_indexing() -> Result<()> {
        let dir = tempdir()?;
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch)?;

        let inner = zip_bytes(&[("c.txt", &b"bye"[..])])?;
        let path = dir.path().join("outer.zip");
        std::fs::write(&path, zip_bytes(&[("b.zip", inner.as_slice())])?)?;

        let outcome = indexer(&scratch)?.index(&path, 4)?;
        assert_eq!(outcome.manifest().map(Manifest::len), Some(2));
        assert_eq!(std::fs::read_dir(&scratch)?.count(), 0);
        Ok(())
    }
}
