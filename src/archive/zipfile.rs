//! ZIP reader.
//!
//! Random access by index: a corrupt or encrypted entry only costs that entry,
//! enumeration carries on with the next index.

use super::{extract_stream, ArchiveReader, ExtractedEntry, Format, ScratchSpace, Visit};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

pub struct ZipReader {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open ZIP: {}", path.display()))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("Failed to read ZIP: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Extract entry `index`, or `None` for directories.
    fn extract_index(&mut self, index: usize, scratch: &ScratchSpace) -> Result<Option<ExtractedEntry>> {
        let mut entry = self
            .archive
            .by_index(index)
            .with_context(|| format!("Failed to read entry #{} of {}", index, self.path.display()))?;

        let name = entry.name().to_string();
        if entry.is_dir() {
            debug!("skipping directory entry '{}'", name);
            return Ok(None);
        }

        let size_compressed = Some(entry.compressed_size());
        extract_stream(scratch, &name, &name, size_compressed, &mut entry).map(Some)
    }
}

impl ArchiveReader for ZipReader {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()> {
        for index in 0..self.archive.len() {
            match self.extract_index(index, scratch) {
                Ok(Some(entry)) => visit(Ok(entry)),
                Ok(None) => {}
                Err(e) => visit(Err(e)),
            }
        }
        Ok(())
    }
}
