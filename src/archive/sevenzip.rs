//! 7z reader using the pure-Rust sevenz-rust2 decoder.
//!
//! # Solid archives
//!
//! 7z archives can be "solid", where many files share one compressed stream.
//! To reach file N every file before it has to be decompressed anyway, so the
//! reader walks entries in stored order with `for_each_entries` and extracts
//! each one as the decoder passes it. Non-solid archives take the same path.
//!
//! Every entry's bytes must be consumed before the decoder moves on: in a
//! solid block the next file starts where the previous one ended. When an
//! entry cannot be written to scratch its data is still read and discarded.
//! When the data itself cannot be decoded the rest of that block is
//! abandoned, while later blocks are decoded as usual.
//!
//! Compressed size is taken from the entry metadata. Only the first file of a
//! block carries the block's packed size; the others report zero, which is
//! surfaced as unknown.

use super::{try_extract_stream, ArchiveReader, ExtractFailure, Format, ScratchSpace, Visit};

use anyhow::{Context, Result};
use sevenz_rust2::{ArchiveReader as SevenZArchive, Password};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SevenZipReader {
    path: PathBuf,
    archive: SevenZArchive<File>,
}

impl SevenZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let archive = SevenZArchive::open(path, Password::empty())
            .with_context(|| format!("Failed to open 7z archive: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }
}

/// Compressed size as reported by the header; zero means "not recorded".
fn reported_compressed_size(compressed_size: u64, size: u64) -> Option<u64> {
    if compressed_size == 0 && size > 0 {
        None
    } else {
        Some(compressed_size)
    }
}

/// Read and discard the rest of an entry so the block stays aligned.
fn discard(content: &mut dyn Read) -> io::Result<u64> {
    io::copy(content, &mut io::sink())
}

impl ArchiveReader for SevenZipReader {
    fn format(&self) -> Format {
        Format::SevenZip
    }

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()> {
        self.archive
            .for_each_entries(|entry, content| {
                let name = entry.name().to_string();
                if entry.is_directory() {
                    debug!("skipping directory entry '{}'", name);
                    return Ok(true);
                }

                let size_compressed = reported_compressed_size(entry.compressed_size, entry.size());
                match try_extract_stream(scratch, &name, &name, size_compressed, content) {
                    Ok(extracted) => visit(Ok(extracted)),
                    Err(ExtractFailure::Destination(e)) => {
                        visit(Err(e));
                        if let Err(e) = discard(content) {
                            debug!("abandoning block after '{}': {}", name, e);
                            return Ok(false);
                        }
                    }
                    Err(ExtractFailure::Source(e)) => {
                        visit(Err(e));
                        // Returning false ends only the current block
                        return Ok(false);
                    }
                }
                Ok(true)
            })
            .with_context(|| format!("Failed to decode 7z archive: {}", self.path.display()))
    }
}
