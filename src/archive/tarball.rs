//! Tar reader (plain, gzip, bzip2, xz and zstd streams).
//!
//! Tar is a sequential format: members are extracted as the stream passes
//! them, and a damaged header ends enumeration because the next header's
//! position can no longer be trusted. A read error inside a member's data
//! ends it too: with a compression codec the decoder is broken from that
//! point on. Once the end marker is reached the rest of the stream is drained
//! so that a damaged trailer (gzip CRC, zstd checksum) is still reported.
//!
//! Tar carries no per-member compressed size, so every entry reports `None`.

use super::{try_extract_stream, ArchiveReader, Codec, ExtractFailure, Format, ScratchSpace, Visit};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::EntryType;
use tracing::debug;

pub struct TarballReader {
    path: PathBuf,
    format: Format,
    archive: Option<tar::Archive<Box<dyn Read>>>,
}

impl TarballReader {
    /// Open a plain or gzip/bzip2/xz-compressed tar.
    pub fn open(path: &Path, codec: Codec) -> Result<Self> {
        let file = open_file(path)?;
        Ok(Self::from_stream(path, Format::Tar(codec), codec.decoder(file)))
    }

    /// Open a zstd-compressed tar.
    pub fn open_zstd(path: &Path) -> Result<Self> {
        let file = open_file(path)?;
        let decoder = zstd::Decoder::new(file)
            .with_context(|| format!("Failed to start zstd stream: {}", path.display()))?;
        Ok(Self::from_stream(path, Format::TarZstd, Box::new(decoder)))
    }

    fn from_stream(path: &Path, format: Format, stream: Box<dyn Read>) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
            archive: Some(tar::Archive::new(stream)),
        }
    }
}

fn open_file(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open tar: {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Member types that carry a byte stream of their own.
fn has_content(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse
    )
}

impl ArchiveReader for TarballReader {
    fn format(&self) -> Format {
        self.format
    }

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()> {
        let path = &self.path;
        let mut archive = self
            .archive
            .take()
            .with_context(|| format!("Tar stream already consumed: {}", path.display()))?;

        let members = archive
            .entries()
            .with_context(|| format!("Failed to read tar: {}", path.display()))?;

        for member in members {
            let mut member = member
                .with_context(|| format!("Failed to read tar member header in {}", path.display()))?;

            let name = match member.path() {
                Ok(p) => p.to_string_lossy().into_owned(),
                Err(e) => {
                    visit(Err(e).context("Tar member has an unreadable path"));
                    continue;
                }
            };

            let entry_type = member.header().entry_type();
            if entry_type.is_dir() {
                debug!("skipping directory entry '{}'", name);
                continue;
            }
            if !has_content(entry_type) {
                debug!("skipping {:?} member '{}'", entry_type, name);
                continue;
            }

            match try_extract_stream(scratch, &name, &name, None, &mut member) {
                Ok(entry) => visit(Ok(entry)),
                // The iterator skips whatever part of the member was left unread
                Err(ExtractFailure::Destination(e)) => visit(Err(e)),
                Err(ExtractFailure::Source(e)) => {
                    return Err(e.context(format!("Tar stream broken in {}", path.display())));
                }
            }
        }

        io::copy(&mut archive.into_inner(), &mut io::sink())
            .with_context(|| format!("Failed to read to the end of {}", path.display()))?;
        Ok(())
    }
}
