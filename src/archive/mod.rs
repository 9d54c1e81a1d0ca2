//! Archive handling.
//!
//! Provides a uniform "enumerate and extract" interface over every container
//! format the indexer understands, using native Rust crates for ZIP (zip
//! crate), 7z (sevenz-rust2), RAR (unrar), tar (tar + flate2/bzip2/xz2/zstd)
//! and a built-in WARC/ARC record reader.
//!
//! A reader never extracts more than one entry at a time. Each extracted entry
//! owns the scratch directory it was written to, so the bytes stay on disk
//! exactly as long as the caller holds the [`ExtractedEntry`].

pub mod rarfile;
pub mod scratch;
pub mod sevenzip;
pub mod sniff;
pub mod tarball;
pub mod webarchive;
pub mod zipfile;

pub use scratch::ScratchSpace;
pub use sniff::{sniff, sniff_path, Codec, Format};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::paths;

/// One entry extracted to transient storage.
#[derive(Debug)]
pub struct ExtractedEntry {
    /// Name as stored in the container (or derived, for web archives)
    pub name: String,
    /// Where the entry's bytes live on disk
    pub path: PathBuf,
    /// Compressed size when the format reports one.
    ///
    /// `None` for rar (the binding exposes no packed size), tar and web
    /// archives (no per-member compression), and 7z entries that follow the
    /// first one in a solid block (the block's packed size is only recorded
    /// on its first file).
    pub size_compressed: Option<u64>,
    scratch: TempDir,
}

impl ExtractedEntry {
    /// Scratch directory holding the entry; removed when the entry is dropped.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Receives each extracted entry, or the failure that prevented extracting it.
pub type Visit<'a> = dyn FnMut(Result<ExtractedEntry>) + 'a;

/// Uniform enumeration over one opened container.
///
/// `walk` is single-pass: entries are extracted in stored order, one at a time,
/// and each is handed to `visit` before the next one is touched. Directory
/// entries are skipped. Failures that only affect one entry go to `visit`;
/// `walk` returns an error only when enumeration itself cannot continue.
pub trait ArchiveReader {
    fn format(&self) -> Format;

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()>;
}

/// Open the container at `path` as `format`.
pub fn open(format: Format, path: &Path) -> Result<Box<dyn ArchiveReader>> {
    let reader: Box<dyn ArchiveReader> = match format {
        Format::SevenZip => Box::new(sevenzip::SevenZipReader::open(path)?),
        Format::Zip => Box::new(zipfile::ZipReader::open(path)?),
        Format::Rar => Box::new(rarfile::RarReader::open(path)?),
        Format::WebArchive => Box::new(webarchive::WebArchiveReader::open(path)?),
        Format::Tar(codec) => Box::new(tarball::TarballReader::open(path, codec)?),
        Format::TarZstd => Box::new(tarball::TarballReader::open_zstd(path)?),
    };
    Ok(reader)
}

/// Buffer used when copying entry data into scratch
const COPY_BUFFER: usize = 64 * 1024;

/// Which side of an extraction failed.
///
/// Readers that share one decoder across entries need to know whether the
/// source is still positioned correctly after a failure.
#[derive(Debug)]
pub(crate) enum ExtractFailure {
    /// Scratch could not be prepared or written; the source is intact.
    Destination(anyhow::Error),
    /// Reading the entry's data failed; the source may be unusable.
    Source(anyhow::Error),
}

impl ExtractFailure {
    pub(crate) fn into_error(self) -> anyhow::Error {
        match self {
            Self::Destination(e) | Self::Source(e) => e,
        }
    }
}

/// Stream `content` into a fresh scratch directory as `file_name`.
///
/// This is the shared extraction step for readers that expose entry data as a
/// byte stream. On a destination failure `content` may be only partly read.
pub(crate) fn try_extract_stream<R: Read + ?Sized>(
    scratch: &ScratchSpace,
    stored_name: &str,
    file_name: &str,
    size_compressed: Option<u64>,
    content: &mut R,
) -> Result<ExtractedEntry, ExtractFailure> {
    let dir = scratch.acquire().map_err(ExtractFailure::Destination)?;
    let path = dir.path().join(paths::transient_file_name(file_name));

    let file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))
        .map_err(ExtractFailure::Destination)?;
    let mut writer = BufWriter::new(file);

    let mut buffer = vec![0u8; COPY_BUFFER];
    loop {
        let n = match content.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let e = anyhow::Error::new(e).context(format!("Failed to extract '{}'", stored_name));
                return Err(ExtractFailure::Source(e));
            }
        };
        writer
            .write_all(&buffer[..n])
            .with_context(|| format!("Failed to write {}", path.display()))
            .map_err(ExtractFailure::Destination)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
        .map_err(ExtractFailure::Destination)?;

    Ok(ExtractedEntry {
        name: stored_name.to_string(),
        path,
        size_compressed,
        scratch: dir,
    })
}

/// [`try_extract_stream`] for readers that treat both failure sides alike.
pub(crate) fn extract_stream<R: Read + ?Sized>(
    scratch: &ScratchSpace,
    stored_name: &str,
    file_name: &str,
    size_compressed: Option<u64>,
    content: &mut R,
) -> Result<ExtractedEntry> {
    try_extract_stream(scratch, stored_name, file_name, size_compressed, content).map_err(ExtractFailure::into_error)
}

/// Wrap a file that was already written into `dir`.
pub(crate) fn adopt(dir: TempDir, path: PathBuf, name: String, size_compressed: Option<u64>) -> ExtractedEntry {
    ExtractedEntry {
        name,
        path,
        size_compressed,
        scratch: dir,
    }
}
