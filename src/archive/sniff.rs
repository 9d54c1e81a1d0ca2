//! Container format detection.
//!
//! Detection uses magic bytes first and file-name suffixes as a fallback, in a
//! fixed priority order:
//!
//! 1. 7z signature
//! 2. ZIP signature
//! 3. RAR signature, or a self-extracting RAR (executable stub + signature)
//! 4. Web archive by suffix (`.warc`, `.arc`, `.warc.gz`, `.arc.gz`)
//! 5. Tar by `ustar` magic (plain or inside a gzip/bzip2/xz stream), or by
//!    compressed suffix (`.tar.gz`, `.tar.bz2`, `.tar.xz`)
//! 6. Tar+zstd by suffix (`.tar.zst`, `.tar.zstd`) or by magic
//!
//! The order matters: a self-extracting RAR also looks like an executable, and
//! a compressed tar may only be recognisable by its suffix.
//!
//! Every probe that reads from the stream seeks back to where it started, so
//! each probe sees the same prefix. A miss is not an error: `Ok(None)` simply
//! means "not a container".

use crate::paths;

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read for magic probes (one tar header block).
const HEAD_LEN: usize = 512;

/// How far into an executable stub we look for an embedded RAR signature.
const SFX_SCAN_LEN: u64 = 2 * 1024 * 1024;

const SEVEN_Z_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const RAR4_MAGIC: &[u8] = b"Rar!\x1A\x07\x00";
const RAR5_MAGIC: &[u8] = b"Rar!\x1A\x07\x01\x00";
/// Common prefix of both RAR signatures, used for the SFX scan.
const RAR_SIGNATURE: &[u8] = b"Rar!\x1A\x07";
const EXECUTABLE_MAGICS: [&[u8]; 2] = [b"MZ", b"\x7FELF"];
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

const WEB_ARCHIVE_SUFFIXES: &[&str] = &[".warc", ".arc", ".warc.gz", ".arc.gz"];
const TAR_GZ_SUFFIXES: &[&str] = &[".tar.gz", ".tgz"];
const TAR_BZ2_SUFFIXES: &[&str] = &[".tar.bz2", ".tbz2"];
const TAR_XZ_SUFFIXES: &[&str] = &[".tar.xz", ".txz"];
const TAR_ZSTD_SUFFIXES: &[&str] = &[".tar.zst", ".tar.zstd"];

/// Stream codec wrapped around a tar archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Codec {
    /// Identify a compression codec by its leading magic bytes.
    pub fn from_magic(head: &[u8]) -> Option<Codec> {
        if head.starts_with(&[0x1F, 0x8B]) {
            Some(Codec::Gzip)
        } else if head.starts_with(b"BZh") {
            Some(Codec::Bzip2)
        } else if head.starts_with(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Codec::Xz)
        } else {
            None
        }
    }

    /// Wrap `reader` in the matching decoder.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Codec::None => Box::new(reader),
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            Codec::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            Codec::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
        }
    }
}

/// Container format detected by [`sniff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// 7z archive (7z signature)
    SevenZip,
    /// ZIP archive (PK signature)
    Zip,
    /// RAR archive, plain or self-extracting
    Rar,
    /// WARC or ARC web capture
    WebArchive,
    /// Tar archive, optionally wrapped in a gzip/bzip2/xz stream
    Tar(Codec),
    /// Tar archive wrapped in a zstd stream
    TarZstd,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::SevenZip => "7z",
            Format::Zip => "zip",
            Format::Rar => "rar",
            Format::WebArchive => "web-archive",
            Format::Tar(Codec::None) => "tar",
            Format::Tar(Codec::Gzip) => "tar+gzip",
            Format::Tar(Codec::Bzip2) => "tar+bzip2",
            Format::Tar(Codec::Xz) => "tar+xz",
            Format::TarZstd => "tar+zstd",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify the file at `path`.
pub fn sniff_path(path: &Path) -> io::Result<Option<Format>> {
    let mut file = BufReader::new(File::open(path)?);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    sniff(&mut file, &name)
}

/// Classify a seekable byte source whose file name is `name`.
///
/// The stream position is the same on return as on entry, whether or not a
/// format matched.
pub fn sniff<R: Read + Seek>(reader: &mut R, name: &str) -> io::Result<Option<Format>> {
    let head = restoring_position(reader, |r| read_prefix(r, HEAD_LEN as u64))?;

    if head.starts_with(SEVEN_Z_MAGIC) {
        return Ok(Some(Format::SevenZip));
    }

    if ZIP_MAGICS.iter().any(|magic| head.starts_with(magic)) {
        return Ok(Some(Format::Zip));
    }

    if head.starts_with(RAR4_MAGIC) || head.starts_with(RAR5_MAGIC) || is_rar_sfx(reader, &head)? {
        return Ok(Some(Format::Rar));
    }

    if paths::has_suffix(name, WEB_ARCHIVE_SUFFIXES) {
        return Ok(Some(Format::WebArchive));
    }

    if let Some(codec) = sniff_tar(reader, &head, name)? {
        return Ok(Some(Format::Tar(codec)));
    }

    if paths::has_suffix(name, TAR_ZSTD_SUFFIXES) || is_zstd_tar(reader, &head)? {
        return Ok(Some(Format::TarZstd));
    }

    Ok(None)
}

/// Run `probe` and seek back to the starting position afterwards, even if the
/// probe failed.
fn restoring_position<R, T, F>(reader: &mut R, probe: F) -> io::Result<T>
where
    R: Read + Seek,
    F: FnOnce(&mut R) -> io::Result<T>,
{
    let start = reader.stream_position()?;
    let result = probe(reader);
    reader.seek(SeekFrom::Start(start))?;
    result
}

/// Read up to `limit` bytes; short reads at EOF are fine.
fn read_prefix<R: Read>(reader: R, limit: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}

fn has_tar_magic(block: &[u8]) -> bool {
    block
        .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len())
        .is_some_and(|magic| magic == TAR_MAGIC)
}

/// Self-extracting RAR: an executable stub with a RAR signature further in.
fn is_rar_sfx<R: Read + Seek>(reader: &mut R, head: &[u8]) -> io::Result<bool> {
    if !EXECUTABLE_MAGICS.iter().any(|magic| head.starts_with(magic)) {
        return Ok(false);
    }

    let window = restoring_position(reader, |r| read_prefix(r, SFX_SCAN_LEN))?;
    Ok(window
        .windows(RAR_SIGNATURE.len())
        .any(|candidate| candidate == RAR_SIGNATURE))
}

/// Tar, plain or compressed. Magic wins over suffix; the suffix only decides
/// when the decompressed header is unreadable.
fn sniff_tar<R: Read + Seek>(reader: &mut R, head: &[u8], name: &str) -> io::Result<Option<Codec>> {
    if has_tar_magic(head) {
        return Ok(Some(Codec::None));
    }

    if let Some(codec) = Codec::from_magic(head) {
        let block = restoring_position(reader, |r| {
            // A corrupt stream is just "not a tar" here
            Ok(read_prefix(codec.decoder(r), HEAD_LEN as u64).unwrap_or_default())
        })?;
        if has_tar_magic(&block) {
            return Ok(Some(codec));
        }
    }

    let by_suffix = if paths::has_suffix(name, TAR_GZ_SUFFIXES) {
        Some(Codec::Gzip)
    } else if paths::has_suffix(name, TAR_BZ2_SUFFIXES) {
        Some(Codec::Bzip2)
    } else if paths::has_suffix(name, TAR_XZ_SUFFIXES) {
        Some(Codec::Xz)
    } else {
        None
    };

    Ok(by_suffix)
}

fn is_zstd_tar<R: Read + Seek>(reader: &mut R, head: &[u8]) -> io::Result<bool> {
    if !head.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
        return Ok(false);
    }

    restoring_position(reader, |r| {
        let block = zstd::Decoder::new(r)
            .and_then(|decoder| read_prefix(decoder, HEAD_LEN as u64))
            .unwrap_or_default();
        Ok(has_tar_magic(&block))
    })
}
