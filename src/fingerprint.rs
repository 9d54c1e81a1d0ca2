//! Content fingerprints for extracted entries.
//!
//! Every entry is identified by its SHA-256 and MD5 digests, both rendered as
//! lowercase hex. The file is streamed once through both hashers, so memory
//! use is bounded by the chunk size regardless of entry size.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read chunk size for hashing (16 MiB).
pub const CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// SHA-256 / MD5 digest pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub sha256: String,
    pub md5: String,
}

/// Compute the fingerprint of a file.
///
/// Uses streaming to handle large files without loading into memory.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    fingerprint_reader(file)
        .with_context(|| format!("Failed to read file for hashing: {}", path.display()))
}

/// Compute the fingerprint of everything `reader` yields.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<Fingerprint> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sha256 = Sha256::new();
    let mut md5 = md5::Context::new();

    loop {
        let bytes_read = reader.read(&mut buf)?;

        if bytes_read == 0 {
            break;
        }

        sha256.update(&buf[..bytes_read]);
        md5.consume(&buf[..bytes_read]);
    }

    Ok(Fingerprint {
        sha256: format!("{:x}", sha256.finalize()),
        md5: format!("{:x}", md5.compute()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_fingerprint_empty_file() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.flush()?;

        let fp = fingerprint_file(tmp.path())?;
        assert_eq!(
            fp.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.md5, "d41d8cd98f00b204e9800998ecf8427e");
        Ok(())
    }

    #[test]
    fn test_fingerprint_known_value() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"hi")?;
        tmp.flush()?;

        let fp = fingerprint_file(tmp.path())?;
        assert_eq!(
            fp.sha256,
            "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
        );
        assert_eq!(fp.md5, "49f68a5c8493ec2c0bf489821c21fc3b");
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_deterministic() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"Test content for hashing")?;
        tmp.flush()?;

        let first = fingerprint_file(tmp.path())?;
        let second = fingerprint_file(tmp.path())?;
        assert_eq!(first, second);

        // Same bytes through a reader that hands them out one at a time
        let trickle = fingerprint_reader(OneByte(&b"Test content for hashing"[..]))?;
        assert_eq!(first, trickle);
        Ok(())
    }

    struct OneByte<R>(R);

    impl<R: Read> Read for OneByte<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let err = fingerprint_file(Path::new("/nonexistent/file.bin")).unwrap_err();
        assert!(err.to_string().contains("Failed to open file for hashing"));
    }
}
