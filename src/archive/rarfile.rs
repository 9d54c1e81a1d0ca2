//! RAR reader (FFI to the unrar library).
//!
//! unrar walks the archive with a header cursor: each header is either
//! extracted or skipped, and both consume the cursor and hand back the next
//! one. A failed extraction consumes the cursor without a successor, so the
//! archive is reopened and the headers already handled are skipped. In a
//! solid archive skipping means decoding, and a damaged file can make the
//! rest unreachable; the walk then stops after reporting that one failure.
//!
//! The binding does not expose per-entry packed size, so compressed size is
//! reported as unknown.

use super::{adopt, ArchiveReader, Format, ScratchSpace, Visit};

use crate::paths;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use unrar::{CursorBeforeHeader, OpenArchive, Process};

pub struct RarReader {
    path: PathBuf,
    cursor: Option<OpenArchive<Process, CursorBeforeHeader>>,
}

impl RarReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            cursor: Some(open_cursor(path)?),
        })
    }

    /// Fresh cursor positioned after the first `handled` headers, or `None`
    /// when the archive ends before that.
    fn resume_after(&self, handled: usize) -> Result<Option<OpenArchive<Process, CursorBeforeHeader>>> {
        let mut archive = open_cursor(&self.path)?;
        for _ in 0..handled {
            match archive
                .read_header()
                .with_context(|| format!("Failed to read RAR header in {}", self.path.display()))?
            {
                Some(header) => archive = header.skip().context("Failed to skip RAR entry")?,
                None => return Ok(None),
            }
        }
        Ok(Some(archive))
    }
}

fn open_cursor(path: &Path) -> Result<OpenArchive<Process, CursorBeforeHeader>> {
    unrar::Archive::new(path)
        .open_for_processing()
        .with_context(|| format!("Failed to open RAR: {}", path.display()))
}

impl ArchiveReader for RarReader {
    fn format(&self) -> Format {
        Format::Rar
    }

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()> {
        let mut handled = 0;
        while let Some(archive) = self.cursor.take() {
            let Some(header) = archive
                .read_header()
                .with_context(|| format!("Failed to read RAR header in {}", self.path.display()))?
            else {
                break; // End of archive
            };
            handled += 1;

            let (name, is_file) = {
                let entry = header.entry();
                (entry.filename.to_string_lossy().to_string(), entry.is_file())
            };

            if !is_file {
                debug!("skipping directory entry '{}'", name);
                self.cursor = Some(header.skip().context("Failed to skip RAR entry")?);
                continue;
            }

            let dir = match scratch.acquire() {
                Ok(dir) => dir,
                Err(e) => {
                    visit(Err(e));
                    self.cursor = Some(header.skip().context("Failed to skip RAR entry")?);
                    continue;
                }
            };

            let dest = dir.path().join(paths::transient_file_name(&name));
            match header.extract_to(&dest) {
                Ok(next) => {
                    self.cursor = Some(next);
                    visit(Ok(adopt(dir, dest, name, None)));
                }
                Err(e) => {
                    visit(Err(anyhow::Error::new(e).context(format!("Failed to extract RAR entry: {}", name))));
                    match self.resume_after(handled) {
                        Ok(cursor) => self.cursor = cursor,
                        Err(e) => {
                            warn!("Cannot continue past '{}' in {}: {:#}", name, self.path.display(), e);
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
