//! File type classification.
//!
//! Each extracted entry gets a human-readable type description from an
//! external classifier, by default the `file` utility in brief mode. The
//! classifier sits behind the [`TypeClassifier`] trait so tests can substitute
//! a deterministic fake.
//!
//! Classification never fails an entry: [`describe_or_placeholder`] turns any
//! failure (missing tool, non-zero exit, timeout) into [`PLACEHOLDER`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Description used when classification fails.
pub const PLACEHOLDER: &str = "N/A";

/// Default name of the classification binary.
pub const FILE_COMMAND: &str = "file";

/// Default time allowed for one classification.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the classification collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier binary not found: {0}")]
    NotFound(String),

    #[error("failed to run classifier: {0}")]
    Io(#[from] std::io::Error),

    #[error("classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("classifier timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
}

/// Describes the type of a file on disk.
#[cfg_attr(test, mockall::automock)]
pub trait TypeClassifier {
    /// Return a one-line description of the file at `path`.
    fn describe(&self, path: &Path) -> Result<String, ClassifyError>;
}

/// Classify `path`, falling back to [`PLACEHOLDER`] on any failure.
pub fn describe_or_placeholder(classifier: &dyn TypeClassifier, path: &Path) -> String {
    match classifier.describe(path) {
        Ok(description) => description,
        Err(e) => {
            warn!("Type classification failed for {}: {}", path.display(), e);
            PLACEHOLDER.to_string()
        }
    }
}

/// Classifier backed by the `file` utility.
#[derive(Debug, Clone)]
pub struct FileCommand {
    program: PathBuf,
    timeout: Duration,
}

impl FileCommand {
    /// Use `program` (a path, or a name looked up in `PATH`).
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn resolve(&self) -> Result<PathBuf, ClassifyError> {
        which::which(&self.program)
            .map_err(|_| ClassifyError::NotFound(self.program.display().to_string()))
    }
}

impl Default for FileCommand {
    fn default() -> Self {
        Self::new(FILE_COMMAND, DEFAULT_TIMEOUT)
    }
}

impl TypeClassifier for FileCommand {
    fn describe(&self, path: &Path) -> Result<String, ClassifyError> {
        let program = self.resolve()?;
        debug!("Classifying {} with {}", path.display(), program.display());

        // -b: brief mode, no "path: " prefix
        let mut child = Command::new(&program)
            .arg("-b")
            .arg("--")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let stdout = child
                    .stdout
                    .take()
                    .map(std::io::read_to_string)
                    .transpose()?
                    .unwrap_or_default();

                if !status.success() {
                    let stderr = child
                        .stderr
                        .take()
                        .map(std::io::read_to_string)
                        .transpose()?
                        .unwrap_or_default();
                    return Err(ClassifyError::Failed {
                        status: status.to_string(),
                        stderr: stderr.trim().to_string(),
                    });
                }

                Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ClassifyError::TimedOut(self.timeout))
            }
        }
    }
}
