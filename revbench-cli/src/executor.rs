//! Benchmark-process launcher
//!
//! Runs one revision's compiled benchmark executable and collects the result
//! file it leaves behind. No timeout is enforced at this layer; per-sample
//! timeouts live inside the child. The file is read only after the child has
//! exited, then deleted so a later revision cannot pick up stale results.

use revbench_core::table::{self, TableError};
use revbench_core::RevisionResult;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Failures launching or collecting from the benchmark process. Recoverable:
/// the revision contributes an empty column and the walk continues.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The child could not be started.
    #[error("failed to launch {path}: {source}")]
    Spawn {
        /// The artifact that would not start.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The child exited with a failure status (e.g. an unhandled fault in a
    /// benchmark operation running without a timeout).
    #[error("benchmark process exited with {status}")]
    Exited {
        /// The child's exit status.
        status: std::process::ExitStatus,
    },

    /// The child exited cleanly but left no result file. Also the case when
    /// a filter matched zero tests.
    #[error("benchmark process produced no result file at {path}")]
    NoResultFile {
        /// Where the file was expected.
        path: PathBuf,
    },

    /// The result file exists but does not parse.
    #[error("unreadable result file: {0}")]
    BadTable(#[from] TableError),

    /// Reading or deleting the result file failed.
    #[error("result file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Launches the benchmark executable and retrieves its result table.
pub struct BenchmarkExecutor {
    workdir: PathBuf,
    result_file: String,
    passthrough: Vec<String>,
}

impl BenchmarkExecutor {
    /// `workdir` is where the child runs and writes its result file;
    /// `passthrough` is forwarded verbatim to every launch.
    pub fn new(workdir: PathBuf, result_file: String, passthrough: Vec<String>) -> Self {
        Self {
            workdir,
            result_file,
            passthrough,
        }
    }

    /// Run `artifact`, block until it exits, then parse and delete its
    /// result file.
    pub fn run(&self, artifact: &Path, revision: &str) -> Result<RevisionResult, LaunchError> {
        let path = self.workdir.join(&self.result_file);

        // A leftover file from an earlier, failed run must not be attributed
        // to this revision.
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::warn!(path = %path.display(), "removed stale result file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let status = Command::new(artifact)
            .args(&self.passthrough)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| LaunchError::Spawn {
                path: artifact.to_path_buf(),
                source,
            })?;

        if !status.success() {
            return Err(LaunchError::Exited { status });
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LaunchError::NoResultFile { path });
            }
            Err(e) => return Err(e.into()),
        };

        let tests = table::parse_table(&text)?;
        std::fs::remove_file(&path)?;

        Ok(RevisionResult {
            revision: revision.to_string(),
            tests,
        })
    }
}
