//! Revision walking
//!
//! Resolves a commit range into an ordered oldest-to-newest revision list by
//! querying git history. Read-only: nothing here touches the working tree.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// How many parent directories to climb when auto-discovering the base path.
pub const MAX_ASCENT: usize = 20;

/// Failures resolving the repository or its history. All of these abort the
/// whole run; no partial walking is attempted.
#[derive(Debug, Error)]
pub enum RangeError {
    /// The `--commit-range` value did not parse.
    #[error("malformed commit range {0:?}: expected OLDEST[,NEWEST]")]
    Malformed(String),

    /// No ancestor directory contains both project directories.
    #[error(
        "could not locate a base path containing {engine:?} and {bench:?} \
         within {MAX_ASCENT} parent directories; pass --base-path"
    )]
    BaseNotFound {
        /// Expected engine directory name.
        engine: String,
        /// Expected benchmark directory name.
        bench: String,
    },

    /// The history query failed.
    #[error("git log failed in {repo}: {detail}")]
    History {
        /// Repository the query ran in.
        repo: PathBuf,
        /// Exit status or stderr excerpt.
        detail: String,
    },

    /// git itself could not be invoked.
    #[error("failed to run git: {0}")]
    Git(#[from] std::io::Error),
}

/// An inclusive revision range, oldest first. When `newest` is absent the
/// range extends to the current tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    /// Oldest revision, always included in the walk.
    pub oldest: String,
    /// Newest revision, or the current tip when absent.
    pub newest: Option<String>,
}

impl RevisionRange {
    /// Parse an `OLDEST[,NEWEST]` range value.
    pub fn parse(value: &str) -> Result<Self, RangeError> {
        let mut parts = value.split(',').map(str::trim);
        let oldest = match parts.next() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(RangeError::Malformed(value.to_string())),
        };
        let newest = match parts.next() {
            None => None,
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) => return Err(RangeError::Malformed(value.to_string())),
        };
        if parts.next().is_some() {
            return Err(RangeError::Malformed(value.to_string()));
        }
        Ok(Self { oldest, newest })
    }

    /// Whether the range collapses to a single revision.
    fn is_single(&self) -> bool {
        self.newest
            .as_deref()
            .is_some_and(|newest| newest.eq_ignore_ascii_case(&self.oldest))
    }
}

/// Locate the base path holding both project directories by climbing from
/// `start` through at most [`MAX_ASCENT`] parents.
pub fn discover_base_path(
    start: &Path,
    engine_dir: &str,
    bench_dir: &str,
) -> Result<PathBuf, RangeError> {
    let mut dir = Some(start);
    for _ in 0..=MAX_ASCENT {
        match dir {
            Some(d) => {
                if d.join(engine_dir).is_dir() && d.join(bench_dir).is_dir() {
                    return Ok(d.to_path_buf());
                }
                dir = d.parent();
            }
            None => break,
        }
    }
    Err(RangeError::BaseNotFound {
        engine: engine_dir.to_string(),
        bench: bench_dir.to_string(),
    })
}

/// Resolve the range into revision ids, oldest first. The oldest revision is
/// always the first element; history between oldest (exclusive) and newest
/// (inclusive) follows.
pub fn walk_revisions(repo: &Path, range: &RevisionRange) -> Result<Vec<String>, RangeError> {
    if range.is_single() {
        return Ok(vec![range.oldest.clone()]);
    }

    let span = format!(
        "{}..{}",
        range.oldest,
        range.newest.as_deref().unwrap_or("HEAD")
    );
    let output = Command::new("git")
        .args(["log", "--pretty=format:%H", &span])
        .current_dir(repo)
        .output()?;

    if !output.status.success() {
        return Err(RangeError::History {
            repo: repo.to_path_buf(),
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(oldest_first(
        &range.oldest,
        &String::from_utf8_lossy(&output.stdout),
    ))
}

/// Order `git log` output (newest first) into an oldest-first walk that
/// includes the range's oldest revision itself.
fn oldest_first(oldest: &str, log_output: &str) -> Vec<String> {
    let mut revisions: Vec<String> = log_output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    revisions.push(oldest.to_string());
    revisions.reverse();
    revisions
}
