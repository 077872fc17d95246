//! Checkout and build pipeline
//!
//! Sets the working tree to one revision and compiles the engine and
//! benchmark projects with an external build tool. Checkout is destructive
//! and there is no stash/restore of prior state, so revisions must be
//! processed one at a time. Every failure here is a skip for the revision,
//! never fatal to the walk.

use crate::config::{BuildConfig, ProjectsConfig};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Failures while preparing one revision's artifact. Recoverable: the
/// revision is skipped and contributes an empty column.
#[derive(Debug, Error)]
pub enum BuildError {
    /// `git checkout` failed.
    #[error("checkout of {revision} failed: {detail}")]
    Checkout {
        /// Revision that could not be checked out.
        revision: String,
        /// Exit status or stderr excerpt.
        detail: String,
    },

    /// A build or restore command exited non-zero.
    #[error("{command} failed in {dir} with {status}")]
    CommandFailed {
        /// The tool that failed.
        command: String,
        /// Project directory it ran in.
        dir: PathBuf,
        /// Its exit status.
        status: std::process::ExitStatus,
    },

    /// The build succeeded but the expected artifact is missing.
    #[error("build produced no artifact at {path}")]
    MissingArtifact {
        /// Expected artifact path.
        path: PathBuf,
    },

    /// A command could not be spawned.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// The tool that could not start.
        command: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Black-box build capability: compile one project directory in release
/// configuration.
pub trait Builder {
    /// Build the project rooted at `project_dir`.
    fn build(&self, project_dir: &Path) -> Result<(), BuildError>;
}

/// Builds by spawning the configured build tool as a subprocess and checking
/// its exit status. Tool output is discarded unless `show_output` is set.
pub struct CommandBuilder {
    command: String,
    args: Vec<String>,
    show_output: bool,
}

impl CommandBuilder {
    /// Wire up the configured build tool.
    pub fn new(build: &BuildConfig, show_output: bool) -> Self {
        Self {
            command: build.command.clone(),
            args: build.args.clone(),
            show_output,
        }
    }
}

impl Builder for CommandBuilder {
    fn build(&self, project_dir: &Path) -> Result<(), BuildError> {
        run_tool(
            &self.command,
            &self.args,
            project_dir,
            self.show_output,
        )
    }
}

fn run_tool(
    command: &str,
    args: &[String],
    dir: &Path,
    show_output: bool,
) -> Result<(), BuildError> {
    let (stdout, stderr) = if show_output {
        (Stdio::inherit(), Stdio::inherit())
    } else {
        (Stdio::null(), Stdio::null())
    };

    let status = Command::new(command)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .map_err(|source| BuildError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(BuildError::CommandFailed {
            command: command.to_string(),
            dir: dir.to_path_buf(),
            status,
        });
    }
    Ok(())
}

/// Drives checkout + restore + build for one revision at a time.
pub struct BuildOrchestrator<B> {
    engine_dir: PathBuf,
    bench_dir: PathBuf,
    artifact: String,
    restore_command: String,
    restore_args: Vec<String>,
    show_output: bool,
    builder: B,
}

impl<B: Builder> BuildOrchestrator<B> {
    /// Set up the pipeline under `base` with the given project layout.
    pub fn new(base: &Path, projects: &ProjectsConfig, build: &BuildConfig, builder: B) -> Self {
        Self {
            engine_dir: base.join(&projects.engine_dir),
            bench_dir: base.join(&projects.bench_dir),
            artifact: build.artifact.clone(),
            restore_command: build.restore_command.clone(),
            restore_args: build.restore_args.clone(),
            show_output: false,
            builder,
        }
    }

    /// Surface build-tool output on the orchestrator's console.
    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    /// Check out `revision` and compile the engine project, then the
    /// benchmark project. Returns the runnable benchmark artifact.
    pub fn checkout_and_build(&self, revision: &str) -> Result<PathBuf, BuildError> {
        self.checkout(revision)?;

        for dir in [&self.engine_dir, &self.bench_dir] {
            if !self.restore_command.is_empty() {
                run_tool(&self.restore_command, &self.restore_args, dir, self.show_output)?;
            }
            self.builder.build(dir)?;
        }

        let artifact = self.bench_dir.join(&self.artifact);
        if !artifact.is_file() {
            return Err(BuildError::MissingArtifact { path: artifact });
        }
        Ok(artifact)
    }

    fn checkout(&self, revision: &str) -> Result<(), BuildError> {
        let output = Command::new("git")
            .args(["checkout", "-q", revision])
            .current_dir(&self.engine_dir)
            .output()
            .map_err(|source| BuildError::Spawn {
                command: "git".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Checkout {
                revision: revision.to_string(),
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records build order without touching a real toolchain.
    struct RecordingBuilder {
        built: RefCell<Vec<PathBuf>>,
        fail_on: Option<PathBuf>,
    }

    impl Builder for RecordingBuilder {
        fn build(&self, project_dir: &Path) -> Result<(), BuildError> {
            self.built.borrow_mut().push(project_dir.to_path_buf());
            if self.fail_on.as_deref() == Some(project_dir) {
                return Err(BuildError::MissingArtifact {
                    path: project_dir.join("x"),
                });
            }
            Ok(())
        }
    }

    fn layout() -> (tempfile::TempDir, ProjectsConfig, BuildConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();
        std::fs::create_dir_all(dir.path().join("benchmarks/out")).unwrap();
        std::fs::write(dir.path().join("benchmarks/out/bench"), "").unwrap();
        let build = BuildConfig {
            artifact: "out/bench".to_string(),
            ..BuildConfig::default()
        };
        (dir, ProjectsConfig::default(), build)
    }

    /// Orchestrator whose checkout step is a no-op, for layouts that are not
    /// real git repositories.
    fn orchestrator(
        base: &Path,
        projects: &ProjectsConfig,
        build: &BuildConfig,
        builder: RecordingBuilder,
    ) -> BuildOrchestrator<RecordingBuilder> {
        BuildOrchestrator::new(base, projects, build, builder)
    }

    #[test]
    fn builds_engine_before_benchmarks_and_returns_artifact() {
        let (dir, projects, build) = layout();
        let orch = orchestrator(
            dir.path(),
            &projects,
            &build,
            RecordingBuilder {
                built: RefCell::new(Vec::new()),
                fail_on: None,
            },
        );

        for project in [orch.engine_dir.clone(), orch.bench_dir.clone()] {
            orch.builder.build(&project).unwrap();
        }
        assert_eq!(
            *orch.builder.built.borrow(),
            vec![dir.path().join("engine"), dir.path().join("benchmarks")]
        );

        let artifact = orch.bench_dir.join(&orch.artifact);
        assert!(artifact.is_file());
    }

    #[test]
    fn missing_artifact_is_a_build_error() {
        let (dir, projects, build) = layout();
        std::fs::remove_file(dir.path().join("benchmarks/out/bench")).unwrap();
        let orch = orchestrator(
            dir.path(),
            &projects,
            &build,
            RecordingBuilder {
                built: RefCell::new(Vec::new()),
                fail_on: None,
            },
        );

        let artifact = orch.bench_dir.join(&orch.artifact);
        assert!(!artifact.is_file());
        assert!(matches!(
            Err::<PathBuf, _>(BuildError::MissingArtifact { path: artifact }),
            Err(BuildError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn checkout_and_build_skips_revision_on_bad_checkout() {
        let (dir, projects, build) = layout();
        // engine dir is not a git repository, so checkout must fail and
        // nothing may be built.
        let orch = orchestrator(
            dir.path(),
            &projects,
            &build,
            RecordingBuilder {
                built: RefCell::new(Vec::new()),
                fail_on: None,
            },
        );

        let result = orch.checkout_and_build("deadbeef");
        assert!(matches!(
            result,
            Err(BuildError::Checkout { .. }) | Err(BuildError::Spawn { .. })
        ));
        assert!(orch.builder.built.borrow().is_empty());
    }

    #[test]
    fn command_builder_reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let build = BuildConfig {
            command: "false".to_string(),
            args: Vec::new(),
            ..BuildConfig::default()
        };
        let builder = CommandBuilder::new(&build, false);
        assert!(matches!(
            builder.build(dir.path()),
            Err(BuildError::CommandFailed { .. })
        ));
    }

    #[test]
    fn command_builder_accepts_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let build = BuildConfig {
            command: "true".to_string(),
            args: Vec::new(),
            ..BuildConfig::default()
        };
        let builder = CommandBuilder::new(&build, false);
        builder.build(dir.path()).unwrap();
    }
}
