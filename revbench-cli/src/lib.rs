#![warn(missing_docs)]
//! revbench orchestrator
//!
//! Walks a commit range of the engine repository oldest-to-newest; for each
//! revision checks out, builds, and launches that revision's benchmark
//! executable; then merges all per-revision result tables into one
//! test x revision matrix. A revision that fails to build or run is skipped
//! with a warning and contributes an empty column.

pub mod aggregate;
pub mod builder;
pub mod config;
pub mod executor;
pub mod walker;

use aggregate::{abbrev, ResultMatrix};
use builder::{BuildOrchestrator, CommandBuilder};
use clap::Parser;
use executor::BenchmarkExecutor;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walker::RevisionRange;

/// Orchestrator CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "revbench")]
#[command(about = "Benchmark an engine across a range of source revisions")]
pub struct Cli {
    /// Commit range to walk, oldest first (NEWEST defaults to the tip)
    #[arg(long, value_name = "OLDEST[,NEWEST]")]
    pub commit_range: String,

    /// Directory containing the engine and benchmark projects
    /// (default: auto-discovered from the current directory)
    #[arg(long, value_name = "PATH")]
    pub base_path: Option<PathBuf>,

    /// Show build-tool output instead of discarding it
    #[arg(long)]
    pub compiler_output: bool,

    /// Arguments forwarded verbatim to every benchmark-process launch
    /// (e.g. --filter, --timeout, --unset)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub bench_args: Vec<String>,
}

/// Binary entry point: install logging, parse the CLI, run the walk.
pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("revbench=info")),
        )
        .with_target(false)
        .init();

    run_with_cli(Cli::parse())
}

/// Produces one runnable benchmark artifact per revision. The seam between
/// the walk loop and the checkout/build pipeline, so the loop's
/// skip-and-continue behavior can be exercised without a git repository.
pub trait RevisionBuilder {
    /// Check out `revision` and build it, returning the artifact path.
    fn prepare(&self, revision: &str) -> Result<PathBuf, builder::BuildError>;
}

impl<B: builder::Builder> RevisionBuilder for BuildOrchestrator<B> {
    fn prepare(&self, revision: &str) -> Result<PathBuf, builder::BuildError> {
        self.checkout_and_build(revision)
    }
}

/// Walk `revisions` oldest-to-newest, building and benchmarking each one.
/// A revision whose build or run fails contributes an empty column; the
/// walk never aborts on a per-revision failure.
pub fn process_revisions(
    revisions: &[String],
    builds: &dyn RevisionBuilder,
    executor: &BenchmarkExecutor,
    bar: &ProgressBar,
) -> ResultMatrix {
    let mut matrix = ResultMatrix::default();
    for rev in revisions {
        bar.set_message(abbrev(rev));

        let column = match builds.prepare(rev) {
            Ok(artifact) => match executor.run(&artifact, rev) {
                Ok(result) => {
                    if result.is_empty() {
                        warn!(revision = %abbrev(rev), "benchmark process reported no tests");
                    }
                    result
                }
                Err(e) => {
                    warn!(revision = %abbrev(rev), error = %e, "benchmark run failed; empty column");
                    revbench_core::RevisionResult::empty(rev)
                }
            },
            Err(e) => {
                warn!(revision = %abbrev(rev), error = %e, "build failed; skipping revision");
                revbench_core::RevisionResult::empty(rev)
            }
        };

        matrix.append(&column);
        bar.inc(1);
    }
    matrix
}

/// Run the full revision walk with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let range = RevisionRange::parse(&cli.commit_range)?;

    let cwd = std::env::current_dir()?;
    let config = config::load(&cwd)?;

    let base = match cli.base_path {
        Some(path) => path,
        None => walker::discover_base_path(
            &cwd,
            &config.projects.engine_dir,
            &config.projects.bench_dir,
        )?,
    };
    let engine_dir = base.join(&config.projects.engine_dir);
    let bench_dir = base.join(&config.projects.bench_dir);
    info!(base = %base.display(), "using project base path");

    let revisions = walker::walk_revisions(&engine_dir, &range)?;
    info!(
        count = revisions.len(),
        oldest = %abbrev(&revisions[0]),
        newest = %abbrev(revisions.last().map(String::as_str).unwrap_or_default()),
        "resolved revision walk"
    );

    let orchestrator = BuildOrchestrator::new(
        &base,
        &config.projects,
        &config.build,
        CommandBuilder::new(&config.build, cli.compiler_output),
    )
    .show_output(cli.compiler_output);
    let executor = BenchmarkExecutor::new(
        bench_dir,
        config.output.result_file.clone(),
        cli.bench_args.clone(),
    );

    let bar = ProgressBar::new(revisions.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let matrix = process_revisions(&revisions, &orchestrator, &executor, &bar);
    bar.finish_and_clear();

    if !matrix.has_data() {
        warn!("no revision produced results; writing header-only matrix");
    }
    std::fs::write(&config.output.path, matrix.to_csv())?;
    info!(
        path = %config.output.path,
        revisions = matrix.revision_count(),
        "wrote aggregate matrix"
    );

    Ok(())
}
