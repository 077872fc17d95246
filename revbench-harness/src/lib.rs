//! revbench harness
//!
//! Library linked into the benchmark executable the orchestrator builds and
//! launches once per revision. Call [`run`] from your `main` with the
//! engine's known feature flags:
//!
//! ```ignore
//! const FLAGS: &[&str] = &["ParallelClone", "CopyOnWrite"];
//!
//! inventory::submit! {
//!     revbench_core::BenchTest {
//!         key: "RawClone",
//!         label: "Raw cloning speed",
//!         iterations: 100_000,
//!         setup: |flags| Box::new(CloneWorkload::new(flags)),
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     revbench_harness::run(FLAGS)
//! }
//! ```
//!
//! The harness runs every matched test once per configuration variant and
//! writes the result table the orchestrator collects. With `--timeout`, each
//! (test, variant) sample executes in a spawned worker process of the same
//! binary so runaway domain code can be hard-killed.

mod supervisor;
mod worker;

pub use supervisor::{MatrixSupervisor, SupervisorError};

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use revbench_core::{all_tests, table, FlagSet, Variant};
use std::io::Write;
use std::time::Duration;

/// Benchmark-process CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "benchmarks")]
#[command(about = "Run engine benchmark tests across flag-configuration variants")]
pub struct Cli {
    /// Case-insensitive regex matched against test keys (empty = all tests)
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Per-sample timeout in milliseconds (-1 or 0 = unlimited)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Define one configuration variant: comma-separated flags to force off.
    /// May be given multiple times; an empty value is a baseline variant.
    #[arg(
        long = "unset",
        value_name = "FLAG[,FLAG...]",
        action = clap::ArgAction::Append,
        num_args = 0..=1,
        default_missing_value = ""
    )]
    pub unset: Vec<String>,

    /// Internal: run as a sample worker for the matrix supervisor
    #[arg(long, hide = true)]
    pub matrix_worker: bool,
}

/// Harness entry point: parse the CLI and run the configuration matrix.
pub fn run(known_flags: &'static [&'static str]) -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli, known_flags)
}

/// Run the harness with pre-parsed arguments.
pub fn run_with_cli(cli: Cli, known_flags: &'static [&'static str]) -> anyhow::Result<()> {
    if cli.matrix_worker {
        return worker::run_worker(known_flags);
    }

    // Validate every variant before any test executes. An unrecognized flag
    // name is fatal here, with the valid flag list in the error message.
    let variants = build_variants(known_flags, &cli.unset)?;

    print_banner(&cli, &variants);

    let filter = build_filter(&cli.filter).context("invalid --filter regex")?;
    let supervisor = MatrixSupervisor::new(variants, timeout_from_millis(cli.timeout));

    let mut results = Vec::new();
    for test in all_tests() {
        if !filter.is_match(test.key) {
            continue;
        }
        print!("{:<50}", format!("Test [{}]:", test.key));
        let _ = std::io::stdout().flush();
        results.push(supervisor.run_test(test));
    }

    if results.is_empty() {
        println!("No tests to run");
        return Ok(());
    }

    let text = table::write_table(&build_banner(), supervisor.variant_count(), &results);
    std::fs::write(table::RESULT_FILE, text)
        .with_context(|| format!("failed to write {}", table::RESULT_FILE))?;
    println!("Benchmark results written to: {}", table::RESULT_FILE);

    Ok(())
}

/// Resolve the `--unset` occurrences into validated flag configurations.
/// Zero occurrences imply a single baseline variant.
fn build_variants(
    known_flags: &'static [&'static str],
    unset: &[String],
) -> anyhow::Result<Vec<FlagSet>> {
    let baseline = FlagSet::all_enabled(known_flags);

    if unset.is_empty() {
        return Ok(vec![baseline]);
    }

    let mut variants = Vec::with_capacity(unset.len());
    for value in unset {
        let variant = Variant::parse(value);
        variants.push(baseline.with_disabled(&variant.disabled)?);
    }
    Ok(variants)
}

/// Compile the case-insensitive test-key filter. An empty pattern matches
/// every test.
fn build_filter(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){}", pattern))
}

fn timeout_from_millis(ms: i64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms as u64))
    } else {
        None
    }
}

fn build_banner() -> String {
    let profile = if cfg!(debug_assertions) {
        "Debug"
    } else {
        "Release"
    };
    format!("{} {}", profile, env!("CARGO_PKG_VERSION"))
}

fn print_banner(cli: &Cli, variants: &[FlagSet]) {
    println!("Benchmarks ({})", build_banner());
    if cfg!(debug_assertions) {
        println!("WARNING: running a Debug build; results will be slower than Release.");
    }
    if !cli.filter.is_empty() {
        println!("Running benchmarks using filter: {}", cli.filter);
    }
    for (i, flags) in variants.iter().enumerate() {
        let disabled = flags.disabled_names();
        if disabled.is_empty() {
            println!("Sub-test {} will enable all settings", i + 1);
        } else {
            println!("Sub-test {} will disable: {}", i + 1, disabled.join(" "));
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["ParallelClone", "CopyOnWrite", "ZoneCaching"];

    #[test]
    fn zero_unset_occurrences_yield_one_baseline_variant() {
        let variants = build_variants(KNOWN, &[]).unwrap();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].disabled_names().is_empty());
    }

    #[test]
    fn empty_unset_occurrence_is_an_explicit_baseline() {
        let variants = build_variants(
            KNOWN,
            &["".to_string(), "ParallelClone,ZoneCaching".to_string()],
        )
        .unwrap();
        assert_eq!(variants.len(), 2);
        assert!(variants[0].disabled_names().is_empty());
        assert_eq!(
            variants[1].disabled_names(),
            vec!["ParallelClone".to_string(), "ZoneCaching".to_string()]
        );
    }

    #[test]
    fn unknown_flag_fails_before_any_test_runs() {
        let err = build_variants(KNOWN, &["Turbo".to_string()]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Turbo"), "got: {message}");
        assert!(message.contains("ParallelClone"), "got: {message}");
    }

    #[test]
    fn filter_is_case_insensitive_over_test_keys() {
        let keys = ["RawClone", "RawCloneMT", "GameInit"];
        let filter = build_filter("clone").unwrap();
        let matched: Vec<&str> = keys.iter().copied().filter(|k| filter.is_match(k)).collect();
        assert_eq!(matched, vec!["RawClone", "RawCloneMT"]);
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = build_filter("").unwrap();
        assert!(filter.is_match("RawClone"));
        assert!(filter.is_match("GameInit"));
    }

    #[test]
    fn nonpositive_timeouts_mean_unlimited() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), None);
        assert_eq!(
            timeout_from_millis(2500),
            Some(Duration::from_millis(2500))
        );
    }
}
