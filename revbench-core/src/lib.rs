#![warn(missing_docs)]
//! revbench core - shared data model
//!
//! This crate defines the types that cross the orchestrator/benchmark-process
//! boundary:
//! - `BenchTest` and the `Workload` trait for declaring benchmark tests
//! - `FlagSet` for the feature-flag registry mutated once per variant
//! - `Sample`/`TestResult`/`RevisionResult` for measured outcomes
//! - the per-revision result-table format (`table` module)

pub mod flags;
mod measure;
pub mod table;

pub use flags::{FlagError, FlagSet, Variant};
pub use measure::{quiesce, time_sample};

use std::fmt;
use std::str::FromStr;

/// A fresh instance of the simulation engine state exercised by one
/// benchmark run. The engine is opaque to the orchestration layer: all it
/// exposes is "run the benchmark operation N times".
pub trait Workload: Send {
    /// Run the benchmark operation for `iterations` rounds.
    fn run(&mut self, iterations: u64);
}

/// Benchmark test registered via `inventory::submit!` in the benchmark
/// binary. Immutable for the duration of a run.
pub struct BenchTest {
    /// Unique key used for filtering and worker dispatch.
    pub key: &'static str,
    /// Human-readable label shown in result tables.
    pub label: &'static str,
    /// Iteration count handed to the benchmark operation (>= 1).
    pub iterations: u64,
    /// Factory producing one fresh domain instance under the given flags.
    /// Called once per (test, variant) pair; instances are never shared.
    pub setup: fn(&FlagSet) -> Box<dyn Workload>,
}

impl BenchTest {
    /// Display name used in result tables and console output.
    pub fn display_name(&self) -> String {
        if self.iterations > 1 {
            format!("{}; {} iterations", self.label, self.iterations)
        } else {
            self.label.to_string()
        }
    }
}

inventory::collect!(BenchTest);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<BenchTest> {}
};

/// All registered tests, sorted by key for deterministic execution order.
pub fn all_tests() -> Vec<&'static BenchTest> {
    let mut tests: Vec<_> = inventory::iter::<BenchTest>.into_iter().collect();
    tests.sort_by_key(|t| t.key);
    tests
}

/// Look up a registered test by its exact key.
pub fn find_test(key: &str) -> Option<&'static BenchTest> {
    inventory::iter::<BenchTest>.into_iter().find(|t| t.key == key)
}

/// One measured (test, variant) cell.
///
/// Timeouts and faults are recorded distinctly rather than folded into the
/// elapsed-time samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Wall-clock milliseconds for a completed run.
    Elapsed(u64),
    /// The run exceeded its time budget and was terminated.
    TimedOut,
    /// The benchmark operation faulted (panicked or crashed) before
    /// completing.
    Faulted,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Elapsed(ms) => write!(f, "{}", ms),
            Sample::TimedOut => write!(f, "timeout"),
            Sample::Faulted => write!(f, "failed"),
        }
    }
}

impl FromStr for Sample {
    type Err = table::TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(Sample::TimedOut),
            "failed" => Ok(Sample::Faulted),
            other => other
                .parse::<u64>()
                .map(Sample::Elapsed)
                .map_err(|_| table::TableError::BadCell {
                    cell: other.to_string(),
                }),
        }
    }
}

/// One test's samples, one per configuration variant in declaration order.
/// The sample count always equals the variant count.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Display name of the test (see [`BenchTest::display_name`]).
    pub name: String,
    /// Ordered samples, one per variant.
    pub samples: Vec<Sample>,
}

/// All results produced by one revision's benchmark run. Explicitly empty
/// when the build or launch failed; the revision still occupies a column in
/// the final matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionResult {
    /// Full revision identifier.
    pub revision: String,
    /// Per-test results in execution order, or empty on failure.
    pub tests: Vec<TestResult>,
}

impl RevisionResult {
    /// A result carrying no data, for revisions that failed to build or run.
    pub fn empty(revision: &str) -> Self {
        Self {
            revision: revision.to_string(),
            tests: Vec::new(),
        }
    }

    /// Whether this revision produced any test results.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_display_roundtrip() {
        assert_eq!(Sample::Elapsed(142).to_string(), "142");
        assert_eq!(Sample::TimedOut.to_string(), "timeout");
        assert_eq!(Sample::Faulted.to_string(), "failed");

        assert_eq!("142".parse::<Sample>().unwrap(), Sample::Elapsed(142));
        assert_eq!("timeout".parse::<Sample>().unwrap(), Sample::TimedOut);
        assert_eq!("failed".parse::<Sample>().unwrap(), Sample::Faulted);
        assert!("1.5x".parse::<Sample>().is_err());
    }

    #[test]
    fn display_name_appends_iteration_count() {
        let test = BenchTest {
            key: "RawClone",
            label: "Raw cloning speed",
            iterations: 100_000,
            setup: |_| unreachable!(),
        };
        assert_eq!(test.display_name(), "Raw cloning speed; 100000 iterations");

        let single = BenchTest {
            key: "BoomBotPreHit",
            label: "Pre-hit cloning test",
            iterations: 1,
            setup: |_| unreachable!(),
        };
        assert_eq!(single.display_name(), "Pre-hit cloning test");
    }

    #[test]
    fn empty_revision_result() {
        let result = RevisionResult::empty("abc123def456");
        assert!(result.is_empty());
        assert_eq!(result.revision, "abc123def456");
    }
}
