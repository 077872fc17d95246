//! Per-revision result table
//!
//! The benchmark process hands its results to the orchestrator through a
//! flat text file in the working directory. Layout:
//!
//! ```text
//! Build,Release 0.1.0
//! "",""
//! Test Name,1,2
//! Raw cloning speed; 100000 iterations,102,99
//! ```
//!
//! The first three lines are header information; the orchestrator skips
//! them when parsing. The file must be fully written and the benchmark
//! process must have exited before the parent reads it.

use crate::{Sample, TestResult};
use thiserror::Error;

/// Well-known name of the per-revision result file, written by the benchmark
/// process and deleted by the orchestrator after reading.
pub const RESULT_FILE: &str = "benchmarks.csv";

/// Errors raised while parsing a result table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    /// Fewer than the three expected header lines.
    #[error("result table is truncated: expected banner, separator and header lines")]
    MissingHeader,
    /// A data row with no value cells.
    #[error("malformed result row: {line:?}")]
    MalformedRow {
        /// The offending line.
        line: String,
    },
    /// A value cell that is neither a millisecond count nor a flag.
    #[error("unrecognized sample cell: {cell:?}")]
    BadCell {
        /// The offending cell text.
        cell: String,
    },
}

/// Serialize results into the result-table text format. `build_banner` is
/// the configuration/version half of the leading `Build,...` line.
pub fn write_table(build_banner: &str, variant_count: usize, tests: &[TestResult]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Build,{}\r\n", build_banner));
    out.push_str("\"\",\"\"\r\n");

    out.push_str("Test Name");
    for i in 1..=variant_count.max(1) {
        out.push_str(&format!(",{}", i));
    }
    out.push_str("\r\n");

    for test in tests {
        out.push_str(&test.name);
        for sample in &test.samples {
            out.push_str(&format!(",{}", sample));
        }
        out.push_str("\r\n");
    }
    out
}

/// Parse a result table back into per-test results, skipping the three
/// header lines.
pub fn parse_table(text: &str) -> Result<Vec<TestResult>, TableError> {
    let mut lines = text.lines();
    for _ in 0..3 {
        lines.next().ok_or(TableError::MissingHeader)?;
    }

    let mut tests = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = line.split(',');
        let name = cells.next().unwrap_or_default().to_string();
        let samples: Vec<Sample> = cells
            .map(|cell| cell.trim().parse::<Sample>())
            .collect::<Result<_, _>>()?;
        if samples.is_empty() {
            return Err(TableError::MalformedRow {
                line: line.to_string(),
            });
        }
        tests.push(TestResult { name, samples });
    }
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<TestResult> {
        vec![
            TestResult {
                name: "Raw cloning speed; 100000 iterations".to_string(),
                samples: vec![Sample::Elapsed(102), Sample::Elapsed(99)],
            },
            TestResult {
                name: "Turn transition".to_string(),
                samples: vec![Sample::TimedOut, Sample::Elapsed(3)],
            },
        ]
    }

    #[test]
    fn writes_three_header_lines_then_rows() {
        let text = write_table("Release 0.1.0", 2, &sample_results());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Build,Release 0.1.0");
        assert_eq!(lines[1], "\"\",\"\"");
        assert_eq!(lines[2], "Test Name,1,2");
        assert_eq!(lines[3], "Raw cloning speed; 100000 iterations,102,99");
        assert_eq!(lines[4], "Turn transition,timeout,3");
    }

    #[test]
    fn parse_roundtrip() {
        let results = sample_results();
        let text = write_table("Release 0.1.0", 2, &results);
        let parsed = parse_table(&text).unwrap();
        assert_eq!(parsed, results);
    }

    #[test]
    fn parse_rejects_truncated_header() {
        assert_eq!(
            parse_table("Build,Release 0.1.0\r\n\"\",\"\"\r\n"),
            Err(TableError::MissingHeader)
        );
    }

    #[test]
    fn parse_rejects_row_without_cells() {
        let text = "Build,x\r\n\"\",\"\"\r\nTest Name,1\r\nLonelyName\r\n";
        assert!(matches!(
            parse_table(text),
            Err(TableError::MalformedRow { .. })
        ));
    }

    #[test]
    fn parse_rejects_garbage_cells() {
        let text = "Build,x\r\n\"\",\"\"\r\nTest Name,1\r\nA,fast\r\n";
        assert!(matches!(parse_table(text), Err(TableError::BadCell { .. })));
    }

    #[test]
    fn empty_table_parses_to_no_tests() {
        let text = write_table("Release 0.1.0", 1, &[]);
        assert!(parse_table(&text).unwrap().is_empty());
    }
}
