//! Cross-revision result aggregation
//!
//! Accumulates one column per processed revision, in processing order. The
//! first revision that produced any results fixes the row order; later
//! columns are appended positionally, by index, not by re-matching test
//! names. Failed revisions contribute a column of empty cells.

use revbench_core::{RevisionResult, Sample};

/// Revision-id abbreviation used in matrix headers.
pub fn abbrev(revision: &str) -> String {
    revision.chars().take(8).collect()
}

/// Test name x revision matrix of elapsed-time samples.
#[derive(Debug, Default)]
pub struct ResultMatrix {
    rows: Vec<String>,
    columns: Vec<Column>,
}

#[derive(Debug)]
struct Column {
    revision: String,
    cells: Vec<Option<Sample>>,
}

impl ResultMatrix {
    /// Append one revision's column. Only the first variant's sample of each
    /// test is carried into the matrix; the per-revision file keeps the full
    /// variant breakdown.
    pub fn append(&mut self, result: &RevisionResult) {
        if self.rows.is_empty() && !result.is_empty() {
            self.rows = result.tests.iter().map(|t| t.name.clone()).collect();
        }

        let cells = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, _)| {
                result
                    .tests
                    .get(i)
                    .and_then(|test| test.samples.first())
                    .copied()
            })
            .collect();

        self.columns.push(Column {
            revision: result.revision.clone(),
            cells,
        });
    }

    /// Number of revision columns accumulated so far.
    pub fn revision_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether any revision produced data.
    pub fn has_data(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Serialize the matrix: header of abbreviated revision ids, one row per
    /// test with one cell per revision (empty for missing data).
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str("Test Name");
        for column in &self.columns {
            out.push(',');
            out.push_str(&abbrev(&column.revision));
        }
        out.push_str("\r\n");

        for (i, name) in self.rows.iter().enumerate() {
            out.push_str(name);
            for column in &self.columns {
                out.push(',');
                if let Some(Some(sample)) = column.cells.get(i) {
                    out.push_str(&sample.to_string());
                }
            }
            out.push_str("\r\n");
        }
        out
    }
}
