//! Minimal benchmark executable built on the harness.
//!
//! Stands in for a real engine's benchmark binary: registers a few synthetic
//! workloads against two feature flags, then hands control to the harness.
//!
//! ```text
//! cargo run --release --example engine_bench -- --unset --unset ParallelClone
//! ```

use revbench_core::{BenchTest, FlagSet, Workload};

const FLAGS: &[&str] = &["ParallelClone", "CopyOnWrite"];

/// Hashes a buffer repeatedly; "ParallelClone" halves the buffer to mimic a
/// feature that changes the work profile when toggled.
struct HashChurn {
    data: Vec<u64>,
}

impl HashChurn {
    fn new(flags: &FlagSet) -> Self {
        let len = if flags.is_enabled("ParallelClone") {
            4096
        } else {
            8192
        };
        Self {
            data: (0..len).map(|i| i as u64 * 2654435761).collect(),
        }
    }
}

impl Workload for HashChurn {
    fn run(&mut self, iterations: u64) {
        let mut acc = 0u64;
        for _ in 0..iterations {
            for &v in &self.data {
                acc = acc.rotate_left(5) ^ v;
            }
        }
        std::hint::black_box(acc);
    }
}

/// Clones a nested structure per operation.
struct CloneChurn {
    template: Vec<Vec<u8>>,
}

impl CloneChurn {
    fn new(flags: &FlagSet) -> Self {
        let rows = if flags.is_enabled("CopyOnWrite") { 64 } else { 128 };
        Self {
            template: (0..rows).map(|i| vec![i as u8; 256]).collect(),
        }
    }
}

impl Workload for CloneChurn {
    fn run(&mut self, iterations: u64) {
        for _ in 0..iterations {
            let copy = self.template.clone();
            std::hint::black_box(&copy);
        }
    }
}

inventory::submit! {
    BenchTest {
        key: "HashChurn",
        label: "Buffer hashing throughput",
        iterations: 2_000,
        setup: |flags| Box::new(HashChurn::new(flags)),
    }
}

inventory::submit! {
    BenchTest {
        key: "CloneChurn",
        label: "Nested structure cloning",
        iterations: 10_000,
        setup: |flags| Box::new(CloneChurn::new(flags)),
    }
}

fn main() -> anyhow::Result<()> {
    revbench_harness::run(FLAGS)
}
