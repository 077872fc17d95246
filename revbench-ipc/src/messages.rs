//! IPC message types
//!
//! One worker process runs exactly one (test, variant) sample: the
//! supervisor sends a `RunSample`, waits for `Ready` (setup is untimed),
//! then waits for `Finished` or `Fault` while racing its deadline. On
//! expiry the worker is killed without further protocol traffic.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Protocol version negotiated in the worker's `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands sent from the matrix supervisor to a sample worker.
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Run one (test, variant) sample.
    RunSample {
        /// Key of the registered test to run.
        test_key: String,
        /// Canonical names of the flags to force off for this sample.
        disabled_flags: Vec<String>,
    },
    /// Exit the worker loop.
    Shutdown,
}

/// Messages sent from a sample worker back to the supervisor.
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Handshake sent immediately after startup.
    Hello {
        /// Must equal [`PROTOCOL_VERSION`].
        protocol_version: u32,
    },
    /// Setup finished; the timed operation is about to start. The
    /// supervisor starts the sample's time budget on receipt, so setup
    /// cost never counts against it.
    Ready,
    /// The sample completed.
    Finished {
        /// Elapsed wall-clock milliseconds.
        elapsed_ms: u64,
    },
    /// The benchmark operation panicked, or the sample could not be set up.
    Fault {
        /// Human-readable description.
        message: String,
    },
}
