#![warn(missing_docs)]
//! revbench IPC
//!
//! Message passing between the config-matrix supervisor and the sample
//! worker processes it spawns for timeout-isolated runs. Messages travel
//! over inherited pipe file descriptors as length-prefixed rkyv frames.

mod framing;
mod messages;

pub use framing::{
    encode, FrameError, MessageReceiver, MessageSender, Readiness, MAX_FRAME_SIZE,
};
pub use messages::{SupervisorCommand, WorkerMessage, PROTOCOL_VERSION};
