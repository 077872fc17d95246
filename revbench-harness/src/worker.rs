//! Sample worker process
//!
//! Entered when the benchmark binary is re-executed with `--matrix-worker`.
//! The supervisor hands us our pipe ends through `REVBENCH_IPC_FD`; we
//! announce ourselves, run the one sample we are given, report the elapsed
//! time, and exit. Setup is reported separately: `Ready` goes out once the
//! workload exists so the supervisor can keep setup time off the sample
//! budget. Panics inside setup or the benchmark operation are caught and
//! reported as faults instead of crashing the pipe.

use anyhow::{anyhow, bail, Context};
use revbench_core::{find_test, time_sample, FlagSet};
use revbench_ipc::{
    FrameError, MessageReceiver, MessageSender, SupervisorCommand, WorkerMessage, PROTOCOL_VERSION,
};
use std::os::unix::io::{FromRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};

/// Environment variable carrying "read_fd,write_fd" for the worker's pipes.
pub const IPC_FD_ENV: &str = "REVBENCH_IPC_FD";

/// Worker main loop. Never returns to the normal harness path.
pub fn run_worker(known_flags: &'static [&'static str]) -> anyhow::Result<()> {
    let (read_fd, write_fd) = ipc_fds_from_env()?;

    // Safety: the supervisor's pre_exec placed these descriptors for us and
    // nothing else in this process owns them.
    let reader_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
    let writer_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
    let mut receiver = MessageReceiver::new(reader_file);
    let mut sender = MessageSender::new(writer_file);

    sender.send(&WorkerMessage::Hello {
        protocol_version: PROTOCOL_VERSION,
    })?;

    loop {
        let command: SupervisorCommand = match receiver.recv() {
            Ok(cmd) => cmd,
            // Supervisor went away; nothing left to report to.
            Err(FrameError::EndOfStream) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match command {
            SupervisorCommand::RunSample {
                test_key,
                disabled_flags,
            } => run_sample(known_flags, &test_key, &disabled_flags, &mut sender)?,
            SupervisorCommand::Shutdown => return Ok(()),
        }
    }
}

/// Execute one (test, variant) sample. Emits `Ready` between setup and the
/// timed operation, then `Finished` or `Fault`. Samples that never get past
/// setup fault without a `Ready`.
fn run_sample<W: std::io::Write>(
    known_flags: &'static [&'static str],
    test_key: &str,
    disabled_flags: &[String],
    sender: &mut MessageSender<W>,
) -> Result<(), FrameError> {
    let test = match find_test(test_key) {
        Some(test) => test,
        None => {
            return sender.send(&WorkerMessage::Fault {
                message: format!("unknown test key: {}", test_key),
            })
        }
    };

    let flags = match FlagSet::all_enabled(known_flags).with_disabled(disabled_flags) {
        Ok(flags) => flags,
        Err(e) => {
            return sender.send(&WorkerMessage::Fault {
                message: e.to_string(),
            })
        }
    };

    let mut workload = match panic::catch_unwind(AssertUnwindSafe(|| (test.setup)(&flags))) {
        Ok(workload) => workload,
        Err(payload) => {
            return sender.send(&WorkerMessage::Fault {
                message: panic_message(payload.as_ref()),
            })
        }
    };

    sender.send(&WorkerMessage::Ready)?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        time_sample(workload.as_mut(), test.iterations)
    }));

    match outcome {
        Ok(elapsed_ms) => sender.send(&WorkerMessage::Finished { elapsed_ms }),
        Err(payload) => sender.send(&WorkerMessage::Fault {
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "benchmark operation panicked".to_string()
    }
}

fn ipc_fds_from_env() -> anyhow::Result<(RawFd, RawFd)> {
    let value = std::env::var(IPC_FD_ENV)
        .with_context(|| format!("{} not set; not spawned by a matrix supervisor", IPC_FD_ENV))?;

    let mut parts = value.splitn(2, ',');
    let read_fd = parse_fd(parts.next())?;
    let write_fd = parse_fd(parts.next())?;
    if read_fd == write_fd {
        bail!("malformed {}: {}", IPC_FD_ENV, value);
    }
    Ok((read_fd, write_fd))
}

fn parse_fd(part: Option<&str>) -> anyhow::Result<RawFd> {
    part.ok_or_else(|| anyhow!("malformed {}", IPC_FD_ENV))?
        .trim()
        .parse::<RawFd>()
        .with_context(|| format!("malformed {}", IPC_FD_ENV))
}
