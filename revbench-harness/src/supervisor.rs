//! Config-matrix supervisor
//!
//! Runs every matched test once per configuration variant, in declaration
//! order. Without a timeout the benchmark operation runs synchronously in
//! this process, and an unhandled panic is fatal to the whole benchmark
//! run. With a timeout, each (test, variant) sample executes in a freshly
//! spawned worker process of the same binary so non-cooperative domain code
//! can be hard-killed when the deadline expires. Setup is untimed: the
//! sample budget starts only once the worker reports it is about to run
//! the benchmark operation.

use revbench_core::{time_sample, BenchTest, FlagSet, Sample, TestResult};
use revbench_ipc::{
    FrameError, MessageReceiver, MessageSender, Readiness, SupervisorCommand, WorkerMessage,
};
use std::io::Write as _;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by the supervisor's worker-process plumbing. These never
/// abort the matrix: the affected sample is recorded as failed and execution
/// proceeds to the next (test, variant) pair.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker process could not be spawned.
    #[error("failed to spawn sample worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Frame traffic with the worker failed.
    #[error("ipc error: {0}")]
    Ipc(String),

    /// The worker spoke an unexpected message or protocol version.
    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol {
        /// What the supervisor was waiting for.
        expected: String,
        /// What actually arrived.
        got: String,
    },
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        SupervisorError::Ipc(e.to_string())
    }
}

/// Create a pipe pair, returning (read_fd, write_fd), both close-on-exec.
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Spawn `command` with a fresh pipe pair installed as the child's fd 3
/// (commands in) and fd 4 (messages out). Returns the child together with
/// the parent-side write and read ends.
///
/// The child-side ends are first lifted above the target range with
/// `F_DUPFD` so the dup2 calls cannot collide with whatever descriptors the
/// pipes happened to land on. With a sparse fd table the four pipe ends sit
/// exactly at 3..=6, where a naive dup2-then-close sequence closes the fd it
/// just installed.
fn spawn_with_ipc(
    mut command: Command,
) -> Result<(Child, std::fs::File, std::fs::File), std::io::Error> {
    // cmd pipe: supervisor writes -> child reads from fd 3
    let (cmd_read, cmd_write) = create_pipe()?;
    // msg pipe: child writes to fd 4 -> supervisor reads
    let (msg_read, msg_write) = match create_pipe() {
        Ok(fds) => fds,
        Err(e) => {
            close_fd(cmd_read);
            close_fd(cmd_write);
            return Err(e);
        }
    };

    command
        .stdin(Stdio::null())
        // The child's console output is discarded so it cannot skew the
        // measurement or interleave with the parent's table rows.
        .stdout(Stdio::null())
        .stderr(Stdio::inherit());

    unsafe {
        command.pre_exec(move || {
            // F_DUPFD copies have close-on-exec unset, which is exactly
            // what fd 3/4 need across the exec.
            let read_src = libc::fcntl(cmd_read, libc::F_DUPFD, 10);
            if read_src < 0 {
                return Err(std::io::Error::last_os_error());
            }
            let write_src = libc::fcntl(msg_write, libc::F_DUPFD, 10);
            if write_src < 0 {
                return Err(std::io::Error::last_os_error());
            }

            libc::close(cmd_read);
            libc::close(cmd_write);
            libc::close(msg_read);
            libc::close(msg_write);

            if libc::dup2(read_src, 3) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::dup2(write_src, 4) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            libc::close(read_src);
            libc::close(write_src);

            Ok(())
        });
    }

    let child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            for fd in [cmd_read, cmd_write, msg_read, msg_write] {
                close_fd(fd);
            }
            return Err(e);
        }
    };

    // Parent keeps only its own ends.
    close_fd(cmd_read);
    close_fd(msg_write);

    let to_child = unsafe { std::fs::File::from_raw_fd(cmd_write) };
    let from_child = unsafe { std::fs::File::from_raw_fd(msg_read) };
    Ok((child, to_child, from_child))
}

/// Handle to one spawned sample-worker process.
struct WorkerHandle {
    child: Child,
    commands: MessageSender<std::fs::File>,
    messages: MessageReceiver<std::fs::File>,
}

impl WorkerHandle {
    /// Re-exec the current binary as a sample worker with fd 3/4 IPC.
    fn spawn() -> Result<Self, SupervisorError> {
        let binary = std::env::current_exe().map_err(SupervisorError::Spawn)?;
        let mut command = Command::new(binary);
        command
            .arg("--matrix-worker")
            .env(crate::worker::IPC_FD_ENV, "3,4");

        let (child, to_child, from_child) =
            spawn_with_ipc(command).map_err(SupervisorError::Spawn)?;

        let mut handle = Self {
            child,
            commands: MessageSender::new(to_child),
            messages: MessageReceiver::new(from_child),
        };
        handle.wait_for_hello()?;
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<(), SupervisorError> {
        match self.messages.recv::<WorkerMessage>()? {
            WorkerMessage::Hello { protocol_version } => {
                if protocol_version != revbench_ipc::PROTOCOL_VERSION {
                    return Err(SupervisorError::Protocol {
                        expected: format!("protocol version {}", revbench_ipc::PROTOCOL_VERSION),
                        got: format!("protocol version {}", protocol_version),
                    });
                }
                Ok(())
            }
            other => Err(SupervisorError::Protocol {
                expected: "Hello".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Hard-kill the worker. Domain code is treated as non-cooperative, so
    /// there is no graceful-shutdown window on timeout.
    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn shutdown(mut self) {
        let _ = self.commands.send(&SupervisorCommand::Shutdown);
        let _ = self.child.wait();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Executes the test x variant matrix with isolation and timeout
/// enforcement.
pub struct MatrixSupervisor {
    variants: Vec<FlagSet>,
    timeout: Option<Duration>,
}

impl MatrixSupervisor {
    /// Build a supervisor over pre-validated variants. `timeout` bounds each
    /// individual (test, variant) sample; `None` runs to completion.
    pub fn new(variants: Vec<FlagSet>, timeout: Option<Duration>) -> Self {
        Self { variants, timeout }
    }

    /// Number of configuration variants per test.
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Run one test across every variant, printing one cell per sample.
    /// Always returns exactly `variant_count()` samples.
    pub fn run_test(&self, test: &BenchTest) -> TestResult {
        let mut samples = Vec::with_capacity(self.variants.len());

        for flags in &self.variants {
            let sample = match self.timeout {
                Some(limit) => match self.run_isolated(test, flags, limit) {
                    Ok(sample) => sample,
                    Err(e) => {
                        eprintln!("warning: sample worker failed for {}: {}", test.key, e);
                        Sample::Faulted
                    }
                },
                // No timeout: run synchronously. A panic here takes down the
                // whole benchmark process; robustness is opt-in.
                None => {
                    let mut workload = (test.setup)(flags);
                    Sample::Elapsed(time_sample(workload.as_mut(), test.iterations))
                }
            };

            print!("{:<12}", sample_cell(&sample));
            let _ = std::io::stdout().flush();
            samples.push(sample);
        }

        println!();
        TestResult {
            name: test.display_name(),
            samples,
        }
    }

    /// Run one sample in a spawned worker, racing the deadline. Setup runs
    /// before the clock: the worker reports `Ready` once its domain instance
    /// exists, and only then does the budget start.
    fn run_isolated(
        &self,
        test: &BenchTest,
        flags: &FlagSet,
        limit: Duration,
    ) -> Result<Sample, SupervisorError> {
        let mut worker = WorkerHandle::spawn()?;
        worker.commands.send(&SupervisorCommand::RunSample {
            test_key: test.key.to_string(),
            disabled_flags: flags.disabled_names(),
        })?;

        // Setup phase, unbounded. Setup failures arrive as Fault.
        match worker.messages.recv::<WorkerMessage>() {
            Ok(WorkerMessage::Ready) => {}
            Ok(WorkerMessage::Fault { message }) => {
                eprintln!("warning: {} faulted: {}", test.key, message);
                worker.shutdown();
                return Ok(Sample::Faulted);
            }
            Ok(other) => {
                worker.kill();
                return Err(SupervisorError::Protocol {
                    expected: "Ready".to_string(),
                    got: format!("{:?}", other),
                });
            }
            Err(FrameError::EndOfStream) => {
                worker.kill();
                return Ok(Sample::Faulted);
            }
            Err(e) => {
                worker.kill();
                return Err(e.into());
            }
        }

        let deadline = Instant::now() + limit;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                worker.kill();
                return Ok(Sample::TimedOut);
            }

            match worker
                .messages
                .poll_ready(remaining.min(Duration::from_millis(100)))?
            {
                Readiness::Ready => {}
                Readiness::TimedOut => {
                    if !worker.is_alive() {
                        // Died without a Fault frame: aborted or signaled.
                        return Ok(Sample::Faulted);
                    }
                    continue;
                }
                Readiness::HungUp => {
                    worker.kill();
                    return Ok(Sample::Faulted);
                }
            }

            match worker.messages.recv::<WorkerMessage>() {
                Ok(WorkerMessage::Finished { elapsed_ms }) => {
                    worker.shutdown();
                    return Ok(Sample::Elapsed(elapsed_ms));
                }
                Ok(WorkerMessage::Fault { message }) => {
                    eprintln!("warning: {} faulted: {}", test.key, message);
                    worker.shutdown();
                    return Ok(Sample::Faulted);
                }
                Ok(other) => {
                    worker.kill();
                    return Err(SupervisorError::Protocol {
                        expected: "Finished or Fault".to_string(),
                        got: format!("{:?}", other),
                    });
                }
                Err(FrameError::EndOfStream) => {
                    // Worker closed the pipe without reporting: hard crash.
                    worker.kill();
                    return Ok(Sample::Faulted);
                }
                Err(e) => {
                    worker.kill();
                    return Err(e.into());
                }
            }
        }
    }
}

fn sample_cell(sample: &Sample) -> String {
    match sample {
        Sample::Elapsed(ms) => format!("{}ms", ms),
        Sample::TimedOut => "timeout".to_string(),
        Sample::Faulted => "failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revbench_core::Workload;
    use std::io::{Read, Write};

    const KNOWN: &[&str] = &["ParallelClone", "CopyOnWrite"];

    struct Spin;

    impl Workload for Spin {
        fn run(&mut self, iterations: u64) {
            let mut acc = 0u64;
            for i in 0..iterations {
                acc = acc.wrapping_add(i);
            }
            std::hint::black_box(acc);
        }
    }

    fn spin_setup(_flags: &FlagSet) -> Box<dyn Workload> {
        Box::new(Spin)
    }

    #[test]
    fn child_pipes_land_on_fd_three_and_four() {
        // With a sparse fd table the pipe ends occupy 3..=6, which is the
        // arrangement where careless fd shuffling closes an installed end.
        let mut command = Command::new("/bin/sh");
        command.args(["-c", "cat <&3 >&4"]);

        let (mut child, mut to_child, mut from_child) = spawn_with_ipc(command).unwrap();
        to_child.write_all(b"hello").unwrap();
        drop(to_child);

        let mut echoed = Vec::new();
        from_child.read_to_end(&mut echoed).unwrap();
        assert_eq!(echoed, b"hello");
        let _ = child.wait();
    }

    #[test]
    fn one_sample_per_variant_in_declaration_order() {
        let baseline = FlagSet::all_enabled(KNOWN);
        let variants = vec![
            baseline.clone(),
            baseline
                .with_disabled(&["ParallelClone".to_string()])
                .unwrap(),
            baseline
                .with_disabled(&["CopyOnWrite".to_string()])
                .unwrap(),
        ];
        let supervisor = MatrixSupervisor::new(variants, None);
        assert_eq!(supervisor.variant_count(), 3);

        let test = BenchTest {
            key: "Spin",
            label: "Spin workload",
            iterations: 1_000,
            setup: spin_setup,
        };
        let result = supervisor.run_test(&test);
        assert_eq!(result.samples.len(), 3);
        assert!(result
            .samples
            .iter()
            .all(|s| matches!(s, Sample::Elapsed(_))));
    }

    #[test]
    fn sample_cells_distinguish_timeouts_from_timings() {
        assert_eq!(sample_cell(&Sample::Elapsed(7)), "7ms");
        assert_eq!(sample_cell(&Sample::TimedOut), "timeout");
        assert_eq!(sample_cell(&Sample::Faulted), "failed");
    }

    #[test]
    #[ignore] // Requires a built benchmark binary to re-exec as the worker.
    fn timeout_kills_runaway_worker() {
        let baseline = FlagSet::all_enabled(KNOWN);
        let supervisor =
            MatrixSupervisor::new(vec![baseline], Some(Duration::from_millis(50)));
        let test = BenchTest {
            key: "Sleepy",
            label: "Sleeps past the deadline",
            iterations: 1,
            setup: |_| {
                struct Sleepy;
                impl Workload for Sleepy {
                    fn run(&mut self, _: u64) {
                        std::thread::sleep(Duration::from_secs(3600));
                    }
                }
                Box::new(Sleepy)
            },
        };
        let result = supervisor.run_test(&test);
        assert_eq!(result.samples, vec![Sample::TimedOut]);
    }

    #[test]
    #[ignore] // Requires a built benchmark binary to re-exec as the worker.
    fn setup_time_does_not_count_against_the_budget() {
        let baseline = FlagSet::all_enabled(KNOWN);
        let supervisor =
            MatrixSupervisor::new(vec![baseline], Some(Duration::from_millis(200)));
        let test = BenchTest {
            key: "SlowSetup",
            label: "Slow setup, instant operation",
            iterations: 1,
            setup: |_| {
                std::thread::sleep(Duration::from_millis(500));
                struct Immediate;
                impl Workload for Immediate {
                    fn run(&mut self, _: u64) {}
                }
                Box::new(Immediate)
            },
        };
        let result = supervisor.run_test(&test);
        assert!(matches!(result.samples[0], Sample::Elapsed(_)));
    }
}
