//! Pipe message transport
//!
//! Messages cross the supervisor/worker pipe pair as delimited frames: a
//! 4-byte little-endian payload length followed by the rkyv archive of the
//! message. A frame is sent with a single write, which keeps it atomic on a
//! pipe for the message sizes involved (far below PIPE_BUF). The receiver is
//! deliberately unbuffered: every byte is read on demand, so polling the
//! underlying descriptor is the single source of truth for pending data and
//! the deadline loop in the supervisor needs no staging-buffer check.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a frame payload. Commands and replies are tiny; a header
/// announcing anything near this means the stream is corrupt.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Transport failures on the supervisor/worker pipe.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Pipe I/O failed.
    #[error("pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The outgoing message could not be serialized.
    #[error("could not encode message: {0}")]
    Encode(String),

    /// The incoming payload failed validation.
    #[error("could not decode message: {0}")]
    Decode(String),

    /// A frame header announced an impossible payload length.
    #[error("corrupt frame header: payload of {len} bytes")]
    BadLength {
        /// The announced length.
        len: usize,
    },

    /// The peer closed its end between frames.
    #[error("peer closed the pipe")]
    EndOfStream,
}

/// Serialize one message into a ready-to-send frame, header included.
pub fn encode<T>(message: &T) -> Result<Vec<u8>, FrameError>
where
    T: Serialize<AllocSerializer<128>>,
{
    let payload =
        rkyv::to_bytes::<_, 128>(message).map_err(|e| FrameError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::BadLength { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writing end of the pipe. Each send is one complete frame in one write.
pub struct MessageSender<W: Write> {
    pipe: W,
}

impl<W: Write> MessageSender<W> {
    /// Wrap the writing end.
    pub fn new(pipe: W) -> Self {
        Self { pipe }
    }

    /// Encode and send one message.
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<128>>,
    {
        let frame = encode(message)?;
        self.pipe.write_all(&frame)?;
        self.pipe.flush()?;
        Ok(())
    }
}

/// Outcome of waiting for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A frame header can be read without blocking.
    Ready,
    /// Nothing arrived within the wait budget.
    TimedOut,
    /// The peer hung up with no data left to read.
    HungUp,
}

/// Reading end of the pipe.
pub struct MessageReceiver<R: Read> {
    pipe: R,
}

impl<R: Read> MessageReceiver<R> {
    /// Wrap the reading end.
    pub fn new(pipe: R) -> Self {
        Self { pipe }
    }

    /// Receive one message, blocking until the full frame has arrived.
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut header = [0u8; 4];
        if let Err(e) = self.pipe.read_exact(&mut header) {
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::EndOfStream
            } else {
                FrameError::Io(e)
            });
        }

        let len = u32::from_le_bytes(header) as usize;
        if len == 0 || len > MAX_FRAME_SIZE {
            return Err(FrameError::BadLength { len });
        }

        // rkyv validation needs the payload aligned
        let mut payload = rkyv::AlignedVec::with_capacity(len);
        payload.resize(len, 0);
        self.pipe.read_exact(&mut payload)?;

        let archived = rkyv::check_archived_root::<T>(&payload)
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        let message = archived
            .deserialize(&mut Infallible)
            .expect("validated archive deserializes infallibly");
        Ok(message)
    }
}

impl<R: Read + AsRawFd> MessageReceiver<R> {
    /// Wait until data is readable, the peer hangs up, or `timeout` passes.
    pub fn poll_ready(&self, timeout: Duration) -> Result<Readiness, FrameError> {
        let mut pollfd = libc::pollfd {
            fd: self.pipe.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let n = unsafe { libc::poll(&mut pollfd, 1, timeout.as_millis() as libc::c_int) };
        if n < 0 {
            return Err(FrameError::Io(std::io::Error::last_os_error()));
        }
        if n == 0 {
            return Ok(Readiness::TimedOut);
        }

        // Data wins over hangup: a closing peer may leave a final frame.
        if pollfd.revents & libc::POLLIN != 0 {
            Ok(Readiness::Ready)
        } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            Ok(Readiness::HungUp)
        } else {
            Ok(Readiness::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{SupervisorCommand, WorkerMessage};
    use std::io::Cursor;
    use std::os::unix::io::FromRawFd;

    #[test]
    fn command_roundtrip() {
        let original = SupervisorCommand::RunSample {
            test_key: "RawClone".to_string(),
            disabled_flags: vec!["ParallelClone".to_string()],
        };

        let mut buffer = Vec::new();
        MessageSender::new(&mut buffer).send(&original).unwrap();

        let mut receiver = MessageReceiver::new(Cursor::new(buffer));
        match receiver.recv::<SupervisorCommand>().unwrap() {
            SupervisorCommand::RunSample {
                test_key,
                disabled_flags,
            } => {
                assert_eq!(test_key, "RawClone");
                assert_eq!(disabled_flags, vec!["ParallelClone".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn multiple_messages_preserve_order() {
        let mut buffer = Vec::new();
        {
            let mut sender = MessageSender::new(&mut buffer);
            sender
                .send(&WorkerMessage::Hello {
                    protocol_version: 1,
                })
                .unwrap();
            sender.send(&WorkerMessage::Ready).unwrap();
            sender
                .send(&WorkerMessage::Finished { elapsed_ms: 42 })
                .unwrap();
        }

        let mut receiver = MessageReceiver::new(Cursor::new(buffer));
        assert!(matches!(
            receiver.recv::<WorkerMessage>().unwrap(),
            WorkerMessage::Hello {
                protocol_version: 1
            }
        ));
        assert!(matches!(
            receiver.recv::<WorkerMessage>().unwrap(),
            WorkerMessage::Ready
        ));
        assert!(matches!(
            receiver.recv::<WorkerMessage>().unwrap(),
            WorkerMessage::Finished { elapsed_ms: 42 }
        ));
        assert!(matches!(
            receiver.recv::<WorkerMessage>(),
            Err(FrameError::EndOfStream)
        ));
    }

    #[test]
    fn end_of_stream_on_empty_input() {
        let mut receiver = MessageReceiver::new(Cursor::new(Vec::new()));
        let result: Result<WorkerMessage, _> = receiver.recv();
        assert!(matches!(result, Err(FrameError::EndOfStream)));
    }

    #[test]
    fn oversized_length_header_is_rejected() {
        let buffer = (u32::MAX).to_le_bytes().to_vec();
        let mut receiver = MessageReceiver::new(Cursor::new(buffer));
        let result: Result<WorkerMessage, _> = receiver.recv();
        assert!(matches!(result, Err(FrameError::BadLength { .. })));
    }

    #[test]
    fn zero_length_header_is_rejected() {
        let buffer = 0u32.to_le_bytes().to_vec();
        let mut receiver = MessageReceiver::new(Cursor::new(buffer));
        let result: Result<WorkerMessage, _> = receiver.recv();
        assert!(matches!(result, Err(FrameError::BadLength { len: 0 })));
    }

    #[test]
    fn poll_ready_tracks_pipe_state() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let read_end = unsafe { std::fs::File::from_raw_fd(fds[0]) };
        let write_end = unsafe { std::fs::File::from_raw_fd(fds[1]) };

        let mut receiver = MessageReceiver::new(read_end);
        assert_eq!(
            receiver.poll_ready(Duration::from_millis(10)).unwrap(),
            Readiness::TimedOut
        );

        let mut sender = MessageSender::new(write_end);
        sender
            .send(&WorkerMessage::Finished { elapsed_ms: 7 })
            .unwrap();
        assert_eq!(
            receiver.poll_ready(Duration::from_millis(10)).unwrap(),
            Readiness::Ready
        );
        assert!(matches!(
            receiver.recv::<WorkerMessage>().unwrap(),
            WorkerMessage::Finished { elapsed_ms: 7 }
        ));

        drop(sender);
        assert_eq!(
            receiver.poll_ready(Duration::from_millis(10)).unwrap(),
            Readiness::HungUp
        );
        assert!(matches!(
            receiver.recv::<WorkerMessage>(),
            Err(FrameError::EndOfStream)
        ));
    }
}
