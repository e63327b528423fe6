//! Byte transport abstraction shared by the serial, socket and WebSocket links.

use std::time::Duration;

use crate::ProtocolError;

/// How long a single `read` may block before reporting `Idle`.
///
/// This is also the worst-case overshoot of a transaction timeout: the
/// deadline is only checked between reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of one read from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes received
    Data(Vec<u8>),
    /// Nothing arrived within the poll interval
    Idle,
    /// The remote end closed the stream
    Closed,
}

/// A byte-oriented link to the display.
///
/// Implementations must bound `read` by their poll interval so that callers
/// can check deadlines between reads.
pub trait Transport: Send {
    /// Write a whole encoded frame
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Read whatever is available, waiting at most one poll interval
    fn read(&mut self) -> Result<ReadOutcome, ProtocolError>;

    /// Human readable endpoint, for logs
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self) -> Result<ReadOutcome, ProtocolError> {
        (**self).read()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Map a read error to `Idle` when it only means the poll interval elapsed
pub(crate) fn idle_on_timeout(e: std::io::Error) -> Result<ReadOutcome, ProtocolError> {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Ok(ReadOutcome::Idle),
        std::io::ErrorKind::Interrupted => Ok(ReadOutcome::Idle),
        _ => Err(e.into()),
    }
}
