//! Connection manager and transaction engine.
//!
//! A [`Connection`] owns the transport and a busy flag. Every exchange with the
//! display goes through [`Connection::send`], which runs exactly one
//! transaction at a time:
//!
//! 1. claim the busy flag, or fail fast with [`ProtocolError::Busy`]
//! 2. write the encoded packet
//! 3. unless the caller asked for nothing back, poll the transport, feeding a
//!    [`FrameScanner`] until a matching reply, end of stream, a read error or
//!    the deadline
//!
//! The deadline is soft: it is checked between reads, so a transaction can
//! overrun its timeout by up to one transport poll interval.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::packets::{fmt_hex, Packet, PacketKind};
use crate::scanner::FrameScanner;
use crate::transport::{ReadOutcome, Transport};
use crate::ProtocolError;

/// Lifecycle of a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Idle = 0,
    Sending = 1,
    AwaitingReply = 2,
    Complete = 3,
    TimedOut = 4,
    Failed = 5,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransactionState::Sending,
            2 => TransactionState::AwaitingReply,
            3 => TransactionState::Complete,
            4 => TransactionState::TimedOut,
            5 => TransactionState::Failed,
            _ => TransactionState::Idle,
        }
    }
}

/// What a transaction waits for after writing its packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Stop polling once this much time has passed
    pub timeout: Option<Duration>,
    /// Stop polling once a packet of this kind has been decoded
    pub expected_kind: Option<PacketKind>,
}

impl SendOptions {
    /// Write and return immediately
    pub fn fire_and_forget() -> Self {
        Self::default()
    }

    /// Wait for a packet of `kind`, giving up after `timeout`
    pub fn expect(kind: PacketKind, timeout: Duration) -> Self {
        SendOptions {
            timeout: Some(timeout),
            expected_kind: Some(kind),
        }
    }

    /// Wait for the first packet of any kind, giving up after `timeout`
    pub fn any_reply(timeout: Duration) -> Self {
        SendOptions {
            timeout: Some(timeout),
            expected_kind: None,
        }
    }

    fn awaits_reply(&self) -> bool {
        self.timeout.is_some() || self.expected_kind.is_some()
    }
}

/// Outcome of one transaction
#[derive(Debug)]
pub struct Exchange {
    /// Every packet decoded while waiting, in arrival order
    pub packets: Vec<Packet>,
    /// `Complete`, `TimedOut` or `Failed`
    pub state: TransactionState,
    /// The transport reported end of stream
    pub end_of_stream: bool,
    /// Frames that were dropped because they could not be decoded
    pub dropped_frames: usize,
    /// Read error that ended the transaction, if any
    pub error: Option<ProtocolError>,
}

impl Exchange {
    fn new(state: TransactionState) -> Self {
        Exchange {
            packets: Vec::new(),
            state,
            end_of_stream: false,
            dropped_frames: 0,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == TransactionState::Complete
    }

    pub fn timed_out(&self) -> bool {
        self.state == TransactionState::TimedOut
    }

    /// First received packet of the given kind
    pub fn find(&self, kind: PacketKind) -> Option<&Packet> {
        self.packets.iter().find(|p| p.kind() == Some(kind))
    }

    /// Exit code of the first `Ret` received
    pub fn exit_code(&self) -> Option<u8> {
        match self.find(PacketKind::Ret) {
            Some(Packet::Ret { exit_code }) => Some(*exit_code),
            _ => None,
        }
    }

    fn satisfies(&self, expected: Option<PacketKind>) -> bool {
        match expected {
            Some(kind) => self.find(kind).is_some(),
            None => !self.packets.is_empty(),
        }
    }
}

/// Owns the transport and serializes access to it
pub struct Connection {
    transport: Mutex<Option<Box<dyn Transport>>>,
    busy: AtomicBool,
    // Mirrors whether `transport` is Some, readable while a send holds the lock
    open: AtomicBool,
    state: AtomicU8,
}

/// Releases the busy flag when dropped, on every exit path
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Connection {
    /// A connection with no transport yet
    pub fn new() -> Self {
        Connection {
            transport: Mutex::new(None),
            busy: AtomicBool::new(false),
            open: AtomicBool::new(false),
            state: AtomicU8::new(TransactionState::Idle as u8),
        }
    }

    /// A connection that is already open on `transport`
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        let conn = Connection::new();
        *conn.lock_transport() = Some(Box::new(transport));
        conn.open.store(true, Ordering::Release);
        conn
    }

    /// Take ownership of a transport. Replaces (and drops) any previous one.
    pub fn open<T: Transport + 'static>(&self, transport: T) -> Result<(), ProtocolError> {
        let _guard = self.acquire()?;
        log::info!("Opening {}", transport.describe());
        if let Some(previous) = self.lock_transport().replace(Box::new(transport)) {
            log::info!("Closed {}", previous.describe());
        }
        self.open.store(true, Ordering::Release);
        self.set_state(TransactionState::Idle);
        Ok(())
    }

    /// Drop the transport. Fails with `Busy` while a transaction is in flight.
    pub fn close(&self) -> Result<(), ProtocolError> {
        let _guard = self.acquire()?;
        if let Some(transport) = self.lock_transport().take() {
            log::info!("Closed {}", transport.describe());
        }
        self.open.store(false, Ordering::Release);
        self.set_state(TransactionState::Idle);
        Ok(())
    }

    /// A transport is attached. Never waits for an in-flight transaction.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// A transaction currently holds the transport
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// State of the current transaction, or the final state of the last one
    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run one transaction: write `packet`, then wait as `options` say.
    ///
    /// Fails with `Busy` without blocking when another transaction is in
    /// flight, with `TransportUnavailable` when nothing is open, and with the
    /// transport error when the write fails. Timeouts, end of stream and read
    /// errors are reported through the returned [`Exchange`] together with any
    /// packets decoded before them.
    pub fn send(&self, packet: &Packet, options: SendOptions) -> Result<Exchange, ProtocolError> {
        let _guard = self.acquire()?;
        let frame = packet.encode()?;

        let mut slot = self.lock_transport();
        let transport = slot.as_mut().ok_or(ProtocolError::TransportUnavailable)?;

        self.set_state(TransactionState::Sending);
        log::debug!("-> {}", packet);
        log::trace!("-> {}", fmt_hex(&frame));
        if let Err(e) = transport.write_all(&frame) {
            log::warn!("Write to {} failed: {}", transport.describe(), e);
            self.set_state(TransactionState::Failed);
            return Err(e);
        }

        if !options.awaits_reply() {
            self.set_state(TransactionState::Complete);
            return Ok(Exchange::new(TransactionState::Complete));
        }

        self.set_state(TransactionState::AwaitingReply);
        let exchange = await_reply(&mut **transport, options);
        self.set_state(exchange.state);
        Ok(exchange)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, ProtocolError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProtocolError::Busy)?;
        Ok(BusyGuard { busy: &self.busy })
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        // A panic inside a transport leaves it usable enough to close
        self.transport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

fn await_reply(transport: &mut dyn Transport, options: SendOptions) -> Exchange {
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let mut scanner = FrameScanner::new();
    let mut exchange = Exchange::new(TransactionState::AwaitingReply);

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!(
                "No reply from {} within {:?} ({} packets received)",
                transport.describe(),
                options.timeout.unwrap_or_default(),
                exchange.packets.len()
            );
            exchange.state = TransactionState::TimedOut;
            break;
        }

        match transport.read() {
            Ok(ReadOutcome::Data(bytes)) => {
                log::trace!("<- {}", fmt_hex(&bytes));
                for frame in scanner.push(&bytes) {
                    match frame.decode() {
                        Ok(packet) => {
                            log::debug!("<- {}", packet);
                            exchange.packets.push(packet);
                        }
                        Err(e) => {
                            log::warn!("Dropping frame {}: {}", fmt_hex(frame.body()), e);
                            exchange.dropped_frames += 1;
                        }
                    }
                }
                if exchange.satisfies(options.expected_kind) {
                    exchange.state = TransactionState::Complete;
                    break;
                }
            }
            Ok(ReadOutcome::Idle) => {}
            Ok(ReadOutcome::Closed) => {
                log::info!("{} closed the stream", transport.describe());
                exchange.end_of_stream = true;
                exchange.state = TransactionState::Complete;
                break;
            }
            Err(e) => {
                log::warn!("Read from {} failed: {}", transport.describe(), e);
                exchange.error = Some(e);
                exchange.state = TransactionState::Failed;
                break;
            }
        }
    }

    exchange.dropped_frames += scanner.malformed();
    exchange
}
