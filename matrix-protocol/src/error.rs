//! Error types for the matrix protocol.

use thiserror::Error;

/// Errors raised while exchanging packets with the display.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Another transaction currently holds the transport
    #[error("transport busy: another transaction is in flight")]
    Busy,

    /// No transport has been opened, or it was closed
    #[error("no open transport")]
    TransportUnavailable,

    /// I/O error during read/write
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// Serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// WebSocket handshake or framing failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame did not match the layout of its declared kind
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Packet payload does not fit in the one-byte length field
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Connection closed by the remote end
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        }
    }
}

/// Reasons a frame can fail to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame does not begin with the start magic
    #[error("missing start magic")]
    MissingStartMagic,

    /// Frame does not end with the end magic
    #[error("missing end magic")]
    MissingEndMagic,

    /// Frame is shorter than its header or declared length
    #[error("truncated frame: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    /// Length byte disagrees with the bytes actually present
    #[error("length byte says {declared}, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Payload is shorter than the fixed layout of its kind
    #[error("{kind} payload too short: need {needed} bytes, have {have}")]
    ShortPayload {
        kind: &'static str,
        needed: usize,
        have: usize,
    },

    /// Bitmap payload is not a whole number of RGB triples
    #[error("bitmap payload of {0} bytes is not a multiple of 3")]
    RaggedBitmap(usize),
}
