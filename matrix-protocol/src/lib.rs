//! # Matrix Protocol
//!
//! Framed binary protocol for driving a pixel matrix display over a serial
//! port or a socket.
//!
//! ## Wire Format
//!
//! ```text
//! [13 37][len:u8][kind:u8][payload...][DE AD]
//! ```
//!
//! `len` counts the kind byte plus the payload. Multi-byte fields are
//! big-endian.
//!
//! ## Packet Kinds
//!
//! | Kind | Name | Direction | Payload |
//! |------|------|-----------|---------|
//! | 0x01 | FillScreen | host→display | r, g, b |
//! | 0x02 | DrawPixel | host→display | x, y, r, g, b |
//! | 0x03 | ClearScreen | host→display | empty |
//! | 0x04 | DrawChar | host→display | x, y, char, bg rgb, fg rgb, size |
//! | 0x05 | InitRGBBitmap | host→display | width, height |
//! | 0x06 | FeedRGBBitmap | host→display | up to 84 rgb triples |
//! | 0x07 | DrawRGBBitmap | host→display | x, y |
//! | 0x70 | DebugHeapBefore | display→host | heap:u32 (multiple of 4) |
//! | 0x71 | DebugHeapAfter | display→host | heap:u32 (multiple of 4) |
//! | 0x72 | DebugValue | display→host | u8 |
//! | 0xFF | Ret | display→host | exit code:u8 |

mod error;
mod packets;
pub mod connection;
pub mod scanner;
pub mod serial;
pub mod socket;
pub mod transport;
pub mod websocket;

pub use connection::{Connection, Exchange, SendOptions, TransactionState};
pub use error::{DecodeError, ProtocolError};
pub use packets::{
    align_heap, fmt_hex, Color, Packet, PacketKind, Position, Size, END_MAGIC, MAX_FRAME_LENGTH,
    MAX_PIXELS_PER_PACKET, START_MAGIC,
};
pub use scanner::{FrameScanner, RawFrame};
pub use serial::{SerialTransport, DEFAULT_BAUD_RATE};
pub use socket::{SocketAddr, SocketTransport};
pub use transport::{ReadOutcome, Transport, DEFAULT_POLL_INTERVAL};
pub use websocket::WebSocketTransport;
