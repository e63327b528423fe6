//! Packet types and encoding/decoding for the matrix wire protocol.

use std::fmt;

use crate::{DecodeError, ProtocolError};

/// Marks the beginning of every frame
pub const START_MAGIC: [u8; 2] = [0x13, 0x37];

/// Marks the end of every frame
pub const END_MAGIC: [u8; 2] = [0xDE, 0xAD];

/// Largest value of the length byte (kind byte + payload)
pub const MAX_FRAME_LENGTH: usize = u8::MAX as usize;

/// Pixels carried by a single FeedRGBBitmap packet (3 bytes each)
pub const MAX_PIXELS_PER_PACKET: usize = 84;

/// Start magic, length byte, end magic
pub(crate) const FRAMING_OVERHEAD: usize = START_MAGIC.len() + 1 + END_MAGIC.len();

/// Packet kinds understood by the display firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    FillScreen = 0x01,
    DrawPixel = 0x02,
    ClearScreen = 0x03,
    DrawChar = 0x04,
    InitRgbBitmap = 0x05,
    FeedRgbBitmap = 0x06,
    DrawRgbBitmap = 0x07,
    DebugHeapBefore = 0x70,
    DebugHeapAfter = 0x71,
    DebugValue = 0x72,
    Ret = 0xFF,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            0x01 => PacketKind::FillScreen,
            0x02 => PacketKind::DrawPixel,
            0x03 => PacketKind::ClearScreen,
            0x04 => PacketKind::DrawChar,
            0x05 => PacketKind::InitRgbBitmap,
            0x06 => PacketKind::FeedRgbBitmap,
            0x07 => PacketKind::DrawRgbBitmap,
            0x70 => PacketKind::DebugHeapBefore,
            0x71 => PacketKind::DebugHeapAfter,
            0x72 => PacketKind::DebugValue,
            0xFF => PacketKind::Ret,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketKind::FillScreen => "FillScreen",
            PacketKind::DrawPixel => "DrawPixel",
            PacketKind::ClearScreen => "ClearScreen",
            PacketKind::DrawChar => "DrawChar",
            PacketKind::InitRgbBitmap => "InitRGBBitmap",
            PacketKind::FeedRgbBitmap => "FeedRGBBitmap",
            PacketKind::DrawRgbBitmap => "DrawRGBBitmap",
            PacketKind::DebugHeapBefore => "DebugHeapBefore",
            PacketKind::DebugHeapAfter => "DebugHeapAfter",
            PacketKind::DebugValue => "DebugValue",
            PacketKind::Ret => "Ret",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An 8-bit-per-channel RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Channels in r, g, b order
    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Pixel coordinate on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub const fn new(x: u8, y: u8) -> Self {
        Position { x, y }
    }
}

/// Bitmap dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u8,
    pub height: u8,
}

/// Round a heap value up to the next multiple of 4, as the firmware expects.
///
/// Values too close to `u32::MAX` saturate at the largest multiple of 4.
pub fn align_heap(heap: u32) -> u32 {
    match heap % 4 {
        0 => heap,
        rem => heap.checked_add(4 - rem).unwrap_or(u32::MAX & !3),
    }
}

/// Packets exchanged with the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Paint the whole screen one color
    FillScreen(Color),

    /// Set a single pixel
    DrawPixel { pos: Position, color: Color },

    /// Blank the screen
    ClearScreen,

    /// Render one character cell
    DrawChar {
        pos: Position,
        code: u8,
        bg: Color,
        fg: Color,
        size: u8,
    },

    /// Allocate an off-screen bitmap on the device
    InitRgbBitmap { size: Size },

    /// Append pixels to the off-screen bitmap
    FeedRgbBitmap(Vec<Color>),

    /// Blit the off-screen bitmap at a position
    DrawRgbBitmap { pos: Position },

    /// Free heap reported before an operation
    DebugHeapBefore { heap: u32 },

    /// Free heap reported after an operation
    DebugHeapAfter { heap: u32 },

    /// Single debug byte
    DebugValue(u8),

    /// Completion reply from the device
    Ret { exit_code: u8 },

    /// A kind byte this side does not know about
    Raw { kind: u8, payload: Vec<u8> },
}

impl Packet {
    /// DebugHeapBefore with the heap value aligned to 4 bytes
    pub fn heap_before(heap: u32) -> Self {
        Packet::DebugHeapBefore {
            heap: align_heap(heap),
        }
    }

    /// DebugHeapAfter with the heap value aligned to 4 bytes
    pub fn heap_after(heap: u32) -> Self {
        Packet::DebugHeapAfter {
            heap: align_heap(heap),
        }
    }

    /// Split a pixel run into as many FeedRGBBitmap packets as the length byte allows
    pub fn feed_into_multiple_packets(pixels: &[Color]) -> Vec<Packet> {
        pixels
            .chunks(MAX_PIXELS_PER_PACKET)
            .map(|chunk| Packet::FeedRgbBitmap(chunk.to_vec()))
            .collect()
    }

    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::from_u8(self.kind_byte())
    }

    pub fn kind_byte(&self) -> u8 {
        let kind = match self {
            Packet::FillScreen(_) => PacketKind::FillScreen,
            Packet::DrawPixel { .. } => PacketKind::DrawPixel,
            Packet::ClearScreen => PacketKind::ClearScreen,
            Packet::DrawChar { .. } => PacketKind::DrawChar,
            Packet::InitRgbBitmap { .. } => PacketKind::InitRgbBitmap,
            Packet::FeedRgbBitmap(_) => PacketKind::FeedRgbBitmap,
            Packet::DrawRgbBitmap { .. } => PacketKind::DrawRgbBitmap,
            Packet::DebugHeapBefore { .. } => PacketKind::DebugHeapBefore,
            Packet::DebugHeapAfter { .. } => PacketKind::DebugHeapAfter,
            Packet::DebugValue(_) => PacketKind::DebugValue,
            Packet::Ret { .. } => PacketKind::Ret,
            Packet::Raw { kind, .. } => return *kind,
        };
        kind as u8
    }

    /// Payload bytes, without kind byte or framing
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Packet::FillScreen(c) => vec![c.r, c.g, c.b],
            Packet::DrawPixel { pos, color } => vec![pos.x, pos.y, color.r, color.g, color.b],
            Packet::ClearScreen => vec![],
            Packet::DrawChar {
                pos,
                code,
                bg,
                fg,
                size,
            } => vec![
                pos.x, pos.y, *code, bg.r, bg.g, bg.b, fg.r, fg.g, fg.b, *size,
            ],
            Packet::InitRgbBitmap { size } => vec![size.width, size.height],
            Packet::FeedRgbBitmap(pixels) => pixels.iter().flat_map(|p| p.channels()).collect(),
            Packet::DrawRgbBitmap { pos } => vec![pos.x, pos.y],
            Packet::DebugHeapBefore { heap } | Packet::DebugHeapAfter { heap } => {
                align_heap(*heap).to_be_bytes().to_vec()
            }
            Packet::DebugValue(val) => vec![*val],
            Packet::Ret { exit_code } => vec![*exit_code],
            Packet::Raw { payload, .. } => payload.clone(),
        }
    }

    /// Encode packet to wire format
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.payload();

        // Format: [13 37][len:u8][kind:u8][payload...][DE AD]
        // len includes the kind byte
        let len = 1 + payload.len();
        if len > MAX_FRAME_LENGTH {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(FRAMING_OVERHEAD + len);
        frame.extend(START_MAGIC);
        frame.push(len as u8);
        frame.push(self.kind_byte());
        frame.extend(&payload);
        frame.extend(END_MAGIC);
        Ok(frame)
    }

    /// Decode a complete frame, magics included
    pub fn decode(frame: &[u8]) -> Result<Packet, DecodeError> {
        // Smallest frame: magic, len, kind, magic
        let min_len = FRAMING_OVERHEAD + 1;
        if frame.len() < min_len {
            return Err(DecodeError::Truncated {
                needed: min_len,
                have: frame.len(),
            });
        }
        if frame[..2] != START_MAGIC {
            return Err(DecodeError::MissingStartMagic);
        }
        if frame[frame.len() - 2..] != END_MAGIC {
            return Err(DecodeError::MissingEndMagic);
        }
        Self::decode_body(&frame[2..frame.len() - 2])
    }

    /// Decode a frame body: `[len][kind][payload...]`, magics already stripped
    pub fn decode_body(body: &[u8]) -> Result<Packet, DecodeError> {
        if body.len() < 2 {
            return Err(DecodeError::Truncated {
                needed: 2,
                have: body.len(),
            });
        }

        let declared = body[0] as usize;
        let actual = body.len() - 1;
        if declared != actual {
            return Err(DecodeError::LengthMismatch { declared, actual });
        }

        let kind_byte = body[1];
        let payload = &body[2..];

        let kind = match PacketKind::from_u8(kind_byte) {
            Some(kind) => kind,
            None => {
                return Ok(Packet::Raw {
                    kind: kind_byte,
                    payload: payload.to_vec(),
                })
            }
        };

        let require = |needed: usize| {
            if payload.len() < needed {
                Err(DecodeError::ShortPayload {
                    kind: kind.name(),
                    needed,
                    have: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        let color_at = |i: usize| Color::new(payload[i], payload[i + 1], payload[i + 2]);

        let packet = match kind {
            PacketKind::FillScreen => {
                require(3)?;
                Packet::FillScreen(color_at(0))
            }
            PacketKind::DrawPixel => {
                require(5)?;
                Packet::DrawPixel {
                    pos: Position::new(payload[0], payload[1]),
                    color: color_at(2),
                }
            }
            PacketKind::ClearScreen => Packet::ClearScreen,
            PacketKind::DrawChar => {
                require(10)?;
                Packet::DrawChar {
                    pos: Position::new(payload[0], payload[1]),
                    code: payload[2],
                    bg: color_at(3),
                    fg: color_at(6),
                    size: payload[9],
                }
            }
            PacketKind::InitRgbBitmap => {
                require(2)?;
                Packet::InitRgbBitmap {
                    size: Size {
                        width: payload[0],
                        height: payload[1],
                    },
                }
            }
            PacketKind::FeedRgbBitmap => {
                if payload.len() % 3 != 0 {
                    return Err(DecodeError::RaggedBitmap(payload.len()));
                }
                Packet::FeedRgbBitmap(
                    payload
                        .chunks_exact(3)
                        .map(|c| Color::new(c[0], c[1], c[2]))
                        .collect(),
                )
            }
            PacketKind::DrawRgbBitmap => {
                require(2)?;
                Packet::DrawRgbBitmap {
                    pos: Position::new(payload[0], payload[1]),
                }
            }
            PacketKind::DebugHeapBefore => {
                require(4)?;
                Packet::DebugHeapBefore {
                    heap: read_u32_be(payload),
                }
            }
            PacketKind::DebugHeapAfter => {
                require(4)?;
                Packet::DebugHeapAfter {
                    heap: read_u32_be(payload),
                }
            }
            PacketKind::DebugValue => {
                require(1)?;
                Packet::DebugValue(payload[0])
            }
            PacketKind::Ret => {
                require(1)?;
                Packet::Ret {
                    exit_code: payload[0],
                }
            }
        };

        Ok(packet)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::FillScreen(color) => write!(f, "FillScreen(color={})", color),
            Packet::DrawPixel { pos, color } => {
                write!(f, "DrawPixel(pos={},{}, color={})", pos.x, pos.y, color)
            }
            Packet::ClearScreen => write!(f, "ClearScreen"),
            Packet::DrawChar { pos, code, .. } => {
                write!(f, "DrawChar(pos={},{}, code=0x{:02x})", pos.x, pos.y, code)
            }
            Packet::InitRgbBitmap { size } => {
                write!(f, "InitRGBBitmap(size={}x{})", size.width, size.height)
            }
            Packet::FeedRgbBitmap(pixels) => {
                write!(f, "FeedRGBBitmap(pixel_count={})", pixels.len())
            }
            Packet::DrawRgbBitmap { pos } => write!(f, "DrawRGBBitmap(pos={},{})", pos.x, pos.y),
            Packet::DebugHeapBefore { heap } => write!(f, "HeapBefore(heap={})", heap),
            Packet::DebugHeapAfter { heap } => write!(f, "HeapAfter(heap={})", heap),
            Packet::DebugValue(val) => write!(f, "DebugValue(val={})", val),
            Packet::Ret { exit_code } => write!(f, "Ret(exit_code={})", exit_code),
            Packet::Raw { kind, payload } => {
                write!(f, "Raw(kind=0x{:02x}, {} bytes)", kind, payload.len())
            }
        }
    }
}

fn read_u32_be(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Format bytes as hex string for wire tracing
pub fn fmt_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let encoded = packet.encode().unwrap();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_wire_format_fill_screen() {
        let encoded = Packet::FillScreen(Color::RED).encode().unwrap();
        // len = 4 (kind byte + 3 color bytes)
        assert_eq!(
            encoded,
            vec![0x13, 0x37, 0x04, 0x01, 0xFF, 0x00, 0x00, 0xDE, 0xAD]
        );
    }

    #[test]
    fn test_wire_format_clear_screen() {
        let encoded = Packet::ClearScreen.encode().unwrap();
        assert_eq!(encoded, vec![0x13, 0x37, 0x01, 0x03, 0xDE, 0xAD]);
    }

    #[test]
    fn test_encode_decode_fill_screen() {
        round_trip(Packet::FillScreen(Color::new(255, 0, 0)));
    }

    #[test]
    fn test_encode_decode_draw_pixel() {
        round_trip(Packet::DrawPixel {
            pos: Position::new(3, 7),
            color: Color::new(1, 2, 3),
        });
    }

    #[test]
    fn test_encode_decode_draw_char() {
        round_trip(Packet::DrawChar {
            pos: Position::new(0, 8),
            code: b'A',
            bg: Color::BLACK,
            fg: Color::WHITE,
            size: 1,
        });
    }

    #[test]
    fn test_encode_decode_bitmap_packets() {
        round_trip(Packet::InitRgbBitmap {
            size: Size {
                width: 32,
                height: 32,
            },
        });
        round_trip(Packet::FeedRgbBitmap(vec![
            Color::new(1, 2, 3),
            Color::new(4, 5, 6),
        ]));
        round_trip(Packet::DrawRgbBitmap {
            pos: Position::new(16, 0),
        });
    }

    #[test]
    fn test_encode_decode_responses() {
        round_trip(Packet::Ret { exit_code: 0 });
        round_trip(Packet::Ret { exit_code: 0xFE });
        round_trip(Packet::DebugValue(42));
        round_trip(Packet::heap_before(1024));
        round_trip(Packet::heap_after(0x00AB_CDEF));
    }

    #[test]
    fn test_heap_is_aligned_and_big_endian() {
        let packet = Packet::heap_before(1021);
        assert_eq!(packet, Packet::DebugHeapBefore { heap: 1024 });
        assert_eq!(packet.payload(), vec![0x00, 0x00, 0x04, 0x00]);

        // Unaligned value built by hand is still aligned on the wire
        let raw = Packet::DebugHeapAfter { heap: 5 }.encode().unwrap();
        assert_eq!(
            Packet::decode(&raw).unwrap(),
            Packet::DebugHeapAfter { heap: 8 }
        );
    }

    #[test]
    fn test_align_heap_saturates() {
        assert_eq!(align_heap(0), 0);
        assert_eq!(align_heap(1), 4);
        assert_eq!(align_heap(8), 8);
        assert_eq!(align_heap(u32::MAX), u32::MAX & !3);
    }

    #[test]
    fn test_unknown_kind_decodes_raw() {
        let frame = [0x13, 0x37, 0x03, 0x42, 0xAA, 0xBB, 0xDE, 0xAD];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(
            packet,
            Packet::Raw {
                kind: 0x42,
                payload: vec![0xAA, 0xBB]
            }
        );
        assert_eq!(packet.kind(), None);
        assert_eq!(packet.encode().unwrap(), frame.to_vec());
    }

    #[test]
    fn test_decode_short_payload_is_error() {
        // Ret with no exit code byte
        let err = Packet::decode_body(&[0x01, 0xFF]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortPayload {
                kind: "Ret",
                needed: 1,
                have: 0
            }
        );

        // Heap value cut short
        let err = Packet::decode_body(&[0x03, 0x70, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, DecodeError::ShortPayload { needed: 4, .. }));
    }

    #[test]
    fn test_decode_rejects_bad_framing() {
        assert!(matches!(
            Packet::decode(&[0x13, 0x37]),
            Err(DecodeError::Truncated { .. })
        ));
        assert_eq!(
            Packet::decode(&[0x00, 0x37, 0x01, 0x03, 0xDE, 0xAD]),
            Err(DecodeError::MissingStartMagic)
        );
        assert_eq!(
            Packet::decode(&[0x13, 0x37, 0x01, 0x03, 0xDE, 0xAE]),
            Err(DecodeError::MissingEndMagic)
        );
        assert_eq!(
            Packet::decode(&[0x13, 0x37, 0x05, 0x03, 0xDE, 0xAD]),
            Err(DecodeError::LengthMismatch {
                declared: 5,
                actual: 1
            })
        );
    }

    #[test]
    fn test_decode_ragged_bitmap() {
        let err = Packet::decode_body(&[0x03, 0x06, 0x01, 0x02]).unwrap_err();
        assert_eq!(err, DecodeError::RaggedBitmap(2));
    }

    #[test]
    fn test_feed_into_multiple_packets() {
        let pixels: Vec<Color> = (0..200u32)
            .map(|i| Color::new(i as u8, (i >> 1) as u8, 7))
            .collect();
        let packets = Packet::feed_into_multiple_packets(&pixels);
        assert_eq!(packets.len(), 3); // ceil(200 / 84)

        let mut rejoined = Vec::new();
        for packet in &packets {
            match packet {
                Packet::FeedRgbBitmap(chunk) => {
                    assert!(chunk.len() <= MAX_PIXELS_PER_PACKET);
                    rejoined.extend_from_slice(chunk);
                }
                other => panic!("unexpected packet {:?}", other),
            }
            assert!(packet.encode().is_ok());
        }
        assert_eq!(rejoined, pixels);
    }

    #[test]
    fn test_feed_into_multiple_packets_exact_and_empty() {
        let pixels = vec![Color::WHITE; 168];
        assert_eq!(Packet::feed_into_multiple_packets(&pixels).len(), 2);
        assert!(Packet::feed_into_multiple_packets(&[]).is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let packet = Packet::FeedRgbBitmap(vec![Color::BLACK; MAX_PIXELS_PER_PACKET + 1]);
        assert!(matches!(
            packet.encode(),
            Err(ProtocolError::PayloadTooLarge(255))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Packet::Ret { exit_code: 0 }.to_string(), "Ret(exit_code=0)");
        assert_eq!(
            Packet::FeedRgbBitmap(vec![Color::BLACK; 84]).to_string(),
            "FeedRGBBitmap(pixel_count=84)"
        );
        assert_eq!(fmt_hex(&[0x13, 0x37]), "13 37");
    }
}
