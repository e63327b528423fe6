//! Frame scanner for a fragmented byte stream.
//!
//! Bytes arrive from the transport in arbitrary chunks. The scanner keeps
//! everything it has not yet consumed, and on each push extracts every frame
//! that is complete:
//!
//! ```text
//! ... noise ... [13 37][len][kind][payload: len-1 bytes][DE AD] ...
//! ```
//!
//! A frame is located by its start magic, sized by its length byte and only
//! accepted when the end magic sits exactly where the length says it should.
//! Payload bytes that happen to look like a magic marker are therefore never
//! mistaken for a frame boundary.
//!
//! A candidate is only judged once its declared length has arrived, so a
//! stray start magic in line noise holds back later frames until that many
//! bytes (at most 260) have been received.

use crate::packets::{Packet, END_MAGIC, FRAMING_OVERHEAD, START_MAGIC};
use crate::DecodeError;

/// A frame body with both magics stripped: `[len][kind][payload...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    body: Vec<u8>,
}

impl RawFrame {
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn kind_byte(&self) -> u8 {
        self.body[1]
    }

    /// Decode into a typed packet
    pub fn decode(&self) -> Result<Packet, DecodeError> {
        Packet::decode_body(&self.body)
    }
}

/// Accumulates stream bytes and extracts complete frames in arrival order
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: Vec<u8>,
    malformed: usize,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add received bytes and return every frame completed by them.
    ///
    /// Incomplete frames stay buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Candidate frames discarded because their end magic was missing
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn try_extract_one(&mut self) -> Option<RawFrame> {
        loop {
            let start = match self.buffer.windows(2).position(|w| w == START_MAGIC) {
                Some(start) => start,
                None => {
                    // Only a dangling first half of the start magic is worth keeping
                    let keep = usize::from(self.buffer.last() == Some(&START_MAGIC[0]));
                    let noise = self.buffer.len() - keep;
                    self.buffer.drain(..noise);
                    return None;
                }
            };
            self.buffer.drain(..start);

            if self.buffer.len() < 3 {
                return None;
            }

            let len = self.buffer[2] as usize;
            if len == 0 {
                self.reject();
                continue;
            }

            let total = FRAMING_OVERHEAD + len;
            if self.buffer.len() < total {
                return None;
            }

            if self.buffer[total - 2..total] != END_MAGIC {
                self.reject();
                continue;
            }

            let frame: Vec<u8> = self.buffer.drain(..total).collect();
            return Some(RawFrame {
                body: frame[START_MAGIC.len()..total - END_MAGIC.len()].to_vec(),
            });
        }
    }

    /// Drop a start magic that did not lead to a well-formed frame
    fn reject(&mut self) {
        self.malformed += 1;
        log::debug!("Discarding malformed frame candidate");
        self.buffer.drain(..START_MAGIC.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::Color;

    fn two_frames() -> (Vec<u8>, Vec<Packet>) {
        let packets = vec![Packet::DebugValue(7), Packet::Ret { exit_code: 0 }];
        let mut stream = Vec::new();
        for p in &packets {
            stream.extend(p.encode().unwrap());
        }
        (stream, packets)
    }

    fn decode_all(frames: Vec<RawFrame>) -> Vec<Packet> {
        frames.iter().map(|f| f.decode().unwrap()).collect()
    }

    #[test]
    fn test_two_frames_in_one_push() {
        let (stream, packets) = two_frames();
        let mut scanner = FrameScanner::new();
        assert_eq!(decode_all(scanner.push(&stream)), packets);
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_two_frames_split_at_every_boundary() {
        let (stream, packets) = two_frames();
        for a in 0..stream.len() {
            for b in a..stream.len() {
                let mut scanner = FrameScanner::new();
                let mut frames = scanner.push(&stream[..a]);
                frames.extend(scanner.push(&stream[a..b]));
                frames.extend(scanner.push(&stream[b..]));
                assert_eq!(decode_all(frames), packets, "split at {} / {}", a, b);
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let (stream, packets) = two_frames();
        let mut scanner = FrameScanner::new();
        let mut frames = Vec::new();
        for byte in &stream {
            frames.extend(scanner.push(std::slice::from_ref(byte)));
        }
        assert_eq!(decode_all(frames), packets);
    }

    #[test]
    fn test_incomplete_frame_is_retained() {
        let frame = Packet::Ret { exit_code: 3 }.encode().unwrap();
        let mut scanner = FrameScanner::new();
        assert!(scanner.push(&frame[..4]).is_empty());
        assert_eq!(scanner.pending(), 4);
        let frames = scanner.push(&frame[4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind_byte(), 0xFF);
    }

    #[test]
    fn test_noise_before_frame_is_dropped() {
        let mut stream = b"boot ok\r\n".to_vec();
        stream.extend(Packet::Ret { exit_code: 0 }.encode().unwrap());
        let mut scanner = FrameScanner::new();
        let packets = decode_all(scanner.push(&stream));
        assert_eq!(packets, vec![Packet::Ret { exit_code: 0 }]);
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_dangling_start_byte_kept() {
        let mut scanner = FrameScanner::new();
        assert!(scanner.push(&[0x00, 0x01, 0x13]).is_empty());
        assert_eq!(scanner.pending(), 1);
        let frames = scanner.push(&[0x37, 0x02, 0x72, 0x09, 0xDE, 0xAD]);
        assert_eq!(decode_all(frames), vec![Packet::DebugValue(9)]);
    }

    #[test]
    fn test_malformed_frame_skipped() {
        // Length claims one byte of payload but the end magic is not there
        let mut stream = vec![0x13, 0x37, 0x02, 0xFF, 0x00, 0x11, 0x22];
        stream.extend(Packet::Ret { exit_code: 1 }.encode().unwrap());
        let mut scanner = FrameScanner::new();
        let packets = decode_all(scanner.push(&stream));
        assert_eq!(packets, vec![Packet::Ret { exit_code: 1 }]);
        assert_eq!(scanner.malformed(), 1);
    }

    #[test]
    fn test_spurious_start_resolves_once_length_is_reached() {
        // Noise that looks like the start of a 13-byte frame, then a real reply
        let mut stream = vec![0x13, 0x37, 0x08, 0x01];
        stream.extend(Packet::Ret { exit_code: 4 }.encode().unwrap());
        let mut scanner = FrameScanner::new();
        assert!(scanner.push(&stream).is_empty());

        // Two more bytes complete the candidate, which then fails its end magic
        let packets = decode_all(scanner.push(&[0x00, 0x00]));
        assert_eq!(packets, vec![Packet::Ret { exit_code: 4 }]);
        assert_eq!(scanner.malformed(), 1);
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_magic_bytes_inside_payload() {
        let packet = Packet::FeedRgbBitmap(vec![
            Color::new(0x13, 0x37, 0xDE),
            Color::new(0xAD, 0x13, 0x37),
        ]);
        let mut scanner = FrameScanner::new();
        let packets = decode_all(scanner.push(&packet.encode().unwrap()));
        assert_eq!(packets, vec![packet]);
    }

    #[test]
    fn test_frame_shaped_payload_split_at_every_boundary() {
        // Payload bytes spell a complete ClearScreen frame: 13 37 01 03 DE AD
        let packet = Packet::FeedRgbBitmap(vec![
            Color::new(0x13, 0x37, 0x01),
            Color::new(0x03, 0xDE, 0xAD),
        ]);
        let stream = packet.encode().unwrap();
        assert_eq!(
            stream,
            [0x13, 0x37, 0x07, 0x06, 0x13, 0x37, 0x01, 0x03, 0xDE, 0xAD, 0xDE, 0xAD]
        );

        for at in 0..=stream.len() {
            let mut scanner = FrameScanner::new();
            let mut frames = scanner.push(&stream[..at]);
            frames.extend(scanner.push(&stream[at..]));
            assert_eq!(decode_all(frames), vec![packet.clone()], "split at {}", at);
            assert_eq!(scanner.malformed(), 0);
        }
    }

    #[test]
    fn test_undecodable_frame_still_extracted() {
        // Well framed, but a Ret without its exit code
        let mut scanner = FrameScanner::new();
        let frames = scanner.push(&[0x13, 0x37, 0x01, 0xFF, 0xDE, 0xAD]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].decode().is_err());
    }
}
