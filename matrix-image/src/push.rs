//! Pushing an image to the display.
//!
//! The image is quantized to a small palette, remapped onto it and streamed
//! as `InitRGBBitmap` followed by `FeedRGBBitmap` chunks. Each of those waits
//! for the display's `Ret`. A red pixel on the top row marks progress after
//! every packet. Finally the screen is cleared and the bitmap drawn.

use std::time::Duration;

use matrix_protocol::{
    Color, Connection, Exchange, Packet, PacketKind, Position, ProtocolError, SendOptions, Size,
};

use crate::median_cut::MedianCut;
use crate::nearest::remap;
use crate::PushError;

pub const DEFAULT_PALETTE_SIZE: usize = 16;
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(3000);
pub const PROGRESS_COLOR: Color = Color::RED;

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Width and height of the square image
    pub dimension: u8,
    pub palette_size: usize,
    /// Where the top-left corner of the bitmap is drawn
    pub start: Position,
    /// How long to wait for each `Ret`
    pub reply_timeout: Duration,
    /// Draw a progress pixel after every bitmap packet
    pub progress_marker: bool,
}

impl PushConfig {
    pub fn new(dimension: u8) -> Self {
        PushConfig {
            dimension,
            palette_size: DEFAULT_PALETTE_SIZE,
            start: Position::default(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            progress_marker: true,
        }
    }
}

/// Quantized image and the packets that carry it
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub palette: Vec<Color>,
    pub pixels: Vec<Color>,
    pub packets: Vec<Packet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub palette: Vec<Color>,
    /// Every packet written, progress markers and the final draw included
    pub packets_sent: usize,
    /// `Ret` replies received for bitmap packets
    pub replies: usize,
    /// Bitmap packets that got no `Ret` in time
    pub timeouts: usize,
}

/// Quantize `pixels` (row-major, `dimension` squared of them) and build the
/// bitmap packets without touching the display.
pub fn prepare(pixels: &[Color], config: &PushConfig) -> Result<PreparedImage, PushError> {
    if config.dimension == 0 {
        return Err(PushError::InvalidDimension(config.dimension));
    }
    let dim = usize::from(config.dimension);
    if pixels.len() != dim * dim {
        return Err(PushError::PixelCount {
            expected: dim * dim,
            actual: pixels.len(),
        });
    }

    let palette = MedianCut::new(pixels.to_vec()).fixed_size_palette(config.palette_size);
    let remapped = remap(pixels, &palette);

    let mut packets = vec![Packet::InitRgbBitmap {
        size: Size {
            width: config.dimension,
            height: config.dimension,
        },
    }];
    packets.extend(Packet::feed_into_multiple_packets(&remapped));

    Ok(PreparedImage {
        palette,
        pixels: remapped,
        packets,
    })
}

/// Send an image over `conn` and draw it at `config.start`.
///
/// A missing `Ret` is counted in the report and the push carries on. A
/// transport that fails or closes aborts the push.
pub fn push_image(
    conn: &Connection,
    pixels: &[Color],
    config: &PushConfig,
) -> Result<PushReport, PushError> {
    let prepared = prepare(pixels, config)?;
    let total = prepared.packets.len();
    log::info!(
        "Pushing {0}x{0} image: {1} colors, {2} packets",
        config.dimension,
        prepared.palette.len(),
        total
    );

    let await_ret = SendOptions::expect(PacketKind::Ret, config.reply_timeout);
    let mut report = PushReport {
        palette: prepared.palette.clone(),
        ..Default::default()
    };

    for (step, packet) in prepared.packets.iter().enumerate() {
        let mut exchange = conn.send(packet, await_ret)?;
        report.packets_sent += 1;
        check_transport(&mut exchange)?;
        match exchange.exit_code() {
            Some(0) => report.replies += 1,
            Some(code) => {
                log::warn!("{} returned {}", packet, code);
                report.replies += 1;
            }
            None => report.timeouts += 1,
        }

        if config.progress_marker {
            let marker = Packet::DrawPixel {
                pos: Position::new(u8::try_from(step).unwrap_or(u8::MAX), 0),
                color: PROGRESS_COLOR,
            };
            let mut exchange = conn.send(&marker, await_ret)?;
            report.packets_sent += 1;
            check_transport(&mut exchange)?;
            if exchange.timed_out() {
                log::debug!("Progress marker {} not acknowledged", step);
            }
        }

        log::info!("Sent {}/{}", step + 1, total);
    }

    conn.send(&Packet::ClearScreen, SendOptions::fire_and_forget())?;
    conn.send(
        &Packet::DrawRgbBitmap { pos: config.start },
        SendOptions::fire_and_forget(),
    )?;
    report.packets_sent += 2;

    if report.timeouts > 0 {
        log::warn!("{} of {} packets got no reply", report.timeouts, total);
    }
    Ok(report)
}

fn check_transport(exchange: &mut Exchange) -> Result<(), PushError> {
    if let Some(e) = exchange.error.take() {
        return Err(e.into());
    }
    if exchange.end_of_stream && exchange.exit_code().is_none() {
        return Err(ProtocolError::ConnectionClosed.into());
    }
    Ok(())
}
