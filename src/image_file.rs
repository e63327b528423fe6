//! PNG loading.

use matrix_protocol::Color;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG decode error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("Image must be square, got {width}x{height}")]
    NotSquare { width: u32, height: u32 },

    #[error("Image is {0} pixels wide, the display takes at most 255")]
    TooLarge(u32),

    #[error("Unsupported color type {0:?}")]
    UnsupportedColor(png::ColorType),
}

/// A square image as row-major pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquareImage {
    pub dimension: u8,
    pub pixels: Vec<Color>,
}

pub fn load_png(path: &Path) -> Result<SquareImage, ImageError> {
    let file = File::open(path)?;
    decode_png(BufReader::new(file))
}

/// Decode a PNG into 8-bit RGB. Alpha is dropped, no resizing is done.
pub fn decode_png<R: Read>(reader: R) -> Result<SquareImage, ImageError> {
    let mut decoder = png::Decoder::new(reader);
    // Palette and low bit depths expand to 8 bits, 16-bit samples shrink to 8
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let (width, height) = (info.width, info.height);
    if width != height {
        return Err(ImageError::NotSquare { width, height });
    }
    let dimension = u8::try_from(width).map_err(|_| ImageError::TooLarge(width))?;

    let bytes = &buf[..info.buffer_size()];
    let pixels = match info.color_type {
        png::ColorType::Rgb => bytes
            .chunks_exact(3)
            .map(|p| Color::new(p[0], p[1], p[2]))
            .collect(),
        png::ColorType::Rgba => bytes
            .chunks_exact(4)
            .map(|p| Color::new(p[0], p[1], p[2]))
            .collect(),
        png::ColorType::Grayscale => bytes.iter().map(|&v| Color::new(v, v, v)).collect(),
        png::ColorType::GrayscaleAlpha => bytes
            .chunks_exact(2)
            .map(|p| Color::new(p[0], p[0], p[0]))
            .collect(),
        other => return Err(ImageError::UnsupportedColor(other)),
    };

    Ok(SquareImage { dimension, pixels })
}
