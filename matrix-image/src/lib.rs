//! # Matrix Image
//!
//! Reduces an image to a small palette with median cut and streams it to a
//! pixel matrix display over a [`matrix_protocol::Connection`].

pub mod median_cut;
pub mod nearest;
pub mod push;

pub use median_cut::{ColorBox, MedianCut, CHANNELS};
pub use nearest::{euclidean_distance, nearest, remap, FALLBACK_COLOR};
pub use push::{prepare, push_image, PreparedImage, PushConfig, PushReport};

use matrix_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantizeError {
    #[error("Threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Image dimension must be between 1 and 255, got {0}")]
    InvalidDimension(u8),

    #[error("Expected {expected} pixels, got {actual}")]
    PixelCount { expected: usize, actual: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
