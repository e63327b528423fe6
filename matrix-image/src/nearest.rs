//! Nearest-color matching against a palette.

use matrix_protocol::Color;

/// Used by [`remap`] when the palette is empty
pub const FALLBACK_COLOR: Color = Color::BLACK;

fn squared_distance(a: Color, b: Color) -> u32 {
    a.channels()
        .iter()
        .zip(b.channels())
        .map(|(&x, y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u32
        })
        .sum()
}

/// Euclidean distance between two colors in RGB space
pub fn euclidean_distance(a: Color, b: Color) -> f64 {
    f64::from(squared_distance(a, b)).sqrt()
}

/// Palette entry closest to `color`; the first one wins a tie.
pub fn nearest(color: Color, palette: &[Color]) -> Option<Color> {
    let mut best: Option<(u32, Color)> = None;
    for &candidate in palette {
        let distance = squared_distance(color, candidate);
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, c)| c)
}

/// Replace every pixel with its nearest palette entry
pub fn remap(pixels: &[Color], palette: &[Color]) -> Vec<Color> {
    pixels
        .iter()
        .map(|&p| nearest(p, palette).unwrap_or(FALLBACK_COLOR))
        .collect()
}
