//! Median-cut color quantization.
//!
//! The pixel set starts out as one box. A box is split by sorting its pixels
//! along its widest channel and cutting at the pixel closest to the mean of
//! that channel; the two halves replace it. Once enough boxes exist, each one
//! contributes the average of its pixels to the palette.
//!
//! Boxes live in an arena and are referred to by [`BoxId`]. The active set is
//! an ordered list of ids: splitting removes one id and appends two new ones.

use matrix_protocol::Color;

use crate::QuantizeError;

/// Color channels per pixel (r, g, b)
pub const CHANNELS: usize = 3;

/// Index of a box in the partition arena
pub type BoxId = usize;

/// Inclusive range of one channel's values inside a box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extent {
    pub min: u8,
    pub max: u8,
}

impl Extent {
    pub fn length(&self) -> u8 {
        self.max - self.min
    }
}

/// A set of pixels together with its per-channel bounding box
#[derive(Debug, Clone, Default)]
pub struct ColorBox {
    pixels: Vec<Color>,
    extents: [Extent; CHANNELS],
}

impl ColorBox {
    pub fn new(pixels: Vec<Color>) -> Self {
        let extents = bounding_box(&pixels);
        ColorBox { pixels, extents }
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn extents(&self) -> &[Extent; CHANNELS] {
        &self.extents
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// A box needs two or more pixels to be split
    pub fn is_splittable(&self) -> bool {
        self.pixels.len() >= 2
    }

    /// Widest channel and its spread. Ties go to r, then g, then b.
    pub fn longest_axis(&self) -> (usize, u8) {
        let mut axis = 0;
        let mut length = self.extents[0].length();
        for (i, extent) in self.extents.iter().enumerate().skip(1) {
            if extent.length() > length {
                axis = i;
                length = extent.length();
            }
        }
        (axis, length)
    }

    /// Channel-wise mean of the pixels, truncated. `None` for an empty box.
    pub fn average(&self) -> Option<Color> {
        if self.pixels.is_empty() {
            return None;
        }
        let mut sums = [0u64; CHANNELS];
        for pixel in &self.pixels {
            for (sum, value) in sums.iter_mut().zip(pixel.channels()) {
                *sum += u64::from(value);
            }
        }
        let n = self.pixels.len() as u64;
        Some(Color::new(
            (sums[0] / n) as u8,
            (sums[1] / n) as u8,
            (sums[2] / n) as u8,
        ))
    }

    /// Split into two non-empty boxes. Requires `is_splittable()`.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (axis, _) = self.longest_axis();
        // Stable, so equal values keep their input order
        self.pixels.sort_by_key(|p| p.channels()[axis]);
        let at = split_position(&self.pixels, axis);
        let upper = self.pixels.split_off(at);
        (ColorBox::new(self.pixels), ColorBox::new(upper))
    }
}

fn bounding_box(pixels: &[Color]) -> [Extent; CHANNELS] {
    if pixels.is_empty() {
        return [Extent::default(); CHANNELS];
    }
    let mut extents = [Extent {
        min: u8::MAX,
        max: u8::MIN,
    }; CHANNELS];
    for pixel in pixels {
        for (extent, value) in extents.iter_mut().zip(pixel.channels()) {
            extent.min = extent.min.min(value);
            extent.max = extent.max.max(value);
        }
    }
    extents
}

/// Position of the pixel whose `axis` value is closest to the axis mean.
///
/// Ties go to the highest position. The result is clamped so that both
/// halves of the split keep at least one pixel.
fn split_position(sorted: &[Color], axis: usize) -> usize {
    let n = sorted.len() as i64;
    let sum: i64 = sorted.iter().map(|p| i64::from(p.channels()[axis])).sum();

    // |v - sum/n| compared as |v*n - sum| to stay in integers
    let mut best = 0;
    let mut best_diff = i64::MAX;
    for (i, pixel) in sorted.iter().enumerate() {
        let diff = (i64::from(pixel.channels()[axis]) * n - sum).abs();
        if diff <= best_diff {
            best = i;
            best_diff = diff;
        }
    }
    best.clamp(1, sorted.len() - 1)
}

/// Arena of boxes plus the ordered active set
struct Partition {
    arena: Vec<ColorBox>,
    active: Vec<BoxId>,
}

impl Partition {
    fn new(pixels: Vec<Color>) -> Self {
        Partition {
            arena: vec![ColorBox::new(pixels)],
            active: vec![0],
        }
    }

    fn get(&self, slot: usize) -> &ColorBox {
        &self.arena[self.active[slot]]
    }

    /// Active slot whose box has the widest axis, lowest slot on ties
    fn longest_box(&self) -> usize {
        let mut best = 0;
        let mut best_length = self.get(0).longest_axis().1;
        for slot in 1..self.active.len() {
            let length = self.get(slot).longest_axis().1;
            if length > best_length {
                best = slot;
                best_length = length;
            }
        }
        best
    }

    /// Replace the box at `slot` with its two halves, appended at the end.
    ///
    /// An unsplittable box is appended twice instead so that every call grows
    /// the active set by exactly one.
    fn split_or_duplicate(&mut self, slot: usize) {
        let id = self.active.remove(slot);
        if self.arena[id].is_splittable() {
            let parent = std::mem::take(&mut self.arena[id]);
            let (lower, upper) = parent.split();
            let lower_id = self.insert(lower);
            let upper_id = self.insert(upper);
            self.active.push(lower_id);
            self.active.push(upper_id);
        } else {
            self.active.push(id);
            self.active.push(id);
        }
    }

    fn insert(&mut self, color_box: ColorBox) -> BoxId {
        self.arena.push(color_box);
        self.arena.len() - 1
    }

    fn palette(&self) -> Vec<Color> {
        self.active
            .iter()
            .filter_map(|&id| self.arena[id].average())
            .collect()
    }
}

/// Median-cut quantizer over a fixed pixel set
#[derive(Debug, Clone)]
pub struct MedianCut {
    pixels: Vec<Color>,
}

impl MedianCut {
    pub fn new(pixels: Vec<Color>) -> Self {
        MedianCut { pixels }
    }

    /// Palette of exactly `size` colors (for non-empty input and `size >= 1`).
    ///
    /// When there are fewer distinct colors than requested, colors repeat.
    /// `size == 0` is treated like `size == 1`. Empty input gives an empty
    /// palette.
    pub fn fixed_size_palette(&self, size: usize) -> Vec<Color> {
        if self.pixels.is_empty() {
            return Vec::new();
        }

        let mut partition = Partition::new(self.pixels.clone());
        for _ in 1..size {
            let slot = partition.longest_box();
            partition.split_or_duplicate(slot);
        }
        partition.palette()
    }

    /// Palette whose size follows the color spread of the input.
    ///
    /// Boxes are split until the widest remaining axis is no longer than
    /// `initial_width * (1 - threshold)`. `threshold` must lie in `(0, 1]`;
    /// lower values give fewer colors.
    pub fn dynamic_size_palette(&self, threshold: f64) -> Result<Vec<Color>, QuantizeError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(QuantizeError::InvalidThreshold(threshold));
        }
        if self.pixels.is_empty() {
            return Ok(Vec::new());
        }

        let mut partition = Partition::new(self.pixels.clone());
        let min_length = f64::from(partition.get(0).longest_axis().1) * (1.0 - threshold);

        loop {
            let slot = partition.longest_box();
            if !partition.get(slot).is_splittable() {
                break;
            }
            partition.split_or_duplicate(slot);

            let widest = partition.get(partition.longest_box()).longest_axis().1;
            if f64::from(widest) <= min_length {
                break;
            }
        }

        Ok(partition.palette())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(v: u8) -> Color {
        Color::new(v, v, v)
    }

    #[test]
    fn test_empty_input_gives_empty_palette() {
        let quantizer = MedianCut::new(vec![]);
        for size in [0, 1, 4, 16] {
            assert!(quantizer.fixed_size_palette(size).is_empty());
        }
        assert!(quantizer.dynamic_size_palette(0.5).unwrap().is_empty());
    }

    #[test]
    fn test_identical_colors_fill_palette() {
        let quantizer = MedianCut::new(vec![gray(10); 50]);
        assert_eq!(quantizer.fixed_size_palette(4), vec![gray(10); 4]);
    }

    #[test]
    fn test_fewer_pixels_than_palette() {
        let quantizer = MedianCut::new(vec![Color::RED, Color::BLUE]);
        let palette = quantizer.fixed_size_palette(5);
        assert_eq!(palette.len(), 5);
        assert!(palette.contains(&Color::RED));
        assert!(palette.contains(&Color::BLUE));
        assert!(palette.iter().all(|c| *c == Color::RED || *c == Color::BLUE));
    }

    #[test]
    fn test_palette_size_is_exact() {
        let pixels: Vec<Color> = (0..1000u32)
            .map(|i| Color::new((i * 7) as u8, (i * 13) as u8, (i * 31) as u8))
            .collect();
        let quantizer = MedianCut::new(pixels);
        for size in 1..=32 {
            assert_eq!(quantizer.fixed_size_palette(size).len(), size);
        }
    }

    #[test]
    fn test_zero_and_one_give_full_average() {
        let quantizer = MedianCut::new(vec![gray(0), gray(10), gray(20), gray(31)]);
        // (0 + 10 + 20 + 31) / 4 = 15.25, truncated
        assert_eq!(quantizer.fixed_size_palette(0), vec![gray(15)]);
        assert_eq!(quantizer.fixed_size_palette(1), vec![gray(15)]);
    }

    #[test]
    fn test_split_at_unique_mean_point() {
        // Sorted along r: ten blues, the midpoint, ten reds. Mean r is 125.
        let mut pixels = vec![Color::new(250, 0, 0); 10];
        pixels.push(Color::new(125, 0, 125));
        pixels.extend(vec![Color::new(0, 0, 250); 10]);

        let palette = MedianCut::new(pixels).fixed_size_palette(2);
        assert_eq!(palette.len(), 2);
        assert_eq!(palette[0], Color::new(0, 0, 250));
        // (125 + 10 * 250) / 11 and 125 / 11
        assert_eq!(palette[1], Color::new(238, 0, 11));
    }

    #[test]
    fn test_split_is_deterministic() {
        let pixels: Vec<Color> = (0..500u32)
            .map(|i| Color::new((i * 3) as u8, (i * 11) as u8, (i * 5) as u8))
            .collect();
        let a = MedianCut::new(pixels.clone()).fixed_size_palette(16);
        let b = MedianCut::new(pixels).fixed_size_palette(16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_longest_axis_tie_prefers_red() {
        let b = ColorBox::new(vec![Color::new(0, 0, 0), Color::new(9, 9, 9)]);
        assert_eq!(b.longest_axis(), (0, 9));

        let b = ColorBox::new(vec![Color::new(0, 0, 0), Color::new(1, 9, 9)]);
        assert_eq!(b.longest_axis(), (1, 9));

        let b = ColorBox::new(vec![Color::new(5, 5, 0), Color::new(5, 5, 200)]);
        assert_eq!(b.longest_axis(), (2, 200));
    }

    #[test]
    fn test_bounding_box_and_average() {
        let b = ColorBox::new(vec![Color::new(1, 50, 7), Color::new(4, 20, 8)]);
        assert_eq!(b.extents()[0], Extent { min: 1, max: 4 });
        assert_eq!(b.extents()[1], Extent { min: 20, max: 50 });
        assert_eq!(b.average(), Some(Color::new(2, 35, 7)));
        assert_eq!(ColorBox::default().average(), None);
    }

    #[test]
    fn test_split_keeps_both_halves_non_empty() {
        for values in [vec![0u8, 10], vec![0, 0, 0, 10], vec![0, 255, 255, 255], vec![7, 7]] {
            let pixels: Vec<Color> = values.iter().map(|&v| gray(v)).collect();
            let (lower, upper) = ColorBox::new(pixels.clone()).split();
            assert!(!lower.is_empty() && !upper.is_empty(), "{:?}", values);
            assert_eq!(lower.len() + upper.len(), pixels.len());
        }
    }

    #[test]
    fn test_split_at_value_nearest_mean() {
        // Mean 2.5: 0 and 5 are equally close, the later one wins
        let pixels = vec![gray(5), gray(0), gray(0), gray(5)];
        let (lower, upper) = ColorBox::new(pixels).split();
        assert_eq!(lower.pixels(), &[gray(0), gray(0), gray(5)]);
        assert_eq!(upper.pixels(), &[gray(5)]);
    }

    #[test]
    fn test_widest_box_is_split_first() {
        let mut pixels = vec![gray(0); 10];
        pixels.extend(vec![gray(255); 10]);
        pixels.push(gray(120));
        let palette = MedianCut::new(pixels).fixed_size_palette(3);
        assert_eq!(palette.len(), 3);
        assert!(palette.contains(&gray(0)));
        assert!(palette.contains(&gray(255)));
    }

    #[test]
    fn test_dynamic_palette_grows_with_threshold() {
        let pixels: Vec<Color> = (0..=255u32).map(|v| gray(v as u8)).collect();
        let quantizer = MedianCut::new(pixels);
        let coarse = quantizer.dynamic_size_palette(0.3).unwrap();
        let fine = quantizer.dynamic_size_palette(0.9).unwrap();
        assert!(coarse.len() >= 2);
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn test_dynamic_palette_full_threshold_separates_all_colors() {
        let pixels = vec![Color::RED, Color::RED, Color::GREEN, Color::BLUE];
        let mut palette = MedianCut::new(pixels)
            .dynamic_size_palette(1.0)
            .unwrap();
        palette.sort_by_key(|c| c.channels());
        palette.dedup();
        assert_eq!(palette, vec![Color::BLUE, Color::GREEN, Color::RED]);
    }

    #[test]
    fn test_dynamic_palette_single_pixel() {
        let palette = MedianCut::new(vec![gray(42)]).dynamic_size_palette(0.5).unwrap();
        assert_eq!(palette, vec![gray(42)]);
    }

    #[test]
    fn test_dynamic_palette_rejects_bad_threshold() {
        let quantizer = MedianCut::new(vec![gray(1)]);
        for threshold in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                quantizer.dynamic_size_palette(threshold),
                Err(QuantizeError::InvalidThreshold(_))
            ));
        }
    }
}
