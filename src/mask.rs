//! Boolean pixel masks and the preview overlay.

use image::RgbaImage;

use crate::error::{Error, Result};

/// Red boost applied to marked pixels in the preview overlay.
const OVERLAY_RED_BOOST: u8 = 100;
/// Green/blue reduction applied to marked pixels in the preview overlay.
const OVERLAY_DIM: u8 = 50;
/// Alpha given to marked pixels in the preview overlay.
const OVERLAY_ALPHA: u8 = 200;

/// Row-major grid of flags marking pixels for repair (`index = y * width + x`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// Create an all-clear mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask from existing flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferSizeMismatch`] if `bits.len() != width * height`.
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if bits.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: bits.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells (`width * height`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the mask has no cells at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether `(x, y)` is marked. Out-of-range coordinates read as clear.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[self.index(x, y)]
    }

    /// Like [`Mask::get`] for signed coordinates.
    #[must_use]
    pub fn get_signed(&self, x: i64, y: i64) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.get(x, y),
            _ => false,
        }
    }

    /// Mark or clear `(x, y)`. Out-of-range coordinates are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.bits[idx] = value;
        }
    }

    /// Number of marked cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Whether any cell is marked.
    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.iter().any(|&b| b)
    }

    /// Raw flags in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Coordinates of every marked cell, in row-major order.
    pub fn marked(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.bits.iter().enumerate().filter(|(_, b)| **b).map(move |(i, _)| {
            // i < width * height, and both dimensions are u32.
            #[allow(clippy::cast_possible_truncation)]
            let (x, y) = ((i % width) as u32, (i / width) as u32);
            (x, y)
        })
    }

    /// Number of marked cells among the 8 neighbors of `(x, y)`.
    #[must_use]
    pub fn marked_neighbors(&self, x: u32, y: u32) -> usize {
        let (x, y) = (i64::from(x), i64::from(y));
        let mut count = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx != 0 || dy != 0) && self.get_signed(x + dx, y + dy) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Whether this mask covers the same grid as `image`.
    #[must_use]
    pub fn matches(&self, image: &RgbaImage) -> bool {
        self.width == image.width() && self.height == image.height()
    }

    /// Render a highlighted copy of `image` for previewing a detection.
    ///
    /// Marked pixels get a red tint and become semi-transparent; the rest of
    /// the image is copied unchanged.
    #[must_use]
    pub fn overlay(&self, image: &RgbaImage) -> RgbaImage {
        let mut preview = image.clone();
        for (x, y) in self.marked() {
            if let Some(px) = preview.get_pixel_mut_checked(x, y) {
                px[0] = px[0].saturating_add(OVERLAY_RED_BOOST);
                px[1] = px[1].saturating_sub(OVERLAY_DIM);
                px[2] = px[2].saturating_sub(OVERLAY_DIM);
                px[3] = OVERLAY_ALPHA;
            }
        }
        preview
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
