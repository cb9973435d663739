//! Chroma-key background removal.

use std::fmt;
use std::str::FromStr;

use image::RgbaImage;

use crate::error::Error;

/// Background color to key out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Near-white backgrounds: every channel above `255 - threshold`.
    White,
    /// Green screens: green exceeds both red and blue by more than `threshold`.
    Green,
}

impl Key {
    /// Whether a pixel with these channels belongs to the background.
    #[must_use]
    pub fn matches(self, r: u8, g: u8, b: u8, threshold: u8) -> bool {
        match self {
            Key::White => {
                let floor = u8::MAX - threshold;
                r > floor && g > floor && b > floor
            }
            Key::Green => {
                let (r, g, b, t) = (u16::from(r), u16::from(g), u16::from(b), u16::from(threshold));
                g > r + t && g > b + t
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::White => f.write_str("white"),
            Key::Green => f.write_str("green"),
        }
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "white" => Ok(Key::White),
            "green" => Ok(Key::Green),
            other => Err(Error::InvalidArgument(format!("chroma key '{other}'"))),
        }
    }
}

/// Make every background pixel fully transparent.
///
/// Color channels are left as they are. Returns the number of pixels removed.
pub fn remove_background(image: &mut RgbaImage, key: Key, threshold: u8) -> usize {
    let mut removed = 0;
    for px in image.pixels_mut() {
        if key.matches(px[0], px[1], px[2], threshold) {
            px[3] = 0;
            removed += 1;
        }
    }
    log::debug!("chroma key {key} (threshold {threshold}) removed {removed} pixels");
    removed
}
