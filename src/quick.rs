//! Single-pass "fast" removal filters.
//!
//! These skip detection, cleanup and patch search entirely: each pixel is
//! judged on its own values and, if suspicious, replaced by the average of
//! its radius-2 neighborhood. Reads come from a snapshot of the input.

use image::RgbaImage;

use crate::sampler::{self, brightness, color_at};

/// Pixels less opaque than this are treated as watermark.
const OPAQUE_ALPHA: u8 = 240;
/// Brightness limits outside which a pixel is treated as watermark.
const DARK: f32 = 5.0;
const BRIGHT: f32 = 250.0;
/// Orthogonal contrast that suggests a text edge.
const TEXT_CONTRAST: f32 = 100.0;
/// Text is assumed to be near-black or near-white.
const TEXT_DARK: f32 = 50.0;
const TEXT_BRIGHT: f32 = 200.0;
/// Radius of the replacement average.
const NEIGHBOR_RADIUS: u32 = 2;

/// Replace semi-transparent and extreme-brightness pixels with their
/// neighborhood average.
///
/// Semi-transparent pixels also become fully opaque. Returns the number of
/// pixels changed.
pub fn remove_watermark(image: &mut RgbaImage) -> usize {
    let snapshot = image.clone();
    let mut changed = 0;

    for (x, y, px) in snapshot.enumerate_pixels() {
        let translucent = px[3] < OPAQUE_ALPHA;
        let b = brightness(color_at(&snapshot, x, y));
        if !translucent && b <= BRIGHT && b >= DARK {
            continue;
        }

        let neighbors = sampler::neighbors(&snapshot, x, y, NEIGHBOR_RADIUS);
        let Some(avg) = sampler::average(&neighbors) else {
            continue;
        };

        let out = image.get_pixel_mut(x, y);
        out[0] = avg[0];
        out[1] = avg[1];
        out[2] = avg[2];
        if translucent {
            out[3] = u8::MAX;
        }
        changed += 1;
    }

    log::debug!("quick watermark removal changed {changed} pixels");
    changed
}

/// Replace near-black or near-white pixels that sit on a strong orthogonal
/// edge with their neighborhood average. Border pixels are skipped.
///
/// Returns the number of pixels changed.
pub fn remove_text(image: &mut RgbaImage) -> usize {
    let snapshot = image.clone();
    let (w, h) = snapshot.dimensions();
    let mut changed = 0;

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let b = brightness(color_at(&snapshot, x, y));
            if b >= TEXT_DARK && b <= TEXT_BRIGHT {
                continue;
            }

            let edge = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .into_iter()
                .any(|(nx, ny)| (b - brightness(color_at(&snapshot, nx, ny))).abs() > TEXT_CONTRAST);
            if !edge {
                continue;
            }

            let neighbors = sampler::neighbors(&snapshot, x, y, NEIGHBOR_RADIUS);
            if let Some(avg) = sampler::average(&neighbors) {
                let out = image.get_pixel_mut(x, y);
                out[0] = avg[0];
                out[1] = avg[1];
                out[2] = avg[2];
                changed += 1;
            }
        }
    }

    log::debug!("quick text removal changed {changed} pixels");
    changed
}
