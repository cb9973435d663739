//! Weighted blur over repaired pixels.

use image::RgbaImage;

use crate::error::Result;
use crate::mask::Mask;
use crate::repair::ensure_same_grid;

/// 3x3 kernel, row-major: corners 1, edges 2, center 4.
const KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
/// Sum of [`KERNEL`].
const KERNEL_TOTAL: u32 = 16;

/// Blend masked pixels into their surroundings.
///
/// Each masked pixel that is not on the image border is replaced, per RGB
/// channel, by the 4/2/1-weighted average of its 3x3 neighborhood, rounded to
/// the nearest value with ties to even. All reads come from a snapshot taken before the pass, so
/// the result does not depend on visiting order. Alpha and unmasked pixels are
/// left untouched.
///
/// # Errors
///
/// Returns [`crate::Error::BufferSizeMismatch`] if `mask` does not match `image`.
pub fn smooth(image: &mut RgbaImage, mask: &Mask) -> Result<()> {
    ensure_same_grid(image, mask)?;

    let snapshot = image.clone();
    let (w, h) = snapshot.dimensions();

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            if !mask.get(x, y) {
                continue;
            }

            let mut sum = [0u32; 3];
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, &weight) in row.iter().enumerate() {
                    // ky, kx < 3 and the pixel is interior, so this stays in range.
                    #[allow(clippy::cast_possible_truncation)]
                    let px = snapshot.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for (s, &v) in sum.iter_mut().zip(&px.0[..3]) {
                        *s += u32::from(v) * weight;
                    }
                }
            }

            let out = image.get_pixel_mut(x, y);
            for (ch, s) in sum.into_iter().enumerate() {
                out[ch] = u8::try_from(divide_round_even(s, KERNEL_TOTAL)).unwrap_or(u8::MAX);
            }
        }
    }

    Ok(())
}

/// `n / d` rounded to the nearest integer, ties to even.
fn divide_round_even(n: u32, d: u32) -> u32 {
    let (q, r) = (n / d, n % d);
    match (2 * r).cmp(&d) {
        std::cmp::Ordering::Less => q,
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => q + (q & 1),
    }
}
