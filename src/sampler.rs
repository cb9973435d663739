//! Neighborhood sampling and color statistics.
//!
//! Every later stage reads pixels through these helpers: a square window
//! around a coordinate, clipped to the canvas, with the center excluded.

use image::{Rgb, RgbaImage};

/// Mean of the three color channels, ignoring alpha.
#[must_use]
pub fn brightness(color: Rgb<u8>) -> f32 {
    (f32::from(color[0]) + f32::from(color[1]) + f32::from(color[2])) / 3.0
}

/// Color of the pixel at `(x, y)` without its alpha channel.
#[must_use]
pub fn color_at(image: &RgbaImage, x: u32, y: u32) -> Rgb<u8> {
    let px = image.get_pixel(x, y);
    Rgb([px[0], px[1], px[2]])
}

/// Color at a signed coordinate, or `None` when it falls outside the canvas.
#[must_use]
pub fn color_at_checked(image: &RgbaImage, x: i64, y: i64) -> Option<Rgb<u8>> {
    let x = u32::try_from(x).ok()?;
    let y = u32::try_from(y).ok()?;
    image
        .get_pixel_checked(x, y)
        .map(|px| Rgb([px[0], px[1], px[2]]))
}

/// Collect the colors in the `(2 * radius + 1)`-sided window around `(x, y)`.
///
/// The center pixel and any coordinate outside the canvas are skipped, so the
/// result may be empty for tiny images.
#[must_use]
pub fn neighbors(image: &RgbaImage, x: u32, y: u32, radius: u32) -> Vec<Rgb<u8>> {
    neighbors_where(image, x, y, radius, |_| true)
}

/// Like [`neighbors`], but only keeps colors accepted by `keep`.
#[must_use]
pub fn neighbors_where<F>(image: &RgbaImage, x: u32, y: u32, radius: u32, keep: F) -> Vec<Rgb<u8>>
where
    F: Fn(Rgb<u8>) -> bool,
{
    let r = i64::from(radius);
    let side = usize::try_from(2 * r + 1).unwrap_or(0);
    let mut colors = Vec::with_capacity(side * side);

    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            if let Some(color) = color_at_checked(image, i64::from(x) + dx, i64::from(y) + dy) {
                if keep(color) {
                    colors.push(color);
                }
            }
        }
    }

    colors
}

/// Rounded per-channel mean, or `None` for an empty slice.
#[must_use]
pub fn average(colors: &[Rgb<u8>]) -> Option<Rgb<u8>> {
    if colors.is_empty() {
        return None;
    }

    let mut sum = [0u64; 3];
    for c in colors {
        for (s, v) in sum.iter_mut().zip(c.0) {
            *s += u64::from(v);
        }
    }

    let n = colors.len() as u64;
    // Channel sums are means of u8 values, so the rounded result fits in u8.
    #[allow(clippy::cast_possible_truncation)]
    let mean = |s: u64| ((s + n / 2) / n) as u8;
    Some(Rgb([mean(sum[0]), mean(sum[1]), mean(sum[2])]))
}

/// Local uniformity signal: mean of squared summed channel deviation.
///
/// For each color, `d = |r - mr| + |g - mg| + |b - mb|` against the rounded
/// mean; the result is the mean of `d²`. Returns 0 for an empty slice.
#[must_use]
pub fn variance(colors: &[Rgb<u8>]) -> f32 {
    let Some(mean) = average(colors) else {
        return 0.0;
    };

    let total: f64 = colors
        .iter()
        .map(|c| {
            let d = f64::from(channel_diff(*c, mean));
            d * d
        })
        .sum();

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let v = (total / colors.len() as f64) as f32;
    v
}

/// Sum of absolute per-channel differences between two colors.
#[must_use]
pub fn channel_diff(a: Rgb<u8>, b: Rgb<u8>) -> u32 {
    (0..3)
        .map(|ch| u32::from(a[ch].abs_diff(b[ch])))
        .sum()
}

/// Mean summed channel difference between the patches around `a` and `b`.
///
/// Only offsets where both patch pixels lie inside the canvas are compared.
/// Returns `f32::INFINITY` when no pair could be compared.
#[must_use]
pub fn patch_difference(image: &RgbaImage, a: (u32, u32), b: (u32, u32), radius: u32) -> f32 {
    let r = i64::from(radius);
    let mut total = 0u64;
    let mut count = 0u32;

    for dy in -r..=r {
        for dx in -r..=r {
            let pa = color_at_checked(image, i64::from(a.0) + dx, i64::from(a.1) + dy);
            let pb = color_at_checked(image, i64::from(b.0) + dx, i64::from(b.1) + dy);
            if let (Some(pa), Some(pb)) = (pa, pb) {
                total += u64::from(channel_diff(pa, pb));
                count += 1;
            }
        }
    }

    if count == 0 {
        return f32::INFINITY;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = total as f32 / count as f32;
    mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn uniform(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn neighbors_excludes_center_and_clips_to_canvas() {
        let img = uniform(10, 10, 50);
        assert_eq!(neighbors(&img, 5, 5, 2).len(), 24);
        // Top-left corner: only the 3x3 quadrant inside the canvas, minus center.
        assert_eq!(neighbors(&img, 0, 0, 2).len(), 8);
    }

    #[test]
    fn neighbors_of_single_pixel_image_is_empty() {
        let img = uniform(1, 1, 50);
        assert!(neighbors(&img, 0, 0, 4).is_empty());
    }

    #[test]
    fn neighbors_where_applies_filter() {
        let mut img = uniform(5, 5, 100);
        img.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        let kept = neighbors_where(&img, 2, 2, 1, |c| brightness(c) < 245.0);
        assert_eq!(kept.len(), 7);
    }

    #[test]
    fn average_rounds_per_channel() {
        let colors = [Rgb([0, 10, 255]), Rgb([1, 11, 254])];
        assert_eq!(average(&colors), Some(Rgb([1, 11, 255])));
        assert_eq!(average(&[]), None);
    }

    #[test]
    fn variance_of_uniform_colors_is_zero() {
        let colors = vec![Rgb([40, 80, 120]); 12];
        assert!(variance(&colors).abs() < f32::EPSILON);
        assert!(variance(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn variance_of_known_values() {
        // Mean is (50,50,50); each color deviates by 150 summed, so d^2 = 22500.
        let colors = [Rgb([0, 0, 0]), Rgb([100, 100, 100])];
        assert!((variance(&colors) - 22500.0).abs() < 1e-3);
    }

    #[test]
    fn brightness_is_channel_mean() {
        assert!((brightness(Rgb([30, 60, 90])) - 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn patch_difference_of_identical_patches_is_zero() {
        let img = uniform(20, 20, 90);
        assert!(patch_difference(&img, (5, 5), (12, 12), 3).abs() < f32::EPSILON);
    }

    #[test]
    fn patch_difference_only_compares_in_canvas_pairs() {
        let mut img = uniform(10, 10, 0);
        img.put_pixel(9, 9, Rgba([30, 30, 30, 255]));
        // Patch around (9,9) has 4 in-canvas pixels; only one differs by 90.
        let diff = patch_difference(&img, (8, 8), (9, 9), 1);
        assert!((diff - 22.5).abs() < 1e-4, "got {diff}");
        assert!(patch_difference(&img, (0, 0), (100, 100), 1).is_infinite());
    }
}
