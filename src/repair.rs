//! Content-aware repair of masked pixels.
//!
//! Every masked pixel is recolored from the untouched original snapshot,
//! trying progressively cruder strategies:
//! 1. **Neighbor average** (radius 2), if it is not itself extreme
//! 2. **Patch match** within a 20px window, if a good match exists
//! 3. **Wide average** (radius 4) of non-extreme neighbors
//! 4. **Neutral gray**
//!
//! Repaired pixels become fully opaque.

use image::{Rgb, Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::mask::Mask;
use crate::progress::{self, Progress, RowCadence, Silent};
use crate::sampler::{self, brightness};

/// Radius of the first-choice neighbor average.
const NEIGHBOR_RADIUS: u32 = 2;
/// Neighbor averages at or beyond these brightness limits are rejected.
const AVERAGE_DARK: f32 = 5.0;
const AVERAGE_BRIGHT: f32 = 250.0;
/// Half-size of the patch search window.
const SEARCH_RADIUS: u32 = 20;
/// Stride between patch candidates on both axes.
const SEARCH_STEP: usize = 2;
/// Radius of compared patches.
const PATCH_RADIUS: u32 = 3;
/// Only patches scoring below this are used.
const PATCH_MAX_SCORE: f32 = 100.0;
/// Radius of the wide fallback average.
const WIDE_RADIUS: u32 = 4;
/// Wide-average samples must be strictly inside these brightness limits.
const WIDE_DARK: f32 = 10.0;
const WIDE_BRIGHT: f32 = 245.0;
/// Color used when nothing else is available.
pub const NEUTRAL_GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Which strategy produced a repaired color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Average of the radius-2 neighborhood.
    NeighborAverage,
    /// Center of the best-matching patch nearby.
    PatchMatch,
    /// Average of non-extreme pixels in the radius-4 neighborhood.
    WideAverage,
    /// Neutral gray.
    NeutralGray,
}

/// Per-strategy counts for one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Pixels repaired from the neighbor average.
    pub neighbor_average: usize,
    /// Pixels repaired from a matching patch.
    pub patch_match: usize,
    /// Pixels repaired from the wide average.
    pub wide_average: usize,
    /// Pixels set to neutral gray.
    pub neutral_gray: usize,
    /// Pixels whose patch search had no candidate to evaluate and went
    /// straight to the wide average or gray. Already counted in those fields.
    pub recovered: usize,
}

impl RepairStats {
    /// Total number of repaired pixels.
    #[must_use]
    pub fn total(&self) -> usize {
        self.neighbor_average + self.patch_match + self.wide_average + self.neutral_gray
    }

    fn record(&mut self, strategy: Strategy) {
        match strategy {
            Strategy::NeighborAverage => self.neighbor_average += 1,
            Strategy::PatchMatch => self.patch_match += 1,
            Strategy::WideAverage => self.wide_average += 1,
            Strategy::NeutralGray => self.neutral_gray += 1,
        }
    }
}

/// A localized failure while evaluating one pixel. Never leaves this module.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
enum PixelRepairFailure {
    /// The search window around the pixel holds no full patch outside the
    /// skip zone, which happens on small images and near the canvas edge.
    #[error("no patch candidate within {radius}px of ({x}, {y})")]
    NoPatchCandidate { x: u32, y: u32, radius: u32 },
}

/// Best patch found by the search, as source coordinates and score.
#[derive(Debug, Clone, Copy)]
struct PatchMatch {
    source: (u32, u32),
    score: f32,
}

/// Repair every masked pixel of `target`, reading only from `original`.
///
/// # Errors
///
/// Returns [`Error::BufferSizeMismatch`] if the mask or target do not have the
/// same dimensions as `original`. Per-pixel problems never produce an error.
pub fn repair(original: &RgbaImage, mask: &Mask, target: &mut RgbaImage) -> Result<RepairStats> {
    repair_with_progress(original, mask, target, &mut Silent)
}

/// Like [`repair`], reporting progress every tenth of the image height.
///
/// # Errors
///
/// Same as [`repair`].
pub fn repair_with_progress(
    original: &RgbaImage,
    mask: &Mask,
    target: &mut RgbaImage,
    progress: &mut dyn Progress,
) -> Result<RepairStats> {
    ensure_same_grid(original, mask)?;
    ensure_same_grid(target, mask)?;

    let (w, h) = original.dimensions();
    let cadence = RowCadence::new(h);
    let mut stats = RepairStats::default();

    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }

            let (color, strategy) = match repair_pixel(original, x, y) {
                Ok(found) => found,
                Err(e) => {
                    stats.recovered += 1;
                    recover(original, x, y, &e)
                }
            };

            stats.record(strategy);
            target.put_pixel(x, y, Rgba([color[0], color[1], color[2], 255]));
        }

        if let Some((bar, done)) = cadence.at(y, progress::REPAIR_START, progress::REPAIR_SPAN) {
            progress.report(bar, &format!("repairing: {done}%"));
        }
    }

    log::debug!(
        "repaired {} pixels (average={}, patch={}, wide={}, gray={}, recovered={})",
        stats.total(),
        stats.neighbor_average,
        stats.patch_match,
        stats.wide_average,
        stats.neutral_gray,
        stats.recovered,
    );

    Ok(stats)
}

pub(crate) fn ensure_same_grid(image: &RgbaImage, mask: &Mask) -> Result<()> {
    if mask.matches(image) {
        return Ok(());
    }
    Err(Error::BufferSizeMismatch {
        expected: mask.len(),
        actual: image.width() as usize * image.height() as usize,
    })
}

fn repair_pixel(
    original: &RgbaImage,
    x: u32,
    y: u32,
) -> std::result::Result<(Rgb<u8>, Strategy), PixelRepairFailure> {
    let neighbors = sampler::neighbors(original, x, y, NEIGHBOR_RADIUS);
    if let Some(avg) = sampler::average(&neighbors) {
        let b = brightness(avg);
        if b > AVERAGE_DARK && b < AVERAGE_BRIGHT {
            return Ok((avg, Strategy::NeighborAverage));
        }
    }

    let found = best_patch(original, x, y).ok_or(PixelRepairFailure::NoPatchCandidate {
        x,
        y,
        radius: SEARCH_RADIUS,
    })?;
    if found.score < PATCH_MAX_SCORE {
        let (sx, sy) = found.source;
        return Ok((sampler::color_at(original, sx, sy), Strategy::PatchMatch));
    }

    Ok(fallback(original, x, y))
}

/// Finish a pixel whose evaluation failed, using the fallback strategies only.
fn recover(
    original: &RgbaImage,
    x: u32,
    y: u32,
    failure: &PixelRepairFailure,
) -> (Rgb<u8>, Strategy) {
    log::debug!("repairing ({x}, {y}) with fallback: {failure}");
    fallback(original, x, y)
}

/// Wide average of non-extreme neighbors, or neutral gray.
fn fallback(original: &RgbaImage, x: u32, y: u32) -> (Rgb<u8>, Strategy) {
    let samples = sampler::neighbors_where(original, x, y, WIDE_RADIUS, |c| {
        let b = brightness(c);
        b > WIDE_DARK && b < WIDE_BRIGHT
    });

    match sampler::average(&samples) {
        Some(avg) => (avg, Strategy::WideAverage),
        None => (NEUTRAL_GRAY, Strategy::NeutralGray),
    }
}

/// Scan the search window for the patch most similar to the one around `(x, y)`.
///
/// Candidates lie on a stride-2 grid, keep a full patch inside the canvas and
/// are never within `2 * PATCH_RADIUS` of the target on both axes.
fn best_patch(original: &RgbaImage, x: u32, y: u32) -> Option<PatchMatch> {
    let (w, h) = original.dimensions();
    let y_range = y.saturating_sub(SEARCH_RADIUS).max(PATCH_RADIUS)
        ..(y + SEARCH_RADIUS).min(h.saturating_sub(PATCH_RADIUS));
    let x_range = x.saturating_sub(SEARCH_RADIUS).max(PATCH_RADIUS)
        ..(x + SEARCH_RADIUS).min(w.saturating_sub(PATCH_RADIUS));

    let mut best: Option<PatchMatch> = None;
    for sy in y_range.step_by(SEARCH_STEP) {
        for sx in x_range.clone().step_by(SEARCH_STEP) {
            if sx.abs_diff(x) < 2 * PATCH_RADIUS && sy.abs_diff(y) < 2 * PATCH_RADIUS {
                continue;
            }

            let score = sampler::patch_difference(original, (x, y), (sx, sy), PATCH_RADIUS);
            if best.is_none_or(|b| score < b.score) {
                best = Some(PatchMatch {
                    source: (sx, sy),
                    score,
                });
            }
        }
    }

    best
}
