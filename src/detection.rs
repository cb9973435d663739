//! Watermark region detection.
//!
//! Each interior pixel is checked against an ordered table of independent
//! rules and marked when any of them fires:
//! 1. **Semi-transparent**: alpha strictly inside the watermark band
//! 2. **Extreme brightness**: nearly black or nearly white
//! 3. **Color outlier**: differs sharply from an otherwise uniform neighborhood
//! 4. **Repeating pattern**: the surrounding patch repeats at 8px offsets
//! 5. **Abnormal gradient**: one neighbor edge dominates the others
//! 6. **Text feature**: several high-contrast neighbors
//!
//! When the full table marks fewer than [`MIN_DETECTED`] pixels, the scan is
//! repeated with a relaxed table before morphological cleanup.

use image::RgbaImage;

use crate::mask::Mask;
use crate::morphology;
use crate::sampler::{self, brightness, channel_diff, color_at};

/// Fewer marked pixels than this triggers the relaxed rescan.
pub const MIN_DETECTED: usize = 10;
/// Pixels this close to the border are never evaluated.
const BORDER: u32 = 2;
/// Neighborhood radius for the color-outlier rule.
const NEIGHBOR_RADIUS: u32 = 2;
/// Offset between compared tiles in the repeating-pattern rule.
const PATTERN_STEP: u32 = 8;
/// Patch similarity below this counts as a repeat.
const PATTERN_SIMILARITY: f32 = 30.0;
/// Repeats needed along one axis (out of 3 offsets).
const PATTERN_MIN_REPEATS: usize = 2;
/// Flat neighborhoods trivially "repeat"; require at least this much texture.
const PATTERN_MIN_VARIANCE: f32 = 1.0;
/// Minimum absolute brightness jump for the gradient rule.
const GRADIENT_MIN: f32 = 50.0;
/// How many times the mean gradient the maximum must exceed.
const GRADIENT_RATIO: f32 = 3.0;
/// Contrast counted by the text-feature rule.
const TEXT_CONTRAST: f32 = 100.0;
/// High-contrast neighbors needed by the text-feature rule.
const TEXT_MIN_EDGES: usize = 3;
/// Number of marked pixels whose reasons are kept and logged.
pub(crate) const SAMPLE_LIMIT: usize = 5;

/// The 8-connected neighbor offsets.
pub(crate) const EIGHT_NEIGHBORS: [(i64, i64); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
];

/// A single detection heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Alpha strictly between the lower and upper band limits.
    SemiTransparent,
    /// Brightness outside the normal range.
    ExtremeBrightness,
    /// Large color difference against a uniform neighborhood.
    ColorOutlier,
    /// Tiled content at fixed offsets.
    RepeatingPattern,
    /// Maximum neighbor gradient far above the mean gradient.
    AbnormalGradient,
    /// Several strong brightness edges around the pixel.
    TextFeature,
}

impl Rule {
    /// Short tag used in diagnostics.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Rule::SemiTransparent => "semi-transparent",
            Rule::ExtremeBrightness => "extreme-brightness",
            Rule::ColorOutlier => "color-outlier",
            Rule::RepeatingPattern => "repeating-pattern",
            Rule::AbnormalGradient => "abnormal-gradient",
            Rule::TextFeature => "text-feature",
        }
    }
}

/// Full rule table for the primary scan.
pub const STANDARD_RULES: [Rule; 6] = [
    Rule::SemiTransparent,
    Rule::ExtremeBrightness,
    Rule::ColorOutlier,
    Rule::RepeatingPattern,
    Rule::AbnormalGradient,
    Rule::TextFeature,
];

/// Reduced rule table for the fallback scan.
pub const RELAXED_RULES: [Rule; 3] = [
    Rule::SemiTransparent,
    Rule::ExtremeBrightness,
    Rule::ColorOutlier,
];

/// Numeric limits used by the rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Alpha must be strictly greater than this to count as semi-transparent.
    pub alpha_low: u8,
    /// Alpha must be strictly less than this to count as semi-transparent.
    pub alpha_high: u8,
    /// Brightness strictly below this is extreme.
    pub dark: f32,
    /// Brightness strictly above this is extreme.
    pub bright: f32,
    /// Summed channel difference against the neighbor average that flags an outlier.
    pub color_diff: u32,
    /// Neighbor variance must stay below this for an outlier; `None` skips the check.
    pub outlier_variance: Option<f32>,
}

impl Thresholds {
    /// Limits for the primary scan.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            alpha_low: 10,
            alpha_high: 240,
            dark: 5.0,
            bright: 250.0,
            color_diff: 120,
            outlier_variance: Some(50.0),
        }
    }

    /// Looser limits for the fallback scan.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            alpha_low: 5,
            alpha_high: 250,
            dark: 10.0,
            bright: 245.0,
            color_diff: 80,
            outlier_variance: None,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::standard()
    }
}

/// A marked pixel together with the rules that fired for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// X coordinate.
    pub x: u32,
    /// Y coordinate.
    pub y: u32,
    /// Tags of every rule that fired, in table order.
    pub reasons: Vec<&'static str>,
}

/// Result of a detection scan.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Cleaned mask of pixels to repair.
    pub mask: Mask,
    /// Pixels marked by the scan before morphological cleanup.
    pub raw_count: usize,
    /// Whether the relaxed fallback scan produced this result.
    pub relaxed: bool,
    /// The first few marked pixels with their reasons.
    pub samples: Vec<Sample>,
}

impl Detection {
    /// Number of pixels marked for repair after cleanup.
    #[must_use]
    pub fn count(&self) -> usize {
        self.mask.count()
    }

    /// Whether nothing was marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.mask.any()
    }
}

/// Raw scan output before cleanup.
pub(crate) struct Scan {
    pub mask: Mask,
    pub count: usize,
    pub samples: Vec<Sample>,
}

/// Visit pixels at least `border` away from every edge and mark those for
/// which `fired` reports at least one reason.
pub(crate) fn scan<F>(image: &RgbaImage, border: u32, mut fired: F) -> Scan
where
    F: FnMut(u32, u32, &mut Vec<&'static str>),
{
    let (w, h) = image.dimensions();
    let mut mask = Mask::new(w, h);
    let mut count = 0;
    let mut samples = Vec::new();
    let mut reasons = Vec::new();

    for y in border..h.saturating_sub(border) {
        for x in border..w.saturating_sub(border) {
            reasons.clear();
            fired(x, y, &mut reasons);
            if reasons.is_empty() {
                continue;
            }

            mask.set(x, y, true);
            count += 1;
            if samples.len() < SAMPLE_LIMIT {
                log::debug!("marked ({x}, {y}): {}", reasons.join(", "));
                samples.push(Sample {
                    x,
                    y,
                    reasons: reasons.clone(),
                });
            }
        }
    }

    Scan {
        mask,
        count,
        samples,
    }
}

/// Evaluate `rule` at `(x, y)`.
#[must_use]
pub fn evaluate(rule: Rule, image: &RgbaImage, x: u32, y: u32, limits: &Thresholds) -> bool {
    match rule {
        Rule::SemiTransparent => {
            let alpha = image.get_pixel(x, y)[3];
            alpha > limits.alpha_low && alpha < limits.alpha_high
        }
        Rule::ExtremeBrightness => {
            let b = brightness(color_at(image, x, y));
            b < limits.dark || b > limits.bright
        }
        Rule::ColorOutlier => is_color_outlier(image, x, y, limits),
        Rule::RepeatingPattern => is_repeating_pattern(image, x, y),
        Rule::AbnormalGradient => has_abnormal_gradient(image, x, y),
        Rule::TextFeature => has_text_features(image, x, y),
    }
}

/// Detect watermark-like pixels and return the cleaned mask.
///
/// Runs the full rule table first; if it marks fewer than [`MIN_DETECTED`]
/// pixels, rescans with [`RELAXED_RULES`] and [`Thresholds::relaxed`].
#[must_use]
pub fn detect(image: &RgbaImage) -> Detection {
    let standard = Thresholds::standard();
    let mut raw = scan_rules(image, &STANDARD_RULES, &standard);
    let mut relaxed = false;
    log::debug!("watermark scan marked {} pixels", raw.count);

    if raw.count < MIN_DETECTED {
        log::debug!("fewer than {MIN_DETECTED} pixels marked, retrying with relaxed thresholds");
        raw = scan_rules(image, &RELAXED_RULES, &Thresholds::relaxed());
        relaxed = true;
        log::debug!("relaxed scan marked {} pixels", raw.count);
    }

    let mask = morphology::clean(&raw.mask);
    log::debug!("cleanup: {} -> {} pixels", raw.count, mask.count());

    Detection {
        mask,
        raw_count: raw.count,
        relaxed,
        samples: raw.samples,
    }
}

fn scan_rules(image: &RgbaImage, rules: &[Rule], limits: &Thresholds) -> Scan {
    scan(image, BORDER, |x, y, reasons| {
        for &rule in rules {
            if evaluate(rule, image, x, y, limits) {
                reasons.push(rule.tag());
            }
        }
    })
}

fn is_color_outlier(image: &RgbaImage, x: u32, y: u32, limits: &Thresholds) -> bool {
    let neighbors = sampler::neighbors(image, x, y, NEIGHBOR_RADIUS);
    let Some(avg) = sampler::average(&neighbors) else {
        return false;
    };

    if channel_diff(color_at(image, x, y), avg) <= limits.color_diff {
        return false;
    }

    match limits.outlier_variance {
        Some(max) => sampler::variance(&neighbors) < max,
        None => true,
    }
}

fn is_repeating_pattern(image: &RgbaImage, x: u32, y: u32) -> bool {
    let (w, h) = image.dimensions();
    if x < PATTERN_STEP
        || y < PATTERN_STEP
        || x >= w.saturating_sub(PATTERN_STEP)
        || y >= h.saturating_sub(PATTERN_STEP)
    {
        return false;
    }

    let local = sampler::neighbors(image, x, y, NEIGHBOR_RADIUS);
    if sampler::variance(&local) < PATTERN_MIN_VARIANCE {
        return false;
    }

    let radius = PATTERN_STEP / 2;
    let repeats = |offset: &dyn Fn(u32) -> (u32, u32)| {
        (1..=3)
            .filter(|&k| {
                sampler::patch_difference(image, (x, y), offset(k), radius) < PATTERN_SIMILARITY
            })
            .count()
    };

    repeats(&|k| (x + PATTERN_STEP * k, y)) >= PATTERN_MIN_REPEATS
        || repeats(&|k| (x, y + PATTERN_STEP * k)) >= PATTERN_MIN_REPEATS
}

/// Brightness differences between `(x, y)` and each in-canvas 8-neighbor.
pub(crate) fn neighbor_contrasts(image: &RgbaImage, x: u32, y: u32) -> Vec<f32> {
    let center = brightness(color_at(image, x, y));
    EIGHT_NEIGHBORS
        .iter()
        .filter_map(|&(dx, dy)| {
            sampler::color_at_checked(image, i64::from(x) + dx, i64::from(y) + dy)
        })
        .map(|c| (center - brightness(c)).abs())
        .collect()
}

fn has_abnormal_gradient(image: &RgbaImage, x: u32, y: u32) -> bool {
    let gradients = neighbor_contrasts(image, x, y);
    if gradients.is_empty() {
        return false;
    }

    let max = gradients.iter().copied().fold(0.0_f32, f32::max);
    #[allow(clippy::cast_precision_loss)]
    let mean = gradients.iter().sum::<f32>() / gradients.len() as f32;
    max > mean * GRADIENT_RATIO && max > GRADIENT_MIN
}

fn has_text_features(image: &RgbaImage, x: u32, y: u32) -> bool {
    neighbor_contrasts(image, x, y)
        .iter()
        .filter(|&&c| c > TEXT_CONTRAST)
        .count()
        >= TEXT_MIN_EDGES
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gray(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn uniform_image_yields_empty_mask_after_fallback() {
        let img = gray(40, 40, 128);
        let detection = detect(&img);
        assert!(detection.is_empty());
        assert!(detection.relaxed, "empty primary scan must trigger fallback");
        assert_eq!(detection.raw_count, 0);
    }

    #[test]
    fn semi_transparent_band_excludes_fully_transparent() {
        let mut img = gray(10, 10, 128);
        let limits = Thresholds::standard();
        img.put_pixel(4, 4, Rgba([128, 128, 128, 0]));
        assert!(!evaluate(Rule::SemiTransparent, &img, 4, 4, &limits));
        img.put_pixel(4, 4, Rgba([128, 128, 128, 120]));
        assert!(evaluate(Rule::SemiTransparent, &img, 4, 4, &limits));
        img.put_pixel(4, 4, Rgba([128, 128, 128, 240]));
        assert!(!evaluate(Rule::SemiTransparent, &img, 4, 4, &limits));
        assert!(evaluate(
            Rule::SemiTransparent,
            &img,
            4,
            4,
            &Thresholds::relaxed()
        ));
    }

    #[test]
    fn extreme_brightness_bounds() {
        let mut img = gray(10, 10, 128);
        let limits = Thresholds::standard();
        img.put_pixel(3, 3, Rgba([255, 255, 255, 255]));
        img.put_pixel(4, 4, Rgba([4, 4, 4, 255]));
        img.put_pixel(5, 5, Rgba([250, 250, 250, 255]));
        assert!(evaluate(Rule::ExtremeBrightness, &img, 3, 3, &limits));
        assert!(evaluate(Rule::ExtremeBrightness, &img, 4, 4, &limits));
        assert!(!evaluate(Rule::ExtremeBrightness, &img, 5, 5, &limits));
        assert!(evaluate(
            Rule::ExtremeBrightness,
            &img,
            5,
            5,
            &Thresholds::relaxed()
        ));
    }

    #[test]
    fn color_outlier_requires_uniform_surroundings() {
        let mut img = gray(12, 12, 100);
        img.put_pixel(6, 6, Rgba([200, 200, 100, 255]));
        let limits = Thresholds::standard();
        assert!(evaluate(Rule::ColorOutlier, &img, 6, 6, &limits));

        // A busy neighborhood suppresses the standard rule but not the relaxed one.
        img.put_pixel(5, 5, Rgba([0, 0, 0, 255]));
        img.put_pixel(7, 7, Rgba([255, 255, 255, 255]));
        assert!(!evaluate(Rule::ColorOutlier, &img, 6, 6, &limits));
        assert!(evaluate(
            Rule::ColorOutlier,
            &img,
            6,
            6,
            &Thresholds::relaxed()
        ));
    }

    #[test]
    fn text_feature_and_gradient_fire_on_isolated_dark_dot() {
        let mut img = gray(10, 10, 200);
        img.put_pixel(5, 5, Rgba([20, 20, 20, 255]));
        let limits = Thresholds::standard();
        assert!(evaluate(Rule::TextFeature, &img, 5, 5, &limits));
        // Every gradient is equal, so max is not 3x the mean.
        assert!(!evaluate(Rule::AbnormalGradient, &img, 5, 5, &limits));
        // A neighbor of the dot sees one dominant edge.
        assert!(evaluate(Rule::AbnormalGradient, &img, 4, 5, &limits));
    }

    #[test]
    fn repeating_pattern_detects_tiled_texture() {
        // Vertical stripes with an 8px period repeat at every 8px offset.
        let img = RgbaImage::from_fn(48, 48, |x, _| {
            if x % 8 < 4 {
                Rgba([60, 60, 60, 255])
            } else {
                Rgba([160, 160, 160, 255])
            }
        });
        let limits = Thresholds::standard();
        assert!(evaluate(Rule::RepeatingPattern, &img, 12, 12, &limits));
        // Too close to the border.
        assert!(!evaluate(Rule::RepeatingPattern, &img, 4, 12, &limits));
        // Flat regions never count as a pattern.
        assert!(!evaluate(
            Rule::RepeatingPattern,
            &gray(48, 48, 90),
            20,
            20,
            &limits
        ));
    }

    #[test]
    fn detect_marks_bright_blob_and_keeps_samples() {
        let mut img = gray(30, 30, 120);
        for y in 10..16 {
            for x in 10..16 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let detection = detect(&img);
        assert!(!detection.relaxed);
        assert!(detection.raw_count >= 36);
        for y in 10..16 {
            for x in 10..16 {
                assert!(detection.mask.get(x, y), "({x},{y}) not marked");
            }
        }
        assert_eq!(detection.samples.len(), SAMPLE_LIMIT);
        assert!(!detection.samples[0].reasons.is_empty());
        // Far corner stays clean.
        assert!(!detection.mask.get(25, 25));
    }

    #[test]
    fn detect_on_tiny_image_does_not_panic() {
        let img = gray(3, 3, 255);
        assert!(detect(&img).is_empty());
        let img = gray(1, 1, 0);
        assert!(detect(&img).is_empty());
    }
}
