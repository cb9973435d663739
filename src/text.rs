//! Text region detection.
//!
//! A looser detector than [`crate::detection`]: strokes of rendered text are
//! thin and high-contrast, so it looks for edge counts, short runs, small
//! binary shapes, uniform local color and plausible stroke widths.

use image::RgbaImage;

use crate::detection::{neighbor_contrasts, scan, Detection};
use crate::morphology;
use crate::sampler::{self, brightness, color_at, color_at_checked};

/// Pixels this close to the border are never evaluated.
const BORDER: u32 = 3;
/// Contrast that counts as a strong edge.
const EDGE_CONTRAST: f32 = 80.0;
/// Strong edges expected around a stroke pixel.
const EDGE_RANGE: std::ops::RangeInclusive<usize> = 2..=5;
/// Brightness tolerance for pixels belonging to the same line.
const LINE_TOLERANCE: f32 = 30.0;
/// Run half-length checked for line structure.
const LINE_REACH: i64 = 2;
/// Similar pixels needed along one axis of the run.
const LINE_MIN_RUN: usize = 3;
/// Brightness tolerance for the binary shape pattern and stroke width.
const SHAPE_TOLERANCE: f32 = 40.0;
/// Template cells that must agree with the local pattern.
const SHAPE_MIN_MATCHES: usize = 6;
/// Window radius for the color-uniformity rule.
const UNIFORM_RADIUS: i64 = 2;
/// Variance below which a window counts as uniform.
const UNIFORM_MAX_VARIANCE: f32 = 200.0;
/// Furthest distance walked on each side when measuring stroke width.
const STROKE_REACH: i64 = 5;
/// Plausible stroke widths in pixels.
const STROKE_RANGE: std::ops::RangeInclusive<i64> = 2..=8;

/// 3x3 templates, row-major: solid, cross, hollow, dotted.
const SHAPE_TEMPLATES: [[u8; 9]; 4] = [
    [1, 1, 1, 1, 1, 1, 1, 1, 1],
    [0, 1, 0, 1, 1, 1, 0, 1, 0],
    [1, 1, 1, 1, 0, 1, 1, 1, 1],
    [1, 0, 1, 0, 1, 0, 1, 0, 1],
];

/// A single text heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRule {
    /// Between two and five strong edges around the pixel.
    TextEdges,
    /// A short horizontal or vertical run of similar brightness.
    LineStructure,
    /// The local binary pattern resembles a character fragment.
    CharacterShape,
    /// Low color variance in the surrounding window.
    UniformColor,
    /// A horizontal stroke of plausible width.
    StrokeWidth,
}

impl TextRule {
    /// Short tag used in diagnostics.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            TextRule::TextEdges => "text-edges",
            TextRule::LineStructure => "line-structure",
            TextRule::CharacterShape => "character-shape",
            TextRule::UniformColor => "uniform-color",
            TextRule::StrokeWidth => "stroke-width",
        }
    }

    /// Evaluate this rule at `(x, y)`.
    #[must_use]
    pub fn fires(self, image: &RgbaImage, x: u32, y: u32) -> bool {
        match self {
            TextRule::TextEdges => has_text_like_edges(image, x, y),
            TextRule::LineStructure => has_line_structure(image, x, y),
            TextRule::CharacterShape => has_character_shape(image, x, y),
            TextRule::UniformColor => has_uniform_color(image, x, y),
            TextRule::StrokeWidth => has_stroke_width(image, x, y),
        }
    }
}

/// Rule table for text detection.
pub const TEXT_RULES: [TextRule; 5] = [
    TextRule::TextEdges,
    TextRule::LineStructure,
    TextRule::CharacterShape,
    TextRule::UniformColor,
    TextRule::StrokeWidth,
];

/// Detect text-like pixels and return the cleaned mask.
///
/// There is no relaxed fallback; cleanup uses [`morphology::clean_text`].
#[must_use]
pub fn detect_text(image: &RgbaImage) -> Detection {
    let raw = scan(image, BORDER, |x, y, reasons| {
        for rule in TEXT_RULES {
            if rule.fires(image, x, y) {
                reasons.push(rule.tag());
            }
        }
    });
    log::debug!("text scan marked {} pixels", raw.count);

    let mask = morphology::clean_text(&raw.mask);
    log::debug!("text cleanup: {} -> {} pixels", raw.count, mask.count());

    Detection {
        mask,
        raw_count: raw.count,
        relaxed: false,
        samples: raw.samples,
    }
}

fn brightness_at(image: &RgbaImage, x: i64, y: i64) -> Option<f32> {
    color_at_checked(image, x, y).map(brightness)
}

fn has_text_like_edges(image: &RgbaImage, x: u32, y: u32) -> bool {
    let strong = neighbor_contrasts(image, x, y)
        .iter()
        .filter(|&&c| c > EDGE_CONTRAST)
        .count();
    EDGE_RANGE.contains(&strong)
}

fn has_line_structure(image: &RgbaImage, x: u32, y: u32) -> bool {
    let center = brightness(color_at(image, x, y));
    let (x, y) = (i64::from(x), i64::from(y));
    let similar = |b: Option<f32>| b.is_some_and(|b| (b - center).abs() < LINE_TOLERANCE);

    let horizontal = (-LINE_REACH..=LINE_REACH)
        .filter(|&d| similar(brightness_at(image, x + d, y)))
        .count();
    let vertical = (-LINE_REACH..=LINE_REACH)
        .filter(|&d| similar(brightness_at(image, x, y + d)))
        .count();

    horizontal >= LINE_MIN_RUN || vertical >= LINE_MIN_RUN
}

fn has_character_shape(image: &RgbaImage, x: u32, y: u32) -> bool {
    let center = brightness(color_at(image, x, y));
    let (x, y) = (i64::from(x), i64::from(y));

    let mut pattern = [0u8; 9];
    for (i, cell) in pattern.iter_mut().enumerate() {
        // i < 9, so the offsets stay within -1..=1.
        #[allow(clippy::cast_possible_wrap)]
        let (dx, dy) = ((i % 3) as i64 - 1, (i / 3) as i64 - 1);
        *cell = match brightness_at(image, x + dx, y + dy) {
            Some(b) if (b - center).abs() < SHAPE_TOLERANCE => 1,
            _ => 0,
        };
    }

    SHAPE_TEMPLATES.iter().any(|template| {
        template
            .iter()
            .zip(pattern.iter())
            .filter(|(a, b)| a == b)
            .count()
            >= SHAPE_MIN_MATCHES
    })
}

fn has_uniform_color(image: &RgbaImage, x: u32, y: u32) -> bool {
    let (cx, cy) = (i64::from(x), i64::from(y));
    let mut colors = Vec::with_capacity(25);
    for dy in -UNIFORM_RADIUS..=UNIFORM_RADIUS {
        for dx in -UNIFORM_RADIUS..=UNIFORM_RADIUS {
            if let Some(c) = color_at_checked(image, cx + dx, cy + dy) {
                colors.push(c);
            }
        }
    }

    !colors.is_empty() && sampler::variance(&colors) < UNIFORM_MAX_VARIANCE
}

fn has_stroke_width(image: &RgbaImage, x: u32, y: u32) -> bool {
    let center = brightness(color_at(image, x, y));
    let (x, y) = (i64::from(x), i64::from(y));

    let run = |step: i64| {
        let mut width = 0;
        for d in 1..=STROKE_REACH {
            match brightness_at(image, x + step * d, y) {
                Some(b) if (b - center).abs() < SHAPE_TOLERANCE => width += 1,
                Some(_) => break,
                None => {}
            }
        }
        width
    };

    STROKE_RANGE.contains(&(run(-1) + run(1) + 1))
}
