//! Stage orchestration and file processing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::chroma::{self, Key};
use crate::detection::{self, Detection};
use crate::error::{Error, Result};
use crate::progress::{self, LogProgress, Progress};
use crate::quick;
use crate::repair::{self, RepairStats};
use crate::smoothing;
use crate::text;

/// Which detector feeds the repair stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Watermark rules with relaxed fallback and 2-neighbor cleanup.
    Watermark,
    /// Text rules with the looser text cleanup.
    Text,
}

/// What a run does to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Detect, clean, repair and smooth.
    Repair(DetectionMode),
    /// Single-pass watermark filter.
    QuickWatermark,
    /// Single-pass text filter.
    QuickText,
    /// Make a keyed background transparent.
    Chroma {
        /// Background color.
        key: Key,
        /// Tolerance, see [`Key::matches`].
        threshold: u8,
    },
}

impl Method {
    /// Short human-readable name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Method::Repair(DetectionMode::Watermark) => "watermark removal",
            Method::Repair(DetectionMode::Text) => "text removal",
            Method::QuickWatermark => "quick watermark removal",
            Method::QuickText => "quick text removal",
            Method::Chroma { .. } => "background removal",
        }
    }
}

/// Options controlling processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// What to do with each image.
    pub method: Method,
    /// Only detect, and write a highlighted preview instead of repairing.
    pub preview: bool,
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            method: Method::Repair(DetectionMode::Watermark),
            preview: false,
            verbose: false,
            quiet: false,
        }
    }
}

/// What happened to an image during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Masked pixels were repaired and smoothed.
    Repaired {
        /// Pixels in the cleaned mask.
        detected: usize,
        /// Whether the relaxed fallback scan produced the mask.
        relaxed: bool,
        /// Which strategies served the repaired pixels.
        stats: RepairStats,
    },
    /// Detection found nothing; the image is unchanged.
    NothingDetected,
    /// The image was replaced by a highlighted preview of the mask.
    Previewed {
        /// Pixels in the cleaned mask.
        detected: usize,
    },
    /// A single-pass filter ran.
    Filtered {
        /// Pixels the filter changed.
        changed: usize,
    },
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was skipped (nothing detected).
    pub skipped: bool,
    /// Pixels detected or changed.
    pub affected: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            affected: 0,
            message: String::new(),
        }
    }
}

/// Validate raw RGBA bytes and wrap them as an image.
///
/// # Errors
///
/// Returns [`Error::InvalidDimensions`] if either dimension is zero and
/// [`Error::BufferSizeMismatch`] if `bytes.len() != width * height * 4`.
pub fn buffer_from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize * 4;
    let actual = bytes.len();
    RgbaImage::from_raw(width, height, bytes).ok_or(Error::BufferSizeMismatch { expected, actual })
}

/// Runs the detection and repair stages, one image at a time.
///
/// A run must hold the [`Lease`] returned by [`Pipeline::begin`]; while it is
/// alive, further calls to `begin` fail with [`Error::Busy`]. Share one
/// pipeline between callers that must not overlap, and create one per worker
/// for parallel batches.
#[derive(Debug)]
pub struct Pipeline {
    options: ProcessOptions,
    busy: AtomicBool,
}

impl Pipeline {
    /// Create an idle pipeline.
    #[must_use]
    pub fn new(options: ProcessOptions) -> Self {
        Self {
            options,
            busy: AtomicBool::new(false),
        }
    }

    /// Options this pipeline was created with.
    #[must_use]
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Whether a lease is currently held.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Acquire the processing lease.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another lease is still alive.
    pub fn begin(&self) -> Result<Lease<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(Lease { pipeline: self })
    }

    /// Run detection alone, for previewing what a repair would touch.
    ///
    /// Uses the text detector for [`Method::Repair`] with
    /// [`DetectionMode::Text`] and [`Method::QuickText`], and the watermark
    /// detector otherwise. Does not need a lease.
    #[must_use]
    pub fn detect(&self, image: &RgbaImage) -> Detection {
        match self.options.method {
            Method::Repair(DetectionMode::Text) | Method::QuickText => text::detect_text(image),
            _ => detection::detect(image),
        }
    }

    /// Acquire the lease, run once and release it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a run is in flight, or any error from
    /// [`Lease::run`].
    pub fn process(&self, image: &mut RgbaImage, progress: &mut dyn Progress) -> Result<Outcome> {
        let mut lease = self.begin()?;
        let outcome = lease.run(image, progress)?;
        lease.finish();
        Ok(outcome)
    }

    /// Process a single image file: load, run, save.
    ///
    /// Returns a [`ProcessResult`] indicating success, skip, or failure.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        let mut img = match image::open(input) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let outcome = match self.process(&mut img, &mut LogProgress) {
            Ok(outcome) => outcome,
            Err(e) => {
                result.message = format!("Failed to process: {e}");
                return result;
            }
        };

        match outcome {
            Outcome::NothingDetected => {
                result.skipped = true;
                result.success = true;
                result.message = "Nothing detected".to_string();
                return result;
            }
            Outcome::Repaired {
                detected,
                relaxed,
                stats,
            } => {
                result.affected = detected;
                result.message = format!(
                    "Repaired {} pixels{} (average={}, patch={}, wide={}, gray={})",
                    stats.total(),
                    if relaxed { " with relaxed detection" } else { "" },
                    stats.neighbor_average,
                    stats.patch_match,
                    stats.wide_average,
                    stats.neutral_gray,
                );
            }
            Outcome::Previewed { detected } => {
                result.affected = detected;
                result.message = format!("Preview: {detected} pixels marked");
            }
            Outcome::Filtered { changed } => {
                result.affected = changed;
                result.message = format!("{}: {changed} pixels changed", self.options.method.label());
            }
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&img, output) {
            Ok(()) => result.success = true,
            Err(e) => result.message = format!("Failed to save: {e}"),
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Each image gets its own pipeline with these options, so files are
    /// independent; with the `cli` feature they run in parallel (via rayon).
    /// Output names follow [`default_output_path`] inside `output_dir`.
    #[must_use]
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                let mut failed = ProcessResult::new(input_dir);
                failed.message = format!("Failed to read directory: {e}");
                return vec![failed];
            }
        };

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                let mut failed = ProcessResult::new(output_dir);
                failed.message = format!("Failed to create output directory: {e}");
                return vec![failed];
            }
        }

        let run = |input: &PathBuf| {
            let name = default_output_path(input, &self.options);
            let output = output_dir.join(name.file_name().unwrap_or(input.as_os_str()));
            Pipeline::new(self.options.clone()).process_file(input, &output)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(run).collect()
        }
    }
}

/// Exclusive right to run the pipeline. Released on [`Lease::finish`],
/// [`Lease::cancel`] or drop.
#[derive(Debug)]
pub struct Lease<'a> {
    pipeline: &'a Pipeline,
}

impl Lease<'_> {
    /// Run the configured method on `image`, mutating it in place.
    ///
    /// Detection never fails; once the input is valid the run always
    /// completes, degrading repair quality rather than aborting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] for an image with a zero dimension
    /// and [`Error::InvalidArgument`] when preview is requested for a method
    /// that does not detect.
    pub fn run(&mut self, image: &mut RgbaImage, progress: &mut dyn Progress) -> Result<Outcome> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        let options = &self.pipeline.options;
        if options.preview && !matches!(options.method, Method::Repair(_)) {
            return Err(Error::InvalidArgument(format!(
                "preview is not available for {}",
                options.method.label()
            )));
        }

        log::info!("{} on {width}x{height} image", options.method.label());

        let outcome = match options.method {
            Method::Repair(_) => self.repair(image, progress)?,
            Method::QuickWatermark => Outcome::Filtered {
                changed: quick::remove_watermark(image),
            },
            Method::QuickText => Outcome::Filtered {
                changed: quick::remove_text(image),
            },
            Method::Chroma { key, threshold } => Outcome::Filtered {
                changed: chroma::remove_background(image, key, threshold),
            },
        };

        progress.report(progress::DONE, "done");
        Ok(outcome)
    }

    /// Release the lease after a completed run.
    pub fn finish(self) {}

    /// Release the lease without running, or abandon a run's result.
    pub fn cancel(self) {
        log::debug!("pipeline run cancelled");
    }

    fn repair(&self, image: &mut RgbaImage, progress: &mut dyn Progress) -> Result<Outcome> {
        progress.report(0, "analyzing image");
        let detection = self.pipeline.detect(image);
        let detected = detection.count();
        log::info!(
            "detected {detected} of {} pixels",
            image.width() as usize * image.height() as usize
        );
        progress.report(progress::ANALYZED, "detection complete");

        if detection.is_empty() {
            log::info!("nothing detected, leaving image unchanged");
            return Ok(Outcome::NothingDetected);
        }

        if self.pipeline.options.preview {
            *image = detection.mask.overlay(image);
            return Ok(Outcome::Previewed { detected });
        }

        let original = image.clone();
        progress.report(progress::REPAIR_START, "repairing");
        let stats = repair::repair_with_progress(&original, &detection.mask, image, progress)?;

        progress.report(progress::SMOOTHING, "smoothing");
        smoothing::smooth(image, &detection.mask)?;

        Ok(Outcome::Repaired {
            detected,
            relaxed: detection.relaxed,
            stats,
        })
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.pipeline.busy.store(false, Ordering::Release);
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGBA image, choosing the encoder from the file extension.
///
/// JPEG has no alpha channel, so it is written as RGB at quality 100.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).into_rgb8();
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// `"photo.jpg"` becomes `"photo_cleaned.jpg"`, or `"photo_preview.jpg"` in
/// preview mode. Background removal needs alpha, so it always writes PNG:
/// `"photo_nobg.png"`.
#[must_use]
pub fn default_output_path(input: &Path, opts: &ProcessOptions) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));

    let name = match opts.method {
        Method::Chroma { .. } => format!("{stem}_nobg.png"),
        _ if opts.preview => format!("{stem}_preview.{ext}"),
        _ => format!("{stem}_cleaned.{ext}"),
    };
    parent.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;
    use image::Rgba;

    fn watermark_pipeline() -> Pipeline {
        Pipeline::new(ProcessOptions::default())
    }

    #[test]
    fn second_lease_is_rejected_until_release() {
        let pipeline = watermark_pipeline();
        let lease = pipeline.begin().unwrap();
        assert!(pipeline.is_busy());
        assert!(matches!(pipeline.begin(), Err(Error::Busy)));

        lease.finish();
        assert!(!pipeline.is_busy());

        let lease = pipeline.begin().unwrap();
        lease.cancel();
        assert!(!pipeline.is_busy());

        {
            let _lease = pipeline.begin().unwrap();
        }
        assert!(pipeline.begin().is_ok());
    }

    #[test]
    fn process_rejects_while_leased() {
        let pipeline = watermark_pipeline();
        let _held = pipeline.begin().unwrap();
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([128, 128, 128, 255]));
        assert!(matches!(
            pipeline.process(&mut img, &mut Silent),
            Err(Error::Busy)
        ));
    }

    #[test]
    fn uniform_image_is_left_unchanged() {
        let pipeline = watermark_pipeline();
        let original = RgbaImage::from_pixel(32, 32, Rgba([90, 120, 150, 255]));
        let mut img = original.clone();
        let outcome = pipeline.process(&mut img, &mut Silent).unwrap();
        assert_eq!(outcome, Outcome::NothingDetected);
        assert_eq!(img, original);
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn bright_blob_is_repaired_and_made_opaque() {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([100, 100, 100, 255]));
        for y in 15..20 {
            for x in 15..20 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 120]));
            }
        }
        let outcome = watermark_pipeline().process(&mut img, &mut Silent).unwrap();
        let Outcome::Repaired { detected, stats, .. } = outcome else {
            panic!("expected a repair, got {outcome:?}");
        };
        assert!(detected >= 25);
        assert_eq!(stats.total(), detected);
        for y in 15..20 {
            for x in 15..20 {
                let px = img.get_pixel(x, y);
                assert_eq!(px[3], 255);
                assert!(px[0] < 250, "({x},{y}) still bright: {px:?}");
            }
        }
    }

    #[test]
    fn progress_runs_from_zero_to_done() {
        let mut img = RgbaImage::from_pixel(30, 30, Rgba([100, 100, 100, 255]));
        for y in 10..14 {
            for x in 10..14 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mut updates = Vec::new();
        let mut sink = |p: u8, _: &str| updates.push(p);
        watermark_pipeline().process(&mut img, &mut sink).unwrap();

        assert_eq!(updates.first(), Some(&0));
        assert_eq!(updates.last(), Some(&progress::DONE));
        assert!(updates.contains(&progress::ANALYZED));
        assert!(updates.contains(&progress::SMOOTHING));
        assert!(updates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn preview_replaces_image_with_overlay() {
        let pipeline = Pipeline::new(ProcessOptions {
            preview: true,
            ..ProcessOptions::default()
        });
        let mut img = RgbaImage::from_pixel(30, 30, Rgba([100, 100, 100, 255]));
        for y in 10..15 {
            for x in 10..15 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let outcome = pipeline.process(&mut img, &mut Silent).unwrap();
        assert!(matches!(outcome, Outcome::Previewed { .. }));
        assert_eq!(*img.get_pixel(12, 12), Rgba([255, 205, 205, 200]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn preview_requires_a_detecting_method() {
        let pipeline = Pipeline::new(ProcessOptions {
            method: Method::QuickWatermark,
            preview: true,
            ..ProcessOptions::default()
        });
        let original = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 100]));
        let mut img = original.clone();
        let err = pipeline.process(&mut img, &mut Silent).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("preview")));
        assert_eq!(img, original);
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn chroma_method_keys_out_background() {
        let pipeline = Pipeline::new(ProcessOptions {
            method: Method::Chroma {
                key: Key::Green,
                threshold: 50,
            },
            ..ProcessOptions::default()
        });
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 50, 50, 255]));
        let outcome = pipeline.process(&mut img, &mut Silent).unwrap();
        assert_eq!(outcome, Outcome::Filtered { changed: 15 });
        assert_eq!(img.get_pixel(0, 0)[3], 255);
        assert_eq!(img.get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn buffer_from_raw_validates_input() {
        assert!(matches!(
            buffer_from_raw(0, 4, Vec::new()),
            Err(Error::InvalidDimensions {
                width: 0,
                height: 4
            })
        ));
        assert!(matches!(
            buffer_from_raw(2, 2, vec![0; 15]),
            Err(Error::BufferSizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
        let img = buffer_from_raw(2, 2, vec![7; 16]).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn default_output_path_depends_on_method() {
        let opts = ProcessOptions::default();
        let p = default_output_path(Path::new("/tmp/photo.jpg"), &opts);
        assert_eq!(p, PathBuf::from("/tmp/photo_cleaned.jpg"));

        let preview = ProcessOptions {
            preview: true,
            ..ProcessOptions::default()
        };
        let p = default_output_path(Path::new("image.png"), &preview);
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "image_preview.png"
        );

        let chroma = ProcessOptions {
            method: Method::Chroma {
                key: Key::White,
                threshold: 20,
            },
            ..ProcessOptions::default()
        };
        let p = default_output_path(Path::new("/tmp/shot.jpg"), &chroma);
        assert_eq!(p, PathBuf::from("/tmp/shot_nobg.png"));
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }
}
