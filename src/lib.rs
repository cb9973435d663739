//! Detect and repair watermark and text regions in raster images.
//!
//! A heuristic, non-ML filter over RGBA buffers. A run goes through four
//! stages, each reading the original pixels and producing a new output:
//! mask detection, morphological cleanup, patch-based repair and smoothing.
//!
//! # Quick Start
//!
//! ```no_run
//! use pixmend::{Pipeline, ProcessOptions, Silent};
//!
//! let pipeline = Pipeline::new(ProcessOptions::default());
//! let mut img = image::open("photo.png").unwrap().to_rgba8();
//! let outcome = pipeline.process(&mut img, &mut Silent).unwrap();
//! println!("{outcome:?}");
//! img.save("cleaned.png").unwrap();
//! ```
//!
//! # Stages
//!
//! Each stage is usable on its own, for example to preview what a repair
//! would touch:
//!
//! ```no_run
//! let img = image::open("photo.png").unwrap().to_rgba8();
//! let detection = pixmend::detect(&img);
//! println!("{} pixels marked (relaxed: {})", detection.count(), detection.relaxed);
//! pixmend::Mask::overlay(&detection.mask, &img).save("preview.png").unwrap();
//! ```

#![deny(missing_docs)]

pub mod chroma;
pub mod detection;
pub mod error;
pub mod mask;
pub mod morphology;
mod pipeline;
pub mod progress;
pub mod quick;
pub mod repair;
pub mod sampler;
pub mod smoothing;
pub mod text;

pub use chroma::Key;
pub use detection::{detect, Detection};
pub use error::{Error, Result};
pub use mask::Mask;
pub use morphology::{clean, clean_text};
pub use pipeline::{
    buffer_from_raw, default_output_path, is_supported_image, save_image, DetectionMode, Lease,
    Method, Outcome, Pipeline, ProcessOptions, ProcessResult,
};
pub use progress::{LogProgress, Progress, Silent};
pub use repair::{repair, RepairStats};
pub use smoothing::smooth;
pub use text::detect_text;
