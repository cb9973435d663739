//! Error types for the pixmend crate.

/// Errors that can occur while validating input or processing image files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The image has a zero dimension.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// A raw buffer or mask does not match its stated dimensions.
    #[error("buffer length {actual} does not match expected length {expected}")]
    BufferSizeMismatch {
        /// Length implied by the stated width and height.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// An option value could not be understood.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another run currently holds the pipeline lease.
    #[error("pipeline is busy with another image")]
    Busy,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
