use std::fmt;

use thiserror::Error;

/// Image container formats the reader recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormatKind {
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl fmt::Display for ImageFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Bmp => "BMP",
            Self::Tga => "TGA",
        };
        f.write_str(name)
    }
}

/// Per-request failure. Every variant is non-fatal: it becomes the `error`
/// field of a `ReadResult` and the pipeline keeps processing.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The source does not exist.
    #[error("image does not exist: {0}")]
    NotFound(String),

    /// The source file exceeds the configured size cap.
    #[error("image filesize {size} exceeds limit of {limit} bytes: {path}")]
    TooLarge { path: String, size: u64, limit: u64 },

    /// Underlying IO error while reading the source.
    #[error("image i/o error: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The bytes match no supported container format.
    #[error("unrecognized image format: {0}")]
    UnsupportedFormat(String),

    /// Width or height fails the resolution validity rule.
    #[error("texture resolution is not supported: {width} x {height}")]
    ResolutionNotSupported { width: u32, height: u32 },

    /// The container is recognized but carries pixel data outside the
    /// per-format layout table.
    #[error("{0} file contains data in an unsupported format")]
    UnsupportedPixelFormat(ImageFormatKind),

    /// 16-bit color data in a format that rejects it.
    #[error("16-bit {0} file is not supported")]
    UnsupportedBitDepth(ImageFormatKind),

    /// The container is recognized but decoding failed part-way.
    #[error("failed to decode {format}: {source}")]
    Decode {
        format: ImageFormatKind,
        #[source]
        source: image::ImageError,
    },

    /// Percent sizes must both be 100 or both strictly inside (0, 100).
    #[error("invalid transform parameters: percent size must be 100 or within (0, 100), got {x} x {y}")]
    InvalidTransformParams { x: u32, y: u32 },

    /// Resize/format normalization failed.
    #[error("image transform failed: {0}")]
    Transform(String),

    /// The graphics backend refused the upload.
    #[error("texture creation failed for {source_id}: {reason}")]
    TextureCreation { source_id: String, reason: String },
}
