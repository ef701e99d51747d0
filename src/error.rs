//! Error taxonomy shared by every stage of the stereo pipeline.
//!
//! Per-pair errors (`Decode`, `InsufficientFeatures`, `Alignment`, `InvalidStream`,
//! `Io` on a single output file) are caught by the batch driver and recorded as skips.
//! Only a failure to create the output root aborts a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file is not a readable raster image
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// One of the images produced too few feature descriptors to attempt matching
    #[error("too few descriptors in {path}: found {found}, need {required}")]
    InsufficientFeatures {
        path: PathBuf,
        found: usize,
        required: usize,
    },

    #[error("alignment failed: {0}")]
    Alignment(#[from] AlignmentError),

    /// Compositor inputs must have identical dimensions
    #[error("dimension mismatch: left is {}x{}, right is {}x{}", left.0, left.1, right.0, right.1)]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },

    /// Input to the MPO encoder/splitter is not a well-formed JPEG stream
    #[error("invalid JPEG stream: {0}")]
    InvalidStream(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image encoding failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch cancelled")]
    Cancelled,
}

/// Reasons the geometric aligner rejects a pair
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    #[error("only {found} correspondences survived matching (need {required})")]
    TooFewMatches { found: usize, required: usize },

    #[error("robust homography fit found no consensus among {matches} matches")]
    NoConsensus { matches: usize },

    #[error("homography is degenerate (determinant {determinant:e})")]
    Degenerate { determinant: f64 },
}

impl Error {
    /// Wrap an `std::io::Error` with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an `image::ImageError` raised while decoding `path`
    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Error::Decode {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly kind, used in batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Decode { .. } => "decode",
            Error::InsufficientFeatures { .. } => "insufficient_features",
            Error::Alignment(_) => "alignment",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::InvalidStream(_) => "invalid_stream",
            Error::Io { .. } => "io",
            Error::Encode(_) => "encode",
            Error::Config(_) => "config",
            Error::Cancelled => "cancelled",
        }
    }
}
