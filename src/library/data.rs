//! Shared data structures for a batch run
//!
//! These structs represent the data model that flows between the folder scan,
//! the pair matcher and the per-pair processing stages.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A single image discovered by a folder scan
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Full path to the image file
    pub path: PathBuf,
    /// Capture time (EXIF or file modification time); `None` if unavailable
    pub timestamp: Option<NaiveDateTime>,
    /// File size on disk in bytes
    pub byte_size: u64,
    /// Decoded width/height, read from the image header on first access
    dimensions: OnceLock<Option<(u32, u32)>>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, timestamp: Option<NaiveDateTime>, byte_size: u64) -> Self {
        Self {
            path: path.into(),
            timestamp,
            byte_size,
            dimensions: OnceLock::new(),
        }
    }

    /// Filename only (e.g., "DSCF0001.JPG")
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    /// Filename without extension, used to name outputs
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Image dimensions, decoded lazily from the file header
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        *self
            .dimensions
            .get_or_init(|| image::image_dimensions(&self.path).ok())
    }
}

impl PartialEq for ImageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.timestamp == other.timestamp
            && self.byte_size == other.byte_size
    }
}

impl Eq for ImageRecord {}

/// A left/right stereo pair
///
/// When both timestamps are known, `left` was captured no later than `right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub left: ImageRecord,
    pub right: ImageRecord,
}

impl Pair {
    pub fn new(left: ImageRecord, right: ImageRecord) -> Self {
        Self { left, right }
    }

    /// Capture-time gap in seconds, if both timestamps are known
    pub fn time_gap(&self) -> Option<f64> {
        match (self.left.timestamp, self.right.timestamp) {
            (Some(l), Some(r)) => Some(seconds_between(l, r)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}", self.left.path.display(), self.right.path.display())
    }
}

/// Matcher output: the accepted pairs plus every image left unpaired
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matching {
    pub pairs: Vec<Pair>,
    pub singles: Vec<ImageRecord>,
}

impl Matching {
    /// Number of images accounted for (2 per pair + singles)
    pub fn image_count(&self) -> usize {
        self.pairs.len() * 2 + self.singles.len()
    }
}

/// Signed gap `b - a` in seconds, with millisecond resolution
pub fn seconds_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (b - a).num_milliseconds() as f64 / 1000.0
}
