//! Metadata access for JPEG streams
//!
//! The MPO encoder and the folder scan only need a few Exif fields: the three
//! capture timestamps and the chroma positioning flag, plus the camera identity
//! and orientation for reporting. `MetadataService` is the
//! seam they go through; `ExifMetadata` is the implementation over APP1 Exif.

pub mod exif;
pub mod jpeg;

use chrono::NaiveDateTime;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Exif timestamp layout
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// How much of a file is read when looking for a capture time
const HEADER_READ_LIMIT: u64 = 256 * 1024;

/// YCbCrPositioning value for co-sited chroma samples
pub const YCBCR_CO_SITED: u16 = 2;

/// Metadata fields the pipeline reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Make,
    Model,
    Orientation,
    DateTime,
    DateTimeOriginal,
    DateTimeDigitized,
    YCbCrPositioning,
}

impl Tag {
    pub const ALL: [Tag; 7] = [
        Tag::Make,
        Tag::Model,
        Tag::Orientation,
        Tag::DateTime,
        Tag::DateTimeOriginal,
        Tag::DateTimeDigitized,
        Tag::YCbCrPositioning,
    ];

    /// Numeric Exif tag id
    pub fn code(self) -> u16 {
        match self {
            Tag::Make => 0x010F,
            Tag::Model => 0x0110,
            Tag::Orientation => 0x0112,
            Tag::DateTime => 0x0132,
            Tag::DateTimeOriginal => 0x9003,
            Tag::DateTimeDigitized => 0x9004,
            Tag::YCbCrPositioning => 0x0213,
        }
    }

    /// Whether the tag lives in the Exif sub-IFD rather than IFD0
    pub fn in_exif_ifd(self) -> bool {
        matches!(self, Tag::DateTimeOriginal | Tag::DateTimeDigitized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Ascii(String),
    Short(u16),
}

impl TagValue {
    /// Exif-formatted timestamp value
    pub fn datetime(ts: NaiveDateTime) -> Self {
        TagValue::Ascii(ts.format(EXIF_DATETIME_FORMAT).to_string())
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TagValue::Ascii(text) => NaiveDateTime::parse_from_str(text, EXIF_DATETIME_FORMAT).ok(),
            TagValue::Short(_) => None,
        }
    }

    pub fn as_short(&self) -> Option<u16> {
        match self {
            TagValue::Short(v) => Some(*v),
            TagValue::Ascii(_) => None,
        }
    }
}

/// Key/value access to a JPEG stream's metadata
pub trait MetadataService: Send + Sync {
    /// Read one field; `Ok(None)` if the stream has no such field
    fn get(&self, jpeg: &[u8], tag: Tag) -> Result<Option<TagValue>>;

    /// Return a copy of the stream with the given fields set
    fn set(&self, jpeg: &[u8], values: &[(Tag, TagValue)]) -> Result<Vec<u8>>;

    /// Best capture time recorded in the stream
    fn capture_time(&self, jpeg: &[u8]) -> Result<Option<NaiveDateTime>> {
        for tag in [Tag::DateTimeDigitized, Tag::DateTimeOriginal, Tag::DateTime] {
            if let Some(ts) = self.get(jpeg, tag)?.and_then(|v| v.as_datetime()) {
                return Ok(Some(ts));
            }
        }
        Ok(None)
    }
}

/// `MetadataService` over the APP1 Exif segment
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadata;

impl MetadataService for ExifMetadata {
    fn get(&self, jpeg: &[u8], tag: Tag) -> Result<Option<TagValue>> {
        if !jpeg.starts_with(&jpeg::SOI) {
            return Err(Error::InvalidStream("missing SOI marker".to_string()));
        }
        Ok(exif::read_tag(jpeg, tag))
    }

    fn set(&self, jpeg: &[u8], values: &[(Tag, TagValue)]) -> Result<Vec<u8>> {
        exif::write_tags(jpeg, values)
    }
}

/// Fields written on both streams of an MPO before concatenation
pub fn normalization_fields(ts: NaiveDateTime) -> Vec<(Tag, TagValue)> {
    vec![
        (Tag::DateTime, TagValue::datetime(ts)),
        (Tag::DateTimeOriginal, TagValue::datetime(ts)),
        (Tag::DateTimeDigitized, TagValue::datetime(ts)),
        (Tag::YCbCrPositioning, TagValue::Short(YCBCR_CO_SITED)),
    ]
}

/// Read the capture time of a JPEG file from its Exif header
///
/// Only the first part of the file is read. Non-JPEG files yield `Ok(None)`.
pub fn capture_time(path: &Path) -> Result<Option<NaiveDateTime>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut head = Vec::new();
    file.take(HEADER_READ_LIMIT)
        .read_to_end(&mut head)
        .map_err(|e| Error::io(path, e))?;

    if !head.starts_with(&jpeg::SOI) {
        return Ok(None);
    }
    ExifMetadata.capture_time(&head)
}
