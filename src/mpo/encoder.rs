//! MPO encoding
//!
//! Both streams are validated, their capture timestamps and chroma positioning are
//! made identical, and an MPF index segment is inserted into the left stream before
//! the two are concatenated.

use chrono::{Local, NaiveDateTime};
use std::path::Path;

use super::{stereo_entries, MpoContainer, MPF_SIGNATURE, MPF_VERSION};
use super::{TAG_MPF_VERSION, TAG_MP_ENTRY, TAG_NUMBER_OF_IMAGES};
use crate::error::{Error, Result};
use crate::metadata::jpeg::{self, APP2};
use crate::metadata::{normalization_fields, ExifMetadata, MetadataService};
use crate::output;

const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;

/// Offset of the entry table from the TIFF header: header, count, 3 entries, next IFD
const ENTRY_TABLE_OFFSET: u32 = 8 + 2 + 3 * 12 + 4;

/// Full APP2 segment length including marker and length field
pub const MPF_SEGMENT_LEN: usize = 2 + 2 + 4 + ENTRY_TABLE_OFFSET as usize + 2 * super::ENTRY_LEN;

fn ifd_entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
    out.extend_from_slice(&tag.to_be_bytes());
    out.extend_from_slice(&kind.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&value);
}

/// Build the APP2 MPF segment for a pair of stream lengths
///
/// `first_len` must already include this segment.
pub fn build_mpf_segment(first_len: u32, second_len: u32) -> Result<Vec<u8>> {
    let entries = stereo_entries(first_len, second_len);

    let mut payload = MPF_SIGNATURE.to_vec();
    payload.extend_from_slice(b"MM");
    payload.extend_from_slice(&42u16.to_be_bytes());
    payload.extend_from_slice(&8u32.to_be_bytes());

    payload.extend_from_slice(&3u16.to_be_bytes());
    ifd_entry(&mut payload, TAG_MPF_VERSION, TYPE_UNDEFINED, 4, *MPF_VERSION);
    ifd_entry(&mut payload, TAG_NUMBER_OF_IMAGES, TYPE_LONG, 1, 2u32.to_be_bytes());
    ifd_entry(
        &mut payload,
        TAG_MP_ENTRY,
        TYPE_UNDEFINED,
        (entries.len() * super::ENTRY_LEN) as u32,
        ENTRY_TABLE_OFFSET.to_be_bytes(),
    );
    payload.extend_from_slice(&0u32.to_be_bytes());
    for entry in &entries {
        payload.extend_from_slice(&entry.to_bytes());
    }

    jpeg::build_app_segment(APP2, &payload)
}

/// Validate a stream and cut it at its EOI
fn checked_stream<'a>(data: &'a [u8], side: &str) -> Result<&'a [u8]> {
    let header = jpeg::parse(data)
        .map_err(|e| Error::InvalidStream(format!("{} image: {}", side, invalid_reason(e))))?;
    if header.stream_end < data.len() {
        log::debug!(
            "Ignoring {} trailing bytes after the {} image",
            data.len() - header.stream_end,
            side
        );
    }
    Ok(&data[..header.stream_end])
}

fn invalid_reason(e: Error) -> String {
    match e {
        Error::InvalidStream(reason) => reason,
        other => other.to_string(),
    }
}

fn to_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidStream(format!("stream of {} bytes is too large", len)))
}

/// MPO encoder over a metadata service
#[derive(Debug, Clone, Default)]
pub struct MpoEncoder<M = ExifMetadata> {
    metadata: M,
}

impl MpoEncoder<ExifMetadata> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: MetadataService> MpoEncoder<M> {
    pub fn with_metadata(metadata: M) -> Self {
        Self { metadata }
    }

    /// Encode using the left image's capture time, or the current time if it has none
    pub fn encode(&self, left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
        Ok(self.encode_container(left, right, None)?.to_bytes())
    }

    pub fn encode_with_timestamp(
        &self,
        left: &[u8],
        right: &[u8],
        timestamp: NaiveDateTime,
    ) -> Result<Vec<u8>> {
        Ok(self.encode_container(left, right, Some(timestamp))?.to_bytes())
    }

    /// Build the container for two JPEG streams
    pub fn encode_container(
        &self,
        left: &[u8],
        right: &[u8],
        timestamp: Option<NaiveDateTime>,
    ) -> Result<MpoContainer> {
        let left = checked_stream(left, "left")?;
        let right = checked_stream(right, "right")?;

        let timestamp = match timestamp {
            Some(ts) => ts,
            None => self
                .metadata
                .capture_time(left)?
                .unwrap_or_else(|| Local::now().naive_local()),
        };
        let fields = normalization_fields(timestamp);
        let left = self.metadata.set(left, &fields)?;
        let second = self.metadata.set(right, &fields)?;

        // An MPO's own first stream may already carry an index; replace it
        let header = jpeg::parse(&left)?;
        let left = match header.find_app(&left, APP2, MPF_SIGNATURE) {
            Some(old) => jpeg::splice(&left, old.start, old.len, &[]),
            None => left,
        };
        let header = jpeg::parse(&left)?;

        let first_len = to_u32(left.len() + MPF_SEGMENT_LEN)?;
        let second_len = to_u32(second.len())?;
        to_u32(first_len as usize + second_len as usize)?;

        let segment = build_mpf_segment(first_len, second_len)?;
        let first = jpeg::splice(&left, header.app_insert_offset(), 0, &segment);

        Ok(MpoContainer {
            entries: stereo_entries(first_len, second_len),
            first,
            second,
        })
    }
}

/// Encode two JPEG streams into MPO bytes with Exif-based normalization
pub fn encode(left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
    MpoEncoder::new().encode(left, right)
}

/// Write MPO bytes to `path` atomically
pub fn write_mpo(path: &Path, bytes: &[u8]) -> Result<()> {
    output::write_atomic(path, bytes)?;
    log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
