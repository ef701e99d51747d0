//! Exif (TIFF) structure inside a JPEG APP1 segment
//!
//! Supports reading the handful of tags the pipeline cares about and rewriting them.
//! Existing values are patched in place when the stored field is large enough;
//! otherwise new IFD tables are appended to the block, carrying every original entry
//! plus the new values. Streams without Exif get a minimal segment.

use super::jpeg::{self, APP0, APP1};
use super::{Tag, TagValue};
use crate::error::Result;

pub const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

const TAG_EXIF_IFD: u16 = 0x8769;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16(self, b: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    pub fn put_u16(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn put_u32(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// One 12-byte IFD entry
#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Offset of the entry inside the TIFF block
    pos: usize,
    tag: u16,
    kind: u16,
    count: u32,
    value: u32,
}

/// Read-only view over a TIFF block
struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let order = match &data[..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return None,
        };
        if order.u16(&data[2..4]) != 42 {
            return None;
        }
        Some(Self { data, order })
    }

    fn entries(&self, offset: usize) -> Option<Vec<Entry>> {
        let count = self.order.u16(self.data.get(offset..offset + 2)?) as usize;
        let table_end = offset + 2 + count * 12;
        if table_end > self.data.len() {
            return None;
        }
        Some(
            (0..count)
                .map(|i| {
                    let pos = offset + 2 + i * 12;
                    let raw = &self.data[pos..pos + 12];
                    Entry {
                        pos,
                        tag: self.order.u16(&raw[0..2]),
                        kind: self.order.u16(&raw[2..4]),
                        count: self.order.u32(&raw[4..8]),
                        value: self.order.u32(&raw[8..12]),
                    }
                })
                .collect(),
        )
    }

    fn find(&self, tag: Tag) -> Option<Entry> {
        let ifd0 = self.order.u32(&self.data[4..8]) as usize;
        let ifd0_entries = self.entries(ifd0)?;
        let entries = if tag.in_exif_ifd() {
            let pointer = ifd0_entries.iter().find(|e| e.tag == TAG_EXIF_IFD)?;
            self.entries(pointer.value as usize)?
        } else {
            ifd0_entries
        };
        entries.into_iter().find(|e| e.tag == tag.code())
    }

    /// Where an entry's value bytes live, and how many there are
    fn value_range(&self, entry: &Entry) -> Option<(usize, usize)> {
        let unit = match entry.kind {
            TYPE_ASCII => 1,
            TYPE_SHORT => 2,
            TYPE_LONG => 4,
            _ => return None,
        };
        let size = unit * entry.count as usize;
        let start = if size <= 4 {
            entry.pos + 8
        } else {
            entry.value as usize
        };
        if start + size > self.data.len() {
            return None;
        }
        Some((start, size))
    }

    fn read(&self, entry: &Entry) -> Option<TagValue> {
        let (start, size) = self.value_range(entry)?;
        let bytes = &self.data[start..start + size];
        match entry.kind {
            TYPE_ASCII => {
                let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
                Some(TagValue::Ascii(String::from_utf8_lossy(text).trim().to_string()))
            }
            TYPE_SHORT if size >= 2 => Some(TagValue::Short(self.order.u16(bytes))),
            _ => None,
        }
    }
}

/// Locate the TIFF block of the first Exif APP1 segment: (segment, tiff start, tiff end)
fn exif_block(data: &[u8]) -> Option<(jpeg::Segment, usize, usize)> {
    for segment in jpeg::segments(data).ok()? {
        // Partial reads of large files end in a truncated segment; stop quietly
        let segment = segment.ok()?;
        if segment.marker == APP1 && segment.payload(data).starts_with(EXIF_SIGNATURE) {
            let start = segment.start + 4 + EXIF_SIGNATURE.len();
            return Some((segment, start, segment.end()));
        }
    }
    None
}

/// Read a single tag from the Exif segment of a JPEG stream (or a prefix of one)
pub fn read_tag(data: &[u8], tag: Tag) -> Option<TagValue> {
    let (_, start, end) = exif_block(data)?;
    let tiff = Tiff::parse(&data[start..end])?;
    let entry = tiff.find(tag)?;
    tiff.read(&entry)
}

/// Try to overwrite each value inside the existing TIFF block
///
/// Returns `false` without touching `tiff` if any tag is missing or too small.
fn patch_in_place(tiff: &mut [u8], values: &[(Tag, TagValue)]) -> bool {
    let mut writes: Vec<(usize, Vec<u8>)> = Vec::with_capacity(values.len());
    {
        let view = match Tiff::parse(tiff) {
            Some(view) => view,
            None => return false,
        };
        for (tag, value) in values {
            let entry = match view.find(*tag) {
                Some(entry) => entry,
                None => return false,
            };
            let (start, size) = match view.value_range(&entry) {
                Some(range) => range,
                None => return false,
            };
            match value {
                TagValue::Ascii(text) if entry.kind == TYPE_ASCII && size > text.len() => {
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.resize(size, 0);
                    writes.push((start, bytes));
                }
                TagValue::Short(v) if entry.kind == TYPE_SHORT && size >= 2 => {
                    writes.push((start, view.order.put_u16(*v).to_vec()));
                }
                _ => return false,
            }
        }
    }
    for (offset, bytes) in writes {
        tiff[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }
    true
}

/// Raw IFD field used by the TIFF writer
enum Field {
    /// NUL-terminated text
    Ascii(Vec<u8>),
    Short(u16),
    Long(u32),
    /// Entry copied from an existing IFD: type, count and value bytes as stored
    Copied([u8; 10]),
}

impl Field {
    fn from_value(value: &TagValue) -> Self {
        match value {
            TagValue::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                Field::Ascii(bytes)
            }
            TagValue::Short(v) => Field::Short(*v),
        }
    }

    /// Bytes stored outside the IFD table (word-aligned)
    fn out_of_line_len(&self) -> usize {
        match self {
            Field::Ascii(bytes) if bytes.len() > 4 => bytes.len() + bytes.len() % 2,
            _ => 0,
        }
    }
}

/// Append an IFD (table, next pointer, then out-of-line values) to `out`
///
/// Offsets are relative to the start of `out`, which must hold the TIFF header.
fn write_ifd(out: &mut Vec<u8>, order: ByteOrder, entries: &[(u16, Field)], next_ifd: u32) {
    let ifd_offset = out.len();
    let data_start = ifd_offset + 2 + entries.len() * 12 + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&order.put_u16(entries.len() as u16));
    for (tag, field) in entries {
        out.extend_from_slice(&order.put_u16(*tag));
        match field {
            Field::Ascii(bytes) => {
                out.extend_from_slice(&order.put_u16(TYPE_ASCII));
                out.extend_from_slice(&order.put_u32(bytes.len() as u32));
                if bytes.len() <= 4 {
                    let mut inline = [0u8; 4];
                    inline[..bytes.len()].copy_from_slice(bytes);
                    out.extend_from_slice(&inline);
                } else {
                    let offset = data_start + data.len();
                    out.extend_from_slice(&order.put_u32(offset as u32));
                    data.extend_from_slice(bytes);
                    if data.len() % 2 == 1 {
                        data.push(0);
                    }
                }
            }
            Field::Short(v) => {
                out.extend_from_slice(&order.put_u16(TYPE_SHORT));
                out.extend_from_slice(&order.put_u32(1));
                out.extend_from_slice(&order.put_u16(*v));
                out.extend_from_slice(&[0, 0]);
            }
            Field::Long(v) => {
                out.extend_from_slice(&order.put_u16(TYPE_LONG));
                out.extend_from_slice(&order.put_u32(1));
                out.extend_from_slice(&order.put_u32(*v));
            }
            Field::Copied(raw) => out.extend_from_slice(raw),
        }
    }
    out.extend_from_slice(&order.put_u32(next_ifd));
    out.extend_from_slice(&data);
}

/// Build a big-endian TIFF block holding IFD0 and, if needed, an Exif sub-IFD
fn build_tiff(values: &[(Tag, TagValue)]) -> Vec<u8> {
    let order = ByteOrder::Big;

    let mut ifd0: Vec<(u16, Field)> = values
        .iter()
        .filter(|(tag, _)| !tag.in_exif_ifd())
        .map(|(tag, value)| (tag.code(), Field::from_value(value)))
        .collect();
    let mut exif: Vec<(u16, Field)> = values
        .iter()
        .filter(|(tag, _)| tag.in_exif_ifd())
        .map(|(tag, value)| (tag.code(), Field::from_value(value)))
        .collect();
    exif.sort_by_key(|(tag, _)| *tag);

    if !exif.is_empty() {
        let ifd0_len = 2 + (ifd0.len() + 1) * 12 + 4;
        let ifd0_data: usize = ifd0.iter().map(|(_, f)| f.out_of_line_len()).sum();
        let exif_offset = 8 + ifd0_len + ifd0_data;
        ifd0.push((TAG_EXIF_IFD, Field::Long(exif_offset as u32)));
    }
    ifd0.sort_by_key(|(tag, _)| *tag);

    let mut out = Vec::new();
    out.extend_from_slice(b"MM");
    out.extend_from_slice(&order.put_u16(42));
    out.extend_from_slice(&order.put_u32(8));
    write_ifd(&mut out, order, &ifd0, 0);
    if !exif.is_empty() {
        write_ifd(&mut out, order, &exif, 0);
    }
    out
}

/// Existing entries of an IFD, minus the tags in `replaced`, plus `added`, sorted by tag
fn merge_entries(
    tiff: &[u8],
    existing: &[Entry],
    replaced: &[u16],
    added: Vec<(u16, Field)>,
) -> Vec<(u16, Field)> {
    let mut merged: Vec<(u16, Field)> = existing
        .iter()
        .filter(|e| !replaced.contains(&e.tag))
        .map(|e| {
            let mut raw = [0u8; 10];
            raw.copy_from_slice(&tiff[e.pos + 2..e.pos + 12]);
            (e.tag, Field::Copied(raw))
        })
        .collect();
    merged.extend(added);
    merged.sort_by_key(|(tag, _)| *tag);
    merged
}

fn new_fields<'v>(
    values: &'v [(Tag, TagValue)],
    in_exif: bool,
) -> impl Iterator<Item = &'v (Tag, TagValue)> {
    values.iter().filter(move |(tag, _)| tag.in_exif_ifd() == in_exif)
}

/// Rewrite a TIFF block with `values` set, keeping every other entry
///
/// The original bytes stay where they are, so existing value offsets, the thumbnail
/// IFD, GPS data and maker notes remain valid. New IFD0 and Exif tables are appended
/// and the header is pointed at the new IFD0.
fn rewrite_tiff(tiff: &[u8], values: &[(Tag, TagValue)]) -> Option<Vec<u8>> {
    let view = Tiff::parse(tiff)?;
    let order = view.order;
    let ifd0_offset = order.u32(&tiff[4..8]) as usize;
    let ifd0 = view.entries(ifd0_offset)?;
    let next_pos = ifd0_offset + 2 + ifd0.len() * 12;
    let next_ifd = order.u32(tiff.get(next_pos..next_pos + 4)?);

    let mut out = tiff.to_vec();
    if out.len() % 2 == 1 {
        out.push(0);
    }

    let exif_values: Vec<_> = new_fields(values, true).collect();
    let mut ifd0_added: Vec<(u16, Field)> = new_fields(values, false)
        .map(|(tag, value)| (tag.code(), Field::from_value(value)))
        .collect();
    let mut ifd0_replaced: Vec<u16> = ifd0_added.iter().map(|(tag, _)| *tag).collect();

    if !exif_values.is_empty() {
        let existing = match ifd0.iter().find(|e| e.tag == TAG_EXIF_IFD) {
            Some(pointer) => view.entries(pointer.value as usize)?,
            None => Vec::new(),
        };
        let replaced: Vec<u16> = exif_values.iter().map(|(tag, _)| tag.code()).collect();
        let added = exif_values
            .iter()
            .map(|(tag, value)| (tag.code(), Field::from_value(value)))
            .collect();
        let exif = merge_entries(tiff, &existing, &replaced, added);

        let exif_offset = u32::try_from(out.len()).ok()?;
        write_ifd(&mut out, order, &exif, 0);
        if out.len() % 2 == 1 {
            out.push(0);
        }
        ifd0_replaced.push(TAG_EXIF_IFD);
        ifd0_added.push((TAG_EXIF_IFD, Field::Long(exif_offset)));
    }

    let ifd0 = merge_entries(tiff, &ifd0, &ifd0_replaced, ifd0_added);
    let new_ifd0 = u32::try_from(out.len()).ok()?;
    write_ifd(&mut out, order, &ifd0, next_ifd);
    out[4..8].copy_from_slice(&order.put_u32(new_ifd0));
    Some(out)
}

/// Write `values` into the Exif segment of a complete JPEG stream
pub fn write_tags(data: &[u8], values: &[(Tag, TagValue)]) -> Result<Vec<u8>> {
    let header = jpeg::parse(data)?;

    if let Some(segment) = header.find_app(data, APP1, EXIF_SIGNATURE) {
        let start = segment.start + 4 + EXIF_SIGNATURE.len();
        let end = segment.end();

        let mut out = data.to_vec();
        if patch_in_place(&mut out[start..end], values) {
            return Ok(out);
        }

        let tiff = match rewrite_tiff(&data[start..end], values) {
            Some(tiff) => tiff,
            None => {
                log::warn!("Unreadable Exif block; replacing it with a minimal one");
                build_tiff(values)
            }
        };
        log::debug!(
            "Rewriting Exif segment ({} -> {} bytes)",
            segment.len,
            tiff.len() + EXIF_SIGNATURE.len() + 4
        );
        let mut payload = EXIF_SIGNATURE.to_vec();
        payload.extend(tiff);
        let replacement = jpeg::build_app_segment(APP1, &payload)?;
        return Ok(jpeg::splice(data, segment.start, segment.len, &replacement));
    }

    // No Exif yet: place one right after SOI / JFIF
    let offset = header
        .segments
        .iter()
        .take_while(|s| s.marker == APP0)
        .last()
        .map(|s| s.end())
        .unwrap_or(2);
    let segment = build_exif_segment(values)?;
    Ok(jpeg::splice(data, offset, 0, &segment))
}

fn build_exif_segment(values: &[(Tag, TagValue)]) -> Result<Vec<u8>> {
    let mut payload = EXIF_SIGNATURE.to_vec();
    payload.extend(build_tiff(values));
    jpeg::build_app_segment(APP1, &payload)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::jpeg::tests::tiny_jpeg;
    use crate::metadata::normalization_fields;
    use chrono::NaiveDate;

    const STAMP: &str = "2024:05:01 10:00:00";

    fn little_endian_exif_jpeg() -> Vec<u8> {
        // IFD0: DateTime (ASCII 20, out of line), YCbCrPositioning = 1 (centered)
        let order = ByteOrder::Little;
        let mut tiff = b"II".to_vec();
        tiff.extend_from_slice(&order.put_u16(42));
        tiff.extend_from_slice(&order.put_u32(8));
        tiff.extend_from_slice(&order.put_u16(2));
        let text_offset = 8 + 2 + 2 * 12 + 4;
        tiff.extend_from_slice(&order.put_u16(0x0132));
        tiff.extend_from_slice(&order.put_u16(TYPE_ASCII));
        tiff.extend_from_slice(&order.put_u32(20));
        tiff.extend_from_slice(&order.put_u32(text_offset as u32));
        tiff.extend_from_slice(&order.put_u16(0x0213));
        tiff.extend_from_slice(&order.put_u16(TYPE_SHORT));
        tiff.extend_from_slice(&order.put_u32(1));
        tiff.extend_from_slice(&order.put_u16(1));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&order.put_u32(0));
        tiff.extend_from_slice(b"2001:01:01 00:00:00\0");

        let mut payload = EXIF_SIGNATURE.to_vec();
        payload.extend(tiff);
        let segment = jpeg::build_app_segment(APP1, &payload).unwrap();
        let base = tiny_jpeg(32);
        jpeg::splice(&base, 2, 0, &segment)
    }

    /// Big-endian camera-style Exif: IFD0 with Make, Orientation and DateTime
    /// (no Exif sub-IFD), linked to an IFD1 holding a single Compression entry
    pub(crate) fn camera_exif_jpeg() -> Vec<u8> {
        let order = ByteOrder::Big;
        let mut tiff = b"MM".to_vec();
        tiff.extend_from_slice(&order.put_u16(42));
        tiff.extend_from_slice(&order.put_u32(8));

        let ifd0_len = 2 + 3 * 12 + 4;
        let make_offset = 8 + ifd0_len;
        let datetime_offset = make_offset + 6;
        let ifd1_offset = datetime_offset + 20;

        tiff.extend_from_slice(&order.put_u16(3));
        tiff.extend_from_slice(&order.put_u16(0x010F));
        tiff.extend_from_slice(&order.put_u16(TYPE_ASCII));
        tiff.extend_from_slice(&order.put_u32(6));
        tiff.extend_from_slice(&order.put_u32(make_offset as u32));
        tiff.extend_from_slice(&order.put_u16(0x0112));
        tiff.extend_from_slice(&order.put_u16(TYPE_SHORT));
        tiff.extend_from_slice(&order.put_u32(1));
        tiff.extend_from_slice(&order.put_u16(6));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&order.put_u16(0x0132));
        tiff.extend_from_slice(&order.put_u16(TYPE_ASCII));
        tiff.extend_from_slice(&order.put_u32(20));
        tiff.extend_from_slice(&order.put_u32(datetime_offset as u32));
        tiff.extend_from_slice(&order.put_u32(ifd1_offset as u32));
        tiff.extend_from_slice(b"Canon\0");
        tiff.extend_from_slice(b"2001:01:01 00:00:00\0");

        tiff.extend_from_slice(&order.put_u16(1));
        tiff.extend_from_slice(&order.put_u16(0x0103));
        tiff.extend_from_slice(&order.put_u16(TYPE_SHORT));
        tiff.extend_from_slice(&order.put_u32(1));
        tiff.extend_from_slice(&order.put_u16(6));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&order.put_u32(0));

        let mut payload = EXIF_SIGNATURE.to_vec();
        payload.extend(tiff);
        let segment = jpeg::build_app_segment(APP1, &payload).unwrap();
        jpeg::splice(&tiny_jpeg(32), 2, 0, &segment)
    }

    /// IFD0's next-IFD pointer and the tags of the IFD it points to
    fn ifd1_tags(data: &[u8]) -> Vec<u16> {
        let (_, start, end) = exif_block(data).unwrap();
        let tiff = Tiff::parse(&data[start..end]).unwrap();
        let ifd0 = tiff.order.u32(&tiff.data[4..8]) as usize;
        let count = tiff.entries(ifd0).unwrap().len();
        let next_pos = ifd0 + 2 + count * 12;
        let next = tiff.order.u32(&tiff.data[next_pos..next_pos + 4]) as usize;
        tiff.entries(next).unwrap().iter().map(|e| e.tag).collect()
    }

    #[test]
    fn test_rewrite_keeps_camera_tags() {
        let data = camera_exif_jpeg();
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let out = write_tags(&data, &normalization_fields(ts)).unwrap();

        assert_eq!(read_tag(&out, Tag::Make), Some(TagValue::Ascii("Canon".to_string())));
        assert_eq!(read_tag(&out, Tag::Orientation), Some(TagValue::Short(6)));
        assert_eq!(read_tag(&out, Tag::Model), None);
        for (tag, value) in normalization_fields(ts) {
            assert_eq!(read_tag(&out, tag), Some(value), "{:?}", tag);
        }
        assert_eq!(ifd1_tags(&out), vec![0x0103]);
        assert!(jpeg::parse(&out).is_ok());
    }

    #[test]
    fn test_rewrite_twice_keeps_single_exif_table_chain() {
        let data = camera_exif_jpeg();
        let first = write_tags(&data, &[(Tag::DateTimeOriginal, TagValue::Ascii(STAMP.to_string()))])
            .unwrap();
        let second = write_tags(
            &first,
            &[(Tag::DateTimeDigitized, TagValue::Ascii(STAMP.to_string()))],
        )
        .unwrap();
        assert_eq!(read_tag(&second, Tag::DateTimeOriginal), Some(TagValue::Ascii(STAMP.to_string())));
        assert_eq!(read_tag(&second, Tag::DateTimeDigitized), Some(TagValue::Ascii(STAMP.to_string())));
        assert_eq!(read_tag(&second, Tag::Make), Some(TagValue::Ascii("Canon".to_string())));
    }

    #[test]
    fn test_read_little_endian() {
        let data = little_endian_exif_jpeg();
        assert_eq!(
            read_tag(&data, Tag::DateTime),
            Some(TagValue::Ascii("2001:01:01 00:00:00".to_string()))
        );
        assert_eq!(read_tag(&data, Tag::YCbCrPositioning), Some(TagValue::Short(1)));
        assert_eq!(read_tag(&data, Tag::DateTimeOriginal), None);
    }

    #[test]
    fn test_patch_in_place_keeps_length() {
        let data = little_endian_exif_jpeg();
        let out = write_tags(
            &data,
            &[
                (Tag::DateTime, TagValue::Ascii(STAMP.to_string())),
                (Tag::YCbCrPositioning, TagValue::Short(2)),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), data.len());
        assert_eq!(read_tag(&out, Tag::DateTime), Some(TagValue::Ascii(STAMP.to_string())));
        assert_eq!(read_tag(&out, Tag::YCbCrPositioning), Some(TagValue::Short(2)));
    }

    #[test]
    fn test_missing_tag_rebuilds_segment() {
        let data = little_endian_exif_jpeg();
        let out = write_tags(
            &data,
            &[(Tag::DateTimeOriginal, TagValue::Ascii(STAMP.to_string()))],
        )
        .unwrap();
        // Old fields survive the rebuild
        assert_eq!(
            read_tag(&out, Tag::DateTime),
            Some(TagValue::Ascii("2001:01:01 00:00:00".to_string()))
        );
        assert_eq!(
            read_tag(&out, Tag::DateTimeOriginal),
            Some(TagValue::Ascii(STAMP.to_string()))
        );
        assert!(jpeg::parse(&out).is_ok());
    }

    #[test]
    fn test_insert_into_stream_without_exif() {
        let data = tiny_jpeg(16);
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let values = normalization_fields(ts);
        let out = write_tags(&data, &values).unwrap();

        let header = jpeg::parse(&out).unwrap();
        assert_eq!(header.segments[0].marker, APP0);
        assert_eq!(header.segments[1].marker, APP1);
        for (tag, value) in values {
            assert_eq!(read_tag(&out, tag), Some(value));
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(write_tags(b"not a jpeg", &[]).is_err());
        assert_eq!(read_tag(b"not a jpeg", Tag::DateTime), None);
    }
}
