//! Reading MPO files back into their two JPEG streams

use std::path::{Path, PathBuf};

use super::{stereo_entries, MpEntry, MpoContainer, ENTRY_LEN, MPF_SIGNATURE, TAG_MP_ENTRY};
use crate::compose::Eye;
use crate::error::{Error, Result};
use crate::output;
use crate::metadata::exif::ByteOrder;
use crate::metadata::jpeg::{self, APP2, SOI};

/// MP index read from the first stream
struct MpIndex {
    entries: Vec<MpEntry>,
    /// File offset of the MPF TIFF header
    tiff_start: usize,
}

fn read_index(data: &[u8], header: &jpeg::Header) -> Option<MpIndex> {
    let segment = header.find_app(data, APP2, MPF_SIGNATURE)?;
    let tiff_start = segment.start + 4 + MPF_SIGNATURE.len();
    let tiff = &data[tiff_start..segment.end()];
    if tiff.len() < 8 {
        return None;
    }
    let order = match &tiff[..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    let ifd = order.u32(&tiff[4..8]) as usize;
    let count = order.u16(tiff.get(ifd..ifd + 2)?) as usize;

    for i in 0..count {
        let entry = tiff.get(ifd + 2 + i * 12..ifd + 14 + i * 12)?;
        if order.u16(&entry[0..2]) != TAG_MP_ENTRY {
            continue;
        }
        let size = order.u32(&entry[4..8]) as usize;
        let offset = order.u32(&entry[8..12]) as usize;
        let table = tiff.get(offset..offset + size)?;
        let entries = table
            .chunks_exact(ENTRY_LEN)
            .filter_map(|chunk| MpEntry::from_bytes(chunk, order))
            .collect();
        return Some(MpIndex {
            entries,
            tiff_start,
        });
    }
    None
}

/// Resolve an entry to file coordinates
///
/// Offsets written by this crate count from the start of the file; camera files count
/// from the MPF TIFF header. Whichever lands on an SOI marker wins.
fn locate(data: &[u8], entry: &MpEntry, tiff_start: usize) -> Option<MpEntry> {
    if entry.offset == 0 {
        return (entry.size as usize <= data.len()).then_some(*entry);
    }
    [0, tiff_start].into_iter().find_map(|base| {
        let offset = base + entry.offset as usize;
        let end = offset + entry.size as usize;
        (end <= data.len() && data[offset..].starts_with(&SOI)).then_some(MpEntry {
            offset: u32::try_from(offset).ok()?,
            ..*entry
        })
    })
}

fn split_by_index(data: &[u8], index: &MpIndex) -> Option<MpoContainer> {
    if index.entries.len() < 2 {
        return None;
    }
    let first = locate(data, &index.entries[0], index.tiff_start)?;
    let second = locate(data, &index.entries[1], index.tiff_start)?;
    Some(MpoContainer {
        entries: [first, second],
        first: data[first.range()].to_vec(),
        second: data[second.range()].to_vec(),
    })
}

/// Find the second stream by scanning for SOI after the first stream's EOI
fn split_by_scan(data: &[u8], first_end: usize) -> Result<MpoContainer> {
    let start = data[first_end..]
        .windows(2)
        .position(|w| w == SOI)
        .map(|p| first_end + p)
        .ok_or_else(|| Error::InvalidStream("no second JPEG stream".to_string()))?;
    let second = jpeg::parse(&data[start..])?;
    let second_len = second.stream_end;

    let first_len = u32::try_from(first_end)
        .map_err(|_| Error::InvalidStream("first stream too large".to_string()))?;
    let second_len_u32 = u32::try_from(second_len)
        .map_err(|_| Error::InvalidStream("second stream too large".to_string()))?;
    let mut entries = stereo_entries(first_len, second_len_u32);
    entries[1].offset = start as u32;

    Ok(MpoContainer {
        entries,
        first: data[..first_end].to_vec(),
        second: data[start..start + second_len].to_vec(),
    })
}

/// Split MPO bytes into their two JPEG streams
///
/// Uses the MPF index when present, otherwise falls back to scanning for the
/// second stream after the first one ends.
pub fn split(data: &[u8]) -> Result<MpoContainer> {
    let header = jpeg::parse(data)?;

    if let Some(index) = read_index(data, &header) {
        if let Some(container) = split_by_index(data, &index) {
            return Ok(container);
        }
        log::warn!("MPF index does not match the file layout; scanning for streams");
    }
    split_by_scan(data, header.stream_end)
}

/// Read and split an MPO file
pub fn split_file(path: &Path) -> Result<MpoContainer> {
    let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    split(&data).map_err(|e| match e {
        Error::InvalidStream(reason) => {
            Error::InvalidStream(format!("{}: {}", path.display(), reason))
        }
        other => other,
    })
}

/// Split an MPO file into `<out_dir>/left/<stem>_l.jpg` and `<out_dir>/right/<stem>_r.jpg`
pub fn split_to_eyes(path: &Path, out_dir: &Path) -> Result<[PathBuf; 2]> {
    let container = split_file(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let write = |eye: Eye| -> Result<PathBuf> {
        let target = out_dir
            .join(eye.dir_name())
            .join(format!("{}{}.jpg", stem, eye.suffix()));
        output::write_atomic(&target, container.stream(eye))?;
        Ok(target)
    };
    let left = write(Eye::Left)?;
    let right = write(Eye::Right)?;
    log::debug!("Split {} into {} and {}", path.display(), left.display(), right.display());
    Ok([left, right])
}
