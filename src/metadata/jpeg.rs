//! JPEG marker-segment walking
//!
//! Only the header part of a stream is parsed (everything before the first SOS).
//! Entropy-coded data is never interpreted; the end of a stream is located by
//! scanning for EOI after the headers, where `FF D9` cannot appear byte-stuffed.

use crate::error::{Error, Result};

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP2: u8 = 0xE2;
pub const SOS: u8 = 0xDA;

/// A marker segment inside a JPEG stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub marker: u8,
    /// Offset of the 0xFF that starts the marker
    pub start: usize,
    /// Total length in bytes, including marker and length field
    pub len: usize,
}

impl Segment {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Segment payload (after the 2-byte length field)
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        if self.len <= 4 {
            return &[];
        }
        &data[self.start + 4..self.end()]
    }

    pub fn is_app(&self) -> bool {
        (0xE0..=0xEF).contains(&self.marker)
    }
}

/// Iterator over header segments, stopping after SOS
pub struct Segments<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

/// Walk the header segments of `data`
///
/// Fails immediately if the stream does not start with SOI.
pub fn segments(data: &[u8]) -> Result<Segments<'_>> {
    if !data.starts_with(&SOI) {
        return Err(Error::InvalidStream("missing SOI marker".to_string()));
    }
    Ok(Segments {
        data,
        pos: 2,
        done: false,
    })
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let data = self.data;

        // Skip fill bytes between segments
        let mut pos = self.pos;
        if pos >= data.len() || data[pos] != 0xFF {
            self.done = true;
            return Some(Err(Error::InvalidStream(format!(
                "expected marker at offset {}",
                pos
            ))));
        }
        while pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            self.done = true;
            return Some(Err(Error::InvalidStream("truncated marker".to_string())));
        }

        let marker = data[pos + 1];
        let segment = if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            // Standalone markers carry no length field
            Segment {
                marker,
                start: pos,
                len: 2,
            }
        } else {
            if pos + 4 > data.len() {
                self.done = true;
                return Some(Err(Error::InvalidStream(
                    "truncated segment length".to_string(),
                )));
            }
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            if length < 2 || pos + 2 + length > data.len() {
                self.done = true;
                return Some(Err(Error::InvalidStream(format!(
                    "segment 0xFF{:02X} at offset {} overruns the stream",
                    marker, pos
                ))));
            }
            Segment {
                marker,
                start: pos,
                len: 2 + length,
            }
        };

        if marker == SOS || marker == EOI[1] {
            self.done = true;
        }
        self.pos = segment.end();
        Some(Ok(segment))
    }
}

/// Parsed header of a complete JPEG stream
#[derive(Debug, Clone)]
pub struct Header {
    pub segments: Vec<Segment>,
    /// Offset just past the EOI marker that ends this stream
    pub stream_end: usize,
}

impl Header {
    /// Insertion point for new APPn segments: after SOI and any leading APP0/APP1
    pub fn app_insert_offset(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| s.marker == APP0 || s.marker == APP1)
            .last()
            .map(|s| s.end())
            .unwrap_or(2)
    }

    /// First APPn segment whose payload starts with `signature`
    pub fn find_app(&self, data: &[u8], marker: u8, signature: &[u8]) -> Option<Segment> {
        self.segments
            .iter()
            .copied()
            .find(|s| s.marker == marker && s.payload(data).starts_with(signature))
    }
}

/// Validate a complete stream and locate its end
///
/// A valid stream starts with SOI, has well-formed header segments up to a SOS,
/// and contains an EOI after the headers.
pub fn parse(data: &[u8]) -> Result<Header> {
    let mut found = Vec::new();
    let mut sos_end = None;
    for segment in segments(data)? {
        let segment = segment?;
        if segment.marker == EOI[1] {
            return Err(Error::InvalidStream("EOI before any scan data".to_string()));
        }
        found.push(segment);
        if segment.marker == SOS {
            sos_end = Some(segment.end());
        }
    }
    let sos_end = sos_end.ok_or_else(|| Error::InvalidStream("no SOS segment".to_string()))?;

    let eoi = data[sos_end..]
        .windows(2)
        .position(|w| w == EOI)
        .map(|p| sos_end + p + 2)
        .ok_or_else(|| Error::InvalidStream("missing EOI marker".to_string()))?;

    Ok(Header {
        segments: found,
        stream_end: eoi,
    })
}

/// Build a complete APPn segment from a payload
pub fn build_app_segment(marker: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = payload.len() + 2;
    if length > u16::MAX as usize {
        return Err(Error::InvalidStream(format!(
            "APP segment payload of {} bytes is too large",
            payload.len()
        )));
    }
    let mut segment = Vec::with_capacity(length + 2);
    segment.extend_from_slice(&[0xFF, marker]);
    segment.extend_from_slice(&(length as u16).to_be_bytes());
    segment.extend_from_slice(payload);
    Ok(segment)
}

/// Return a copy of `data` with `bytes` spliced in at `offset`, replacing `remove` bytes
pub fn splice(data: &[u8], offset: usize, remove: usize, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + bytes.len() - remove.min(data.len()));
    out.extend_from_slice(&data[..offset]);
    out.extend_from_slice(bytes);
    out.extend_from_slice(&data[offset + remove..]);
    out
}
