//! Multi-Picture Object (MPO) containers
//!
//! An MPO file is two JPEG streams back to back. The first stream carries an
//! APP2 "MPF" segment whose index IFD lists both images by attribute, size and offset.
//!
//! Index layout written here (big-endian TIFF inside the APP2 payload):
//!
//! | offset | field                                          |
//! |--------|------------------------------------------------|
//! | 0      | `"MPF\0"`                                      |
//! | 4      | `MM 00 2A 00 00 00 08`                         |
//! | 12     | entry count = 3                                |
//! | 14     | MPFVersion (B000, UNDEFINED x4, `"0100"`)      |
//! | 26     | NumberOfImages (B001, LONG, 2)                 |
//! | 38     | MPEntry (B002, UNDEFINED x32, offset 50)       |
//! | 50     | next IFD = 0                                   |
//! | 54     | two 16-byte MP entries                         |
//!
//! Entry offsets are counted from the first byte of the file.

pub mod encoder;
pub mod split;

pub use encoder::{encode, write_mpo, MpoEncoder};
pub use split::split;

use crate::compose::Eye;
use crate::metadata::exif::ByteOrder;

pub const MPF_SIGNATURE: &[u8] = b"MPF\0";

/// Attribute of the primary (left) image
pub const ATTR_PRIMARY: u32 = 0x0000_0000;
/// Attribute of the stereo right-eye image
pub const ATTR_STEREO_RIGHT: u32 = 0x0002_0000;

pub const MP_TYPE_STEREO: &str = "Baseline Stereo Image";

pub const TAG_MPF_VERSION: u16 = 0xB000;
pub const TAG_NUMBER_OF_IMAGES: u16 = 0xB001;
pub const TAG_MP_ENTRY: u16 = 0xB002;

pub const MPF_VERSION: &[u8; 4] = b"0100";

/// Size of one MP entry record
pub const ENTRY_LEN: usize = 16;

/// One image in the MP index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpEntry {
    pub attribute: u32,
    pub size: u32,
    pub offset: u32,
    /// Dependent-image entry numbers; always 0 for stereo pairs
    pub dependency: u32,
}

impl MpEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        out[0..4].copy_from_slice(&self.attribute.to_be_bytes());
        out[4..8].copy_from_slice(&self.size.to_be_bytes());
        out[8..12].copy_from_slice(&self.offset.to_be_bytes());
        out[12..16].copy_from_slice(&self.dependency.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Option<Self> {
        if bytes.len() < ENTRY_LEN {
            return None;
        }
        Some(Self {
            attribute: order.u32(&bytes[0..4]),
            size: order.u32(&bytes[4..8]),
            offset: order.u32(&bytes[8..12]),
            dependency: order.u32(&bytes[12..16]),
        })
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }
}

/// Index entries for a stereo pair whose streams are `first_len` and `second_len` bytes
pub fn stereo_entries(first_len: u32, second_len: u32) -> [MpEntry; 2] {
    [
        MpEntry {
            attribute: ATTR_PRIMARY,
            size: first_len,
            offset: 0,
            dependency: 0,
        },
        MpEntry {
            attribute: ATTR_STEREO_RIGHT,
            size: second_len,
            offset: first_len,
            dependency: 0,
        },
    ]
}

/// Two JPEG streams plus their index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpoContainer {
    pub entries: [MpEntry; 2],
    /// Left stream, including its MPF segment
    pub first: Vec<u8>,
    /// Right stream
    pub second: Vec<u8>,
}

impl MpoContainer {
    pub fn number_of_images(&self) -> usize {
        self.entries.len()
    }

    /// Logical MP type derived from the entry attributes
    pub fn mp_type(&self) -> &'static str {
        if self.entries[0].attribute == ATTR_PRIMARY
            && self.entries[1].attribute == ATTR_STEREO_RIGHT
        {
            MP_TYPE_STEREO
        } else {
            "Undefined"
        }
    }

    /// The JPEG stream shown to one eye
    pub fn stream(&self, eye: Eye) -> &[u8] {
        match eye {
            Eye::Left => &self.first,
            Eye::Right => &self.second,
        }
    }

    /// Physical file contents
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.first.len() + self.second.len());
        out.extend_from_slice(&self.first);
        out.extend_from_slice(&self.second);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_entries_for_known_lengths() {
        let [first, second] = stereo_entries(1000, 2000);
        assert_eq!(
            first,
            MpEntry {
                attribute: 0x0000_0000,
                size: 1000,
                offset: 0,
                dependency: 0
            }
        );
        assert_eq!(
            second,
            MpEntry {
                attribute: 0x0002_0000,
                size: 2000,
                offset: 1000,
                dependency: 0
            }
        );
        assert_eq!(second.range(), 1000..3000);
    }

    #[test]
    fn test_entry_bytes() {
        let entry = stereo_entries(0x0102_0304, 7)[1];
        let bytes = entry.to_bytes();
        assert_eq!(&bytes[0..4], &[0x00, 0x02, 0x00, 0x00]);
        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(MpEntry::from_bytes(&bytes, ByteOrder::Big), Some(entry));
    }

    #[test]
    fn test_mp_type() {
        let container = MpoContainer {
            entries: stereo_entries(1, 1),
            first: vec![1],
            second: vec![2],
        };
        assert_eq!(container.mp_type(), "Baseline Stereo Image");
        assert_eq!(container.number_of_images(), 2);
        assert_eq!(container.to_bytes(), vec![1, 2]);
        assert_eq!(container.stream(Eye::Right), &[2]);
    }
}
