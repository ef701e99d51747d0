//! Stereogram compositing
//!
//! Pure pixel transforms over two equally sized RGB buffers. No resizing or
//! alignment happens here; mismatched inputs are rejected.

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Viewable stereogram layouts
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StereoFormat {
    /// Red from the left eye, green and blue from the right
    Anaglyph,
    /// Parallel viewing: left | right
    SideBySide,
    /// Cross-eyed viewing: right | left
    SideBySideReversed,
    /// left | right | left, viewable either way
    LeftRightLeft,
}

impl StereoFormat {
    pub const ALL: [StereoFormat; 4] = [
        StereoFormat::Anaglyph,
        StereoFormat::SideBySide,
        StereoFormat::SideBySideReversed,
        StereoFormat::LeftRightLeft,
    ];

    /// Output file name prefix
    pub fn prefix(self) -> &'static str {
        match self {
            StereoFormat::Anaglyph => "rc_",
            StereoFormat::SideBySide => "ii_",
            StereoFormat::SideBySideReversed => "xi_",
            StereoFormat::LeftRightLeft => "lrl_",
        }
    }

    /// Output folder name
    pub fn dir_name(self) -> &'static str {
        match self {
            StereoFormat::Anaglyph => "rc",
            StereoFormat::SideBySide => "ii",
            StereoFormat::SideBySideReversed => "xi",
            StereoFormat::LeftRightLeft => "lrl",
        }
    }

    /// Width of the output canvas in multiples of the input width
    pub fn width_factor(self) -> u32 {
        match self {
            StereoFormat::Anaglyph => 1,
            StereoFormat::SideBySide | StereoFormat::SideBySideReversed => 2,
            StereoFormat::LeftRightLeft => 3,
        }
    }

    pub fn compose(self, left: &RgbImage, right: &RgbImage) -> Result<RgbImage> {
        match self {
            StereoFormat::Anaglyph => anaglyph(left, right),
            StereoFormat::SideBySide => side_by_side(left, right),
            StereoFormat::SideBySideReversed => side_by_side_reversed(left, right),
            StereoFormat::LeftRightLeft => left_right_left(left, right),
        }
    }
}

impl std::fmt::Display for StereoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StereoFormat::Anaglyph => "anaglyph",
            StereoFormat::SideBySide => "side-by-side",
            StereoFormat::SideBySideReversed => "crossview",
            StereoFormat::LeftRightLeft => "left-right-left",
        };
        f.write_str(name)
    }
}

/// A single eye extracted from a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Suffix appended to the source stem
    pub fn suffix(self) -> &'static str {
        match self {
            Eye::Left => "_l",
            Eye::Right => "_r",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

fn check_dimensions(left: &RgbImage, right: &RgbImage) -> Result<()> {
    if left.dimensions() != right.dimensions() {
        return Err(Error::DimensionMismatch {
            left: left.dimensions(),
            right: right.dimensions(),
        });
    }
    Ok(())
}

/// Lay out images in a row on a canvas of `images.len()` widths
fn tile(images: &[&RgbImage]) -> RgbImage {
    let (w, h) = images.first().map(|i| i.dimensions()).unwrap_or((0, 0));
    let mut canvas = RgbImage::new(w * images.len() as u32, h);
    for (i, img) in images.iter().enumerate() {
        imageops::replace(&mut canvas, *img, w as i64 * i as i64, 0);
    }
    canvas
}

/// Red/cyan anaglyph, W x H
pub fn anaglyph(left: &RgbImage, right: &RgbImage) -> Result<RgbImage> {
    check_dimensions(left, right)?;
    let mut out = right.clone();
    for (dst, src) in out.pixels_mut().zip(left.pixels()) {
        dst[0] = src[0];
    }
    Ok(out)
}

/// left | right, 2W x H
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> Result<RgbImage> {
    check_dimensions(left, right)?;
    Ok(tile(&[left, right]))
}

/// right | left, 2W x H
pub fn side_by_side_reversed(left: &RgbImage, right: &RgbImage) -> Result<RgbImage> {
    check_dimensions(left, right)?;
    Ok(tile(&[right, left]))
}

/// left | right | left, 3W x H
pub fn left_right_left(left: &RgbImage, right: &RgbImage) -> Result<RgbImage> {
    check_dimensions(left, right)?;
    Ok(tile(&[left, right, left]))
}
