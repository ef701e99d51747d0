//! Output file handling
//!
//! Every product is encoded in memory first and then written through a temporary
//! sibling that is renamed into place, so an interrupted batch never leaves a
//! truncated file behind.

use atomic_write_file::AtomicWriteFile;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Encode an RGB buffer as a baseline JPEG stream
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(Error::Encode)?;
    Ok(buffer)
}

/// Create a directory and its parents
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Write `bytes` to `path` atomically, creating parent directories
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let mut file = AtomicWriteFile::open(path).map_err(|e| Error::io(path, e))?;
    file.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.commit().map_err(|e| Error::io(path, e))?;
    Ok(())
}
