//! Folder scanning
//!
//! Turns a directory into a list of `ImageRecord`s with resolved capture times.
//! Generated output folders (`_3d_*`), sorter folders and hidden directories are
//! never descended into, so re-running a batch does not pick up its own products.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::data::ImageRecord;
use crate::error::{Error, Result};
use crate::metadata;

/// Extensions of still images the matcher accepts
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Extensions of multi-picture files the splitter accepts
pub const MPO_EXTENSIONS: [&str; 1] = ["mpo"];

/// Folder names the sorter creates
pub const PAIRS_DIR: &str = "_pairs";
pub const SINGLES_DIR: &str = "_singles";

/// Prefix of generated output roots
pub const OUTPUT_PREFIX: &str = "_3d_";

/// Where an image's capture time comes from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Exif capture time only; files without one get no timestamp
    Exif,
    /// File modification time only
    Modified,
    /// Exif capture time, falling back to modification time
    #[default]
    ExifOrModified,
}

impl std::str::FromStr for TimestampSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exif" => Ok(TimestampSource::Exif),
            "modified" | "mtime" => Ok(TimestampSource::Modified),
            "exif_or_modified" | "auto" => Ok(TimestampSource::ExifOrModified),
            other => Err(Error::Config(format!("unknown timestamp source '{}'", other))),
        }
    }
}

/// Directories the scan never enters (the root itself is always scanned)
fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with(OUTPUT_PREFIX)
        || name.starts_with('.')
        || name == PAIRS_DIR
        || name == SINGLES_DIR
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

/// List files under `root` with one of `extensions`, sorted by path
pub fn list_files(root: &Path, recursive: bool, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Modification time of a file in local time
fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

/// Resolve a file's capture time according to `source`
pub fn resolve_timestamp(path: &Path, source: TimestampSource) -> Option<NaiveDateTime> {
    let from_exif = || match metadata::capture_time(path) {
        Ok(ts) => ts,
        Err(e) => {
            log::debug!("No Exif time for {}: {}", path.display(), e);
            None
        }
    };
    match source {
        TimestampSource::Exif => from_exif(),
        TimestampSource::Modified => modified_time(path),
        TimestampSource::ExifOrModified => from_exif().or_else(|| modified_time(path)),
    }
}

/// Build a record for a single file
pub fn read_record(path: &Path, source: TimestampSource) -> Result<ImageRecord> {
    let byte_size = std::fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
    Ok(ImageRecord::new(
        path,
        resolve_timestamp(path, source),
        byte_size,
    ))
}

/// Scan a folder for still images
pub fn scan_folder(
    root: &Path,
    recursive: bool,
    source: TimestampSource,
) -> Result<Vec<ImageRecord>> {
    log::info!("Scanning folder: {}", root.display());

    let mut records = Vec::new();
    for path in list_files(root, recursive, &IMAGE_EXTENSIONS)? {
        match read_record(&path, source) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    let undated = records.iter().filter(|r| r.timestamp.is_none()).count();
    log::info!(
        "Found {} images ({} without a timestamp)",
        records.len(),
        undated
    );
    Ok(records)
}

/// Scan a folder for MPO files
pub fn scan_mpo(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    list_files(root, recursive, &MPO_EXTENSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_skips_generated_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.JPG"));
        touch(&root.join("b.png"));
        touch(&root.join("notes.txt"));
        touch(&root.join("sub/c.jpeg"));
        touch(&root.join("_3d_old/rc/rc_a.jpg"));
        touch(&root.join("_pairs/d.jpg"));
        touch(&root.join(".cache/e.jpg"));

        let flat = list_files(root, false, &IMAGE_EXTENSIONS).unwrap();
        assert_eq!(flat, vec![root.join("a.JPG"), root.join("b.png")]);

        let deep = list_files(root, true, &IMAGE_EXTENSIONS).unwrap();
        assert_eq!(
            deep,
            vec![root.join("a.JPG"), root.join("b.png"), root.join("sub/c.jpeg")]
        );
    }

    #[test]
    fn test_scan_records_use_mtime_fallback() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));

        let records = scan_folder(dir.path(), false, TimestampSource::ExifOrModified).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].byte_size, 1);
        assert!(records[0].timestamp.is_some());

        let exif_only = scan_folder(dir.path(), false, TimestampSource::Exif).unwrap();
        assert_eq!(exif_only[0].timestamp, None);
    }

    #[test]
    fn test_scan_missing_root() {
        assert!(matches!(
            scan_folder(Path::new("/nonexistent/folder"), false, TimestampSource::Modified),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_scan_mpo() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.MPO"));
        touch(&dir.path().join("y.jpg"));
        assert_eq!(scan_mpo(dir.path(), false).unwrap(), vec![dir.path().join("x.MPO")]);
    }

    #[test]
    fn test_timestamp_source_names() {
        assert_eq!("mtime".parse::<TimestampSource>().unwrap(), TimestampSource::Modified);
        assert!("gps".parse::<TimestampSource>().is_err());
    }
}
