//! Sorting originals into `_pairs/` and `_singles/`

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::library::scan::{PAIRS_DIR, SINGLES_DIR};
use crate::library::Matching;

/// Sidecar that does not keep a folder alive
const PICASA_INI: &str = ".picasa.ini";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Files moved into a `_pairs` folder
    pub paired: usize,
    /// Files moved into a `_singles` folder
    pub singles: usize,
    /// Files that were already sorted or no longer exist
    pub untouched: usize,
}

/// Move `path` into `<its dir>/<folder>/`; `Ok(false)` when nothing was moved
fn move_into(path: &Path, folder: &str) -> Result<bool> {
    let Some(dir) = path.parent() else {
        return Ok(false);
    };
    if dir.file_name().is_some_and(|name| name == folder) || !path.is_file() {
        return Ok(false);
    }
    let Some(name) = path.file_name() else {
        return Ok(false);
    };

    let dest_dir = dir.join(folder);
    std::fs::create_dir_all(&dest_dir).map_err(|e| Error::io(&dest_dir, e))?;
    let dest = dest_dir.join(name);
    if dest.exists() {
        log::warn!("{} already exists, leaving {} in place", dest.display(), path.display());
        return Ok(false);
    }
    std::fs::rename(path, &dest).map_err(|e| Error::io(path, e))?;
    log::debug!("Moved {} -> {}", path.display(), dest.display());
    Ok(true)
}

/// Move matched files next to where they were found
pub fn organize(matching: &Matching) -> Result<SortSummary> {
    let mut summary = SortSummary::default();

    let paired = matching
        .pairs
        .iter()
        .flat_map(|pair| [&pair.left.path, &pair.right.path]);
    for path in paired {
        if move_into(path, PAIRS_DIR)? {
            summary.paired += 1;
        } else {
            summary.untouched += 1;
        }
    }

    for record in &matching.singles {
        if move_into(&record.path, SINGLES_DIR)? {
            summary.singles += 1;
        } else {
            summary.untouched += 1;
        }
    }

    log::info!(
        "Sorted {} paired and {} single files ({} left in place)",
        summary.paired,
        summary.singles,
        summary.untouched
    );
    Ok(summary)
}

fn is_effectively_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .all(|e| e.file_name() == PICASA_INI),
        Err(_) => false,
    }
}

/// Remove directories under `root` that are empty (or hold only a `.picasa.ini`)
///
/// `root` itself is kept. Returns the removed directories, deepest first.
pub fn remove_empty_dirs(root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let dirs = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir());

    for entry in dirs {
        let dir = entry.path();
        if !is_effectively_empty(dir) {
            continue;
        }
        let sidecar = dir.join(PICASA_INI);
        if sidecar.is_file() {
            if let Err(e) = std::fs::remove_file(&sidecar) {
                log::warn!("Could not remove {}: {}", sidecar.display(), e);
                continue;
            }
        }
        match std::fs::remove_dir(dir) {
            Ok(()) => removed.push(dir.to_path_buf()),
            Err(e) => log::warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
    removed
}
