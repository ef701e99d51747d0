//! Batch outcome summary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::library::Pair;
use crate::output;

/// Name of the summary written into the output root
pub const REPORT_FILE_NAME: &str = "stereo-maker.log.json";

/// A pair that could not be processed, and why
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SkippedPair {
    pub left: PathBuf,
    pub right: PathBuf,
    /// Short error kind, e.g. `alignment` or `invalid_stream`
    pub kind: String,
    pub reason: String,
}

impl SkippedPair {
    pub fn new(pair: &Pair, error: &Error) -> Self {
        Self {
            left: pair.left.path.clone(),
            right: pair.right.path.clone(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    /// A single-file input such as an MPO; both sides name the same file
    pub fn for_file(path: &Path, error: &Error) -> Self {
        Self {
            left: path.to_path_buf(),
            right: path.to_path_buf(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub source: PathBuf,
    pub output_root: PathBuf,
    /// Local start time, RFC 3339
    pub started_at: String,
    pub total_pairs: usize,
    /// Pairs that produced every requested output
    pub completed: usize,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedPair>,
    /// Images the matcher left unpaired
    pub singles: Vec<PathBuf>,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl BatchReport {
    pub fn new(source: &Path, output_root: &Path, total_pairs: usize) -> Self {
        Self {
            source: source.to_path_buf(),
            output_root: output_root.to_path_buf(),
            started_at: chrono::Local::now().to_rfc3339(),
            total_pairs,
            ..Self::default()
        }
    }

    /// Pairs attempted so far (completed or skipped)
    pub fn attempted(&self) -> usize {
        self.completed + self.skipped.len()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the summary as JSON to `path`
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self
            .to_json()
            .map_err(|e| Error::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        output::write_atomic(path, json.as_bytes())
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} pairs completed, {} skipped, {} files written, {} singles",
            self.completed,
            self.total_pairs,
            self.skipped.len(),
            self.written.len(),
            self.singles.len()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
