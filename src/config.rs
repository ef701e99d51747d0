//! Batch configuration
//!
//! Every threshold the matcher, aligner and driver use lives here and is passed
//! explicitly into each batch. The struct is serialized to JSON so a config file can
//! sit next to the user's other settings; CLI flags override individual fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::align::AlignConfig;
use crate::compose::StereoFormat;
use crate::error::{Error, Result};
use crate::library::TimestampSource;
use crate::pairing::{MatchConfig, PairingMode};

/// Smallest time window accepted from user input (seconds)
const MIN_TIME_DIFF: f64 = 0.01;

/// Output products a batch can be asked for
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Anaglyph,
    SideBySide,
    SideBySideReversed,
    LeftRightLeft,
    Mpo,
}

impl OutputFormat {
    /// The pixel composition behind this output, `None` for MPO containers
    pub fn stereo(self) -> Option<StereoFormat> {
        match self {
            OutputFormat::Anaglyph => Some(StereoFormat::Anaglyph),
            OutputFormat::SideBySide => Some(StereoFormat::SideBySide),
            OutputFormat::SideBySideReversed => Some(StereoFormat::SideBySideReversed),
            OutputFormat::LeftRightLeft => Some(StereoFormat::LeftRightLeft),
            OutputFormat::Mpo => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anaglyph" | "rc" => Ok(OutputFormat::Anaglyph),
            "side_by_side" | "sbs" | "parallel" | "ii" => Ok(OutputFormat::SideBySide),
            "side_by_side_reversed" | "crossview" | "xi" => Ok(OutputFormat::SideBySideReversed),
            "left_right_left" | "lrl" => Ok(OutputFormat::LeftRightLeft),
            "mpo" => Ok(OutputFormat::Mpo),
            other => Err(Error::Config(format!("unknown output format '{}'", other))),
        }
    }
}

/// All options recognised by a batch run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Maximum capture-time gap between two members of a pair (seconds)
    pub time_diff_threshold: f64,

    /// Perceptual hashes must differ by strictly less than this many bits
    pub hash_diff_threshold: u32,

    pub pairing_mode: PairingMode,

    /// Shorthand for `pairing_mode: strict`
    pub strict_adjacency: bool,

    /// Match each folder on its own instead of across the whole scan
    pub per_folder: bool,

    pub requested_formats: BTreeSet<OutputFormat>,

    /// Descend into subfolders when scanning
    pub recursive: bool,

    pub timestamp_source: TimestampSource,

    /// Quality used when encoding composited JPEGs (1-100)
    pub jpeg_quality: u8,

    /// Output root; defaults to a `_3d_<name>` sibling of the source folder
    pub output_dir: Option<PathBuf>,

    pub alignment: AlignConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_diff_threshold: 2.0,
            hash_diff_threshold: 10,
            pairing_mode: PairingMode::Greedy,
            strict_adjacency: false,
            per_folder: true,
            requested_formats: BTreeSet::from([OutputFormat::Anaglyph]),
            recursive: false,
            timestamp_source: TimestampSource::default(),
            jpeg_quality: 95,
            output_dir: None,
            alignment: AlignConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the config file
    ///
    /// - Linux: ~/.config/stereo-maker/config.json
    /// - macOS: ~/Library/Application Support/stereo-maker/config.json
    /// - Windows: %APPDATA%\stereo-maker\config.json
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("stereo-maker");
        path.push("config.json");
        Some(path)
    }

    /// Load a config file, filling missing fields with defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Config = Self::from_json(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config.sanitized())
    }

    /// Load from `path` if given, else from the default location if it exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.is_file() => {
                    log::debug!("Loading config from {}", default.display());
                    Self::load(&default)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Clamp user-provided values into their usable ranges
    pub fn sanitized(mut self) -> Self {
        if !(self.time_diff_threshold >= MIN_TIME_DIFF) {
            self.time_diff_threshold = MIN_TIME_DIFF;
        }
        self.hash_diff_threshold = self.hash_diff_threshold.max(1);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self
    }

    pub fn pairing_mode(&self) -> PairingMode {
        if self.strict_adjacency {
            PairingMode::Strict
        } else {
            self.pairing_mode
        }
    }

    /// Matcher view of this configuration
    pub fn matching(&self) -> MatchConfig {
        MatchConfig {
            time_diff_threshold: self.time_diff_threshold,
            hash_diff_threshold: self.hash_diff_threshold,
            mode: self.pairing_mode(),
            per_folder: self.per_folder,
            ..MatchConfig::default()
        }
    }

    /// Pixel formats to composite, in a stable order
    pub fn stereo_formats(&self) -> Vec<StereoFormat> {
        self.requested_formats
            .iter()
            .filter_map(|f| f.stereo())
            .collect()
    }

    pub fn wants_mpo(&self) -> bool {
        self.requested_formats.contains(&OutputFormat::Mpo)
    }

    /// Alignment is only needed when at least one pixel format is requested
    pub fn needs_alignment(&self) -> bool {
        self.requested_formats.iter().any(|f| f.stereo().is_some())
    }

    /// Resolve the output root for a given source folder
    pub fn output_root(&self, source: &Path) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "images".to_string());
        let parent = source.parent().unwrap_or(source);
        parent.join(format!("_3d_{}", name))
    }
}
