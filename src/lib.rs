//! Stereo photo toolkit
//!
//! Finds left/right pairs in a folder of photos, aligns the right image onto the
//! left, renders stereograms (anaglyph, parallel, crossview, left-right-left) and
//! packages pairs as MPO files.

pub mod align;
pub mod batch;
pub mod compose;
pub mod config;
pub mod error;
pub mod library;
pub mod metadata;
pub mod mpo;
pub mod organize;
pub mod output;
pub mod pairing;
pub mod similarity;

pub use align::{AlignConfig, AlignedPair, Aligner};
pub use batch::{BatchReport, BatchRunner, PauseToken};
pub use compose::{Eye, StereoFormat};
pub use config::{Config, OutputFormat};
pub use error::{AlignmentError, Error, Result};
pub use library::{ImageRecord, Matching, Pair};
pub use mpo::{MpoContainer, MpoEncoder};
pub use pairing::{pair_images, MatchConfig, PairingMode};
pub use similarity::{PerceptualHasher, Similarity};
