//! Image library module
//!
//! This module handles:
//! - The records that flow through a batch (data.rs)
//! - Scanning folders and resolving capture times (scan.rs)

pub mod data;
pub mod scan;

pub use data::{ImageRecord, Matching, Pair};
pub use scan::{scan_folder, scan_mpo, TimestampSource};
