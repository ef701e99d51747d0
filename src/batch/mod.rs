//! Batch driver
//!
//! Runs the per-pair pipeline (align, composite, package) over a matched folder on
//! one background worker. Pairs are processed in order; a failing pair is logged and
//! recorded as skipped without stopping the batch. Existing MPO files go through the
//! same loop, rendered straight from their two streams.
//!
//! - `pause`: condvar-backed pause / cancel token checked between pairs
//! - `report`: the JSON summary written at the end of a batch

pub mod pause;
pub mod report;

pub use pause::PauseToken;
pub use report::{BatchReport, SkippedPair, REPORT_FILE_NAME};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;

use crate::align::Aligner;
use crate::compose::Eye;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::{self, ImageRecord, Matching, Pair};
use crate::mpo::{self, MpoEncoder};
use crate::output;
use crate::pairing::{self, LEFT_DIR};
use crate::similarity::PerceptualHasher;

/// Folder holding MPO outputs inside an output directory
pub const MPO_DIR: &str = "mpo";

/// Progress callback: (pairs done, total pairs)
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Scan `source` and match its images with the configured policy
///
/// A `Left/` + `Right/` layout directly under `source` is zipped by file name;
/// anything else goes through the time/similarity matcher.
pub fn match_folder(source: &Path, config: &Config) -> Result<Matching> {
    if let Some((left_dir, right_dir)) = pairing::find_folder_layout(source) {
        log::info!("Found Left/Right folders in {}", source.display());
        let left = library::scan_folder(&left_dir, config.recursive, config.timestamp_source)?;
        let right = library::scan_folder(&right_dir, config.recursive, config.timestamp_source)?;
        return Ok(pairing::pair_by_folders(&left, &right));
    }

    let images = library::scan_folder(source, config.recursive, config.timestamp_source)?;
    let hasher = PerceptualHasher::new();
    let matching = pairing::pair_images(&images, &config.matching(), &hasher);
    log::info!(
        "Matched {} pairs, {} singles",
        matching.pairs.len(),
        matching.singles.len()
    );
    Ok(matching)
}

/// Directory of `dir` relative to the source root, minus a trailing `Left` folder
fn relative_dir(dir: &Path, source: &Path) -> PathBuf {
    let rel = dir.strip_prefix(source).unwrap_or(Path::new(""));
    match rel.file_name() {
        Some(name) if name == LEFT_DIR => rel.parent().unwrap_or(Path::new("")).to_path_buf(),
        _ => rel.to_path_buf(),
    }
}

/// Output stem for each pair, in order
///
/// Normally the left image's stem. When two left images in one folder share a stem
/// (`IMG_1.jpg` and `IMG_1.png`), both get their extension appended (`IMG_1_jpg`).
pub fn output_stems(pairs: &[Pair]) -> Vec<String> {
    let key = |record: &ImageRecord| (record.dir().to_path_buf(), record.stem().to_lowercase());
    let mut counts: HashMap<(PathBuf, String), usize> = HashMap::new();
    for pair in pairs {
        *counts.entry(key(&pair.left)).or_default() += 1;
    }

    pairs
        .iter()
        .map(|pair| {
            let stem = pair.left.stem();
            if counts.get(&key(&pair.left)).copied().unwrap_or(0) < 2 {
                return stem;
            }
            match pair.left.path.extension() {
                Some(ext) => format!("{}_{}", stem, ext.to_string_lossy().to_lowercase()),
                None => stem,
            }
        })
        .collect()
}

pub struct BatchRunner {
    config: Config,
    aligner: Aligner,
    encoder: MpoEncoder,
    pause: PauseToken,
    progress: Option<Box<ProgressFn>>,
}

impl BatchRunner {
    pub fn new(config: Config) -> Self {
        let aligner = Aligner::new(config.alignment.clone());
        Self {
            config,
            aligner,
            encoder: MpoEncoder::new(),
            pause: PauseToken::new(),
            progress: None,
        }
    }

    /// Share a pause token with the caller
    pub fn with_pause_token(mut self, token: PauseToken) -> Self {
        self.pause = token;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn pause_token(&self) -> PauseToken {
        self.pause.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared driver loop: pause checks, skip recording, progress and the summary file
    fn drive<T>(
        &self,
        source: &Path,
        items: &[T],
        singles: Vec<PathBuf>,
        describe: impl Fn(&T) -> String,
        mut work: impl FnMut(usize, &T, &Path, &mut Vec<PathBuf>) -> Result<()>,
        skipped: impl Fn(&T, &Error) -> SkippedPair,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let root = self.config.output_root(source);
        output::ensure_dir(&root)?;

        let total = items.len();
        let mut report = BatchReport::new(source, &root, total);
        report.singles = singles;
        log::info!("Processing {} items into {}", total, root.display());

        for (index, item) in items.iter().enumerate() {
            if !self.pause.wait_if_paused() {
                log::warn!("Batch cancelled after {} of {} items", index, total);
                report.cancelled = true;
                break;
            }

            log::info!("Processing {}/{}: {}", index + 1, total, describe(item));
            match work(index, item, &root, &mut report.written) {
                Ok(()) => report.completed += 1,
                Err(e) => {
                    log::warn!("Skipping {}: {}", describe(item), e);
                    report.skipped.push(skipped(item, &e));
                }
            }

            if let Some(progress) = &self.progress {
                progress(index + 1, total);
            }
        }

        report.elapsed_secs = started.elapsed().as_secs_f64();
        if let Err(e) = report.write_json(&root.join(REPORT_FILE_NAME)) {
            log::warn!("Could not write batch summary: {}", e);
        }
        log::info!("Batch finished: {}", report);
        Ok(report)
    }

    /// Process every pair of `matching` on the current thread
    ///
    /// Fails only when the output root cannot be created; per-pair failures end up
    /// in the report.
    pub fn run_blocking(&self, source: &Path, matching: &Matching) -> Result<BatchReport> {
        let stems = output_stems(&matching.pairs);
        let singles = matching.singles.iter().map(|r| r.path.clone()).collect();
        self.drive(
            source,
            &matching.pairs,
            singles,
            |pair| pair.to_string(),
            |index, pair, root, written| {
                self.process_pair(pair, &stems[index], source, root, written)
            },
            SkippedPair::new,
        )
    }

    /// Render the requested stereo formats from existing MPO files
    ///
    /// Each file counts as one pair in the report; unreadable files are skipped.
    pub fn run_mpo_blocking(&self, source: &Path, files: &[PathBuf]) -> Result<BatchReport> {
        self.drive(
            source,
            files,
            Vec::new(),
            |path| path.display().to_string(),
            |_, path, root, written| self.render_mpo(path, source, root, written),
            |path, e| SkippedPair::for_file(path, e),
        )
    }

    /// Run the batch on tokio's blocking pool
    pub async fn run(self, source: PathBuf, matching: Matching) -> Result<BatchReport> {
        task::spawn_blocking(move || self.run_blocking(&source, &matching))
            .await
            .map_err(join_error)?
    }

    /// Render MPO files on tokio's blocking pool
    pub async fn run_mpo(self, source: PathBuf, files: Vec<PathBuf>) -> Result<BatchReport> {
        task::spawn_blocking(move || self.run_mpo_blocking(&source, &files))
            .await
            .map_err(join_error)?
    }

    fn write_stereo(
        &self,
        left: &image::RgbImage,
        right: &image::RgbImage,
        out_dir: &Path,
        stem: &str,
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        for format in self.config.stereo_formats() {
            let image = format.compose(left, right)?;
            let bytes = output::encode_jpeg(&image, self.config.jpeg_quality)?;
            let dir = out_dir.join(format.dir_name());
            output::ensure_dir(&dir)?;
            let path = dir.join(format!("{}{}.jpg", format.prefix(), stem));
            output::write_atomic(&path, &bytes)?;
            log::debug!("Wrote {} ({})", path.display(), format);
            written.push(path);
        }
        Ok(())
    }

    /// Split one MPO file and composite its two streams without re-aligning them
    pub fn render_mpo(
        &self,
        path: &Path,
        source: &Path,
        root: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let container = mpo::split::split_file(path)?;
        let decode = |eye: Eye| {
            image::load_from_memory(container.stream(eye))
                .map(|img| img.to_rgb8())
                .map_err(|e| Error::decode(path, e))
        };
        let left = decode(Eye::Left)?;
        let right = decode(Eye::Right)?;

        let dir = path.parent().unwrap_or(Path::new(""));
        let out_dir = root.join(relative_dir(dir, source));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.write_stereo(&left, &right, &out_dir, &stem, written)
    }

    /// Produce every requested output for one pair, pushing written paths as they land
    pub fn process_pair(
        &self,
        pair: &Pair,
        stem: &str,
        source: &Path,
        root: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let out_dir = root.join(relative_dir(pair.left.dir(), source));

        if self.config.needs_alignment() {
            let aligned = self.aligner.align_pair(&pair.left.path, &pair.right.path)?;
            self.write_stereo(&aligned.left, aligned.right(), &out_dir, stem, written)?;
        }

        if self.config.wants_mpo() {
            let left = std::fs::read(&pair.left.path).map_err(|e| Error::io(&pair.left.path, e))?;
            let right =
                std::fs::read(&pair.right.path).map_err(|e| Error::io(&pair.right.path, e))?;
            let bytes = self.encoder.encode(&left, &right)?;
            let dir = out_dir.join(MPO_DIR);
            output::ensure_dir(&dir)?;
            let path = dir.join(format!("{}.mpo", stem));
            mpo::write_mpo(&path, &bytes)?;
            written.push(path);
        }

        Ok(())
    }
}

fn join_error(e: task::JoinError) -> Error {
    if e.is_panic() {
        std::panic::resume_unwind(e.into_panic());
    }
    Error::Cancelled
}
