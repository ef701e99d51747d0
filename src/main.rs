//! stereo-maker command line
//!
//! Entry point for pairing, stereogram, MPO, render, split and sort runs.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use stereo_maker::batch::{self, BatchRunner};
use stereo_maker::config::{Config, OutputFormat};
use stereo_maker::library::{self, TimestampSource};
use stereo_maker::mpo::split;
use stereo_maker::organize;
use stereo_maker::pairing::PairingMode;

#[derive(Parser)]
#[command(name = "stereo-maker")]
#[command(about = "Pair stereo photos, render stereograms and build MPO files")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the pairs and singles found in a folder
    Pair(FolderArgs),

    /// Align each pair and render stereograms
    Stereo {
        #[command(flatten)]
        folder: FolderArgs,

        /// Formats to render: anaglyph, sbs, crossview, lrl (repeatable)
        #[arg(short, long = "format")]
        formats: Vec<OutputFormat>,

        /// Also package each pair as an MPO
        #[arg(long)]
        mpo: bool,

        #[arg(long)]
        quality: Option<u8>,
    },

    /// Package each pair as an MPO file (strict burst pairing unless --mode is given)
    Mpo(FolderArgs),

    /// Render stereograms from existing MPO files
    Render {
        /// An MPO file or a folder of them
        input: PathBuf,

        /// Formats to render: anaglyph, sbs, crossview, lrl (repeatable)
        #[arg(short, long = "format")]
        formats: Vec<OutputFormat>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        recursive: bool,

        #[arg(long)]
        quality: Option<u8>,
    },

    /// Split MPO files into left and right JPEGs
    Split {
        /// An MPO file or a folder of them
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        recursive: bool,
    },

    /// Move paired originals into _pairs/ and the rest into _singles/
    Sort(FolderArgs),
}

#[derive(Args)]
struct FolderArgs {
    folder: PathBuf,

    /// Output root (defaults to a _3d_<name> sibling of the folder)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long)]
    recursive: bool,

    /// Maximum capture-time gap between pair members, in seconds
    #[arg(long)]
    time_diff: Option<f64>,

    /// Perceptual-hash distance a pair must stay below
    #[arg(long)]
    hash_diff: Option<u32>,

    /// Pair strictly adjacent burst frames (MPO cameras); same as --mode strict
    #[arg(long)]
    strict: bool,

    /// Pairing policy: greedy, strict or sequential
    #[arg(long)]
    mode: Option<PairingMode>,

    /// Let pairs span subfolders of a recursive scan
    #[arg(long)]
    across_folders: bool,

    /// exif, modified or exif_or_modified
    #[arg(long)]
    timestamps: Option<TimestampSource>,
}

impl FolderArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_dir = Some(output.clone());
        }
        config.recursive |= self.recursive;
        config.strict_adjacency |= self.strict;
        if let Some(mode) = self.mode {
            config.pairing_mode = mode;
            config.strict_adjacency = self.strict;
        }
        if self.across_folders {
            config.per_folder = false;
        }
        if let Some(secs) = self.time_diff {
            config.time_diff_threshold = secs;
        }
        if let Some(bits) = self.hash_diff {
            config.hash_diff_threshold = bits;
        }
        if let Some(source) = self.timestamps {
            config.timestamp_source = source;
        }
    }
}

fn check_folder(folder: &Path) -> anyhow::Result<()> {
    if !folder.is_dir() {
        bail!("{} is not a folder", folder.display());
    }
    Ok(())
}

async fn run_batch(folder: &Path, config: Config) -> anyhow::Result<()> {
    check_folder(folder)?;
    let matching = batch::match_folder(folder, &config)?;
    if matching.pairs.is_empty() {
        log::warn!("No pairs found in {}", folder.display());
        return Ok(());
    }

    let runner = BatchRunner::new(config).with_progress(|done, total| {
        log::info!("Progress: {}/{}", done, total);
    });
    let report = runner.run(folder.to_path_buf(), matching).await?;
    for skipped in &report.skipped {
        log::warn!("Skipped {}: {}", skipped.left.display(), skipped.reason);
    }
    println!("{}", report);
    Ok(())
}

fn run_pair(folder: &Path, config: &Config) -> anyhow::Result<()> {
    check_folder(folder)?;
    let matching = batch::match_folder(folder, config)?;
    for pair in &matching.pairs {
        match pair.time_gap() {
            Some(gap) => println!("{}  ({:.2}s)", pair, gap),
            None => println!("{}", pair),
        }
    }
    for single in &matching.singles {
        println!("single: {}", single.path.display());
    }
    println!(
        "{} pairs, {} singles",
        matching.pairs.len(),
        matching.singles.len()
    );
    Ok(())
}

fn run_sort(folder: &Path, config: &Config) -> anyhow::Result<()> {
    check_folder(folder)?;
    let matching = batch::match_folder(folder, config)?;
    let summary = organize::organize(&matching)?;
    let removed = organize::remove_empty_dirs(folder);
    println!(
        "{} files into _pairs, {} into _singles, {} empty folders removed",
        summary.paired,
        summary.singles,
        removed.len()
    );
    Ok(())
}

/// MPO packaging pairs camera bursts, so strict adjacency is the default here
fn configure_mpo(args: &FolderArgs, config: &mut Config) {
    args.apply(config);
    if args.mode.is_none() {
        config.strict_adjacency = true;
    }
    config.requested_formats = [OutputFormat::Mpo].into_iter().collect();
}

/// Keep the stereo formats of `formats`, falling back to anaglyph
fn apply_formats(config: &mut Config, formats: Vec<OutputFormat>) {
    if !formats.is_empty() {
        config.requested_formats = formats
            .into_iter()
            .filter(|f| f.stereo().is_some())
            .collect();
    }
    if !config.needs_alignment() {
        config.requested_formats.insert(OutputFormat::Anaglyph);
    }
}

/// An MPO file or every MPO under a folder, plus the folder outputs are relative to
fn mpo_inputs(input: &Path, recursive: bool) -> anyhow::Result<(Vec<PathBuf>, PathBuf)> {
    if input.is_dir() {
        Ok((library::scan_mpo(input, recursive)?, input.to_path_buf()))
    } else if input.is_file() {
        let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok((vec![input.to_path_buf()], dir))
    } else {
        bail!("{} does not exist", input.display())
    }
}

async fn run_render(input: &Path, config: Config) -> anyhow::Result<()> {
    let (files, source) = mpo_inputs(input, config.recursive)?;
    if files.is_empty() {
        log::warn!("No MPO files found in {}", input.display());
        return Ok(());
    }

    let runner = BatchRunner::new(config).with_progress(|done, total| {
        log::info!("Progress: {}/{}", done, total);
    });
    let report = runner.run_mpo(source, files).await?;
    for skipped in &report.skipped {
        log::warn!("Skipped {}: {}", skipped.left.display(), skipped.reason);
    }
    println!("{}", report);
    Ok(())
}

fn run_split(
    input: &Path,
    output: Option<PathBuf>,
    recursive: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let (files, out_dir) = if input.is_dir() {
        let out = output.unwrap_or_else(|| config.output_root(input));
        (library::scan_mpo(input, recursive || config.recursive)?, out)
    } else {
        let out = output
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        (vec![input.to_path_buf()], out)
    };

    let mut failed = 0;
    for file in &files {
        match split::split_to_eyes(file, &out_dir) {
            Ok([left, right]) => log::info!(
                "{} -> {}, {}",
                file.display(),
                left.display(),
                right.display()
            ),
            Err(e) => {
                log::warn!("Skipping {}: {}", file.display(), e);
                failed += 1;
            }
        }
    }
    println!("Split {} of {} MPO files", files.len() - failed, files.len());
    if failed > 0 && failed == files.len() {
        bail!("no MPO file could be split");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Pair(args) => {
            args.apply(&mut config);
            run_pair(&args.folder, &config.sanitized())
        }
        Command::Stereo {
            folder,
            formats,
            mpo,
            quality,
        } => {
            folder.apply(&mut config);
            apply_formats(&mut config, formats);
            if mpo {
                config.requested_formats.insert(OutputFormat::Mpo);
            }
            if let Some(quality) = quality {
                config.jpeg_quality = quality;
            }
            run_batch(&folder.folder, config.sanitized()).await
        }
        Command::Mpo(args) => {
            configure_mpo(&args, &mut config);
            run_batch(&args.folder, config.sanitized()).await
        }
        Command::Render {
            input,
            formats,
            output,
            recursive,
            quality,
        } => {
            apply_formats(&mut config, formats);
            if let Some(output) = output {
                config.output_dir = Some(output);
            }
            config.recursive |= recursive;
            if let Some(quality) = quality {
                config.jpeg_quality = quality;
            }
            run_render(&input, config.sanitized()).await
        }
        Command::Split {
            input,
            output,
            recursive,
        } => run_split(&input, output, recursive, &config),
        Command::Sort(args) => {
            args.apply(&mut config);
            run_sort(&args.folder, &config.sanitized())
        }
    }
}
