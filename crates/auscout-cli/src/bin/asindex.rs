//! asindex - offline hash index maintenance
//!
//! Usage:
//!   asindex insert <index> <audio>...   # fingerprint and insert
//!   asindex merge <dst> <src>           # fold src into dst, empty src
//!   asindex stat <index>...
//!   asindex grow <index>
//!   asindex lookup <index> <audio>...   # identify files offline

use anyhow::{Context, Result};
use auscout_cli::output::{print_json, FileReport, IndexReport, InsertReport, LookupReport};
use auscout_cli::{init_logging, load_config};
use auscout_core::{fingerprint_files, AuscoutConfig, ExtractOptions, MatchParams, Matcher};
use auscout_index::{merge, MergeStatus, MutableFileBackedIndex, ReadOnlyMappedIndex};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "asindex")]
#[command(about = "Build and inspect Audio Scout hash indexes", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint audio files and insert them into an index
    Insert {
        index: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Track id of the first file; later files count up from it
        #[arg(long, default_value_t = 1)]
        first_id: u32,
        /// Bucket count when the index is created
        #[arg(long)]
        buckets: Option<u32>,
    },
    /// Move every record of SRC into DST and empty SRC
    Merge {
        dst: PathBuf,
        src: PathBuf,
        /// Bucket count when DST is created
        #[arg(long)]
        buckets: Option<u32>,
        /// Grow DST to stay under this many entries per bucket
        #[arg(long)]
        max_load: Option<f64>,
    },
    /// Print bucket and entry counts
    Stat {
        #[arg(required = true)]
        index: Vec<PathBuf>,
    },
    /// Rehash an index into more buckets
    Grow {
        index: PathBuf,
        /// Exact bucket count (rounded to a power of two)
        #[arg(long, conflicts_with = "max_load")]
        buckets: Option<u32>,
        /// Grow until the load is at most this
        #[arg(long)]
        max_load: Option<f64>,
    },
    /// Identify audio files against an index
    Lookup {
        index: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Toggle bits expanded per frame
        #[arg(short = 'p', long)]
        toggles: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Insert {
            index,
            files,
            first_id,
            buckets,
        } => run_insert(&config, &index, &files, first_id, buckets),
        Command::Merge {
            dst,
            src,
            buckets,
            max_load,
        } => run_merge(&config, &dst, &src, buckets, max_load),
        Command::Stat { index } => run_stat(&index),
        Command::Grow {
            index,
            buckets,
            max_load,
        } => run_grow(&config, &index, buckets, max_load),
        Command::Lookup {
            index,
            files,
            toggles,
        } => run_lookup(&config, &index, &files, toggles),
    }
}

fn run_insert(
    config: &AuscoutConfig,
    index_path: &Path,
    files: &[PathBuf],
    first_id: u32,
    buckets: Option<u32>,
) -> Result<()> {
    if first_id == 0 {
        anyhow::bail!("track id 0 is reserved");
    }
    let mut index =
        MutableFileBackedIndex::open(index_path, buckets.unwrap_or(config.table.main_buckets))
            .with_context(|| format!("Failed to open index: {}", index_path.display()))?;

    let mut next_id = first_id;
    let mut reports = Vec::with_capacity(files.len());
    for (path, result) in fingerprint_files(files, &config.hash, &ExtractOptions::default()) {
        let fp = match result {
            Ok((_, fp)) => fp,
            Err(e) => {
                reports.push(FileReport::failed(&path, e));
                continue;
            }
        };
        let report = index.insert(next_id, &fp.hashes)?;
        reports.push(FileReport::Ok(InsertReport {
            path: path.display().to_string(),
            id: Some(next_id),
            inserted: Some(report.inserted),
            overwritten: Some(report.overwritten),
        }));
        next_id += 1;
    }

    if index.grow(config.table.max_load) {
        log::info!("grew {} to {} buckets", index_path.display(), index.stat().buckets);
    }
    index
        .flush()
        .with_context(|| format!("Failed to write index: {}", index_path.display()))?;
    print_json(&reports);
    Ok(())
}

fn run_merge(
    config: &AuscoutConfig,
    dst: &Path,
    src: &Path,
    buckets: Option<u32>,
    max_load: Option<f64>,
) -> Result<()> {
    let status = merge(
        dst,
        src,
        buckets.unwrap_or(config.table.main_buckets),
        max_load,
    )
    .with_context(|| format!("Failed to merge {} into {}", src.display(), dst.display()))?;

    match status {
        MergeStatus::NothingToMerge => log::warn!("{} is empty, nothing merged", src.display()),
        MergeStatus::Merged { records } => log::info!("merged {} records", records),
    }
    run_stat(&[dst.to_path_buf()])
}

fn run_stat(paths: &[PathBuf]) -> Result<()> {
    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let index = MutableFileBackedIndex::load(path)
            .with_context(|| format!("Failed to load index: {}", path.display()))?;
        let created_at = index
            .created_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        reports.push(IndexReport::new(path, index.stat(), created_at));
    }
    print_json(&reports);
    Ok(())
}

fn run_grow(
    config: &AuscoutConfig,
    path: &Path,
    buckets: Option<u32>,
    max_load: Option<f64>,
) -> Result<()> {
    let mut index = MutableFileBackedIndex::load(path)
        .with_context(|| format!("Failed to load index: {}", path.display()))?;
    let before = index.stat().buckets;

    match buckets {
        Some(buckets) => index.resize(buckets),
        None => {
            index.grow(max_load.unwrap_or(config.table.max_load));
        }
    }

    if index.stat().buckets == before {
        log::info!("{} already has {} buckets", path.display(), before);
    } else {
        index
            .flush()
            .with_context(|| format!("Failed to write index: {}", path.display()))?;
    }
    run_stat(&[path.to_path_buf()])
}

fn run_lookup(
    config: &AuscoutConfig,
    index_path: &Path,
    files: &[PathBuf],
    toggles: Option<usize>,
) -> Result<()> {
    if !index_path.exists() {
        anyhow::bail!("Index not found: {}", index_path.display());
    }
    let index = ReadOnlyMappedIndex::open(index_path, config.table.main_buckets)
        .with_context(|| format!("Failed to open index: {}", index_path.display()))?;

    let mut params = MatchParams::from_config(config);
    if let Some(p) = toggles {
        params.toggles = p;
    }
    let matcher = Matcher::new(params);
    let options = ExtractOptions {
        toggles: params.toggles,
        keep_coeffs: false,
    };

    let reports: Vec<FileReport<LookupReport>> = fingerprint_files(files, &config.hash, &options)
        .into_iter()
        .map(|(path, result)| match result {
            Ok((_, fp)) => FileReport::Ok(LookupReport {
                path: path.display().to_string(),
                result: matcher.lookup(&index, &fp.hashes, fp.toggle_rows()),
            }),
            Err(e) => FileReport::failed(&path, e),
        })
        .collect();

    print_json(&reports);
    Ok(())
}
