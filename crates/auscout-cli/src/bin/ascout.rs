//! ascout - submit and identify audio through an in-process cluster
//!
//! Usage:
//!   ascout submit <dir>                        # register every file of dir
//!   ascout query <dir> [--reference <dir>]     # identify every file of dir
//!
//! With the in-memory metadata store nothing but the indexes outlives the
//! process; pass `--reference` to submit and query in one run.

use anyhow::{Context, Result};
use auscout_cli::output::{print_json, FileReport, InsertReport, QueryReport};
use auscout_cli::tags::read_metadata;
use auscout_cli::{audio_files, init_logging, load_config, open_store};
use auscout_cluster::{Client, LocalCluster, Toggles};
use auscout_core::{fingerprint_files, AuscoutConfig, ExtractOptions};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ascout")]
#[command(about = "Audio Scout cluster front end", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of table shards to run
    #[arg(long, default_value_t = 1, global = true)]
    shards: usize,

    /// Directory holding the shard indexes
    #[arg(long, default_value = ".", global = true)]
    index_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit every audio file of a directory
    Submit { dir: PathBuf },
    /// Identify every audio file of a directory
    Query {
        dir: PathBuf,
        /// Submit the files of this directory first
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Toggle bits expanded per frame
        #[arg(short = 'p', long, default_value_t = 0)]
        toggles: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Command::Query { toggles, .. } = &args.command {
        config.hash.toggles = *toggles;
        config.validate()?;
    }
    if args.shards == 0 {
        anyhow::bail!("at least one shard is required");
    }
    std::fs::create_dir_all(&args.index_dir)
        .with_context(|| format!("Failed to create index directory: {}", args.index_dir.display()))?;

    let store = open_store(&config)?;
    let cluster = LocalCluster::start(&config, store, args.shards, &args.index_dir)
        .context("Failed to start cluster")?;

    let outcome = match &args.command {
        Command::Submit { dir } => {
            submit_dir(&cluster, &config, dir).map(|reports| print_json(&reports))
        }
        Command::Query {
            dir,
            reference,
            ..
        } => {
            let submitted = match reference {
                Some(reference) => submit_dir(&cluster, &config, reference).map(|_| ()),
                None => Ok(()),
            };
            submitted
                .and_then(|_| query_dir(&cluster.client(), &config, dir))
                .map(|reports| print_json(&reports))
        }
    };

    let stopped = cluster.shutdown().context("Failed to stop cluster");
    outcome.and(stopped)
}

fn metadata_for(path: &Path, duration_secs: f64) -> String {
    read_metadata(path, duration_secs).to_inline()
}

fn submit_dir(
    cluster: &LocalCluster,
    config: &AuscoutConfig,
    dir: &Path,
) -> Result<Vec<FileReport<InsertReport>>> {
    let files = audio_files(dir)?;
    log::info!("submitting {} files from {}", files.len(), dir.display());
    let client = cluster.client();

    let reports: Vec<FileReport<InsertReport>> =
        fingerprint_files(&files, &config.hash, &ExtractOptions::default())
            .into_par_iter()
            .map(|(path, result)| match result {
                Ok((audio, fp)) => {
                    match client.submit(&fp.hashes, &metadata_for(&path, audio.duration_secs())) {
                        Ok(id) => FileReport::Ok(InsertReport {
                            path: path.display().to_string(),
                            id,
                            inserted: None,
                            overwritten: None,
                        }),
                        Err(e) => FileReport::failed(&path, e),
                    }
                }
                Err(e) => FileReport::failed(&path, e),
            })
            .collect();

    let accepted = reports
        .iter()
        .filter(|r| matches!(r, FileReport::Ok(InsertReport { id: Some(_), .. })))
        .count() as u64;
    if !cluster.wait_for_submissions(accepted, Duration::from_secs(30)) {
        log::warn!("not every submission reached its shard");
    }
    let merged = cluster.flush()?;
    log::info!("{} submissions accepted, {} records merged", accepted, merged);
    Ok(reports)
}

fn query_dir(
    client: &Client,
    config: &AuscoutConfig,
    dir: &Path,
) -> Result<Vec<FileReport<QueryReport>>> {
    let files = audio_files(dir)?;
    log::info!("querying {} files from {}", files.len(), dir.display());
    let p = config.hash.toggles;
    let options = ExtractOptions {
        toggles: p,
        keep_coeffs: false,
    };

    let reports = fingerprint_files(&files, &config.hash, &options)
        .into_par_iter()
        .map(|(path, result)| match result {
            Ok((_, fp)) => {
                let toggles = fp.toggles.clone().filter(|_| p > 0).map(|rows| Toggles {
                    p: p as u8,
                    rows,
                });
                match client.query(&fp.hashes, toggles) {
                    Ok(found) => FileReport::Ok(QueryReport::new(&path, found.as_deref())),
                    Err(e) => FileReport::failed(&path, e),
                }
            }
            Err(e) => FileReport::failed(&path, e),
        })
        .collect();
    Ok(reports)
}
