//! ashash - perceptual hashes of audio files
//!
//! Usage: ashash [--toggles P] [--sample-rate HZ] <audio>...

use anyhow::Result;
use auscout_cli::output::{print_json, FileReport, FingerprintSummary};
use auscout_cli::{init_logging, load_config};
use auscout_core::{fingerprint_files, ExtractOptions};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ashash")]
#[command(about = "Compute perceptual hashes of audio files", long_about = None)]
struct Args {
    /// Audio files to hash
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analysis sample rate, overrides the configuration
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Report the P least reliable bits of every hash
    #[arg(short = 'p', long, default_value_t = 0)]
    toggles: usize,

    /// Include hash values (and toggles) in the output
    #[arg(long)]
    hashes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(rate) = args.sample_rate {
        config.hash.sample_rate = rate;
    }
    config.hash.toggles = args.toggles;
    config.validate()?;

    let options = ExtractOptions {
        toggles: args.toggles,
        keep_coeffs: false,
    };
    let start = std::time::Instant::now();
    let results = fingerprint_files(&args.files, &config.hash, &options);

    let reports: Vec<FileReport<FingerprintSummary>> = results
        .iter()
        .map(|(path, result)| match result {
            Ok((audio, fp)) => {
                FileReport::Ok(FingerprintSummary::new(path, audio, fp, args.hashes))
            }
            Err(e) => FileReport::failed(path, e),
        })
        .collect();

    log::info!(
        "hashed {} files in {:.2}s",
        reports.iter().filter(|r| r.is_ok()).count(),
        start.elapsed().as_secs_f64()
    );
    print_json(&reports);

    if !reports.iter().any(|r| r.is_ok()) {
        anyhow::bail!("no file could be hashed");
    }
    Ok(())
}
