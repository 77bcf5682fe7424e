//! Shared plumbing for the Audio Scout command line tools

pub mod output;
pub mod tags;

use anyhow::{Context, Result};
use auscout_core::audio::AudioFormat;
use auscout_core::config::MetadataBackend;
use auscout_core::AuscoutConfig;
use auscout_db::{InMemoryStore, MetadataStore, PgMetadataStore, PgSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Info level with `--verbose`, warnings only otherwise
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Configuration from `path`, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<AuscoutConfig> {
    match path {
        Some(path) => AuscoutConfig::load(path),
        None => {
            let config = AuscoutConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Metadata store selected by `[metadata] backend`
pub fn open_store(config: &AuscoutConfig) -> Result<Arc<dyn MetadataStore>> {
    match config.metadata.backend {
        MetadataBackend::Memory => {
            log::info!("using in-memory metadata store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        MetadataBackend::Postgresql => {
            let pg = &config.metadata.postgresql;
            let settings = PgSettings {
                host: pg.host.clone(),
                port: pg.port,
                database: pg.database.clone(),
                user: pg.user.clone(),
                password: pg.password.clone(),
                max_connections: pg.max_connections,
            };
            let store = PgMetadataStore::connect(&settings)
                .context("Failed to open PostgreSQL metadata store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Decodable audio files directly inside `dir`, sorted by name
pub fn audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && AudioFormat::from_path(path).is_supported())
        .collect();
    files.sort();
    Ok(files)
}
