//! Configuration for hashing, lookup, coordinator and table shards
//!
//! Loaded from TOML; every field has a default so a partial file (or no
//! file at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MIN_SAMPLE_RATE;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuscoutConfig {
    #[serde(default)]
    pub hash: HashConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Fingerprint extraction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HashConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_duration")]
    pub frame_duration: f32,
    /// Toggle bits sent with queries (0 disables)
    #[serde(default)]
    pub toggles: usize,
    /// Seconds of audio decoded per file (unbounded when absent)
    #[serde(default)]
    pub max_seconds: Option<f32>,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_duration: default_frame_duration(),
            toggles: 0,
            max_seconds: None,
        }
    }
}

fn default_sample_rate() -> u32 {
    6000
}
fn default_frame_duration() -> f32 {
    0.40
}

/// Fuzzy lookup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupConfig {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            threshold: default_threshold(),
        }
    }
}

fn default_block_size() -> usize {
    128
}
fn default_threshold() -> f32 {
    0.05
}

/// Coordinator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_result_wait_ms")]
    pub result_wait_ms: u64,
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_server_workers(),
            result_wait_ms: default_result_wait_ms(),
            registration_timeout_ms: default_registration_timeout_ms(),
        }
    }
}

fn default_server_workers() -> usize {
    10
}
fn default_result_wait_ms() -> u64 {
    5000
}
fn default_registration_timeout_ms() -> u64 {
    10_000
}

/// Table shard
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    /// Base name; the shard uses `<index_name>.idx` and `<index_name>.tmp`
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_table_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_main_buckets")]
    pub main_buckets: u32,
    #[serde(default = "default_tmp_buckets")]
    pub tmp_buckets: u32,
    /// Entries per bucket above which the durable index is grown on flush
    #[serde(default = "default_max_load")]
    pub max_load: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            worker_threads: default_table_workers(),
            main_buckets: default_main_buckets(),
            tmp_buckets: default_tmp_buckets(),
            max_load: default_max_load(),
        }
    }
}

fn default_index_name() -> String {
    "auscout".to_string()
}
fn default_table_workers() -> usize {
    60
}
fn default_main_buckets() -> u32 {
    1 << 25
}
fn default_tmp_buckets() -> u32 {
    1 << 20
}
fn default_max_load() -> f64 {
    4.0
}

/// Metadata store backend
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    #[default]
    Memory,
    Postgresql,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub backend: MetadataBackend,
    #[serde(default)]
    pub postgresql: PostgresqlConfig,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresqlConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "auscout".to_string()
}
fn default_user() -> String {
    "auscout".to_string()
}
fn default_password() -> String {
    "auscout".to_string()
}
fn default_max_connections() -> u32 {
    10
}

impl AuscoutConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: AuscoutConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hash.sample_rate < MIN_SAMPLE_RATE {
            anyhow::bail!("sample_rate must be >= {}", MIN_SAMPLE_RATE);
        }
        if !(self.hash.frame_duration > 0.0) {
            anyhow::bail!("frame_duration must be > 0");
        }
        if self.hash.toggles > crate::candidates::MAX_TOGGLES {
            anyhow::bail!("toggles must be <= {}", crate::candidates::MAX_TOGGLES);
        }
        if self.lookup.block_size == 0 {
            anyhow::bail!("block_size must be > 0");
        }
        if !(0.0..=1.0).contains(&self.lookup.threshold) {
            anyhow::bail!("threshold must be within [0, 1]");
        }
        if self.server.worker_threads == 0 || self.table.worker_threads == 0 {
            anyhow::bail!("worker_threads must be > 0");
        }
        if self.table.main_buckets == 0 || self.table.tmp_buckets == 0 {
            anyhow::bail!("bucket counts must be > 0");
        }
        if !(self.table.max_load > 0.0) {
            anyhow::bail!("max_load must be > 0");
        }
        Ok(())
    }

    /// PostgreSQL connection string when that backend is selected
    pub fn connection_string(&self) -> Option<String> {
        match self.metadata.backend {
            MetadataBackend::Postgresql => {
                let pg = &self.metadata.postgresql;
                Some(format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    pg.user, pg.password, pg.host, pg.port, pg.database
                ))
            }
            MetadataBackend::Memory => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AuscoutConfig::default();
        assert_eq!(config.hash.sample_rate, 6000);
        assert_eq!(config.hash.toggles, 0);
        assert_eq!(config.lookup.block_size, 128);
        assert_eq!(config.server.worker_threads, 10);
        assert_eq!(config.server.result_wait_ms, 5000);
        assert_eq!(config.table.worker_threads, 60);
        assert_eq!(config.table.main_buckets, 1 << 25);
        assert_eq!(config.table.tmp_buckets, 1 << 20);
        assert_eq!(config.metadata.backend, MetadataBackend::Memory);
        assert!(config.connection_string().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [hash]
            toggles = 4

            [lookup]
            threshold = 0.1

            [table]
            index_name = "/var/lib/auscout/shard0"

            [metadata]
            backend = "postgresql"

            [metadata.postgresql]
            host = "db.example.com"
            port = 5433
        "#;

        let config: AuscoutConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hash.toggles, 4);
        assert_eq!(config.hash.sample_rate, 6000);
        assert!((config.lookup.threshold - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.lookup.block_size, 128);
        assert_eq!(config.table.index_name, "/var/lib/auscout/shard0");
        let conn = config.connection_string().unwrap();
        assert!(conn.contains("db.example.com:5433"));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hash]\nsample_rate = 4000").unwrap();
        assert!(AuscoutConfig::load(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[lookup]\nblock_size = 64").unwrap();
        let config = AuscoutConfig::load(file.path()).unwrap();
        assert_eq!(config.lookup.block_size, 64);
    }
}
