//! PostgreSQL pool setup

use anyhow::Context;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::fmt;
use tokio_postgres::NoTls;

pub type DbPool = Pool;

/// Where and how to reach the metadata database
#[derive(Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "auscout".to_string(),
            user: "auscout".to_string(),
            password: String::new(),
            max_connections: 16,
        }
    }
}

// keeps the password out of logs
impl fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for PgSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Pool of at most `max_connections` connections; nothing is opened yet
pub fn create_pool(settings: &PgSettings) -> anyhow::Result<DbPool> {
    let mut cfg = Config::new();
    cfg.host = Some(settings.host.clone());
    cfg.port = Some(settings.port);
    cfg.dbname = Some(settings.database.clone());
    cfg.user = Some(settings.user.clone());
    cfg.password = Some(settings.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(settings.max_connections.max(1) as usize));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .with_context(|| format!("Failed to create pool for {}", settings))
}

/// Round trip to the server, returning its version
pub async fn test_connection(pool: &DbPool) -> anyhow::Result<String> {
    let client = pool.get().await.context("Failed to get connection")?;
    let row = client
        .query_one("SHOW server_version", &[])
        .await
        .context("Connection test query failed")?;
    Ok(row.get(0))
}
