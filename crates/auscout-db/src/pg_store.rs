//! PostgreSQL-backed metadata store
//!
//! Request threads are plain OS threads, so the async pool is driven
//! through a private runtime with `block_on`.

use crate::connection::{create_pool, test_connection, DbPool, PgSettings};
use crate::models::TrackRecord;
use crate::operations;
use crate::store::MetadataStore;
use crate::StoreError;
use anyhow::Context;
use tokio::runtime::Runtime;

pub struct PgMetadataStore {
    runtime: Runtime,
    pool: DbPool,
}

impl PgMetadataStore {
    /// Connect, verify the connection and create the schema
    pub fn connect(settings: &PgSettings) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("auscout-pg")
            .enable_all()
            .build()
            .context("Failed to start database runtime")?;

        let pool = create_pool(settings)?;
        let version = runtime.block_on(async {
            let version = test_connection(&pool).await?;
            operations::create_schema(&pool).await?;
            anyhow::Ok(version)
        })?;

        log::info!("connected to {} (server {})", settings, version);
        Ok(Self { runtime, pool })
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        self.runtime.block_on(operations::count_tracks(&self.pool))
    }
}

impl MetadataStore for PgMetadataStore {
    fn store(&self, inline: &str) -> Result<u32, StoreError> {
        let record = TrackRecord::parse_inline(inline)?;
        let uid = self
            .runtime
            .block_on(operations::insert_track(&self.pool, &record))?;
        Ok(uid as u32)
    }

    fn lookup(&self, id: u32) -> Result<Option<String>, StoreError> {
        let uid = i32::try_from(id).map_err(|_| StoreError::Malformed(format!("uid {}", id)))?;
        let track = self
            .runtime
            .block_on(operations::get_track(&self.pool, uid))?;
        Ok(track.map(|t| t.to_inline()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioMetaData;

    #[test]
    #[ignore] // Requires PostgreSQL to be running
    fn test_store_and_lookup() {
        let store = PgMetadataStore::connect(&PgSettings::default()).unwrap();
        let inline = AudioMetaData {
            composer: "Satie".into(),
            title1: "Gymnopedie".into(),
            year: 1888,
            ..Default::default()
        }
        .to_inline();

        let id = store.store(&inline).unwrap();
        assert!(id >= 1);
        let found = store.lookup(id).unwrap().unwrap();
        assert!(found.starts_with("Satie \u{1E} Gymnopedie"));
    }
}
