//! Audio Scout Metadata Layer
//!
//! Track metadata model, its inline wire form, and the stores that assign
//! track ids: in-memory and PostgreSQL.

pub mod connection;
pub mod models;
pub mod operations;
pub mod pg_store;
pub mod store;

use thiserror::Error;

// Re-export commonly used types
pub use connection::{create_pool, test_connection, PgSettings};
pub use models::{AudioMetaData, StoredTrack, TrackRecord, FIELD_SEPARATOR, INLINE_DELIM};
pub use pg_store::PgMetadataStore;
pub use store::{InMemoryStore, MetadataStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
