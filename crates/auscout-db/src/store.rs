//! Metadata store abstraction and the in-memory implementation

use crate::models::{StoredTrack, TrackRecord};
use crate::StoreError;
use parking_lot::RwLock;

/// Key-value service mapping track ids to metadata.
///
/// Ids are assigned by the store, start at 1 and are never reused; 0 is
/// reserved as the failure id on the wire.
pub trait MetadataStore: Send + Sync {
    /// Store an inline metadata string, returning its new id
    fn store(&self, inline: &str) -> Result<u32, StoreError>;

    /// Inline rendering of the track stored under `id`
    fn lookup(&self, id: u32) -> Result<Option<String>, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tracks: RwLock<Vec<StoredTrack>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u32) -> Option<StoredTrack> {
        let index = (id as usize).checked_sub(1)?;
        self.tracks.read().get(index).cloned()
    }
}

impl MetadataStore for InMemoryStore {
    fn store(&self, inline: &str) -> Result<u32, StoreError> {
        let record = TrackRecord::parse_inline(inline)?;
        let mut tracks = self.tracks.write();
        let uid = u32::try_from(tracks.len() + 1)
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("track id space exhausted")))?;
        tracks.push(StoredTrack {
            uid,
            record,
            time: chrono::Utc::now(),
        });
        log::debug!("stored track {}", uid);
        Ok(uid)
    }

    fn lookup(&self, id: u32) -> Result<Option<String>, StoreError> {
        Ok(self.get(id).map(|t| t.to_inline()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioMetaData;
    use std::sync::Arc;

    fn inline(title: &str) -> String {
        AudioMetaData {
            title1: title.to_string(),
            ..Default::default()
        }
        .to_inline()
    }

    #[test]
    fn test_ids_start_at_one() {
        let store = InMemoryStore::new();
        assert_eq!(store.store(&inline("a")).unwrap(), 1);
        assert_eq!(store.store(&inline("b")).unwrap(), 2);
        assert_eq!(store.len(), 2);

        let found = store.lookup(2).unwrap().unwrap();
        assert!(found.starts_with(" \u{1E} b \u{1E} "));
        assert!(store.lookup(0).unwrap().is_none());
        assert!(store.lookup(3).unwrap().is_none());
    }

    #[test]
    fn test_malformed_inline_is_rejected() {
        let store = InMemoryStore::new();
        assert!(store.store("no separators").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_stores_get_unique_ids() {
        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| store.store(&inline(&format!("{}-{}", t, i))).unwrap())
                        .collect::<Vec<u32>>()
                })
            })
            .collect();

        let mut ids: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=400).collect::<Vec<u32>>());
    }
}
