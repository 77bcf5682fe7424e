//! Writable, heap-resident hash index
//!
//! Records live in a map from key to its chain of values; the bucket count
//! only determines the layout of the persisted file. Loading a file
//! preserves chain order, so the first value stored under a key stays first.

use crate::error::{IndexError, Result};
use crate::format::{round_buckets, IndexStat, Record, TableValue};
use crate::reader::IndexView;
use crate::writer;
use crate::HashLookup;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of inserting one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An identical record already existed
    Overwrite,
}

/// Summary of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: u64,
    pub overwritten: u64,
}

#[derive(Debug)]
pub struct MutableFileBackedIndex {
    path: Option<PathBuf>,
    chains: HashMap<u32, Vec<TableValue>>,
    /// Every stored (key, value) pair, for constant-time duplicate checks
    stored: HashSet<(u32, TableValue)>,
    buckets: u32,
    entries: u64,
    created_at: i64,
}

impl MutableFileBackedIndex {
    /// Empty table not yet bound to a file
    pub fn with_buckets(bucket_hint: u32) -> Self {
        Self {
            path: None,
            chains: HashMap::new(),
            stored: HashSet::new(),
            buckets: round_buckets(bucket_hint),
            entries: 0,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Load `path`, or start an empty table there when the file is absent
    pub fn open(path: &Path, bucket_hint: u32) -> Result<Self> {
        match Self::load(path) {
            Ok(table) => Ok(table),
            Err(IndexError::NotFound(_)) => {
                log::info!(
                    "index {} not found, starting empty table with {} buckets",
                    path.display(),
                    round_buckets(bucket_hint)
                );
                let mut table = Self::with_buckets(bucket_hint);
                table.path = Some(path.to_path_buf());
                Ok(table)
            }
            Err(e) => Err(e),
        }
    }

    /// Load an existing file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        let (header, view) = IndexView::parse(path, &bytes)?;

        let mut table = Self {
            path: Some(path.to_path_buf()),
            chains: HashMap::new(),
            stored: HashSet::new(),
            buckets: header.bucket_count,
            entries: 0,
            created_at: header.created_at,
        };
        for record in view.records() {
            table.push(record)?;
        }

        log::debug!(
            "loaded {} ({} buckets, {} entries)",
            path.display(),
            table.buckets,
            table.entries
        );
        Ok(table)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.created_at, 0)
    }

    pub fn stat(&self) -> IndexStat {
        IndexStat {
            buckets: self.buckets,
            entries: self.entries,
        }
    }

    fn push(&mut self, record: Record) -> Result<InsertOutcome> {
        self.chains
            .try_reserve(1)
            .map_err(|e| IndexError::Capacity(e.to_string()))?;
        self.stored
            .try_reserve(1)
            .map_err(|e| IndexError::Capacity(e.to_string()))?;
        if !self.stored.insert((record.key, record.value)) {
            return Ok(InsertOutcome::Overwrite);
        }
        let chain = self.chains.entry(record.key).or_default();
        chain
            .try_reserve(1)
            .map_err(|e| IndexError::Capacity(e.to_string()))?;
        chain.push(record.value);
        self.entries += 1;
        Ok(InsertOutcome::Inserted)
    }

    /// Store a single value under `key`
    pub fn insert_value(&mut self, key: u32, value: TableValue) -> Result<InsertOutcome> {
        self.push(Record { key, value })
    }

    /// Store `(track_id, i)` under `hashes[i]` for every frame
    pub fn insert(&mut self, track_id: u32, hashes: &[u32]) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        for (pos, &key) in hashes.iter().enumerate() {
            match self.insert_value(key, TableValue::new(track_id, pos as u32))? {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::Overwrite => report.overwritten += 1,
            }
        }
        Ok(report)
    }

    /// First value stored under `key`
    pub fn lookup(&self, key: u32) -> Option<TableValue> {
        self.chains.get(&key).and_then(|c| c.first().copied())
    }

    /// Every value chained under `key`
    pub fn lookup_all(&self, key: u32) -> impl Iterator<Item = TableValue> + '_ {
        self.chains.get(&key).into_iter().flatten().copied()
    }

    /// All records, in no particular key order
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        self.chains
            .iter()
            .flat_map(|(&key, chain)| chain.iter().map(move |&value| Record { key, value }))
    }

    /// Insert `records`, returning how many were new
    pub fn absorb<I: IntoIterator<Item = Record>>(&mut self, records: I) -> Result<u64> {
        let mut added = 0;
        for record in records {
            if self.push(record)? == InsertOutcome::Inserted {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Drop every record, keeping the bucket count
    pub fn clear(&mut self) {
        self.chains.clear();
        self.stored.clear();
        self.entries = 0;
    }

    /// Change the bucket count of the persisted layout
    pub fn resize(&mut self, bucket_hint: u32) {
        self.buckets = round_buckets(bucket_hint);
    }

    /// Grow when the load factor exceeds `target_load`; returns whether it did
    pub fn grow(&mut self, target_load: f64) -> bool {
        if target_load <= 0.0 || self.stat().load() <= target_load {
            return false;
        }
        let wanted = (self.entries as f64 / target_load).ceil().min(u32::MAX as f64) as u32;
        let old = self.buckets;
        self.resize(wanted);
        log::info!(
            "persisted layout resized from {} to {} buckets",
            old,
            self.buckets
        );
        self.buckets != old
    }

    /// Serialize the table into its file image
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(self.entries as usize)
            .map_err(|e| IndexError::Capacity(e.to_string()))?;

        let mut keys: Vec<u32> = self.chains.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            if let Some(chain) = self.chains.get(&key) {
                records.extend(chain.iter().map(|&value| Record { key, value }));
            }
        }
        writer::encode(self.buckets, &mut records, self.created_at)
    }

    /// Persist to `path`
    pub fn persist_to(&self, path: &Path) -> Result<()> {
        writer::write_atomic(path, &self.to_bytes()?)
    }

    /// Persist to the file this table was opened from
    pub fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.persist_to(path),
            None => Err(IndexError::Capacity(
                "in-memory table has no backing file".to_string(),
            )),
        }
    }

    /// Persist and release the table
    pub fn close(self) -> Result<()> {
        if self.path.is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

impl HashLookup for MutableFileBackedIndex {
    fn lookup(&self, key: u32) -> Option<TableValue> {
        MutableFileBackedIndex::lookup(self, key)
    }

    fn stat(&self) -> IndexStat {
        MutableFileBackedIndex::stat(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    #[test]
    fn test_bucket_hint_rounds_up() {
        assert_eq!(MutableFileBackedIndex::with_buckets(1000).stat().buckets, 1024);
        assert_eq!(MutableFileBackedIndex::with_buckets(0).stat().buckets, 1);
    }

    #[test]
    fn test_insert_twice_does_not_grow() {
        let mut table = MutableFileBackedIndex::with_buckets(64);
        let hashes: Vec<u32> = (0..500).map(|i| i * 7919).collect();

        let first = table.insert(3, &hashes).unwrap();
        assert_eq!(first.inserted, 500);
        let second = table.insert(3, &hashes).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.overwritten, 500);
        assert_eq!(table.stat().entries, 500);
    }

    #[test]
    fn test_chained_values_keep_order() {
        let mut table = MutableFileBackedIndex::with_buckets(4);
        table.insert_value(9, TableValue::new(1, 5)).unwrap();
        table.insert_value(9, TableValue::new(2, 6)).unwrap();
        assert_eq!(table.lookup(9), Some(TableValue::new(1, 5)));
        assert_eq!(table.lookup_all(9).count(), 2);
        assert_eq!(table.lookup(10), None);
    }

    #[test]
    fn test_flush_and_reload_preserves_chains() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.idx");

        let mut table = MutableFileBackedIndex::open(&path, 16).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let hashes: Vec<u32> = (0..2000).map(|_| rng.gen()).collect();
        table.insert(1, &hashes).unwrap();
        table.insert_value(hashes[0], TableValue::new(2, 99)).unwrap();
        table.flush().unwrap();

        let reloaded = MutableFileBackedIndex::open(&path, 1).unwrap();
        assert_eq!(reloaded.stat(), table.stat());
        assert_eq!(reloaded.lookup(hashes[0]), table.lookup(hashes[0]));
        let chain: Vec<_> = reloaded.lookup_all(hashes[0]).collect();
        assert_eq!(chain.last(), Some(&TableValue::new(2, 99)));
    }

    #[test]
    fn test_grow_to_power_of_two() {
        let mut table = MutableFileBackedIndex::with_buckets(4);
        table.insert(1, &(0..100).collect::<Vec<u32>>()).unwrap();
        assert!(!table.grow(50.0));
        assert!(table.grow(3.0));
        // ceil(100 / 3) = 34 -> 64
        assert_eq!(table.stat().buckets, 64);
        assert!(table.stat().buckets.is_power_of_two());
        assert_eq!(table.stat().entries, 100);
        assert!(table.lookup(42).is_some());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.idx");
        fs::write(&path, b"not an index at all").unwrap();
        let err = MutableFileBackedIndex::open(&path, 16).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn test_clear() {
        let mut table = MutableFileBackedIndex::with_buckets(8);
        table.insert(1, &[1, 2, 3]).unwrap();
        table.clear();
        assert_eq!(table.stat().entries, 0);
        assert_eq!(table.stat().buckets, 8);
        assert!(table.iter().next().is_none());
    }

    #[test]
    fn test_long_chain_on_one_key() {
        let mut table = MutableFileBackedIndex::with_buckets(16);
        let silence = vec![0u32; 20_000];
        for id in 1..=4 {
            let report = table.insert(id, &silence).unwrap();
            assert_eq!(report.inserted, 20_000);
        }
        assert_eq!(table.stat().entries, 80_000);
        assert_eq!(table.lookup(0), Some(TableValue::new(1, 0)));

        let again = table.insert(2, &silence[..100]).unwrap();
        assert_eq!(again.overwritten, 100);
        assert_eq!(table.lookup_all(0).count(), 80_000);

        table.clear();
        assert_eq!(table.insert(3, &silence[..10]).unwrap().inserted, 10);
    }
}
