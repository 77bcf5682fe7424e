//! Read-only memory-mapped hash index

use crate::error::{IndexError, Result};
use crate::format::{round_buckets, IndexHeader, IndexStat, Record, TableValue};
use crate::reader::IndexView;
use crate::table::MutableFileBackedIndex;
use crate::HashLookup;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Index file mapped into memory and shared between lookup threads
#[derive(Debug)]
pub struct ReadOnlyMappedIndex {
    path: PathBuf,
    header: IndexHeader,
    map: Mmap,
}

impl ReadOnlyMappedIndex {
    /// Map `path`; an absent file is first created as an empty table
    pub fn open(path: &Path, bucket_hint: u32) -> Result<Self> {
        match Self::map(path) {
            Err(IndexError::NotFound(_)) => {
                log::info!(
                    "index {} not found, creating empty table with {} buckets",
                    path.display(),
                    round_buckets(bucket_hint)
                );
                MutableFileBackedIndex::with_buckets(bucket_hint).persist_to(path)?;
                Self::map(path)
            }
            other => other,
        }
    }

    fn map(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        // SAFETY: index files are only ever replaced by rename, never
        // rewritten in place, so the mapped pages stay unchanged.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::io(path, e))?;
        let (header, _) = IndexView::parse(path, &map)?;
        log::debug!(
            "mapped {} ({} buckets, {} entries)",
            path.display(),
            header.bucket_count,
            header.entry_count
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            map,
        })
    }

    fn view(&self) -> IndexView<'_> {
        IndexView::from_validated(&self.header, &self.map)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stat(&self) -> IndexStat {
        self.header.stat()
    }

    pub fn lookup(&self, key: u32) -> Option<TableValue> {
        self.view().values(key).next()
    }

    pub fn lookup_all(&self, key: u32) -> impl Iterator<Item = TableValue> + '_ {
        self.view().values(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        self.view().records()
    }

    /// Heap copy of this index bound to the same path
    pub fn to_mutable(&self) -> Result<MutableFileBackedIndex> {
        MutableFileBackedIndex::load(&self.path)
    }

    pub fn close(self) {}
}

impl HashLookup for ReadOnlyMappedIndex {
    fn lookup(&self, key: u32) -> Option<TableValue> {
        ReadOnlyMappedIndex::lookup(self, key)
    }

    fn stat(&self) -> IndexStat {
        ReadOnlyMappedIndex::stat(self)
    }
}
