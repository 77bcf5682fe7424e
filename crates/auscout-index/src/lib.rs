//! Audio Scout hash index
//!
//! Maps 32-bit audio hashes to `(track id, frame position)` values. A
//! writable heap table ([`MutableFileBackedIndex`]) collects new entries and
//! a memory-mapped table ([`ReadOnlyMappedIndex`]) serves lookups; both
//! share one flat little-endian file format.

pub mod error;
pub mod format;
pub mod mapped;
pub mod merge;
pub mod reader;
pub mod table;
pub mod writer;

pub use error::IndexError;
pub use format::{IndexHeader, IndexStat, Record, TableValue, MAGIC, VERSION};
pub use mapped::ReadOnlyMappedIndex;
pub use merge::{merge, MergeStatus};
pub use table::{InsertOutcome, InsertReport, MutableFileBackedIndex};

use std::path::Path;

/// Point lookups against any table flavour
pub trait HashLookup {
    /// A representative value stored under `key`
    fn lookup(&self, key: u32) -> Option<TableValue>;

    fn stat(&self) -> IndexStat;
}

impl<T: HashLookup + ?Sized> HashLookup for &T {
    fn lookup(&self, key: u32) -> Option<TableValue> {
        (**self).lookup(key)
    }

    fn stat(&self) -> IndexStat {
        (**self).stat()
    }
}

/// How to open an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Reader,
    Writer,
}

/// An opened index of either flavour
#[derive(Debug)]
pub enum AudioIndex {
    Reader(ReadOnlyMappedIndex),
    Writer(MutableFileBackedIndex),
}

/// Open `path` for reading (mapped) or writing (heap)
pub fn open_index(path: &Path, mode: IndexMode, bucket_hint: u32) -> error::Result<AudioIndex> {
    Ok(match mode {
        IndexMode::Reader => AudioIndex::Reader(ReadOnlyMappedIndex::open(path, bucket_hint)?),
        IndexMode::Writer => AudioIndex::Writer(MutableFileBackedIndex::open(path, bucket_hint)?),
    })
}

impl AudioIndex {
    pub fn mode(&self) -> IndexMode {
        match self {
            AudioIndex::Reader(_) => IndexMode::Reader,
            AudioIndex::Writer(_) => IndexMode::Writer,
        }
    }

    pub fn as_writer(&mut self) -> Option<&mut MutableFileBackedIndex> {
        match self {
            AudioIndex::Writer(table) => Some(table),
            AudioIndex::Reader(_) => None,
        }
    }

    pub fn lookup_all(&self, key: u32) -> Vec<TableValue> {
        match self {
            AudioIndex::Reader(index) => index.lookup_all(key).collect(),
            AudioIndex::Writer(table) => table.lookup_all(key).collect(),
        }
    }

    /// Flush a writer; readers have nothing to write
    pub fn close(self) -> error::Result<()> {
        match self {
            AudioIndex::Reader(index) => {
                index.close();
                Ok(())
            }
            AudioIndex::Writer(table) => table.close(),
        }
    }
}

impl HashLookup for AudioIndex {
    fn lookup(&self, key: u32) -> Option<TableValue> {
        match self {
            AudioIndex::Reader(index) => index.lookup(key),
            AudioIndex::Writer(table) => table.lookup(key),
        }
    }

    fn stat(&self) -> IndexStat {
        match self {
            AudioIndex::Reader(index) => index.stat(),
            AudioIndex::Writer(table) => table.stat(),
        }
    }
}
