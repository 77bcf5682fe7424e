//! .idx file reader
//!
//! [`IndexView::parse`] validates a complete file image once; afterwards
//! bucket and entry accessors index into it without further checks.

use crate::error::{IndexError, Result};
use crate::format::{
    bucket_of, read_u32, IndexHeader, Record, TableValue, CRC64, ENTRY_SIZE, HEADER_SIZE, MAGIC,
    VERSION,
};
use std::path::Path;

/// Borrowed, validated view of a serialized index
#[derive(Debug, Clone, Copy)]
pub struct IndexView<'a> {
    buckets: u32,
    offsets: &'a [u8],
    entries: &'a [u8],
}

impl<'a> IndexView<'a> {
    /// Validate `bytes` as an index file and return its header and view
    pub fn parse(path: &Path, bytes: &'a [u8]) -> Result<(IndexHeader, Self)> {
        let header = IndexHeader::decode(bytes)
            .ok_or_else(|| IndexError::corrupt(path, "truncated header"))?;

        if header.magic != MAGIC {
            return Err(IndexError::corrupt(path, "magic bytes mismatch"));
        }
        if header.version != VERSION {
            return Err(IndexError::corrupt(
                path,
                format!("unsupported version {}", header.version),
            ));
        }
        if !header.bucket_count.is_power_of_two() {
            return Err(IndexError::corrupt(
                path,
                format!("bucket count {} is not a power of two", header.bucket_count),
            ));
        }
        if header.entry_count > u32::MAX as u64 {
            return Err(IndexError::corrupt(path, "entry count overflows offsets"));
        }
        if header.file_len() != bytes.len() as u64 {
            return Err(IndexError::corrupt(
                path,
                format!(
                    "length {} does not match header ({} expected)",
                    bytes.len(),
                    header.file_len()
                ),
            ));
        }

        let payload = &bytes[HEADER_SIZE..];
        if CRC64.checksum(payload) != header.checksum {
            return Err(IndexError::corrupt(path, "checksum mismatch"));
        }

        let view = Self::from_validated(&header, bytes);

        let mut prev = 0u32;
        for b in 0..=header.bucket_count as usize {
            let off = read_u32(view.offsets, b * 4);
            if off < prev || off as u64 > header.entry_count {
                return Err(IndexError::corrupt(path, format!("bad offset for bucket {}", b)));
            }
            prev = off;
        }
        if prev as u64 != header.entry_count {
            return Err(IndexError::corrupt(path, "offsets do not cover all entries"));
        }

        Ok((header, view))
    }

    /// View over a file image that already passed [`IndexView::parse`]
    pub(crate) fn from_validated(header: &IndexHeader, bytes: &'a [u8]) -> Self {
        let payload = &bytes[HEADER_SIZE..];
        let offsets_len = (header.bucket_count as usize + 1) * 4;
        Self {
            buckets: header.bucket_count,
            offsets: &payload[..offsets_len],
            entries: &payload[offsets_len..],
        }
    }

    pub fn buckets(&self) -> u32 {
        self.buckets
    }

    pub fn len(&self) -> usize {
        self.entries.len() / ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record at entry position `i`
    pub fn record(&self, i: usize) -> Record {
        let at = i * ENTRY_SIZE;
        Record {
            key: read_u32(self.entries, at),
            value: TableValue {
                id: read_u32(self.entries, at + 4),
                pos: read_u32(self.entries, at + 8),
            },
        }
    }

    /// Records stored in the bucket that `key` hashes to
    fn bucket(&self, key: u32) -> impl Iterator<Item = Record> + 'a {
        let b = bucket_of(key, self.buckets) as usize;
        let start = read_u32(self.offsets, b * 4) as usize;
        let end = read_u32(self.offsets, (b + 1) * 4) as usize;
        let view = *self;
        (start..end).map(move |i| view.record(i))
    }

    /// All values chained under `key`, in stored order
    pub fn values(&self, key: u32) -> impl Iterator<Item = TableValue> + 'a {
        self.bucket(key)
            .filter(move |r| r.key == key)
            .map(|r| r.value)
    }

    /// Every record in file order
    pub fn records(&self) -> impl Iterator<Item = Record> + 'a {
        let view = *self;
        (0..self.len()).map(move |i| view.record(i))
    }
}
