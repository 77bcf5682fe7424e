//! .idx file format structures
//!
//! ```text
//! +---------------------+ 0
//! | header (64 bytes)   |
//! +---------------------+ 64
//! | offsets: u32 x B+1  |  entry index of each bucket start, CSR style
//! +---------------------+
//! | entries: 12 x N     |  (key, id, pos), grouped by bucket
//! +---------------------+
//! ```
//!
//! All integers are little-endian. The checksum covers everything after
//! the header.

use serde::{Deserialize, Serialize};

/// Magic bytes for .idx files: "ASIX"
pub const MAGIC: [u8; 4] = *b"ASIX";

/// Current format version
pub const VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Size of one serialized entry
pub const ENTRY_SIZE: usize = 12;

/// Checksum algorithm for the payload
pub const CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

/// Value stored under a hash key: which track, and at which frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableValue {
    pub id: u32,
    pub pos: u32,
}

impl TableValue {
    pub fn new(id: u32, pos: u32) -> Self {
        Self { id, pos }
    }
}

/// One key/value record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub key: u32,
    pub value: TableValue,
}

/// Bucket and entry counts of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStat {
    pub buckets: u32,
    pub entries: u64,
}

impl IndexStat {
    /// Mean entries per bucket
    pub fn load(&self) -> f64 {
        if self.buckets == 0 {
            return 0.0;
        }
        self.entries as f64 / self.buckets as f64
    }
}

/// File header (64 bytes fixed size)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Magic bytes: "ASIX"
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Flags (unused, zero)
    pub flags: u16,
    /// Number of buckets, a power of two
    pub bucket_count: u32,
    /// Reserved
    pub reserved1: u32,
    /// Number of entries
    pub entry_count: u64,
    /// Table creation time, unix seconds
    pub created_at: i64,
    /// CRC64 of offsets + entries
    pub checksum: u64,
}

impl IndexHeader {
    pub fn new(bucket_count: u32, entry_count: u64, created_at: i64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            bucket_count,
            reserved1: 0,
            entry_count,
            created_at,
            checksum: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..12].copy_from_slice(&self.bucket_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.reserved1.to_le_bytes());
        buf[16..24].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.created_at.to_le_bytes());
        buf[32..40].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode the fixed fields; `buf` must hold at least [`HEADER_SIZE`] bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        Some(Self {
            magic,
            version: u16::from_le_bytes([buf[4], buf[5]]),
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            bucket_count: read_u32(buf, 8),
            reserved1: read_u32(buf, 12),
            entry_count: read_u64(buf, 16),
            created_at: read_u64(buf, 24) as i64,
            checksum: read_u64(buf, 32),
        })
    }

    pub fn stat(&self) -> IndexStat {
        IndexStat {
            buckets: self.bucket_count,
            entries: self.entry_count,
        }
    }

    /// Total file length implied by the counts
    pub fn file_len(&self) -> u64 {
        HEADER_SIZE as u64
            + (self.bucket_count as u64 + 1) * 4
            + self.entry_count * ENTRY_SIZE as u64
    }
}

/// Spread the key bits before masking so that structured hashes still
/// distribute over the low buckets.
#[inline]
pub fn mix(key: u32) -> u32 {
    let mut h = key;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Bucket of `key` in a table of `buckets` (a power of two)
#[inline]
pub fn bucket_of(key: u32, buckets: u32) -> u32 {
    mix(key) & (buckets - 1)
}

/// Round a bucket hint up to a power of two, at least 1
pub fn round_buckets(hint: u32) -> u32 {
    hint.max(1).checked_next_power_of_two().unwrap_or(1 << 31)
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

#[inline]
pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}
