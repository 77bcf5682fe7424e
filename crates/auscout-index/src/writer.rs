//! .idx file writer

use crate::error::{IndexError, Result};
use crate::format::{bucket_of, IndexHeader, Record, CRC64, ENTRY_SIZE, HEADER_SIZE};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialize records into the on-disk layout.
///
/// Records are grouped by bucket with a stable sort, so values chained under
/// one key keep their relative order.
pub fn encode(buckets: u32, records: &mut Vec<Record>, created_at: i64) -> Result<Vec<u8>> {
    if records.len() > u32::MAX as usize {
        return Err(IndexError::Capacity(format!(
            "{} entries exceed the file format limit",
            records.len()
        )));
    }

    records.sort_by_key(|r| bucket_of(r.key, buckets));

    let mut counts = vec![0u32; buckets as usize + 1];
    for r in records.iter() {
        counts[bucket_of(r.key, buckets) as usize + 1] += 1;
    }
    for b in 1..counts.len() {
        counts[b] += counts[b - 1];
    }

    let payload_len = counts.len() * 4 + records.len() * ENTRY_SIZE;
    let mut buf = Vec::new();
    buf.try_reserve_exact(HEADER_SIZE + payload_len)
        .map_err(|e| IndexError::Capacity(e.to_string()))?;
    buf.resize(HEADER_SIZE, 0);

    for off in &counts {
        buf.extend_from_slice(&off.to_le_bytes());
    }
    for r in records.iter() {
        buf.extend_from_slice(&r.key.to_le_bytes());
        buf.extend_from_slice(&r.value.id.to_le_bytes());
        buf.extend_from_slice(&r.value.pos.to_le_bytes());
    }

    let mut header = IndexHeader::new(buckets, records.len() as u64, created_at);
    header.checksum = CRC64.checksum(&buf[HEADER_SIZE..]);
    buf[..HEADER_SIZE].copy_from_slice(&header.encode());
    Ok(buf)
}

/// Write `bytes` to a sibling file and rename it over `path`.
///
/// Readers that already mapped the old file keep seeing the old contents.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = sibling(path);
    {
        let file = File::create(&tmp).map_err(|e| IndexError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).map_err(|e| IndexError::io(&tmp, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| IndexError::io(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| IndexError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        IndexError::io(path, e)
    })?;
    log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", std::process::id()));
    path.with_file_name(name)
}
