//! Folding a temporary index into a durable one

use crate::error::{IndexError, Result};
use crate::table::MutableFileBackedIndex;
use std::fs;
use std::path::Path;

/// Outcome of [`merge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Source absent or empty; nothing written
    NothingToMerge,
    /// `records` new records were added to the destination
    Merged { records: u64 },
}

/// Move every record of `src_path` into `dst_path`, then empty the source.
///
/// The destination is created with `dst_bucket_hint` buckets when absent and
/// grown to stay under `max_load` entries per bucket when given. Both files
/// are rewritten through rename, so open mappings of either stay valid.
pub fn merge(
    dst_path: &Path,
    src_path: &Path,
    dst_bucket_hint: u32,
    max_load: Option<f64>,
) -> Result<MergeStatus> {
    match fs::metadata(src_path) {
        Ok(meta) if meta.len() == 0 => return Ok(MergeStatus::NothingToMerge),
        Ok(_) => {}
        Err(e) => {
            return match IndexError::io(src_path, e) {
                IndexError::NotFound(_) => Ok(MergeStatus::NothingToMerge),
                other => Err(other),
            }
        }
    }

    let mut src = MutableFileBackedIndex::load(src_path)?;
    if src.stat().entries == 0 {
        return Ok(MergeStatus::NothingToMerge);
    }

    let mut dst = MutableFileBackedIndex::open(dst_path, dst_bucket_hint)?;
    let records = dst.absorb(src.iter())?;
    if let Some(load) = max_load {
        dst.grow(load);
    }
    dst.flush()?;

    src.clear();
    src.flush()?;

    log::info!(
        "merged {} into {}: {} new records, {} total",
        src_path.display(),
        dst_path.display(),
        records,
        dst.stat().entries
    );
    Ok(MergeStatus::Merged { records })
}
