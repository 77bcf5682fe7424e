//! JSON output formatting

use auscout_core::{AudioData, Fingerprint, LookupResult};
use auscout_db::FIELD_SEPARATOR;
use auscout_index::IndexStat;
use serde::Serialize;
use std::path::Path;

/// Fingerprint of one file
#[derive(Debug, Serialize)]
pub struct FingerprintSummary {
    pub path: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub frames: usize,
    pub hash_count: usize,
    pub min_coeff: f64,
    pub max_coeff: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toggles: Option<Vec<Vec<u8>>>,
}

impl FingerprintSummary {
    pub fn new(path: &Path, audio: &AudioData, fp: &Fingerprint, with_hashes: bool) -> Self {
        Self {
            path: path.display().to_string(),
            duration_secs: audio.duration_secs(),
            sample_rate: audio.sample_rate,
            frames: fp.frames_analyzed(),
            hash_count: fp.len(),
            min_coeff: fp.min_coeff,
            max_coeff: fp.max_coeff,
            hashes: with_hashes.then(|| fp.hashes.clone()),
            toggles: if with_hashes { fp.toggles.clone() } else { None },
        }
    }
}

/// Per-file outcome; failures carry the error instead of a result
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FileReport<T> {
    Ok(T),
    Failed { path: String, error: String },
}

impl<T> FileReport<T> {
    pub fn failed(path: &Path, error: impl std::fmt::Display) -> Self {
        FileReport::Failed {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FileReport::Ok(_))
    }
}

/// Offline lookup of one file
#[derive(Debug, Serialize)]
pub struct LookupReport {
    pub path: String,
    #[serde(flatten)]
    pub result: LookupResult,
}

/// Track inserted into an index or submitted to a cluster
#[derive(Debug, Serialize)]
pub struct InsertReport {
    pub path: String,
    pub id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwritten: Option<u64>,
}

/// Cluster query of one file
#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub path: String,
    pub matched: bool,
    /// Metadata columns of the matched track
    pub fields: Vec<String>,
}

impl QueryReport {
    pub fn new(path: &Path, metadata: Option<&str>) -> Self {
        Self {
            path: path.display().to_string(),
            matched: metadata.is_some(),
            fields: metadata.map(split_inline).unwrap_or_default(),
        }
    }
}

/// Index file statistics
#[derive(Debug, Serialize)]
pub struct IndexReport {
    pub path: String,
    pub buckets: u32,
    pub entries: u64,
    pub load: f64,
    pub created_at: Option<String>,
}

impl IndexReport {
    pub fn new(path: &Path, stat: IndexStat, created_at: Option<String>) -> Self {
        Self {
            path: path.display().to_string(),
            buckets: stat.buckets,
            entries: stat.entries,
            load: stat.load(),
            created_at,
        }
    }
}

/// Inline metadata split into trimmed columns
pub fn split_inline(inline: &str) -> Vec<String> {
    inline
        .trim_end_matches('\0')
        .split(FIELD_SEPARATOR)
        .map(|field| field.trim().to_string())
        .collect()
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_inline() {
        let fields = split_inline("Bach \u{1E} Prelude \u{1E}   \u{1E} 1983\0");
        assert_eq!(fields, vec!["Bach", "Prelude", "", "1983"]);
    }

    #[test]
    fn test_query_report() {
        let miss = QueryReport::new(Path::new("q.wav"), None);
        assert!(!miss.matched);
        assert!(miss.fields.is_empty());

        let hit = QueryReport::new(Path::new("q.wav"), Some("a \u{1E} b"));
        assert_eq!(hit.fields, vec!["a", "b"]);
    }

    #[test]
    fn test_file_report_json() {
        let ok: FileReport<LookupReport> = FileReport::Ok(LookupReport {
            path: "x.wav".into(),
            result: LookupResult {
                id: Some(4),
                confidence: 0.5,
            },
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["confidence"], 0.5);

        let failed: FileReport<LookupReport> =
            FileReport::failed(Path::new("y.mp3"), "unsupported");
        assert!(!failed.is_ok());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "unsupported");
        assert_eq!(json["path"], "y.mp3");
    }

    #[test]
    fn test_index_report() {
        let report = IndexReport::new(
            Path::new("t.idx"),
            IndexStat {
                buckets: 4,
                entries: 10,
            },
            None,
        );
        assert_eq!(report.load, 2.5);
    }
}
