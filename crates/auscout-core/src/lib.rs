//! Audio Scout Core - Perceptual Audio Hashing
//!
//! Turns PCM audio into sequences of 32-bit Bark-band hashes and matches
//! such sequences against an [`auscout_index`] table, tolerating bit errors
//! through toggle candidates.

pub mod audio;
pub mod candidates;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matching;
pub mod transform;

pub use transform::{bark, fft};

pub use audio::{decode_audio, AudioData, DecodeError};
pub use candidates::Candidates;
pub use config::{AuscoutConfig, HashConfig};
pub use error::HashError;
pub use fingerprint::{ExtractOptions, Fingerprint, FingerprintExtractor};
pub use matching::{LookupResult, MatchParams, Matcher};

use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Failure to fingerprint one file
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Decode and fingerprint a single file
pub fn fingerprint_file(
    path: &Path,
    config: &HashConfig,
    extractor: &FingerprintExtractor,
    options: &ExtractOptions,
) -> Result<(AudioData, Fingerprint), FileError> {
    let audio = decode_audio(path, config.sample_rate, config.max_seconds)?;
    let fp = extractor.extract(&audio.samples, audio.sample_rate, options)?;
    Ok((audio, fp))
}

/// Fingerprint many files in parallel; each item carries its own outcome
pub fn fingerprint_files(
    paths: &[PathBuf],
    config: &HashConfig,
    options: &ExtractOptions,
) -> Vec<(PathBuf, Result<(AudioData, Fingerprint), FileError>)> {
    let extractor = FingerprintExtractor::new(config);
    paths
        .par_iter()
        .map(|path| {
            let result = fingerprint_file(path, config, &extractor, options);
            if let Err(e) = &result {
                log::warn!("skipping {}: {}", path.display(), e);
            }
            (path.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_noise(path: &Path, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 6000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let mut state = 1u32;
        for _ in 0..6000 * seconds {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            writer.write_sample((state >> 16) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_fingerprint_files_reports_each_item() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("a.wav");
        write_noise(&good, 2);
        let missing = dir.path().join("missing.wav");

        let results = fingerprint_files(
            &[good.clone(), missing.clone()],
            &HashConfig::default(),
            &ExtractOptions::default(),
        );
        assert_eq!(results.len(), 2);

        let (path, ok) = &results[0];
        assert_eq!(path, &good);
        let (audio, fp) = ok.as_ref().unwrap();
        assert_eq!(audio.samples.len(), 12_000);
        // (12000 - 2048) / 64 + 1 = 156 frames
        assert_eq!(fp.frames_analyzed(), 156);
        assert_eq!(fp.hashes.len(), 154);

        assert!(matches!(
            results[1].1,
            Err(FileError::Decode(DecodeError::NotFound(_)))
        ));
    }
}
