//! Audio decoding and resampling
//!
//! Every supported format is decoded to mono `f32` PCM at the requested
//! sample rate, optionally truncated to a maximum duration.

mod decoder;
mod resample;

pub use decoder::{decode_audio, AudioData};
pub use resample::resample_to_target;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to turn a file into PCM samples
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported audio format: {0}")]
    Unsupported(PathBuf),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("no samples decoded from {0}")]
    Empty(PathBuf),
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") | Some("oga") => AudioFormat::Ogg,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioFormat::from_path(Path::new("a/b.WAV")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_path(Path::new("x.mp3")), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_path(Path::new("x.flac")), AudioFormat::Flac);
        assert_eq!(AudioFormat::from_path(Path::new("x.ogg")), AudioFormat::Ogg);
        assert_eq!(AudioFormat::from_path(Path::new("x.txt")), AudioFormat::Unknown);
        assert!(!AudioFormat::from_path(Path::new("noext")).is_supported());
    }
}
