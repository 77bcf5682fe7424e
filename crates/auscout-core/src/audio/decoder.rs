//! Audio decoding for multiple formats

use super::{resample_to_target, AudioFormat, DecodeError};
use anyhow::{Context, Result};
use std::path::Path;

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: u32,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Interleaved samples as they come out of a format decoder
struct RawAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl RawAudio {
    fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(self.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    }
}

/// Decode `path` to mono PCM at `target_sample_rate`.
///
/// With `max_seconds` set, at most that many seconds of the resampled
/// signal are returned.
pub fn decode_audio(
    path: &Path,
    target_sample_rate: u32,
    max_seconds: Option<f32>,
) -> std::result::Result<AudioData, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let raw = match AudioFormat::from_path(path) {
        AudioFormat::Wav => decode_wav(path),
        AudioFormat::Mp3 => decode_mp3(path),
        AudioFormat::Flac => decode_flac(path),
        AudioFormat::Ogg => decode_ogg(path),
        AudioFormat::Unknown => return Err(DecodeError::Unsupported(path.to_path_buf())),
    }
    .map_err(|e| DecodeError::Decode {
        path: path.to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    if raw.samples.is_empty() || raw.sample_rate == 0 {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    let mono = raw.to_mono();
    let mut samples = resample_to_target(&mono, raw.sample_rate, target_sample_rate);

    if let Some(secs) = max_seconds {
        let limit = (secs.max(0.0) as f64 * target_sample_rate as f64) as usize;
        samples.truncate(limit);
    }

    let duration_ms = (samples.len() as f64 / target_sample_rate as f64 * 1000.0) as u32;
    log::debug!(
        "decoded {}: {} Hz x{} -> {} samples @ {} Hz",
        path.display(),
        raw.sample_rate,
        raw.channels,
        samples.len(),
        target_sample_rate
    );

    Ok(AudioData {
        samples,
        sample_rate: target_sample_rate,
        duration_ms,
    })
}

/// Decode WAV file
fn decode_wav(path: &Path) -> Result<RawAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(RawAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode MP3 file
fn decode_mp3(path: &Path) -> Result<RawAudio> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read MP3 file: {}", path.display()))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => anyhow::bail!("MP3 decode error: {}", e),
        }
    }

    Ok(RawAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode FLAC file
fn decode_flac(path: &Path) -> Result<RawAudio> {
    let mut reader = claxon::FlacReader::open(path)
        .with_context(|| format!("Failed to open FLAC file: {}", path.display()))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;
    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawAudio {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

/// Decode OGG Vorbis file
fn decode_ogg(path: &Path) -> Result<RawAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open OGG file: {}", path.display()))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)?;
    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader.read_dec_packet_itl()? {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(RawAudio {
        samples,
        sample_rate,
        channels,
    })
}
