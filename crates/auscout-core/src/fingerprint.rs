//! Fingerprint extraction
//!
//! The signal is cut into heavily overlapping Hamming-windowed frames
//! (advance = 1/32 of the frame length). Each frame is reduced to 33 Bark
//! band energies, and each hash bit records whether the energy difference
//! between two adjacent bands grew or shrank between the frames on either
//! side of the current one.

use crate::candidates::MAX_TOGGLES;
use crate::config::HashConfig;
use crate::error::{HashError, MIN_SAMPLE_RATE};
use crate::transform::bark::{BarkCoeffs, HashContext, HashContextCache, NUM_PAIRS};
use crate::transform::fft;
use rayon::prelude::*;
use std::sync::Arc;

/// Per-call extraction switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Number of least reliable bit positions to report per frame
    pub toggles: usize,
    /// Keep the Bark coefficient rows of every analysed frame
    pub keep_coeffs: bool,
}

/// Hash sequence of one signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fingerprint {
    /// One hash per frame, bit 0 (MSB) from the lowest band pair
    pub hashes: Vec<u32>,
    /// Per-hash band pair indices ordered by ascending |diff|
    pub toggles: Option<Vec<Vec<u8>>>,
    /// Bark coefficients of every analysed frame
    pub coeffs: Option<Vec<BarkCoeffs>>,
    /// Smallest Bark coefficient seen
    pub min_coeff: f64,
    /// Largest Bark coefficient seen
    pub max_coeff: f64,
    frames_analyzed: usize,
}

impl Fingerprint {
    /// Number of frames run through the filterbank (hashes + 2 when non-empty)
    pub fn frames_analyzed(&self) -> usize {
        self.frames_analyzed
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Toggle rows as slices, when they were requested
    pub fn toggle_rows(&self) -> Option<&[Vec<u8>]> {
        self.toggles.as_deref()
    }
}

/// Hop between consecutive frames
pub fn frame_advance(frame_length: usize) -> usize {
    (frame_length - 31 * frame_length / 32).max(1)
}

/// Number of whole frames that fit into `len` samples
pub fn frame_count(len: usize, frame_length: usize) -> usize {
    if len < frame_length {
        return 0;
    }
    (len - frame_length) / frame_advance(frame_length) + 1
}

/// Computes fingerprints with a shared context cache
#[derive(Debug, Clone)]
pub struct FingerprintExtractor {
    frame_duration: f32,
    cache: Arc<HashContextCache>,
}

impl FingerprintExtractor {
    pub fn new(config: &HashConfig) -> Self {
        Self::with_cache(config, Arc::new(HashContextCache::new()))
    }

    pub fn with_cache(config: &HashConfig, cache: Arc<HashContextCache>) -> Self {
        Self {
            frame_duration: config.frame_duration,
            cache,
        }
    }

    pub fn context(&self, sample_rate: u32) -> Arc<HashContext> {
        self.cache.get(sample_rate, self.frame_duration)
    }

    /// Fingerprint mono PCM sampled at `sample_rate`.
    ///
    /// Inputs shorter than three frames produce an empty fingerprint.
    pub fn extract(
        &self,
        pcm: &[f32],
        sample_rate: u32,
        options: &ExtractOptions,
    ) -> Result<Fingerprint, HashError> {
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(HashError::SampleRate(sample_rate));
        }
        if options.toggles > MAX_TOGGLES {
            return Err(HashError::Toggles(options.toggles));
        }

        let ctx = self.context(sample_rate);
        let coeffs = analyse(&ctx, pcm);

        let (min_coeff, max_coeff) = if coeffs.is_empty() {
            (0.0, 0.0)
        } else {
            coeffs
                .iter()
                .flatten()
                .fold((f64::MAX, 0.0f64), |(lo, hi), &c| (lo.min(c), hi.max(c)))
        };

        let mut hashes = Vec::with_capacity(coeffs.len().saturating_sub(2));
        let mut toggles = (options.toggles > 0).then(|| Vec::with_capacity(hashes.capacity()));

        for i in 1..coeffs.len().saturating_sub(1) {
            let (prev, next) = (&coeffs[i - 1], &coeffs[i + 1]);
            let mut hash = 0u32;
            let mut magnitudes = [0.0f64; NUM_PAIRS];

            for m in 0..NUM_PAIRS {
                let diff = (next[m] - next[m + 1]) - (prev[m] - prev[m + 1]);
                hash <<= 1;
                if diff > 0.0 {
                    hash |= 1;
                }
                magnitudes[m] = diff.abs();
            }
            hashes.push(hash);

            if let Some(rows) = toggles.as_mut() {
                let mut order: [u8; NUM_PAIRS] = std::array::from_fn(|m| m as u8);
                order.sort_by(|&a, &b| magnitudes[a as usize].total_cmp(&magnitudes[b as usize]));
                rows.push(order[..options.toggles].to_vec());
            }
        }

        log::debug!(
            "extracted {} hashes from {} samples ({} frames, frame_length={})",
            hashes.len(),
            pcm.len(),
            coeffs.len(),
            ctx.frame_length()
        );

        let frames_analyzed = coeffs.len();
        Ok(Fingerprint {
            hashes,
            toggles,
            coeffs: options.keep_coeffs.then_some(coeffs),
            min_coeff,
            max_coeff,
            frames_analyzed,
        })
    }
}

/// Window, transform and integrate every frame
fn analyse(ctx: &HashContext, pcm: &[f32]) -> Vec<BarkCoeffs> {
    let length = ctx.frame_length();
    let advance = frame_advance(length);
    let total = frame_count(pcm.len(), length);

    (0..total)
        .into_par_iter()
        .map_init(
            || (vec![0.0f64; length], vec![0.0f64; length / 2]),
            |(frame, magnitudes), k| {
                let start = k * advance;
                analyse_frame(ctx, &pcm[start..start + length], frame, magnitudes)
            },
        )
        .collect()
}

fn analyse_frame(
    ctx: &HashContext,
    samples: &[f32],
    frame: &mut [f64],
    magnitudes: &mut [f64],
) -> BarkCoeffs {
    for ((dst, &s), &w) in frame.iter_mut().zip(samples).zip(ctx.window()) {
        *dst = s as f64 * w;
    }

    let spectrum = fft(frame);
    for (m, bin) in magnitudes.iter_mut().zip(&spectrum) {
        *m = bin.norm();
    }
    ctx.integrate(magnitudes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::bark::NUM_FILTERS;
    use std::f64::consts::PI;

    fn extractor() -> FingerprintExtractor {
        FingerprintExtractor::new(&HashConfig::default())
    }

    /// 100 summed cosines starting at 20 Hz, 50 Hz apart
    fn cosine_bank(sample_rate: u32, seconds: u32) -> Vec<f32> {
        let n = (sample_rate * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let sum: f64 = (0..100)
                    .map(|k| (2.0 * PI * (20.0 + 50.0 * k as f64) * t).cos())
                    .sum();
                (sum / 100.0) as f32
            })
            .collect()
    }

    #[test]
    fn test_regression_frame_counts() {
        let pcm = cosine_bank(8000, 30);
        let opts = ExtractOptions {
            toggles: 3,
            keep_coeffs: true,
        };
        let fp = extractor().extract(&pcm, 8000, &opts).unwrap();

        assert_eq!(fp.frames_analyzed(), 3719);
        assert_eq!(fp.hashes.len(), 3717);

        let coeffs = fp.coeffs.as_ref().unwrap();
        assert_eq!(coeffs.len(), 3719);
        assert!(coeffs.iter().all(|row| row.len() == NUM_FILTERS));

        let toggles = fp.toggles.as_ref().unwrap();
        assert_eq!(toggles.len(), 3717);
        assert!(toggles.iter().all(|row| row.len() == 3));
        assert!(fp.min_coeff <= fp.max_coeff);
    }

    #[test]
    fn test_short_input_is_empty() {
        let ex = extractor();
        let opts = ExtractOptions::default();

        let fp = ex.extract(&[], 8000, &opts).unwrap();
        assert!(fp.is_empty());
        assert_eq!(fp.frames_analyzed(), 0);

        let fp = ex.extract(&vec![0.1; 2047], 8000, &opts).unwrap();
        assert!(fp.is_empty());
        assert_eq!(fp.frames_analyzed(), 0);

        // exactly two frames: still no hash
        let fp = ex.extract(&vec![0.1; 2048 + 64], 8000, &opts).unwrap();
        assert_eq!(fp.frames_analyzed(), 2);
        assert!(fp.is_empty());

        let fp = ex.extract(&vec![0.1; 2048 + 128], 8000, &opts).unwrap();
        assert_eq!(fp.hashes.len(), 1);
    }

    #[test]
    fn test_low_sample_rate_rejected() {
        let err = extractor()
            .extract(&[0.0; 10], 5999, &ExtractOptions::default())
            .unwrap_err();
        assert_eq!(err, HashError::SampleRate(5999));
    }

    #[test]
    fn test_too_many_toggles_rejected() {
        let opts = ExtractOptions {
            toggles: MAX_TOGGLES + 1,
            keep_coeffs: false,
        };
        assert!(matches!(
            extractor().extract(&[0.0; 10], 8000, &opts),
            Err(HashError::Toggles(_))
        ));
    }

    #[test]
    fn test_hashes_follow_coefficients() {
        let pcm = cosine_bank(8000, 2);
        let opts = ExtractOptions {
            toggles: 5,
            keep_coeffs: true,
        };
        let fp = extractor().extract(&pcm, 8000, &opts).unwrap();
        let coeffs = fp.coeffs.as_ref().unwrap();
        let toggles = fp.toggles.as_ref().unwrap();

        for (i, &hash) in fp.hashes.iter().enumerate().step_by(17) {
            let (prev, next) = (&coeffs[i], &coeffs[i + 2]);
            let diffs: Vec<f64> = (0..NUM_PAIRS)
                .map(|m| (next[m] - next[m + 1]) - (prev[m] - prev[m + 1]))
                .collect();

            for (m, d) in diffs.iter().enumerate() {
                let bit = hash & (0x8000_0000 >> m) != 0;
                assert_eq!(bit, *d > 0.0, "frame {} pair {}", i, m);
            }

            let ranked: Vec<f64> = toggles[i].iter().map(|&t| diffs[t as usize].abs()).collect();
            assert!(ranked.windows(2).all(|w| w[0] <= w[1]));
            let smallest = diffs.iter().map(|d| d.abs()).fold(f64::MAX, f64::min);
            assert_eq!(ranked[0], smallest);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let pcm = cosine_bank(6000, 3);
        let ex = extractor();
        let a = ex.extract(&pcm, 6000, &ExtractOptions::default()).unwrap();
        let b = ex.extract(&pcm, 6000, &ExtractOptions::default()).unwrap();
        assert_eq!(a.hashes, b.hashes);
        assert!(a.toggles.is_none());
        assert!(a.coeffs.is_none());
    }

    #[test]
    fn test_parallel_frames_keep_signal_order() {
        let pcm = cosine_bank(8000, 4);
        let ctx = HashContextCache::new().get(8000, 0.40);
        let length = ctx.frame_length();
        let advance = frame_advance(length);
        let rows = analyse(&ctx, &pcm);
        assert_eq!(rows.len(), frame_count(pcm.len(), length));

        let mut frame = vec![0.0; length];
        let mut magnitudes = vec![0.0; length / 2];
        for k in [0, 1, rows.len() / 2, rows.len() - 1] {
            let start = k * advance;
            let expected =
                analyse_frame(&ctx, &pcm[start..start + length], &mut frame, &mut magnitudes);
            assert_eq!(rows[k], expected, "frame {}", k);
        }
    }
}
