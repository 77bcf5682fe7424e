//! Bark-scale critical band filterbank
//!
//! A [`HashContext`] bundles everything that depends only on the sample
//! rate and frame duration: the frame length, a Hamming window and the
//! 33-filter weight matrix. Contexts are immutable and shared through
//! [`HashContextCache`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Number of critical band filters
pub const NUM_FILTERS: usize = 33;

/// Number of adjacent filter pairs, one hash bit each
pub const NUM_PAIRS: usize = NUM_FILTERS - 1;

/// Filter width in Bark
pub const BARK_WIDTH: f64 = 1.06;

/// Centre frequencies of the filters (Hz)
pub const CENTER_FREQUENCIES: [f64; NUM_FILTERS] = [
    50.0, 75.0, 100.0, 125.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0, 510.0, 570.0,
    635.0, 700.0, 770.0, 840.0, 920.0, 1000.0, 1085.0, 1170.0, 1270.0, 1370.0, 1485.0, 1600.0,
    1725.0, 1850.0, 2000.0, 2150.0, 2325.0, 2500.0, 2700.0, 2900.0,
];

/// Coefficient vector of one analysed frame
pub type BarkCoeffs = [f64; NUM_FILTERS];

/// Convert a frequency in Hz to Bark
pub fn bark(freq: f64) -> f64 {
    6.0 * (freq / 600.0).asinh()
}

/// Largest power of two not above `duration * sample_rate` samples
pub fn frame_length(sample_rate: u32, duration: f32) -> usize {
    let n = (duration * sample_rate as f32) as usize;
    if n == 0 {
        return 1;
    }
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Hamming window `0.54 - 0.46 cos(2πi / (len - 1))`
pub fn hamming(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Weight matrix `[filter][bin]` for `bins` spectrum bins
fn weights(sample_rate: u32, bins: usize) -> Vec<Vec<f64>> {
    // Nyquist is integer-truncated before conversion
    let nyquist = (sample_rate / 2) as f64;
    let bin_barks: Vec<f64> = (0..bins)
        .map(|j| bark(j as f64 * nyquist / bins as f64))
        .collect();

    CENTER_FREQUENCIES
        .iter()
        .map(|&centre| {
            let centre_bark = bark(centre);
            bin_barks
                .iter()
                .map(|&b| {
                    let d = b - centre_bark;
                    let lo = -2.5 * (d / BARK_WIDTH - 0.5);
                    let hi = d / BARK_WIDTH + 0.5;
                    10f64.powf(lo.min(hi).min(0.0))
                })
                .collect()
        })
        .collect()
}

/// Precomputed analysis state for one (sample rate, frame length)
#[derive(Debug)]
pub struct HashContext {
    sample_rate: u32,
    frame_length: usize,
    window: Vec<f64>,
    weights: Vec<Vec<f64>>,
}

impl HashContext {
    pub fn new(sample_rate: u32, frame_duration: f32) -> Self {
        Self::with_frame_length(sample_rate, frame_length(sample_rate, frame_duration))
    }

    fn with_frame_length(sample_rate: u32, frame_length: usize) -> Self {
        Self {
            sample_rate,
            frame_length,
            window: hamming(frame_length),
            weights: weights(sample_rate, frame_length / 2),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// Integrate a half-spectrum of magnitudes into the critical bands
    pub fn integrate(&self, magnitudes: &[f64]) -> BarkCoeffs {
        let mut coeffs = [0.0; NUM_FILTERS];
        for (coeff, row) in coeffs.iter_mut().zip(&self.weights) {
            *coeff = row.iter().zip(magnitudes).map(|(w, m)| w * m).sum();
        }
        coeffs
    }
}

/// Lazily built contexts keyed by (sample rate, frame length)
#[derive(Debug, Default)]
pub struct HashContextCache {
    contexts: Mutex<HashMap<(u32, usize), Arc<HashContext>>>,
}

impl HashContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sample_rate: u32, frame_duration: f32) -> Arc<HashContext> {
        let length = frame_length(sample_rate, frame_duration);
        let mut contexts = self.contexts.lock();
        contexts
            .entry((sample_rate, length))
            .or_insert_with(|| {
                log::debug!(
                    "building hash context: sr={} frame_length={}",
                    sample_rate,
                    length
                );
                Arc::new(HashContext::with_frame_length(sample_rate, length))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
