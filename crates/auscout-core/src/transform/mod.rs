//! Spectral analysis: FFT kernel and Bark filterbank

pub mod bark;
pub mod fft;

pub use bark::{HashContext, HashContextCache, NUM_FILTERS};
pub use fft::fft;
