//! Error types for hash extraction

use thiserror::Error;

/// Lowest sample rate the Bark filterbank can cover
pub const MIN_SAMPLE_RATE: u32 = 6000;

#[derive(Debug, Error, PartialEq)]
pub enum HashError {
    #[error("sample rate {0} Hz is below the {min} Hz minimum", min = MIN_SAMPLE_RATE)]
    SampleRate(u32),

    #[error("{0} toggles requested, at most {max} are supported", max = crate::candidates::MAX_TOGGLES)]
    Toggles(usize),
}
