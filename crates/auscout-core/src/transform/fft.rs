//! Recursive radix-2 FFT
//!
//! Decimation-in-time over real input. The twiddle table uses the positive
//! exponent `exp(i·2πk/N)`; only magnitudes are consumed downstream so the
//! sign convention does not affect hashing.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Compute the DFT of `samples`. The length must be a power of two.
pub fn fft(samples: &[f64]) -> Vec<Complex64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    debug_assert!(n.is_power_of_two(), "fft length {} is not a power of two", n);

    let twiddles = twiddle_factors(n);
    let mut out = vec![Complex64::default(); n];
    let mut scratch = vec![Complex64::default(); n];
    fft_recursive(samples, 1, &twiddles, 1, &mut out, &mut scratch);
    out
}

fn twiddle_factors(n: usize) -> Vec<Complex64> {
    (0..n / 2)
        .map(|k| Complex64::from_polar(1.0, 2.0 * PI * k as f64 / n as f64))
        .collect()
}

/// `out.len()` is the transform size at this level; `x` is read with `stride`.
/// The two halves of `out` double as scratch space for the children.
fn fft_recursive(
    x: &[f64],
    stride: usize,
    twiddles: &[Complex64],
    tw_step: usize,
    out: &mut [Complex64],
    scratch: &mut [Complex64],
) {
    let n = out.len();
    if n == 1 {
        out[0] = Complex64::new(x[0], 0.0);
        return;
    }

    let half = n / 2;
    {
        let (evens, odds) = scratch[..n].split_at_mut(half);
        let (lo, hi) = out.split_at_mut(half);
        fft_recursive(x, stride * 2, twiddles, tw_step * 2, evens, lo);
        fft_recursive(&x[stride..], stride * 2, twiddles, tw_step * 2, odds, hi);
    }

    for k in 0..half {
        let t = scratch[half + k] * twiddles[k * tw_step];
        out[k] = scratch[k] + t;
        out[k + half] = scratch[k] - t;
    }
}
