//! Test helpers and fixtures for cadenza integration tests
//!
//! Every engine here runs on the offline driver unless a test needs a real
//! audio thread, so cycles are under manual control.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `FFT_EPSILON` (1e-4): Spectral round trips
//! - `INT16_EPSILON`: 16-bit file round trips

#![allow(dead_code)]

pub mod tolerances;

use approx::assert_abs_diff_eq;
use cadenza::prelude::*;

/// Sample rate of the deterministic scenarios.
pub const TEST_SAMPLE_RATE: f64 = 16000.0;

/// Fragment length of the deterministic scenarios.
pub const TEST_FRAGMENT_LEN: usize = 64;

/// Offline engine with the builtin stages and no pipeline loaded.
pub fn test_engine(channels: usize) -> Engine {
    Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .fragment_len(TEST_FRAGMENT_LEN)
        .channels(channels)
        .build()
        .expect("Failed to create test engine")
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate white noise (random samples in -1..1).
pub fn generate_noise(num_samples: usize, seed: u64) -> Vec<f32> {
    // Simple LCG for reproducible "random" noise
    let mut rng = seed;
    (0..num_samples)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((rng >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// One interleaved fragment as a time-domain signal.
pub fn fragment(channels: usize, samples: &[f32]) -> Signal {
    TimeBuffer::from_interleaved(channels, samples.to_vec())
        .expect("fragment length must be a multiple of the channel count")
        .into()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that two signals match sample by sample within tolerance.
pub fn assert_signals_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "signal lengths differ");
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(*a, *e, epsilon = tolerance);
    }
}

/// Install a `tracing` subscriber once, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
