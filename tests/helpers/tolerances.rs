//! Tolerance constants for audio testing.
//!
//! Pipelines built from the reference stages are expected to be bit-exact
//! against their pure counterparts; these bound everything else.

/// Floating point rounding errors (for passthrough, exact gain).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// FFT round trips over a few hundred bins.
pub const FFT_EPSILON: f32 = 1e-4;

/// 16-bit quantization step size.
/// Use when reading back 16-bit recordings.
pub const INT16_EPSILON: f32 = 1.0 / 32768.0;
