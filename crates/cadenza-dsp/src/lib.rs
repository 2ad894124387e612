//! Reference stages for the cadenza pipeline.
//!
//! | Identifier | Stage | Route |
//! |------------|-------|-------|
//! | `gain` | [`Gain`] | time->time, frequency->frequency |
//! | `fft` | [`ForwardFft`] | time->frequency |
//! | `ifft` | [`InverseFft`] | frequency->time |
//! | `mixer` | [`Mixer`] | time->time, frequency->frequency |
//!
//! Each stage has a pure counterpart ([`scale`], [`forward_fft`],
//! [`inverse_fft`], [`mix`]) computing the same values outside a pipeline.
//!
//! ```
//! use cadenza_core::{params, Pipeline, SignalShape, StageSpec};
//!
//! let registry = cadenza_dsp::builtin_registry();
//! let (mut pipeline, _processor) = Pipeline::new();
//! pipeline.reconfigure(
//!     &registry,
//!     [
//!         StageSpec::with_params("mixer", params! { "inputs" => 2, "outputs" => 1 }),
//!         StageSpec::from("fft"),
//!     ],
//! )?;
//! let output = pipeline.prepare(SignalShape::time(2, 64, 16000.0))?;
//! assert_eq!(output.channels, 1);
//! # Ok::<(), cadenza_core::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod fft;
pub use fft::{forward_fft, inverse_fft, FftConfig, ForwardFft, InverseFft};

pub mod gain;
pub use gain::{scale, scale_spectrum, Gain, GainConfig};

pub mod mixer;
pub use mixer::{mix, Mixer, MixerConfig};

use cadenza_core::StageRegistry;

/// Register `gain`, `fft`, `ifft` and `mixer`.
pub fn register_builtin_stages(registry: &StageRegistry) {
    registry.register_transform("gain", |_| Ok(Gain));
    registry.register_transform("fft", |_| Ok(ForwardFft::new()));
    registry.register_transform("ifft", |_| Ok(InverseFft::new()));
    registry.register_transform("mixer", Mixer::from_params);
    tracing::debug!("registered builtin stages");
}

/// A registry holding only the builtin stages.
pub fn builtin_registry() -> StageRegistry {
    let registry = StageRegistry::new();
    register_builtin_stages(&registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{params, RegistryError, StageSpec};

    #[test]
    fn test_builtin_types() {
        let registry = builtin_registry();
        assert_eq!(registry.list_types(), vec!["fft", "gain", "ifft", "mixer"]);
    }

    #[test]
    fn test_create_with_params() {
        let registry = builtin_registry();
        let stage = registry
            .create(&StageSpec::with_params("gain", params! { "gain" => 0.25 }))
            .unwrap();
        assert_eq!(stage.name(), "gain");

        let err = registry
            .create(&StageSpec::with_params("mixer", params! { "inputs" => 0 }))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::ConstructionFailed(_)));
    }
}
