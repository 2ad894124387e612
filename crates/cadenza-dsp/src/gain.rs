//! Linear gain in either domain.

use cadenza_core::{
    get_param_or, Complex32, ProcessError, RegistryError, ShapeRejection, SignalShape,
    SpectrumBuffer, StageParams, TimeBuffer, Transform,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainConfig {
    pub gain: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

/// Scale every sample.
pub fn scale(input: &[f32], gain: f32) -> Vec<f32> {
    input.iter().map(|x| x * gain).collect()
}

/// Scale every bin.
pub fn scale_spectrum(input: &[Complex32], gain: f32) -> Vec<Complex32> {
    input.iter().map(|&x| x * gain).collect()
}

/// Multiplies the signal by a constant. Any shape passes through unchanged.
#[derive(Debug, Default)]
pub struct Gain;

impl Transform for Gain {
    type Config = GainConfig;

    fn configure(params: &StageParams) -> Result<GainConfig, RegistryError> {
        let gain = get_param_or(params, "gain", 1.0, |v| v.as_f32())?;
        if !gain.is_finite() {
            return Err(RegistryError::InvalidParameter(
                "gain".into(),
                format!("{gain} is not finite"),
            ));
        }
        Ok(GainConfig { gain })
    }

    fn negotiate(
        &self,
        requested: &SignalShape,
        _config: Option<&GainConfig>,
    ) -> Result<SignalShape, ShapeRejection> {
        Ok(*requested)
    }

    fn time_to_time(
        &mut self,
        config: &GainConfig,
        input: &TimeBuffer,
        output: &mut TimeBuffer,
    ) -> Result<(), ProcessError> {
        for (out, x) in output.samples_mut().iter_mut().zip(input.samples()) {
            *out = x * config.gain;
        }
        Ok(())
    }

    fn frequency_to_frequency(
        &mut self,
        config: &GainConfig,
        input: &SpectrumBuffer,
        output: &mut SpectrumBuffer,
    ) -> Result<(), ProcessError> {
        for (out, &x) in output.data_mut().iter_mut().zip(input.data()) {
            *out = x * config.gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{params, Signal, Stage, StageAdapter};

    #[test]
    fn test_configure() {
        assert_eq!(Gain::configure(&StageParams::new()).unwrap().gain, 1.0);
        assert_eq!(
            Gain::configure(&params! { "gain" => 0.5 }).unwrap().gain,
            0.5
        );
        assert!(Gain::configure(&params! { "gain" => f64::INFINITY }).is_err());
        assert!(Gain::configure(&params! { "gain" => "loud" }).is_err());
    }

    #[test]
    fn test_time_domain() {
        let shape = SignalShape::time(2, 2, 48000.0);
        let mut stage = StageAdapter::with_config("gain", Gain, GainConfig { gain: 2.0 });
        stage.negotiate(&shape).unwrap();

        let input: Signal = TimeBuffer::from_interleaved(2, vec![1.0, -1.0, 0.5, 0.25])
            .unwrap()
            .into();
        let output = stage.process(&input).unwrap();
        assert_eq!(output.as_time().unwrap().samples(), &[2.0, -2.0, 1.0, 0.5]);
        assert_eq!(scale(&[1.0, -1.0, 0.5, 0.25], 2.0), vec![2.0, -2.0, 1.0, 0.5]);
    }

    #[test]
    fn test_frequency_domain() {
        let shape = SignalShape::frequency(1, 2, 2, 48000.0);
        let mut stage = StageAdapter::with_config("gain", Gain, GainConfig { gain: 0.5 });
        stage.negotiate(&shape).unwrap();

        let mut spectrum = SpectrumBuffer::new(1, 2);
        spectrum.data_mut()[0] = Complex32::new(2.0, -4.0);
        let output = stage.process(&Signal::from(spectrum)).unwrap();
        assert_eq!(output.as_frequency().unwrap().data()[0], Complex32::new(1.0, -2.0));
    }
}
