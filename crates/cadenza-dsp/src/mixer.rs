//! Channel mixer: `inputs` channels in, `outputs` channels out, through a
//! gain matrix.
//!
//! The default matrix averages input channels that fold onto the same output
//! when downmixing (`i % outputs == o`) and repeats inputs cyclically when
//! upmixing. Single cells are overridden with `gain.{output}.{input}`.

use crate::error::{Error, Result};
use cadenza_core::{
    get_param_or, Complex32, ConfigValidator, ProcessError, RegistryError, ShapeRejection,
    SignalShape, SpectrumBuffer, StageParams, TimeBuffer, Transform,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfig {
    pub inputs: usize,
    pub outputs: usize,
    /// Row-major `outputs x inputs`.
    pub gains: Vec<f32>,
}

impl MixerConfig {
    /// Default matrix for the given channel counts.
    pub fn new(inputs: usize, outputs: usize) -> Self {
        let mut gains = vec![0.0; inputs * outputs];
        if outputs < inputs {
            for o in 0..outputs {
                let folded = (0..inputs).filter(|i| i % outputs == o).count();
                for i in (o..inputs).step_by(outputs) {
                    gains[o * inputs + i] = 1.0 / folded as f32;
                }
            }
        } else if inputs > 0 {
            for o in 0..outputs {
                gains[o * inputs + o % inputs] = 1.0;
            }
        }
        Self {
            inputs,
            outputs,
            gains,
        }
    }

    #[inline]
    pub fn gain(&self, output: usize, input: usize) -> f32 {
        self.gains[output * self.inputs + input]
    }

    pub fn set_gain(&mut self, output: usize, input: usize, gain: f32) {
        self.gains[output * self.inputs + input] = gain;
    }
}

/// Mix one interleaved time fragment.
pub fn mix(samples: &[f32], config: &MixerConfig) -> Vec<f32> {
    let mut mixed = Vec::with_capacity(samples.len() / config.inputs.max(1) * config.outputs);
    for frame in samples.chunks_exact(config.inputs.max(1)) {
        for o in 0..config.outputs {
            let mut acc = 0.0;
            for (i, x) in frame.iter().enumerate() {
                acc += config.gain(o, i) * x;
            }
            mixed.push(acc);
        }
    }
    mixed
}

/// Channel mixer with a fixed channel layout.
#[derive(Debug)]
pub struct Mixer {
    inputs: usize,
    outputs: usize,
}

impl Mixer {
    pub fn new(inputs: usize, outputs: usize) -> Result<Self> {
        if inputs == 0 || outputs == 0 {
            return Err(Error::InvalidChannelCount(format!(
                "mixer needs at least one channel each way, got {inputs} -> {outputs}"
            )));
        }
        Ok(Self { inputs, outputs })
    }

    /// Build from `inputs` / `outputs` parameters (both default to 2).
    pub fn from_params(params: &StageParams) -> core::result::Result<Self, RegistryError> {
        let (inputs, outputs) = channel_counts(params)?;
        Ok(Self::new(inputs, outputs)?)
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    fn check(&self, config: &MixerConfig) -> core::result::Result<(), ProcessError> {
        if config.inputs != self.inputs || config.outputs != self.outputs {
            return Err(ProcessError::Rejected("mixer matrix does not match channel layout"));
        }
        Ok(())
    }
}

fn channel_counts(params: &StageParams) -> core::result::Result<(usize, usize), RegistryError> {
    let inputs = get_param_or(params, "inputs", 2, |v| v.as_usize())?;
    let outputs = get_param_or(params, "outputs", 2, |v| v.as_usize())?;
    Ok((inputs, outputs))
}

impl Transform for Mixer {
    type Config = MixerConfig;

    fn configure(params: &StageParams) -> core::result::Result<MixerConfig, RegistryError> {
        let (inputs, outputs) = channel_counts(params)?;
        let mut config = MixerConfig::new(inputs, outputs);

        for (key, value) in params {
            let Some(cell) = key.strip_prefix("gain.") else {
                continue;
            };
            let position = cell
                .split_once('.')
                .and_then(|(o, i)| Some((o.parse::<usize>().ok()?, i.parse::<usize>().ok()?)));
            let Some((o, i)) = position.filter(|&(o, i)| o < outputs && i < inputs) else {
                return Err(Error::InvalidParameter(format!(
                    "{key}: no such cell in a {inputs}->{outputs} matrix"
                ))
                .into());
            };
            let gain = value.as_f32().ok_or_else(|| {
                RegistryError::InvalidParameter(key.clone(), format!("{value:?}"))
            })?;
            config.set_gain(o, i, gain);
        }
        Ok(config)
    }

    fn validator(&self) -> Option<ConfigValidator<MixerConfig>> {
        let (inputs, outputs) = (self.inputs, self.outputs);
        Some(Arc::new(move |config: &MixerConfig| {
            if config.inputs != inputs || config.outputs != outputs {
                return Err(RegistryError::InvalidParameter(
                    "gain".into(),
                    format!(
                        "{}->{} matrix for a {inputs}->{outputs} mixer",
                        config.inputs, config.outputs
                    ),
                ));
            }
            Ok(())
        }))
    }

    fn negotiate(
        &self,
        requested: &SignalShape,
        _config: Option<&MixerConfig>,
    ) -> core::result::Result<SignalShape, ShapeRejection> {
        if requested.channels != self.inputs {
            return Err(ShapeRejection::expected(
                requested.with_channels(self.inputs),
            ));
        }
        Ok(requested.with_channels(self.outputs))
    }

    fn time_to_time(
        &mut self,
        config: &MixerConfig,
        input: &TimeBuffer,
        output: &mut TimeBuffer,
    ) -> core::result::Result<(), ProcessError> {
        self.check(config)?;
        let frames = input.samples().chunks_exact(self.inputs);
        for (out, frame) in output.samples_mut().chunks_exact_mut(self.outputs).zip(frames) {
            for (o, slot) in out.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (i, x) in frame.iter().enumerate() {
                    acc += config.gain(o, i) * x;
                }
                *slot = acc;
            }
        }
        Ok(())
    }

    fn frequency_to_frequency(
        &mut self,
        config: &MixerConfig,
        input: &SpectrumBuffer,
        output: &mut SpectrumBuffer,
    ) -> core::result::Result<(), ProcessError> {
        self.check(config)?;
        for o in 0..self.outputs {
            let bins = output.channel_mut(o);
            bins.fill(Complex32::new(0.0, 0.0));
            for i in 0..self.inputs {
                let gain = config.gain(o, i);
                if gain == 0.0 {
                    continue;
                }
                for (out, &x) in bins.iter_mut().zip(input.channel(i)) {
                    *out += x * gain;
                }
            }
        }
        Ok(())
    }
}
