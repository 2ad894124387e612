//! Time/frequency conversion stages.
//!
//! One fragment of `n` frames maps to `n` complex bins per channel (the full
//! complex spectrum, no real-input folding). FFTs are planned on the control
//! thread in `allocate`; the audio path only runs them with preallocated
//! scratch.

use cadenza_core::{
    get_param_or, Complex32, Domain, ProcessError, RegistryError, ShapeRejection, SignalShape,
    SpectrumBuffer, StageParams, TimeBuffer, Transform,
};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FftConfig {
    /// Scale by `1/n` after transforming.
    pub normalize: bool,
}

/// Forward FFT of interleaved `samples`, returned channel-major.
pub fn forward_fft(samples: &[f32], channels: usize, normalize: bool) -> Vec<Complex32> {
    let frames = samples.len() / channels.max(1);
    let fft = FftPlanner::new().plan_fft_forward(frames);
    let scale = 1.0 / frames as f32;

    let mut spectrum = Vec::with_capacity(frames * channels);
    for channel in 0..channels {
        let mut bins: Vec<Complex32> = samples
            .iter()
            .skip(channel)
            .step_by(channels)
            .map(|&x| Complex32::new(x, 0.0))
            .collect();
        fft.process(&mut bins);
        if normalize {
            for bin in bins.iter_mut() {
                *bin = *bin * scale;
            }
        }
        spectrum.extend_from_slice(&bins);
    }
    spectrum
}

/// Inverse FFT of a channel-major spectrum, returned interleaved (real part).
pub fn inverse_fft(spectrum: &[Complex32], channels: usize, normalize: bool) -> Vec<f32> {
    let bins = spectrum.len() / channels.max(1);
    let fft = FftPlanner::new().plan_fft_inverse(bins);
    let scale = 1.0 / bins as f32;

    let mut samples = vec![0.0; bins * channels];
    for (channel, chunk) in spectrum.chunks_exact(bins.max(1)).enumerate() {
        let mut work = chunk.to_vec();
        fft.process(&mut work);
        for (frame, bin) in work.iter().enumerate() {
            samples[frame * channels + channel] = if normalize { bin.re * scale } else { bin.re };
        }
    }
    samples
}

/// Time to frequency.
#[derive(Default)]
pub struct ForwardFft {
    fft: Option<Arc<dyn Fft<f32>>>,
    scratch: Vec<Complex32>,
}

impl ForwardFft {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transform for ForwardFft {
    type Config = FftConfig;

    fn configure(params: &StageParams) -> Result<FftConfig, RegistryError> {
        Ok(FftConfig {
            normalize: get_param_or(params, "normalize", false, |v| v.as_bool())?,
        })
    }

    fn negotiate(
        &self,
        requested: &SignalShape,
        _config: Option<&FftConfig>,
    ) -> Result<SignalShape, ShapeRejection> {
        if requested.domain != Domain::Time {
            return Err(ShapeRejection::expected(requested.into_time()));
        }
        Ok(requested.into_frequency(requested.fragment_len))
    }

    fn allocate(&mut self, _input: &SignalShape, output: &SignalShape) {
        let fft = FftPlanner::new().plan_fft_forward(output.transform_len);
        self.scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.fft = Some(fft);
    }

    fn time_to_frequency(
        &mut self,
        config: &FftConfig,
        input: &TimeBuffer,
        output: &mut SpectrumBuffer,
    ) -> Result<(), ProcessError> {
        let Some(fft) = self.fft.as_ref() else {
            return Err(ProcessError::NotNegotiated);
        };
        let n = input.frames();
        if output.bins() != n || self.scratch.len() != fft.get_inplace_scratch_len() {
            return Err(ProcessError::ShapeDrift);
        }
        let scale = 1.0 / n as f32;

        for channel in 0..input.channels() {
            let bins = output.channel_mut(channel);
            for (bin, x) in bins.iter_mut().zip(input.channel(channel)) {
                *bin = Complex32::new(x, 0.0);
            }
            fft.process_with_scratch(bins, &mut self.scratch);
            if config.normalize {
                for bin in bins.iter_mut() {
                    *bin = *bin * scale;
                }
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.fft = None;
        self.scratch = Vec::new();
    }
}

/// Frequency to time. Needs one bin per frame.
#[derive(Default)]
pub struct InverseFft {
    fft: Option<Arc<dyn Fft<f32>>>,
    scratch: Vec<Complex32>,
    work: Vec<Complex32>,
}

impl InverseFft {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transform for InverseFft {
    type Config = FftConfig;

    fn configure(params: &StageParams) -> Result<FftConfig, RegistryError> {
        Ok(FftConfig {
            normalize: get_param_or(params, "normalize", true, |v| v.as_bool())?,
        })
    }

    fn negotiate(
        &self,
        requested: &SignalShape,
        _config: Option<&FftConfig>,
    ) -> Result<SignalShape, ShapeRejection> {
        if requested.domain != Domain::Frequency || requested.transform_len != requested.fragment_len
        {
            return Err(ShapeRejection::expected(
                requested.into_frequency(requested.fragment_len),
            ));
        }
        Ok(requested.into_time())
    }

    fn allocate(&mut self, input: &SignalShape, _output: &SignalShape) {
        let fft = FftPlanner::new().plan_fft_inverse(input.transform_len);
        self.scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.work = vec![Complex32::new(0.0, 0.0); input.transform_len];
        self.fft = Some(fft);
    }

    fn frequency_to_time(
        &mut self,
        config: &FftConfig,
        input: &SpectrumBuffer,
        output: &mut TimeBuffer,
    ) -> Result<(), ProcessError> {
        let Some(fft) = self.fft.as_ref() else {
            return Err(ProcessError::NotNegotiated);
        };
        let n = input.bins();
        if self.work.len() != n || output.frames() != n {
            return Err(ProcessError::ShapeDrift);
        }
        let scale = 1.0 / n as f32;

        for channel in 0..input.channels() {
            self.work.copy_from_slice(input.channel(channel));
            fft.process_with_scratch(&mut self.work, &mut self.scratch);
            for (frame, bin) in self.work.iter().enumerate() {
                let value = if config.normalize { bin.re * scale } else { bin.re };
                output.set_sample(channel, frame, value);
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.fft = None;
        self.scratch = Vec::new();
        self.work = Vec::new();
    }
}
