//! Fragment containers passed along the stage chain.
//!
//! Buffers are sized once (at negotiation) and never grow afterwards; the
//! copy helpers only accept equally sized sources.

use crate::shape::{Domain, SignalShape};
use crate::{Error, Result};
use rustfft::num_complex::Complex32;

/// Interleaved time-domain fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBuffer {
    channels: usize,
    frames: usize,
    samples: Vec<f32>,
}

impl TimeBuffer {
    /// Zeroed buffer of `channels * frames` samples.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            samples: vec![0.0; channels * frames],
        }
    }

    /// Wrap interleaved samples. The length must be a multiple of `channels`.
    pub fn from_interleaved(channels: usize, samples: Vec<f32>) -> Result<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(Error::InvalidShape(format!(
                "{} samples cannot be split into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            channels,
            frames: samples.len() / channels,
            samples,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// All channels of one frame.
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.samples[frame * self.channels + channel]
    }

    #[inline]
    pub fn set_sample(&mut self, channel: usize, frame: usize, value: f32) {
        self.samples[frame * self.channels + channel] = value;
    }

    /// Samples of one channel, de-interleaved on the fly.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1))
            .copied()
    }

    pub fn silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Copy an equally sized buffer. Returns `false` (and copies nothing) on mismatch.
    pub fn copy_from(&mut self, other: &TimeBuffer) -> bool {
        if self.channels != other.channels || self.frames != other.frames {
            return false;
        }
        self.samples.copy_from_slice(&other.samples);
        true
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Frequency-domain fragment, stored channel-major (`bins` per channel).
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBuffer {
    channels: usize,
    bins: usize,
    data: Vec<Complex32>,
}

impl SpectrumBuffer {
    pub fn new(channels: usize, bins: usize) -> Self {
        Self {
            channels,
            bins,
            data: vec![Complex32::new(0.0, 0.0); channels * bins],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[Complex32] {
        let start = channel * self.bins;
        &self.data[start..start + self.bins]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Complex32] {
        let start = channel * self.bins;
        &mut self.data[start..start + self.bins]
    }

    #[inline]
    pub fn data(&self) -> &[Complex32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [Complex32] {
        &mut self.data
    }

    pub fn silence(&mut self) {
        self.data.fill(Complex32::new(0.0, 0.0));
    }

    pub fn copy_from(&mut self, other: &SpectrumBuffer) -> bool {
        if self.channels != other.channels || self.bins != other.bins {
            return false;
        }
        self.data.copy_from_slice(&other.data);
        true
    }
}

/// One fragment in either domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Time(TimeBuffer),
    Frequency(SpectrumBuffer),
}

impl Signal {
    /// Zeroed fragment of the given shape. Allocates; control side only.
    pub fn for_shape(shape: &SignalShape) -> Self {
        match shape.domain {
            Domain::Time => Signal::Time(TimeBuffer::new(shape.channels, shape.fragment_len)),
            Domain::Frequency => {
                Signal::Frequency(SpectrumBuffer::new(shape.channels, shape.transform_len))
            }
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Signal::Time(_) => Domain::Time,
            Signal::Frequency(_) => Domain::Frequency,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Signal::Time(buffer) => buffer.channels(),
            Signal::Frequency(buffer) => buffer.channels(),
        }
    }

    /// Frames (time) or bins (frequency) per channel.
    pub fn values_per_channel(&self) -> usize {
        match self {
            Signal::Time(buffer) => buffer.frames(),
            Signal::Frequency(buffer) => buffer.bins(),
        }
    }

    /// Whether this fragment has the layout `shape` describes.
    pub fn matches(&self, shape: &SignalShape) -> bool {
        self.domain() == shape.domain
            && self.channels() == shape.channels
            && self.values_per_channel() == shape.values_per_channel()
    }

    pub fn silence(&mut self) {
        match self {
            Signal::Time(buffer) => buffer.silence(),
            Signal::Frequency(buffer) => buffer.silence(),
        }
    }

    /// Copy a fragment of identical layout. Returns `false` on mismatch.
    pub fn copy_from(&mut self, other: &Signal) -> bool {
        match (self, other) {
            (Signal::Time(dst), Signal::Time(src)) => dst.copy_from(src),
            (Signal::Frequency(dst), Signal::Frequency(src)) => dst.copy_from(src),
            _ => false,
        }
    }

    pub fn as_time(&self) -> Option<&TimeBuffer> {
        match self {
            Signal::Time(buffer) => Some(buffer),
            Signal::Frequency(_) => None,
        }
    }

    pub fn as_time_mut(&mut self) -> Option<&mut TimeBuffer> {
        match self {
            Signal::Time(buffer) => Some(buffer),
            Signal::Frequency(_) => None,
        }
    }

    pub fn as_frequency(&self) -> Option<&SpectrumBuffer> {
        match self {
            Signal::Frequency(buffer) => Some(buffer),
            Signal::Time(_) => None,
        }
    }

    pub fn is_silent(&self) -> bool {
        match self {
            Signal::Time(buffer) => buffer.samples().iter().all(|&s| s == 0.0),
            Signal::Frequency(buffer) => buffer.data().iter().all(|c| c.re == 0.0 && c.im == 0.0),
        }
    }
}

impl From<TimeBuffer> for Signal {
    fn from(buffer: TimeBuffer) -> Self {
        Signal::Time(buffer)
    }
}

impl From<SpectrumBuffer> for Signal {
    fn from(buffer: SpectrumBuffer) -> Self {
        Signal::Frequency(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_access() {
        let buffer = TimeBuffer::from_interleaved(2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.sample(1, 2), 6.0);
        assert_eq!(buffer.frame(1), &[3.0, 4.0]);
        assert_eq!(buffer.channel(0).collect::<Vec<_>>(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_from_interleaved_rejects_ragged() {
        assert!(TimeBuffer::from_interleaved(2, vec![0.0; 5]).is_err());
        assert!(TimeBuffer::from_interleaved(0, vec![]).is_err());
    }

    #[test]
    fn test_for_shape() {
        let time = Signal::for_shape(&SignalShape::time(2, 32, 48000.0));
        assert_eq!(time.domain(), Domain::Time);
        assert_eq!(time.values_per_channel(), 32);

        let shape = SignalShape::frequency(2, 32, 64, 48000.0);
        let freq = Signal::for_shape(&shape);
        assert_eq!(freq.values_per_channel(), 64);
        assert!(freq.matches(&shape));
        assert!(!freq.matches(&shape.into_time()));
    }

    #[test]
    fn test_copy_requires_same_layout() {
        let mut dst = Signal::for_shape(&SignalShape::time(1, 4, 48000.0));
        let src: Signal = TimeBuffer::from_interleaved(1, vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .into();
        assert!(dst.copy_from(&src));
        assert_eq!(dst, src);

        let wrong = Signal::for_shape(&SignalShape::time(2, 4, 48000.0));
        assert!(!dst.copy_from(&wrong));
        assert_eq!(dst, src);
    }

    #[test]
    fn test_silence() {
        let mut signal: Signal = TimeBuffer::from_interleaved(1, vec![0.5; 8]).unwrap().into();
        assert!(!signal.is_silent());
        signal.silence();
        assert!(signal.is_silent());
    }
}
