//! WAV drain target using hound.
//!
//! Supports 16-bit, 24-bit, and 32-bit float WAV files.

use crate::error::{ExportError, Result};
use cadenza_core::RecordSink;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    Int16,
    Int24,
    #[default]
    Float32,
}

impl BitDepth {
    /// Bits per sample.
    pub fn bits(&self) -> u16 {
        match self {
            BitDepth::Int16 => 16,
            BitDepth::Int24 => 24,
            BitDepth::Float32 => 32,
        }
    }
}

/// WAV layout of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
}

impl Default for WavConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bit_depth: BitDepth::Float32,
        }
    }
}

impl WavConfig {
    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth.bits(),
            sample_format: match self.bit_depth {
                BitDepth::Float32 => SampleFormat::Float,
                _ => SampleFormat::Int,
            },
        }
    }
}

/// Finished WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavSummary {
    pub path: PathBuf,
    /// Interleaved samples written.
    pub samples: u64,
    pub frames: u64,
}

/// Streams interleaved `f32` samples into a WAV file.
///
/// `flush` rewrites the header so the file is readable up to the last flush
/// even if the process dies; `finalize` must still be called at the end.
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    config: WavConfig,
    path: PathBuf,
    samples: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, config: WavConfig) -> Result<Self> {
        if config.channels == 0 || config.sample_rate == 0 {
            return Err(ExportError::InvalidOptions(format!(
                "WAV needs at least one channel and a sample rate, got {config:?}"
            )));
        }
        let path = path.as_ref().to_path_buf();
        let writer = WavWriter::create(&path, config.spec())?;
        tracing::debug!(path = %path.display(), ?config, "wav sink created");
        Ok(Self {
            writer,
            config,
            path,
            samples: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> WavConfig {
        self.config
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Write the final header and close the file.
    pub fn finalize(self) -> Result<WavSummary> {
        self.writer.finalize()?;
        let summary = WavSummary {
            frames: self.samples / u64::from(self.config.channels),
            samples: self.samples,
            path: self.path,
        };
        tracing::debug!(path = %summary.path.display(), frames = summary.frames, "wav finalized");
        Ok(summary)
    }

    fn write_sample(&mut self, sample: f32) -> hound::Result<()> {
        match self.config.bit_depth {
            BitDepth::Float32 => self.writer.write_sample(sample),
            BitDepth::Int16 => self.writer.write_sample(quantize(sample, 16) as i16),
            BitDepth::Int24 => self.writer.write_sample(quantize(sample, 24)),
        }
    }
}

/// Clamp to [-1, 1] and scale to a signed integer of `bits` bits.
fn quantize(sample: f32, bits: u32) -> i32 {
    let max = ((1i64 << (bits - 1)) - 1) as f32;
    (sample.clamp(-1.0, 1.0) * max).round() as i32
}

impl RecordSink<f32> for WavSink {
    fn write(&mut self, records: &[f32]) -> io::Result<()> {
        for &sample in records {
            self.write_sample(sample).map_err(into_io)?;
            self.samples += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().map_err(into_io)
    }
}

fn into_io(err: hound::Error) -> io::Error {
    match err {
        hound::Error::IoError(err) => err,
        other => io::Error::other(other),
    }
}
