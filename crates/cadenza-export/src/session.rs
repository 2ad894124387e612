//! Recording sessions: a [`Recorder`] stage on the audio thread, a
//! [`DrainWorker`] writing its queue to a sink.
//!
//! # Usage
//!
//! ```ignore
//! let (session, recorder) = RecordingSession::wav("take.wav", RecordingOptions::default())?;
//! recorder.register(&registry, "recorder");
//! pipeline.reconfigure(&registry, ["gain", "recorder"])?;
//! // ... run the driver ...
//! let report = session.finish()?;
//! ```

use crate::error::{ExportError, Result};
use crate::recorder::Recorder;
use cadenza_core::{DrainConfig, DrainWorker, EngineConfig, RecordSink, SpscQueue};

#[cfg(feature = "wav")]
use crate::wav::{WavConfig, WavSink, WavSummary};

/// Options for a recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingOptions {
    pub channels: usize,
    pub sample_rate: u32,
    /// Queue size in samples. Two seconds of stereo at 44.1 kHz by default.
    pub queue_capacity: usize,
    pub drain: DrainConfig,
    #[cfg(feature = "wav")]
    pub bit_depth: crate::wav::BitDepth,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            queue_capacity: 176_400,
            drain: DrainConfig::default(),
            #[cfg(feature = "wav")]
            bit_depth: crate::wav::BitDepth::Float32,
        }
    }
}

impl RecordingOptions {
    /// Options matching what an engine built from `config` produces: its
    /// channel count, sample rate and queue capacity.
    pub fn for_engine(config: &EngineConfig) -> Self {
        Self {
            channels: config.channels,
            sample_rate: config.sample_rate.round() as u32,
            queue_capacity: config.queue_capacity,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > u16::MAX as usize {
            return Err(ExportError::InvalidOptions(format!(
                "channel count {} out of range",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(ExportError::InvalidOptions("sample rate is zero".into()));
        }
        if self.queue_capacity < self.channels {
            return Err(ExportError::InvalidOptions(format!(
                "queue of {} samples cannot hold one frame",
                self.queue_capacity
            )));
        }
        Ok(())
    }
}

/// What a finished recording produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingReport {
    /// Interleaved samples handed to the sink.
    pub samples: u64,
    pub frames: u64,
    pub flushes: u64,
    /// Samples lost because the queue was full.
    pub dropped: u64,
}

/// Control-side half of a recording.
pub struct RecordingSession<S: RecordSink<f32> + 'static> {
    worker: DrainWorker<f32, S>,
    channels: usize,
}

impl<S: RecordSink<f32> + 'static> RecordingSession<S> {
    /// Start draining into `sink`. Returns the session and the recorder to
    /// install in a pipeline.
    pub fn with_sink(sink: S, options: &RecordingOptions) -> Result<(Self, Recorder)> {
        options.validate()?;
        let (producer, consumer) = SpscQueue::with_capacity(options.queue_capacity);
        let worker = DrainWorker::spawn("cadenza-recorder", consumer, sink, options.drain)?;
        tracing::debug!(
            channels = options.channels,
            capacity = options.queue_capacity,
            "recording session started"
        );
        Ok((
            Self {
                worker,
                channels: options.channels,
            },
            Recorder::new(producer, options.channels),
        ))
    }

    /// Samples written to the sink so far.
    pub fn drained(&self) -> u64 {
        self.worker.drained()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop the worker after a final drain and hand back the sink.
    ///
    /// The recorder should be out of the running pipeline first; samples it
    /// pushes after this are never drained.
    pub fn stop(self) -> Result<(S, RecordingReport)> {
        let (sink, report) = self.worker.stop()?;
        if let Some(err) = report.error {
            return Err(ExportError::Io(err));
        }
        if report.dropped > 0 {
            tracing::warn!(dropped = report.dropped, "recording lost samples to a full queue");
        }
        let report = RecordingReport {
            samples: report.records,
            frames: report.records / self.channels as u64,
            flushes: report.flushes,
            dropped: report.dropped,
        };
        Ok((sink, report))
    }
}

#[cfg(feature = "wav")]
impl RecordingSession<WavSink> {
    /// Record into a new WAV file at `path`.
    pub fn wav(
        path: impl AsRef<std::path::Path>,
        options: &RecordingOptions,
    ) -> Result<(Self, Recorder)> {
        options.validate()?;
        let sink = WavSink::create(
            path,
            WavConfig {
                sample_rate: options.sample_rate,
                channels: options.channels as u16,
                bit_depth: options.bit_depth,
            },
        )?;
        Self::with_sink(sink, options)
    }

    /// Stop and finalize the file.
    pub fn finish(self) -> Result<(WavSummary, RecordingReport)> {
        let (sink, report) = self.stop()?;
        Ok((sink.finalize()?, report))
    }
}
