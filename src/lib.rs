//! # Cadenza - Real-time Audio Pipeline Host
//!
//! Runs a chain of processing stages on an audio thread and lets control
//! threads swap stage parameters without locking or allocating on that thread.
//!
//! ## Architecture
//!
//! Cadenza is an umbrella crate that coordinates:
//! - **cadenza-core** - Configuration cells, stage contract, pipeline, SPSC queues, drivers
//! - **cadenza-dsp** - Reference stages (gain, FFT, channel mixer)
//! - **cadenza-export** - Recording to disk through a drain worker
//!
//! ## Quick Start
//!
//! ```
//! use cadenza::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .sample_rate(16000.0)
//!     .fragment_len(64)
//!     .channels(1)
//!     .stages(["gain", "fft", "ifft"])
//!     .build()?;
//!
//! engine.start()?;
//! let input = Signal::for_shape(&engine.input_shape());
//! let output = engine.process(&input);
//! assert!(output.signal().unwrap().is_silent());
//!
//! // Parameter changes reach the audio thread on its next fragment.
//! engine.set_params("gain", &params! { "gain" => 0.5 })?;
//! # Ok::<(), cadenza::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Everything (`full`)
//! - `export` - Recorder stage and drain sessions
//! - `wav` - WAV output for recordings

/// Re-export of cadenza-core for direct access
pub use cadenza_core as core;

/// Re-export of cadenza-dsp
pub use cadenza_dsp as dsp;

// Core types
pub use cadenza_core::{
    // Drivers
    AudioDriver,
    // Configuration cell
    CellStats,
    ConfigCell,
    ConfigPublisher,
    ConfigReader,
    // Metering
    DeadlineMeter,
    DeadlineMetrics,
    // Drain worker
    DrainConfig,
    DrainReport,
    DrainWorker,

    Domain,
    EngineConfig,
    EventReceiver,
    OfflineDriver,
    // Pipeline
    Pipeline,
    PipelineEvent,
    PipelineProcessor,
    ProcessOutcome,
    Published,
    // Queues
    QueueConsumer,
    QueueProducer,
    RecordSink,
    Route,

    // Signals
    Signal,
    SignalShape,
    SpectrumBuffer,
    SpscQueue,
    // Stages
    Stage,
    StageAdapter,
    StageControl,
    StageParams,
    StageRegistry,
    StageSpec,
    StageStats,
    StageTiming,
    ThreadedDriver,
    TimeBuffer,
    Transform,
};

pub use cadenza_dsp::{
    builtin_registry, register_builtin_stages, ForwardFft, Gain, InverseFft, Mixer,
};

// Export
#[cfg(feature = "export")]
pub use cadenza_export as export;

#[cfg(feature = "export")]
pub use cadenza_export::{
    Recorder, RecorderConfig, RecordingOptions, RecordingReport, RecordingSession,
};

#[cfg(feature = "wav")]
pub use cadenza_export::{WavConfig, WavSink};

mod builder;
mod engine;
mod error;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{Engine, EngineBuilder};

    // Essential types
    pub use crate::core::prelude::*;
    pub use crate::core::{StageControl, ThreadedDriver};

    // Export
    #[cfg(feature = "export")]
    pub use crate::export::{RecordingOptions, RecordingSession};
}
