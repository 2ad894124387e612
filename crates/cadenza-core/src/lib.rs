//! Real-time pipeline kernel: configuration hot-swap, stage negotiation and
//! dispatch, and SPSC hand-off to auxiliary threads.
//!
//! # Primary API
//!
//! - [`ConfigCell`]: publish immutable snapshots to the audio thread
//! - [`Transform`] / [`Stage`] / [`StageAdapter`]: the stage contract
//! - [`Pipeline`] / [`PipelineProcessor`]: negotiate and run a stage chain
//! - [`SpscQueue`] / [`DrainWorker`]: move audio-thread data to a worker
//! - [`StageRegistry`]: build stages from identifiers
//! - [`AudioDriver`]: the driver boundary
//!
//! # Example
//!
//! ```
//! use cadenza_core::prelude::*;
//!
//! struct Gain;
//!
//! impl Transform for Gain {
//!     type Config = f32;
//!
//!     fn configure(params: &StageParams) -> Result<f32, RegistryError> {
//!         get_param_or(params, "gain", 1.0, |v| v.as_f32())
//!     }
//!
//!     fn negotiate(&self, requested: &SignalShape, _: Option<&f32>) -> Result<SignalShape, ShapeRejection> {
//!         Ok(*requested)
//!     }
//!
//!     fn time_to_time(&mut self, gain: &f32, input: &TimeBuffer, output: &mut TimeBuffer) -> Result<(), ProcessError> {
//!         for (out, x) in output.samples_mut().iter_mut().zip(input.samples()) {
//!             *out = x * gain;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let registry = StageRegistry::new();
//! registry.register_transform("gain", |_| Ok(Gain));
//!
//! let (mut pipeline, mut processor) = Pipeline::new();
//! pipeline.reconfigure(&registry, [StageSpec::with_params("gain", params! { "gain" => 0.5 })])?;
//! let shape = pipeline.prepare(SignalShape::time(1, 4, 16000.0))?;
//!
//! let input = Signal::from(TimeBuffer::from_interleaved(1, vec![1.0; 4])?);
//! let output = processor.process(&input).signal().unwrap().clone();
//! assert_eq!(output.as_time().unwrap().samples(), &[0.5; 4]);
//!
//! pipeline.stage_control("gain").unwrap().apply(&params! { "gain" => 2.0 })?;
//! # let _ = shape;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub use error::{Error, FaultKind, ProcessError, RegistryError, Result, StageFault};

pub mod shape;
pub use shape::{Domain, Route, SignalShape};

pub mod signal;
pub use signal::{Signal, SpectrumBuffer, TimeBuffer};

pub mod cell;
pub use cell::{
    CellStats, ConfigCell, ConfigPublisher, ConfigReader, NotReady, Published,
    DEFAULT_RETIRE_CAPACITY,
};

pub mod stage;
pub use stage::{ConfigValidator, ShapeRejection, Stage, StageAdapter, StageControl, Transform};

pub mod registry;
pub use registry::{
    get_param, get_param_or, ParamValue, StageConstructor, StageParams, StageRegistry, StageSpec,
};

pub mod pipeline;
pub use pipeline::{
    EventReceiver, Pipeline, PipelineEvent, PipelineProcessor, PipelineState, ProcessOutcome, StageList,
};

pub mod spsc;
pub use spsc::{QueueConsumer, QueueProducer, SpscQueue};

pub mod worker;
pub use worker::{DrainConfig, DrainReport, DrainWorker, RecordSink};

pub mod driver;
pub use driver::{AudioDriver, OfflineDriver, Sink, Source, StartError, ThreadedDriver};

pub mod config;
pub use config::EngineConfig;

pub mod metering;
pub use metering::{DeadlineMeter, DeadlineMetrics, StageStats, StageTiming};

pub use rustfft::num_complex::Complex32;

pub mod prelude {
    //! Everything needed to write a stage and run a pipeline.
    pub use crate::{
        get_param, get_param_or, params, AudioDriver, Complex32, ConfigCell, Domain,
        EngineConfig, OfflineDriver, ParamValue, Pipeline, PipelineProcessor, ProcessError,
        ProcessOutcome, RegistryError, Route, ShapeRejection, Signal, SignalShape,
        SpectrumBuffer, SpscQueue, Stage, StageAdapter, StageParams, StageRegistry, StageSpec,
        TimeBuffer, Transform,
    };
}
