//! Builder for configuring and constructing an `Engine`.

use crate::{Engine, Result};
use cadenza_core::{
    AudioDriver, EngineConfig, OfflineDriver, Pipeline, SignalShape, StageRegistry, StageSpec,
};

/// Builtin stages (`gain`, `fft`, `ifft`, `mixer`) are registered unless
/// `.without_builtins()` is called. Stages added with `.stage()` are built
/// and prepared against the configured input shape before `build` returns.
///
/// # Example
///
/// ```
/// use cadenza::prelude::*;
///
/// let mut engine = Engine::builder()
///     .sample_rate(16000.0)
///     .fragment_len(64)
///     .channels(1)
///     .stage(StageSpec::with_params("gain", params! { "gain" => 0.5 }))
///     .build()?;
///
/// engine.start()?;
/// let input = Signal::for_shape(&engine.input_shape());
/// assert!(engine.process(&input).is_ready());
/// # Ok::<(), cadenza::Error>(())
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<StageRegistry>,
    without_builtins: bool,
    stages: Vec<StageSpec>,
}

impl EngineBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Frames per fragment. Default: 256
    pub fn fragment_len(mut self, fragment_len: usize) -> Self {
        self.config.fragment_len = fragment_len;
        self
    }

    /// Default: 2
    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    /// Samples buffered between the audio thread and a recording's drain
    /// worker. Default: 88200
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = queue_capacity;
        self
    }

    /// Accumulate per-stage and per-cycle timing from the start.
    pub fn timing(mut self, enabled: bool) -> Self {
        self.config.timing = enabled;
        self
    }

    /// Use `registry` instead of a fresh one. Builtins are still added to it.
    pub fn registry(mut self, registry: StageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn without_builtins(mut self) -> Self {
        self.without_builtins = true;
        self
    }

    /// Append a stage to the initial pipeline.
    pub fn stage(mut self, spec: impl Into<StageSpec>) -> Self {
        self.stages.push(spec.into());
        self
    }

    pub fn stages<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageSpec>,
    {
        self.stages.extend(specs.into_iter().map(Into::into));
        self
    }

    /// Input shape the pipeline will be prepared for.
    pub fn input_shape(&self) -> SignalShape {
        self.config.input_shape()
    }

    /// Build with an [`OfflineDriver`].
    pub fn build(self) -> Result<Engine> {
        self.build_with(OfflineDriver::new())
    }

    /// Build around any driver.
    pub fn build_with<D: AudioDriver>(self, driver: D) -> Result<Engine<D>> {
        self.config.validate()?;

        let registry = self.registry.unwrap_or_default();
        if !self.without_builtins {
            cadenza_dsp::register_builtin_stages(&registry);
        }

        let (mut pipeline, processor) = Pipeline::with_retire_capacity(self.config.retire_capacity);
        pipeline.set_timing(self.config.timing);
        if !self.stages.is_empty() {
            pipeline.reconfigure(&registry, self.stages)?;
            pipeline.prepare(self.config.input_shape())?;
        }

        tracing::info!(
            input = %self.config.input_shape(),
            stages = pipeline.len(),
            "engine built"
        );
        Ok(Engine::from_parts(
            self.config,
            registry,
            pipeline,
            processor,
            driver,
        ))
    }
}
