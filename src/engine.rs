//! Engine that wires a stage registry, a pipeline and a driver together.

use crate::{EngineBuilder, Error, Result};
use cadenza_core::{
    AudioDriver, DeadlineMetrics, EngineConfig, EventReceiver, OfflineDriver, Pipeline,
    PipelineProcessor, ProcessOutcome, Published, Signal, SignalShape, StageControl, StageParams,
    StageRegistry, StageSpec, StageTiming,
};

/// Main audio engine.
///
/// The processor lives either here (stopped) or inside the driver (running).
/// Anything that changes the stage list needs it back, so `load_stages`
/// stops the driver first and restarts it afterwards. Parameter changes go
/// through [`StageControl`] and never interrupt audio.
///
/// # Example
///
/// ```
/// use cadenza::prelude::*;
///
/// let mut engine = Engine::builder().sample_rate(16000.0).fragment_len(32).channels(2).build()?;
/// engine.load_stages([
///     StageSpec::with_params("mixer", params! { "inputs" => 2, "outputs" => 1 }),
///     StageSpec::from("fft"),
/// ])?;
/// assert_eq!(engine.output_shape().unwrap().channels, 1);
///
/// engine.start()?;
/// engine.set_params("mixer", &params! { "inputs" => 2, "outputs" => 1, "gain.0.1" => 0.0 })?;
/// # Ok::<(), cadenza::Error>(())
/// ```
pub struct Engine<D: AudioDriver = OfflineDriver> {
    config: EngineConfig,
    registry: StageRegistry,
    pipeline: Pipeline,
    /// `None` while the driver holds it.
    processor: Option<PipelineProcessor>,
    driver: D,
}

impl Engine {
    /// Create a new engine builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

impl<D: AudioDriver> Engine<D> {
    pub(crate) fn from_parts(
        config: EngineConfig,
        registry: StageRegistry,
        pipeline: Pipeline,
        processor: PipelineProcessor,
        driver: D,
    ) -> Self {
        Self {
            config,
            registry,
            pipeline,
            processor: Some(processor),
            driver,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Shape the driver feeds into the pipeline.
    pub fn input_shape(&self) -> SignalShape {
        self.config.input_shape()
    }

    /// Negotiated output shape, once prepared.
    pub fn output_shape(&self) -> Option<SignalShape> {
        self.pipeline.output_shape()
    }

    /// The registry `load_stages` builds from. Register custom stages here.
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// Replace the pipeline with stages built from `specs` and prepare it.
    ///
    /// A started driver is stopped for the swap and restarted on success.
    /// If a stage cannot be built or negotiated the pipeline is left
    /// unprepared and the driver stays stopped.
    pub fn load_stages<I, S>(&mut self, specs: I) -> Result<SignalShape>
    where
        I: IntoIterator<Item = S>,
        S: Into<StageSpec>,
    {
        let was_started = self.processor.is_none();
        self.stop()?;
        self.release()?;

        self.pipeline.reconfigure(&self.registry, specs)?;
        let output = self.pipeline.prepare(self.config.input_shape())?;
        tracing::info!(stages = ?self.pipeline.stage_names(), %output, "stages loaded");

        if was_started {
            self.start()?;
        }
        Ok(output)
    }

    /// Hand the processor to the driver.
    pub fn start(&mut self) -> Result<()> {
        if !self.pipeline.is_prepared() {
            return Err(Error::Core(cadenza_core::Error::InvalidState {
                operation: "start",
                state: self.pipeline.state().as_str(),
            }));
        }
        let processor = self
            .processor
            .take()
            .ok_or_else(|| cadenza_core::Error::Driver("engine already started".into()))?;
        if let Err(refused) = self.driver.start(processor) {
            let (err, processor) = refused.into_parts();
            self.processor = Some(processor);
            return Err(err.into());
        }
        Ok(())
    }

    /// Take the processor back from the driver. No-op when stopped.
    pub fn stop(&mut self) -> Result<()> {
        if self.processor.is_some() {
            return Ok(());
        }
        match self.driver.stop() {
            Some(processor) => {
                self.processor = Some(processor);
                Ok(())
            }
            None => {
                let err = cadenza_core::Error::Driver("driver lost the pipeline processor".into());
                Err(err.into())
            }
        }
    }

    /// Clear a fault: stop, release and prepare the same stages again.
    /// Restarts the driver if it was running or had exited on the fault.
    pub fn recover(&mut self) -> Result<SignalShape> {
        let was_started = self.processor.is_none();
        self.stop()?;
        self.release()?;
        let output = self.pipeline.prepare(self.config.input_shape())?;
        tracing::info!(%output, "pipeline recovered");
        if was_started {
            self.start()?;
        }
        Ok(output)
    }

    fn release(&mut self) -> Result<()> {
        if let Some(processor) = self.processor.as_mut() {
            self.pipeline.release(processor)?;
        }
        Ok(())
    }

    /// Control handle of the first stage called `name`.
    pub fn stage(&self, name: &str) -> Option<StageControl> {
        self.pipeline.stage_control(name)
    }

    /// Build a new configuration for stage `name` and publish it. Takes
    /// effect on the next fragment.
    pub fn set_params(&self, name: &str, params: &StageParams) -> Result<Published> {
        let control = self
            .stage(name)
            .ok_or_else(|| cadenza_core::Error::UnknownStage(name.to_string()))?;
        Ok(control.apply(params)?)
    }

    /// Free configuration snapshots the audio thread has retired.
    pub fn reclaim(&self) -> usize {
        self.pipeline.reclaim()
    }

    pub fn stage_stats(&self) -> Vec<(String, StageTiming)> {
        self.pipeline.stage_stats()
    }

    /// Cycle load against the fragment deadline (needs timing on).
    pub fn metrics(&self) -> DeadlineMetrics {
        self.pipeline.load()
    }

    pub fn set_timing(&self, enabled: bool) {
        self.pipeline.set_timing(enabled);
    }

    pub fn events(&self) -> &EventReceiver {
        self.pipeline.events()
    }

    /// A stage fault muted the pipeline. See [`recover`](Self::recover).
    pub fn stop_requested(&self) -> bool {
        self.pipeline.stop_requested()
    }

    /// Stop the driver and tear every stage down.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()?;
        self.release()
    }
}

impl Engine<OfflineDriver> {
    /// Run one cycle on the offline driver. `Idle` until started.
    pub fn process<'a>(&'a mut self, input: &'a Signal) -> ProcessOutcome<'a> {
        self.driver.process(input)
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.driver.cycles()
    }
}

impl<D: AudioDriver> Drop for Engine<D> {
    fn drop(&mut self) {
        if self.processor.is_none() {
            if let Some(processor) = self.driver.stop() {
                self.processor = Some(processor);
            }
        }
        if let Some(processor) = self.processor.as_mut() {
            if let Err(err) = self.pipeline.release(processor) {
                tracing::warn!(%err, "engine release failed on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{params, StartError, ThreadedDriver, TimeBuffer};

    fn engine() -> Engine {
        Engine::builder()
            .sample_rate(16000.0)
            .fragment_len(4)
            .channels(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_requires_prepared_pipeline() {
        let mut engine = engine();
        assert!(matches!(
            engine.start(),
            Err(Error::Core(cadenza_core::Error::InvalidState { .. }))
        ));
    }

    #[test]
    fn test_offline_cycle() {
        let mut engine = engine();
        engine
            .load_stages([StageSpec::with_params("gain", params! { "gain" => 2.0 })])
            .unwrap();
        assert!(!engine.is_running());
        engine.start().unwrap();
        assert!(engine.is_running());

        let input = Signal::from(TimeBuffer::from_interleaved(1, vec![0.25; 4]).unwrap());
        let output = engine.process(&input).signal().unwrap().clone();
        assert_eq!(output.as_time().unwrap().samples(), &[0.5; 4]);

        engine.set_params("gain", &params! { "gain" => 4.0 }).unwrap();
        let output = engine.process(&input).signal().unwrap().clone();
        assert_eq!(output.as_time().unwrap().samples(), &[1.0; 4]);
        assert_eq!(engine.cycles(), 2);
    }

    #[test]
    fn test_load_stages_while_running() {
        let mut engine = engine();
        engine.load_stages(["gain"]).unwrap();
        engine.start().unwrap();

        engine
            .load_stages([StageSpec::with_params("gain", params! { "gain" => 0.0 })])
            .unwrap();
        assert!(engine.is_running());

        let input = Signal::from(TimeBuffer::from_interleaved(1, vec![1.0; 4]).unwrap());
        assert!(engine.process(&input).signal().unwrap().is_silent());
    }

    #[test]
    fn test_unknown_stage() {
        let mut engine = engine();
        assert!(matches!(
            engine.load_stages(["reverb"]),
            Err(Error::Core(cadenza_core::Error::Registry(_)))
        ));
        assert!(matches!(
            engine.set_params("reverb", &StageParams::new()),
            Err(Error::Core(cadenza_core::Error::UnknownStage(_)))
        ));
    }

    #[test]
    fn test_threaded_engine_shutdown() {
        let shape = cadenza_core::SignalShape::time(1, 4, 16000.0);
        let mut engine = Engine::builder()
            .sample_rate(16000.0)
            .fragment_len(4)
            .channels(1)
            .stage("gain")
            .build_with(ThreadedDriver::new(shape).free_running())
            .unwrap();

        engine.start().unwrap();
        while engine.driver().cycles() < 10 {
            std::thread::yield_now();
        }
        engine.stop().unwrap();
        assert!(!engine.is_running());
        engine.shutdown().unwrap();
    }

    /// Driver that refuses every start.
    struct Unplugged;

    impl AudioDriver for Unplugged {
        fn start(&mut self, processor: PipelineProcessor) -> core::result::Result<(), StartError> {
            Err(StartError::new(
                cadenza_core::Error::Driver("no device".into()),
                processor,
            ))
        }

        fn stop(&mut self) -> Option<PipelineProcessor> {
            None
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_failed_start_keeps_processor() {
        let mut engine = Engine::builder()
            .sample_rate(16000.0)
            .fragment_len(4)
            .channels(1)
            .stage("gain")
            .build_with(Unplugged)
            .unwrap();

        assert!(matches!(
            engine.start(),
            Err(Error::Core(cadenza_core::Error::Driver(_)))
        ));
        assert!(!engine.is_running());

        // Still owned by the engine, so the stage list can be replaced.
        engine
            .load_stages([StageSpec::with_params("gain", params! { "gain" => 0.5 })])
            .unwrap();
        assert!(engine.pipeline().is_prepared());
        assert!(matches!(
            engine.start(),
            Err(Error::Core(cadenza_core::Error::Driver(_)))
        ));
        engine.shutdown().unwrap();
    }
}
