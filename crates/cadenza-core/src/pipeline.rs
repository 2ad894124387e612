//! Pipeline orchestrator.
//!
//! [`Pipeline`] is the control side: it builds stage lists from a registry,
//! negotiates shapes and tears stages down again. [`PipelineProcessor`] is the
//! audio side and only ever sees a fully negotiated [`StageList`], handed over
//! through a configuration cell at the end of [`Pipeline::prepare`].
//!
//! ```
//! use cadenza_core::{Pipeline, Signal, SignalShape, StageRegistry};
//!
//! let registry = StageRegistry::new();
//! let (mut pipeline, mut processor) = Pipeline::new();
//! pipeline.reconfigure(&registry, Vec::<&str>::new()).unwrap();
//!
//! let shape = SignalShape::time(1, 64, 16000.0);
//! assert_eq!(pipeline.prepare(shape).unwrap(), shape);
//!
//! let input = Signal::for_shape(&shape);
//! assert!(processor.process(&input).signal().is_some());
//!
//! pipeline.release(&mut processor).unwrap();
//! ```

use crate::cell::{CellStats, ConfigCell, ConfigPublisher, ConfigReader, DEFAULT_RETIRE_CAPACITY};
use crate::error::{FaultKind, ProcessError, StageFault};
use crate::metering::{DeadlineMeter, DeadlineMetrics, StageStats, StageTiming};
use crate::registry::{StageRegistry, StageSpec};
use crate::shape::SignalShape;
use crate::signal::Signal;
use crate::stage::{Stage, StageControl};
use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capacity of the event channel. Events beyond it are dropped.
const EVENT_CAPACITY: usize = 64;

/// Control-side end of the event channel.
pub type EventReceiver = Receiver<PipelineEvent>;

/// Lifecycle of a [`Pipeline`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No stage list staged yet.
    Empty = 0,
    /// A stage list is staged but not negotiated.
    Configured = 1,
    /// Negotiated and visible to the processor.
    Prepared = 2,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => PipelineState::Prepared,
            1 => PipelineState::Configured,
            _ => PipelineState::Empty,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Empty => "empty",
            PipelineState::Configured => "configured",
            PipelineState::Prepared => "prepared",
        }
    }
}

/// Notification sent from the audio thread. Delivery is best effort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineEvent {
    /// A stage failed; the pipeline is muted until released.
    StageFault(StageFault),
    /// The driver fed a fragment that does not match the prepared input shape.
    InputMismatch,
    /// A cycle ran past its deadline. Only reported while timing is on.
    DeadlineMiss { elapsed: Duration, deadline: Duration },
}

/// Result of [`PipelineProcessor::process`].
#[derive(Debug)]
pub enum ProcessOutcome<'a> {
    /// Processed output.
    Ready(&'a Signal),
    /// Nothing prepared yet.
    Idle,
    /// A fault stopped the pipeline; the fragment is silence.
    Stopped(&'a Signal),
}

impl<'a> ProcessOutcome<'a> {
    /// Output to hand to the device, if any.
    pub fn signal(&self) -> Option<&'a Signal> {
        match *self {
            ProcessOutcome::Ready(signal) | ProcessOutcome::Stopped(signal) => Some(signal),
            ProcessOutcome::Idle => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProcessOutcome::Ready(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessOutcome::Stopped(_))
    }
}

/// Negotiated stage chain; the snapshot type of the pipeline's own cell.
pub struct StageList {
    stages: Vec<Box<dyn Stage>>,
    stats: Vec<Arc<StageStats>>,
    input: SignalShape,
    output: SignalShape,
    silence: Signal,
    deadline: Duration,
}

impl StageList {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn input_shape(&self) -> SignalShape {
        self.input
    }

    pub fn output_shape(&self) -> SignalShape {
        self.output
    }

    /// Run every stage in order, feeding each output into the next stage.
    fn run(&mut self, input: &Signal, timing: bool) -> core::result::Result<(), StageFault> {
        for index in 0..self.stages.len() {
            let (done, rest) = self.stages.split_at_mut(index);
            let source = match done.last() {
                Some(previous) => previous.output().ok_or(StageFault {
                    index: index - 1,
                    kind: FaultKind::Error(ProcessError::NotNegotiated),
                })?,
                None => input,
            };

            let started = timing.then(Instant::now);
            let result = rest[0].process(source);
            if let Some(started) = started {
                self.stats[index].record_time(started.elapsed());
            }
            if let Err(kind) = result {
                return Err(StageFault { index, kind });
            }
        }
        Ok(())
    }

    fn output<'a>(&'a self, input: &'a Signal) -> &'a Signal {
        self.stages
            .last()
            .and_then(|stage| stage.output())
            .unwrap_or(input)
    }
}

struct PipelineShared {
    state: AtomicU8,
    stop: AtomicBool,
    timing: AtomicBool,
    meter: DeadlineMeter,
    events: Sender<PipelineEvent>,
}

impl PipelineShared {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    fn notify(&self, event: PipelineEvent) {
        let _ = self.events.try_send(event);
    }
}

/// Control side of the pipeline.
pub struct Pipeline {
    shared: Arc<PipelineShared>,
    publisher: ConfigPublisher<StageList>,
    staged: Vec<Box<dyn Stage>>,
    controls: Vec<StageControl>,
    stats: Vec<Arc<StageStats>>,
    input_shape: Option<SignalShape>,
    output_shape: Option<SignalShape>,
    events: EventReceiver,
}

impl Pipeline {
    /// Create a pipeline and its audio-side processor.
    pub fn new() -> (Pipeline, PipelineProcessor) {
        Self::with_retire_capacity(DEFAULT_RETIRE_CAPACITY)
    }

    pub fn with_retire_capacity(retire_capacity: usize) -> (Pipeline, PipelineProcessor) {
        let (publisher, reader) = ConfigCell::with_capacity(retire_capacity);
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        let shared = Arc::new(PipelineShared {
            state: AtomicU8::new(PipelineState::Empty as u8),
            stop: AtomicBool::new(false),
            timing: AtomicBool::new(false),
            meter: DeadlineMeter::new(),
            events: events_tx,
        });

        (
            Pipeline {
                shared: Arc::clone(&shared),
                publisher,
                staged: Vec::new(),
                controls: Vec::new(),
                stats: Vec::new(),
                input_shape: None,
                output_shape: None,
                events: events_rx,
            },
            PipelineProcessor { shared, reader },
        )
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn is_prepared(&self) -> bool {
        self.state() == PipelineState::Prepared
    }

    /// Replace the staged stage list with stages built from `specs`.
    ///
    /// Fails with [`Error::InvalidState`] while prepared. If any stage cannot
    /// be built the previous list stays staged.
    pub fn reconfigure<I, S>(&mut self, registry: &StageRegistry, specs: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<StageSpec>,
    {
        self.ensure_not_prepared("reconfigure")?;
        let stages = specs
            .into_iter()
            .map(|spec| registry.create(&spec.into()))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        self.stage(stages);
        Ok(())
    }

    /// Like [`reconfigure`](Self::reconfigure), with stages built by the caller.
    pub fn install(&mut self, stages: Vec<Box<dyn Stage>>) -> Result<()> {
        self.ensure_not_prepared("install")?;
        self.stage(stages);
        Ok(())
    }

    fn ensure_not_prepared(&self, operation: &'static str) -> Result<()> {
        let state = self.state();
        if state == PipelineState::Prepared {
            return Err(Error::InvalidState {
                operation,
                state: state.as_str(),
            });
        }
        Ok(())
    }

    fn stage(&mut self, stages: Vec<Box<dyn Stage>>) {
        for stage in self.staged.iter_mut().rev() {
            stage.teardown();
        }
        self.controls = stages.iter().map(|stage| stage.control()).collect();
        self.stats = stages.iter().map(|stage| stage.stats()).collect();
        self.staged = stages;
        self.shared.set_state(PipelineState::Configured);
        tracing::debug!(stages = ?self.stage_names(), "pipeline reconfigured");
    }

    /// Negotiate `input` through every staged stage and hand the chain to the
    /// processor. Returns the final output shape.
    ///
    /// If a stage rejects its input, every stage is torn down again in
    /// reverse order and that stage's [`Error::ShapeMismatch`] is returned.
    pub fn prepare(&mut self, input: SignalShape) -> Result<SignalShape> {
        let state = self.state();
        if state != PipelineState::Configured {
            return Err(Error::InvalidState {
                operation: "prepare",
                state: state.as_str(),
            });
        }
        if self.publisher.is_closed() {
            return Err(Error::Driver("pipeline processor was dropped".into()));
        }
        input.validate()?;

        let mut shape = input;
        for index in 0..self.staged.len() {
            match self.staged[index].negotiate(&shape) {
                Ok(offered) => shape = offered,
                Err(err) => {
                    for stage in self.staged[..=index].iter_mut().rev() {
                        stage.teardown();
                    }
                    tracing::warn!(stage = self.staged[index].name(), %err, "prepare rolled back");
                    return Err(err);
                }
            }
        }

        let list = StageList {
            stages: std::mem::take(&mut self.staged),
            stats: self.stats.clone(),
            input,
            output: shape,
            silence: Signal::for_shape(&shape),
            deadline: input.deadline(),
        };
        self.publisher.publish(list);
        self.shared.stop.store(false, Ordering::Release);
        self.input_shape = Some(input);
        self.output_shape = Some(shape);
        self.shared.set_state(PipelineState::Prepared);
        tracing::debug!(%input, output = %shape, "pipeline prepared");
        Ok(shape)
    }

    /// Take the stage list back from `processor`, tear every stage down in
    /// reverse order and free all retired snapshots.
    ///
    /// The `&mut` borrow of the processor guarantees no `process` call is in
    /// flight. Stages stay staged, so `prepare` can run again.
    pub fn release(&mut self, processor: &mut PipelineProcessor) -> Result<()> {
        if !Arc::ptr_eq(&self.shared, &processor.shared) {
            return Err(Error::ProcessorMismatch);
        }
        if self.state() != PipelineState::Prepared {
            return Ok(());
        }

        match processor.reader.take() {
            Some(list) => {
                let mut stages = list.stages;
                for stage in stages.iter_mut().rev() {
                    stage.teardown();
                }
                self.staged = stages;
            }
            None => tracing::warn!("released pipeline had no active stage list"),
        }
        let reclaimed = processor.reader.reclaim() + self.reclaim();

        self.input_shape = None;
        self.output_shape = None;
        self.shared.stop.store(false, Ordering::Release);
        self.shared.set_state(PipelineState::Configured);
        tracing::debug!(reclaimed, "pipeline released");
        Ok(())
    }

    /// Free snapshots retired by every stage since the last call.
    /// Safe while audio is running.
    pub fn reclaim(&self) -> usize {
        self.publisher.reclaim()
            + self
                .controls
                .iter()
                .map(|control| control.reclaim())
                .sum::<usize>()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.controls.iter().map(|control| control.name()).collect()
    }

    /// Control handle of the first stage called `name`.
    pub fn stage_control(&self, name: &str) -> Option<StageControl> {
        self.controls
            .iter()
            .find(|control| control.name() == name)
            .cloned()
    }

    pub fn stage_control_at(&self, index: usize) -> Option<StageControl> {
        self.controls.get(index).cloned()
    }

    pub fn stage_stats(&self) -> Vec<(String, StageTiming)> {
        self.controls
            .iter()
            .zip(&self.stats)
            .map(|(control, stats)| (control.name().to_string(), stats.snapshot()))
            .collect()
    }

    /// Cell counters of the stage list plus every stage.
    pub fn cell_stats(&self) -> Vec<CellStats> {
        std::iter::once(self.publisher.stats())
            .chain(self.controls.iter().map(|control| control.cell_stats()))
            .collect()
    }

    pub fn events(&self) -> &EventReceiver {
        &self.events
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    pub fn input_shape(&self) -> Option<SignalShape> {
        self.input_shape
    }

    pub fn output_shape(&self) -> Option<SignalShape> {
        self.output_shape
    }

    /// Accumulate per-stage and whole-cycle timing.
    pub fn set_timing(&self, enabled: bool) {
        self.shared.timing.store(enabled, Ordering::Release);
    }

    /// Whole-cycle load against the fragment deadline (timing must be on).
    pub fn load(&self) -> DeadlineMetrics {
        self.shared.meter.metrics()
    }
}

/// Audio side of the pipeline. Owned by whatever drives the callback.
pub struct PipelineProcessor {
    shared: Arc<PipelineShared>,
    reader: ConfigReader<StageList>,
}

impl PipelineProcessor {
    /// Run one fragment through the chain.
    ///
    /// Lock-free and allocation-free. A stage fault mutes the pipeline until
    /// it is released: the stop flag is raised, an event is queued and every
    /// following call returns [`ProcessOutcome::Stopped`].
    pub fn process<'a>(&'a mut self, input: &'a Signal) -> ProcessOutcome<'a> {
        let shared = &*self.shared;
        let Ok(list) = self.reader.acquire_mut() else {
            return ProcessOutcome::Idle;
        };
        if shared.stop.load(Ordering::Acquire) {
            return ProcessOutcome::Stopped(&list.silence);
        }
        if !input.matches(&list.input) {
            shared.stop.store(true, Ordering::Release);
            shared.notify(PipelineEvent::InputMismatch);
            return ProcessOutcome::Stopped(&list.silence);
        }

        let timing = shared.timing.load(Ordering::Relaxed);
        let started = timing.then(Instant::now);

        if let Err(fault) = list.run(input, timing) {
            shared.stop.store(true, Ordering::Release);
            shared.notify(PipelineEvent::StageFault(fault));
            return ProcessOutcome::Stopped(&list.silence);
        }

        if let Some(started) = started {
            let elapsed = started.elapsed();
            shared.meter.record(elapsed, list.deadline);
            if elapsed > list.deadline {
                shared.notify(PipelineEvent::DeadlineMiss {
                    elapsed,
                    deadline: list.deadline,
                });
            }
        }
        ProcessOutcome::Ready(list.output(input))
    }

    /// A fault asked the driver to stop.
    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.state() == PipelineState::Prepared
    }

    /// Shape of the active list, as last seen by this side.
    pub fn input_shape(&self) -> Option<SignalShape> {
        self.reader.current().map(StageList::input_shape)
    }

    pub fn output_shape(&self) -> Option<SignalShape> {
        self.reader.current().map(StageList::output_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::registry::{get_param_or, StageParams};
    use crate::shape::Domain;
    use crate::signal::TimeBuffer;
    use crate::stage::{ShapeRejection, Transform};
    use crate::{params, ProcessError};
    use std::sync::atomic::AtomicUsize;

    /// Time-domain scaler that accepts only `channels` channels and counts
    /// how many instances are currently negotiated.
    struct Scale {
        channels: usize,
        live: Arc<AtomicUsize>,
    }

    impl Transform for Scale {
        type Config = f32;

        fn configure(params: &StageParams) -> core::result::Result<f32, RegistryError> {
            get_param_or(params, "factor", 1.0, |v| v.as_f32())
        }

        fn negotiate(
            &self,
            requested: &SignalShape,
            _config: Option<&f32>,
        ) -> core::result::Result<SignalShape, ShapeRejection> {
            if requested.channels != self.channels || requested.domain != Domain::Time {
                return Err(ShapeRejection::expected(
                    requested.into_time().with_channels(self.channels),
                ));
            }
            Ok(*requested)
        }

        fn allocate(&mut self, _input: &SignalShape, _output: &SignalShape) {
            self.live.fetch_add(1, Ordering::SeqCst);
        }

        fn time_to_time(
            &mut self,
            factor: &f32,
            input: &TimeBuffer,
            output: &mut TimeBuffer,
        ) -> core::result::Result<(), ProcessError> {
            if factor.is_nan() {
                return Err(ProcessError::Rejected("nan factor"));
            }
            for (out, sample) in output.samples_mut().iter_mut().zip(input.samples()) {
                *out = sample * factor;
            }
            Ok(())
        }

        fn teardown(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn registry(live: &Arc<AtomicUsize>) -> StageRegistry {
        let registry = StageRegistry::new();
        for (name, channels) in [("mono", 1), ("stereo", 2)] {
            let live = Arc::clone(live);
            registry.register_transform(name, move |_| {
                Ok(Scale {
                    channels,
                    live: Arc::clone(&live),
                })
            });
        }
        registry
    }

    fn shape() -> SignalShape {
        SignalShape::time(1, 4, 16000.0)
    }

    fn fragment(value: f32) -> Signal {
        TimeBuffer::from_interleaved(1, vec![value; 4]).unwrap().into()
    }

    fn samples(outcome: ProcessOutcome<'_>) -> Vec<f32> {
        match outcome {
            ProcessOutcome::Ready(signal) => signal.as_time().unwrap().samples().to_vec(),
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_and_process() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline
            .reconfigure(
                &registry(&live),
                [
                    StageSpec::with_params("mono", params! { "factor" => 2.0 }),
                    StageSpec::with_params("mono", params! { "factor" => 3.0 }),
                ],
            )
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
        assert!(matches!(processor.process(&fragment(1.0)), ProcessOutcome::Idle));

        assert_eq!(pipeline.prepare(shape()).unwrap(), shape());
        assert_eq!(live.load(Ordering::SeqCst), 2);
        assert_eq!(samples(processor.process(&fragment(1.0))), vec![6.0; 4]);
        assert_eq!(processor.output_shape(), Some(shape()));
    }

    #[test]
    fn test_empty_list_passes_input_through() {
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.install(Vec::new()).unwrap();
        pipeline.prepare(shape()).unwrap();
        assert_eq!(samples(processor.process(&fragment(0.5))), vec![0.5; 4]);
    }

    #[test]
    fn test_prepare_rollback_leaves_nothing_negotiated() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, _processor) = Pipeline::new();
        pipeline
            .reconfigure(&registry(&live), ["mono", "stereo", "mono"])
            .unwrap();

        match pipeline.prepare(shape()) {
            Err(Error::ShapeMismatch {
                stage,
                expected,
                offered,
            }) => {
                assert_eq!(stage, "stereo");
                assert_eq!(expected, shape().with_channels(2));
                assert_eq!(offered, shape());
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), PipelineState::Configured);
        assert_eq!(pipeline.output_shape(), None);
    }

    #[test]
    fn test_reconfigure_rejected_while_prepared() {
        let live = Arc::new(AtomicUsize::new(0));
        let registry = registry(&live);
        let (mut pipeline, _processor) = Pipeline::new();
        pipeline.reconfigure(&registry, ["mono"]).unwrap();
        pipeline.prepare(shape()).unwrap();

        assert!(matches!(
            pipeline.reconfigure(&registry, ["mono", "mono"]),
            Err(Error::InvalidState {
                operation: "reconfigure",
                state: "prepared"
            })
        ));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_unknown_stage_keeps_previous_list() {
        let live = Arc::new(AtomicUsize::new(0));
        let registry = registry(&live);
        let (mut pipeline, _processor) = Pipeline::new();
        pipeline.reconfigure(&registry, ["mono"]).unwrap();

        assert!(matches!(
            pipeline.reconfigure(&registry, ["mono", "granular"]),
            Err(Error::Registry(RegistryError::UnknownStageType(_)))
        ));
        assert_eq!(pipeline.stage_names(), vec!["mono"]);
    }

    #[test]
    fn test_prepare_requires_configuration() {
        let (mut pipeline, _processor) = Pipeline::new();
        assert!(matches!(
            pipeline.prepare(shape()),
            Err(Error::InvalidState { state: "empty", .. })
        ));
    }

    #[test]
    fn test_parameter_change_while_prepared() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.reconfigure(&registry(&live), ["mono"]).unwrap();
        pipeline.prepare(shape()).unwrap();
        assert_eq!(samples(processor.process(&fragment(1.0))), vec![1.0; 4]);

        let control = pipeline.stage_control("mono").unwrap();
        control.apply(&params! { "factor" => 4.0 }).unwrap();
        assert_eq!(samples(processor.process(&fragment(1.0))), vec![4.0; 4]);
        assert_eq!(pipeline.reclaim(), 1);
    }

    #[test]
    fn test_fault_stops_until_release() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.reconfigure(&registry(&live), ["mono", "mono"]).unwrap();
        pipeline.prepare(shape()).unwrap();

        pipeline
            .stage_control_at(1)
            .unwrap()
            .apply(&params! { "factor" => f64::NAN })
            .unwrap();
        let input = fragment(1.0);
        let outcome = processor.process(&input);
        assert!(outcome.is_stopped());
        assert!(outcome.signal().unwrap().is_silent());
        assert!(pipeline.stop_requested());
        assert!(processor.stop_requested());
        assert_eq!(
            pipeline.events().try_recv().unwrap(),
            PipelineEvent::StageFault(StageFault {
                index: 1,
                kind: FaultKind::Error(ProcessError::Rejected("nan factor")),
            })
        );

        assert!(processor.process(&fragment(1.0)).is_stopped());
        pipeline.release(&mut processor).unwrap();
        assert!(!pipeline.stop_requested());
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_and_prepare_again() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.reconfigure(&registry(&live), ["mono"]).unwrap();
        pipeline.prepare(shape()).unwrap();
        processor.process(&fragment(1.0));

        pipeline.release(&mut processor).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(matches!(processor.process(&fragment(1.0)), ProcessOutcome::Idle));
        assert!(pipeline.cell_stats().iter().all(|stats| stats.retired == 0));

        pipeline.prepare(shape()).unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(samples(processor.process(&fragment(2.0))), vec![2.0; 4]);

        // Membership can change once released.
        pipeline.release(&mut processor).unwrap();
        pipeline.reconfigure(&registry(&live), ["mono", "mono"]).unwrap();
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_release_rejects_foreign_processor() {
        let (mut pipeline, _processor) = Pipeline::new();
        let (_other, mut foreign) = Pipeline::new();
        assert!(matches!(
            pipeline.release(&mut foreign),
            Err(Error::ProcessorMismatch)
        ));
    }

    #[test]
    fn test_input_mismatch_stops() {
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.install(Vec::new()).unwrap();
        pipeline.prepare(shape()).unwrap();

        let stereo = Signal::for_shape(&shape().with_channels(2));
        assert!(processor.process(&stereo).is_stopped());
        assert_eq!(
            pipeline.events().try_recv().unwrap(),
            PipelineEvent::InputMismatch
        );
    }

    #[test]
    fn test_timing_accumulates_per_stage() {
        let live = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, mut processor) = Pipeline::new();
        pipeline.reconfigure(&registry(&live), ["mono"]).unwrap();
        pipeline.set_timing(true);
        pipeline.prepare(shape()).unwrap();

        for _ in 0..10 {
            processor.process(&fragment(1.0));
        }
        let stats = pipeline.stage_stats();
        assert_eq!(stats[0].0, "mono");
        assert_eq!(stats[0].1.calls, 10);
        assert_eq!(stats[0].1.timed, 10);
        assert_eq!(pipeline.load().cycles, 10);
    }
}
