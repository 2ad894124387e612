//! Driver boundary.
//!
//! A driver owns the [`PipelineProcessor`] while it runs and calls
//! [`PipelineProcessor::process`] once per fragment. Hardware backends live
//! outside this crate; the two drivers here are software clocks for offline
//! rendering and for exercising the real-time path under a deadline.

use crate::metering::DeadlineMeter;
use crate::pipeline::{PipelineProcessor, ProcessOutcome};
use crate::shape::SignalShape;
use crate::signal::Signal;
use crate::Error;
use crossbeam_channel::{bounded, SendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A driver refused to start. The processor it was offered comes back
/// untouched.
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct StartError {
    #[source]
    pub error: Error,
    pub processor: PipelineProcessor,
}

impl StartError {
    pub fn new(error: Error, processor: PipelineProcessor) -> Self {
        Self { error, processor }
    }

    pub fn into_parts(self) -> (Error, PipelineProcessor) {
        (self.error, self.processor)
    }
}

impl std::fmt::Debug for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Something that drives a pipeline processor.
pub trait AudioDriver {
    /// Take ownership of `processor` and start calling it. On failure the
    /// processor is returned inside the error.
    fn start(&mut self, processor: PipelineProcessor) -> Result<(), StartError>;

    /// Stop calling the processor and hand it back.
    fn stop(&mut self) -> Option<PipelineProcessor>;

    fn is_running(&self) -> bool;
}

/// Driver without a clock: the caller runs each cycle.
#[derive(Default)]
pub struct OfflineDriver {
    processor: Option<PipelineProcessor>,
    cycles: u64,
}

impl OfflineDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one cycle. `Idle` when not started.
    pub fn process<'a>(&'a mut self, input: &'a Signal) -> ProcessOutcome<'a> {
        match self.processor.as_mut() {
            Some(processor) => {
                self.cycles += 1;
                processor.process(input)
            }
            None => ProcessOutcome::Idle,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn stop_requested(&self) -> bool {
        self.processor
            .as_ref()
            .is_some_and(|processor| processor.stop_requested())
    }
}

impl AudioDriver for OfflineDriver {
    fn start(&mut self, processor: PipelineProcessor) -> Result<(), StartError> {
        if self.processor.is_some() {
            return Err(StartError::new(
                Error::Driver("offline driver already started".into()),
                processor,
            ));
        }
        self.processor = Some(processor);
        Ok(())
    }

    fn stop(&mut self) -> Option<PipelineProcessor> {
        self.processor.take()
    }

    fn is_running(&self) -> bool {
        self.processor.is_some()
    }
}

/// Fills the input fragment of each cycle.
pub type Source = Box<dyn FnMut(&mut Signal) + Send>;

/// Receives the output fragment of each cycle.
pub type Sink = Box<dyn FnMut(&Signal) + Send>;

type Handoff = (PipelineProcessor, Source, Sink);

type Worker = JoinHandle<Option<Handoff>>;

/// Software callback thread running at the fragment rate.
///
/// Each cycle fills the input through the source, processes it and passes
/// the output to the sink, then sleeps until the next fragment boundary.
/// Exits when stopped or when the pipeline requests a stop.
pub struct ThreadedDriver {
    input_shape: SignalShape,
    paced: bool,
    source: Source,
    sink: Sink,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    meter: Arc<DeadlineMeter>,
    handle: Option<Worker>,
}

impl ThreadedDriver {
    pub fn new(input_shape: SignalShape) -> Self {
        Self {
            input_shape,
            paced: true,
            source: Box::new(|_| {}),
            sink: Box::new(|_| {}),
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            cycles: Arc::new(AtomicU64::new(0)),
            meter: Arc::new(DeadlineMeter::new()),
            handle: None,
        }
    }

    pub fn with_source(mut self, source: impl FnMut(&mut Signal) + Send + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn with_sink(mut self, sink: impl FnMut(&Signal) + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Run cycles back to back instead of sleeping until each deadline.
    pub fn free_running(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn input_shape(&self) -> SignalShape {
        self.input_shape
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Per-cycle load against the fragment deadline.
    pub fn meter(&self) -> Arc<DeadlineMeter> {
        Arc::clone(&self.meter)
    }
}

impl AudioDriver for ThreadedDriver {
    fn start(&mut self, processor: PipelineProcessor) -> Result<(), StartError> {
        if self.handle.is_some() {
            return Err(StartError::new(
                Error::Driver("threaded driver already started".into()),
                processor,
            ));
        }
        if let Err(err) = self.input_shape.validate() {
            return Err(StartError::new(err, processor));
        }

        let stop = Arc::clone(&self.stop);
        let running = Arc::clone(&self.running);
        let cycles = Arc::clone(&self.cycles);
        let meter = Arc::clone(&self.meter);
        let shape = self.input_shape;
        let paced = self.paced;

        stop.store(false, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        // The thread receives its state only once it exists, so a failed
        // spawn leaves everything here.
        let (handoff_tx, handoff_rx) = bounded::<Handoff>(1);
        let spawned = thread::Builder::new()
            .name("cadenza-audio".into())
            .spawn(move || {
                let Ok((mut processor, mut source, mut sink)) = handoff_rx.recv() else {
                    running.store(false, Ordering::SeqCst);
                    return None;
                };
                let mut input = Signal::for_shape(&shape);
                let deadline = shape.deadline();
                let mut next = Instant::now();

                while !stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    source(&mut input);
                    if let Some(output) = processor.process(&input).signal() {
                        sink(output);
                    }
                    meter.record(started.elapsed(), deadline);
                    cycles.fetch_add(1, Ordering::Relaxed);

                    if processor.stop_requested() {
                        break;
                    }
                    if paced {
                        next += deadline;
                        let now = Instant::now();
                        if next > now {
                            thread::sleep(next - now);
                        } else {
                            next = now;
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                Some((processor, source, sink))
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(StartError::new(Error::Spawn(err), processor));
            }
        };

        let source = std::mem::replace(&mut self.source, Box::new(|_| {}));
        let sink = std::mem::replace(&mut self.sink, Box::new(|_| {}));
        if let Err(SendError((processor, source, sink))) = handoff_tx.send((processor, source, sink))
        {
            self.source = source;
            self.sink = sink;
            let _ = handle.join();
            self.running.store(false, Ordering::SeqCst);
            return Err(StartError::new(
                Error::Driver("audio thread exited before start".into()),
                processor,
            ));
        }

        tracing::debug!(%shape, paced, "audio thread started");
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Option<PipelineProcessor> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(Some((processor, source, sink))) => {
                self.source = source;
                self.sink = sink;
                tracing::debug!(cycles = self.cycles(), "audio thread stopped");
                Some(processor)
            }
            Ok(None) => None,
            Err(_) => {
                tracing::warn!("audio thread panicked; processor lost");
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadedDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use std::time::Duration;

    fn prepared(shape: SignalShape) -> (Pipeline, PipelineProcessor) {
        let (mut pipeline, processor) = Pipeline::new();
        pipeline.install(Vec::new()).unwrap();
        pipeline.prepare(shape).unwrap();
        (pipeline, processor)
    }

    #[test]
    fn test_offline_driver() {
        let shape = SignalShape::time(1, 8, 16000.0);
        let (_pipeline, processor) = prepared(shape);
        let mut driver = OfflineDriver::new();
        let input = Signal::for_shape(&shape);

        assert!(matches!(driver.process(&input), ProcessOutcome::Idle));
        driver.start(processor).unwrap();
        assert!(driver.is_running());
        assert!(driver.process(&input).is_ready());
        assert_eq!(driver.cycles(), 1);
        assert!(driver.stop().is_some());
        assert!(!driver.is_running());
    }

    #[test]
    fn test_threaded_driver_runs_and_returns_processor() {
        let shape = SignalShape::time(1, 64, 16000.0);
        let (_pipeline, processor) = prepared(shape);
        let outputs = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&outputs);

        let mut driver = ThreadedDriver::new(shape)
            .with_source(|input| input.silence())
            .with_sink(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        driver.start(processor).unwrap();
        assert!(driver.is_running());
        let (_other, spare) = Pipeline::new();
        assert!(driver.start(spare).is_err());

        thread::sleep(Duration::from_millis(40));
        let processor = driver.stop();
        assert!(processor.is_some());
        assert!(!driver.is_running());
        assert!(driver.cycles() > 0);
        assert_eq!(outputs.load(Ordering::Relaxed), driver.cycles());

        driver.start(processor.unwrap()).unwrap();
        assert!(driver.stop().is_some());
    }

    #[test]
    fn test_threaded_driver_exits_on_stop_request() {
        let shape = SignalShape::time(1, 16, 16000.0);
        let (pipeline, processor) = prepared(shape);
        // Feeding a stereo fragment into a mono pipeline raises the stop flag.
        let mut driver = ThreadedDriver::new(shape.with_channels(2)).free_running();
        driver.start(processor).unwrap();

        let started = Instant::now();
        while driver.is_running() && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!driver.is_running());
        assert!(pipeline.stop_requested());
        assert!(driver.stop().is_some());
    }

    #[test]
    fn test_refused_start_returns_processor() {
        let shape = SignalShape::time(1, 8, 16000.0);
        let (mut pipeline, processor) = prepared(shape);

        let mut offline = OfflineDriver::new();
        offline.start(processor).unwrap();
        let (_other, spare) = Pipeline::new();
        let (err, spare) = offline.start(spare).unwrap_err().into_parts();
        assert!(matches!(err, Error::Driver(_)));
        drop(spare);

        let mut processor = offline.stop().unwrap();
        let mut threaded = ThreadedDriver::new(SignalShape::time(0, 8, 16000.0));
        let refused = threaded.start(processor).unwrap_err();
        assert!(matches!(refused.error, Error::InvalidShape(_)));
        assert!(!threaded.is_running());

        processor = refused.processor;
        pipeline.release(&mut processor).unwrap();
        pipeline.prepare(shape).unwrap();
        let input = Signal::for_shape(&shape);
        assert!(processor.process(&input).is_ready());
    }

    #[test]
    fn test_second_start_keeps_running_thread() {
        let shape = SignalShape::time(1, 16, 16000.0);
        let (mut pipeline, processor) = prepared(shape);
        let (mut other, spare) = Pipeline::new();

        let mut driver = ThreadedDriver::new(shape).free_running();
        driver.start(processor).unwrap();
        let mut spare = driver.start(spare).unwrap_err().processor;
        assert!(driver.is_running());

        other.install(Vec::new()).unwrap();
        other.prepare(shape).unwrap();
        assert!(spare.process(&Signal::for_shape(&shape)).is_ready());

        let mut processor = driver.stop().unwrap();
        pipeline.release(&mut processor).unwrap();
    }
}
