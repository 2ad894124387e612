//! The Stage contract.
//!
//! Plugin authors implement [`Transform`]: a configuration type, shape
//! negotiation and whichever of the four domain entry points the stage
//! supports. [`StageAdapter`] wraps a transform into the object-safe
//! [`Stage`] the pipeline drives. It owns the stage's configuration cell
//! reader, the output buffer sized at negotiation, and the entry point chosen
//! for the negotiated route.

use crate::cell::{CellStats, ConfigCell, ConfigPublisher, ConfigReader, Published};
use crate::error::{FaultKind, ProcessError, RegistryError};
use crate::metering::StageStats;
use crate::registry::StageParams;
use crate::shape::{Route, SignalShape};
use crate::signal::{Signal, SpectrumBuffer, TimeBuffer};
use crate::{Error, Result};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A transform's refusal of a requested shape, carrying what it needs instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRejection {
    pub expected: SignalShape,
}

impl ShapeRejection {
    pub fn expected(expected: SignalShape) -> Self {
        Self { expected }
    }
}

/// Control-side check a stage instance applies to snapshots before they are
/// published.
pub type ConfigValidator<C> =
    Arc<dyn Fn(&C) -> core::result::Result<(), RegistryError> + Send + Sync>;

/// A processing unit, written against concrete buffer types.
///
/// Only the entry point matching the route returned by `negotiate` is ever
/// called. The others default to [`ProcessError::Unsupported`].
pub trait Transform: Send + 'static {
    /// Immutable parameter snapshot published through the stage's cell.
    type Config: Send + 'static;

    /// Build a configuration snapshot from named parameters. Control side.
    fn configure(params: &StageParams) -> core::result::Result<Self::Config, RegistryError>
    where
        Self: Sized;

    /// Output shape for `requested`, given the active configuration (if any).
    ///
    /// Must be deterministic in its arguments.
    fn negotiate(
        &self,
        requested: &SignalShape,
        config: Option<&Self::Config>,
    ) -> core::result::Result<SignalShape, ShapeRejection>;

    /// Instance-specific check for snapshots published through
    /// [`StageControl::apply`]. `configure` is static, so a snapshot it
    /// accepts can still be unusable by this instance; rejecting it here
    /// keeps it off the audio thread.
    fn validator(&self) -> Option<ConfigValidator<Self::Config>> {
        None
    }

    /// Size internal scratch for the negotiated shapes. Control side.
    fn allocate(&mut self, _input: &SignalShape, _output: &SignalShape) {}

    fn time_to_time(
        &mut self,
        _config: &Self::Config,
        _input: &TimeBuffer,
        _output: &mut TimeBuffer,
    ) -> core::result::Result<(), ProcessError> {
        Err(ProcessError::Unsupported(Route::TimeToTime))
    }

    fn time_to_frequency(
        &mut self,
        _config: &Self::Config,
        _input: &TimeBuffer,
        _output: &mut SpectrumBuffer,
    ) -> core::result::Result<(), ProcessError> {
        Err(ProcessError::Unsupported(Route::TimeToFrequency))
    }

    fn frequency_to_time(
        &mut self,
        _config: &Self::Config,
        _input: &SpectrumBuffer,
        _output: &mut TimeBuffer,
    ) -> core::result::Result<(), ProcessError> {
        Err(ProcessError::Unsupported(Route::FrequencyToTime))
    }

    fn frequency_to_frequency(
        &mut self,
        _config: &Self::Config,
        _input: &SpectrumBuffer,
        _output: &mut SpectrumBuffer,
    ) -> core::result::Result<(), ProcessError> {
        Err(ProcessError::Unsupported(Route::FrequencyToFrequency))
    }

    /// Release what `allocate` sized. Called at most once per negotiation.
    fn teardown(&mut self) {}
}

/// Object-safe stage interface driven by the pipeline.
pub trait Stage: Send {
    fn name(&self) -> &str;

    /// Negotiate and size buffers for `requested`. Control side.
    ///
    /// On rejection returns [`Error::ShapeMismatch`] and leaves the stage
    /// un-negotiated.
    fn negotiate(&mut self, requested: &SignalShape) -> Result<SignalShape>;

    /// Process one fragment into the stage's own output buffer.
    ///
    /// Audio thread. On a fault the output buffer is zeroed.
    fn process(&mut self, input: &Signal) -> core::result::Result<&Signal, FaultKind>;

    /// Output of the most recent `process`.
    fn output(&self) -> Option<&Signal>;

    /// Free negotiation-sized resources and reclaim retired snapshots.
    /// Idempotent. Control side, with no `process` in flight.
    fn teardown(&mut self);

    fn is_negotiated(&self) -> bool;

    fn route(&self) -> Option<Route>;

    /// Control-side handle for publishing parameters.
    fn control(&self) -> StageControl;

    fn stats(&self) -> Arc<StageStats>;
}

type Dispatch<T> = fn(
    &mut T,
    &<T as Transform>::Config,
    &Signal,
    &mut Signal,
) -> core::result::Result<(), ProcessError>;

fn dispatch_for<T: Transform>(route: Route) -> Dispatch<T> {
    match route {
        Route::TimeToTime => |transform, config, input, output| match (input, output) {
            (Signal::Time(input), Signal::Time(output)) => {
                transform.time_to_time(config, input, output)
            }
            _ => Err(ProcessError::ShapeDrift),
        },
        Route::TimeToFrequency => |transform, config, input, output| match (input, output) {
            (Signal::Time(input), Signal::Frequency(output)) => {
                transform.time_to_frequency(config, input, output)
            }
            _ => Err(ProcessError::ShapeDrift),
        },
        Route::FrequencyToTime => |transform, config, input, output| match (input, output) {
            (Signal::Frequency(input), Signal::Time(output)) => {
                transform.frequency_to_time(config, input, output)
            }
            _ => Err(ProcessError::ShapeDrift),
        },
        Route::FrequencyToFrequency => |transform, config, input, output| match (input, output) {
            (Signal::Frequency(input), Signal::Frequency(output)) => {
                transform.frequency_to_frequency(config, input, output)
            }
            _ => Err(ProcessError::ShapeDrift),
        },
    }
}

struct Negotiated<T: Transform> {
    input: SignalShape,
    route: Route,
    dispatch: Dispatch<T>,
    output: Signal,
}

/// [`Stage`] implementation for any [`Transform`].
pub struct StageAdapter<T: Transform> {
    name: String,
    transform: T,
    reader: ConfigReader<T::Config>,
    publisher: ConfigPublisher<T::Config>,
    negotiated: Option<Negotiated<T>>,
    stats: Arc<StageStats>,
}

impl<T: Transform> StageAdapter<T> {
    /// Unconfigured stage; it is skipped until something is published.
    pub fn new(name: impl Into<String>, transform: T) -> Self {
        let (publisher, reader) = ConfigCell::new();
        Self {
            name: name.into(),
            transform,
            reader,
            publisher,
            negotiated: None,
            stats: Arc::new(StageStats::new()),
        }
    }

    pub fn with_config(name: impl Into<String>, transform: T, config: T::Config) -> Self {
        let stage = Self::new(name, transform);
        stage.publisher.publish(config);
        stage
    }

    /// Typed publisher for this stage's configuration.
    pub fn publisher(&self) -> ConfigPublisher<T::Config> {
        self.publisher.clone()
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}

impl<T: Transform> Stage for StageAdapter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn negotiate(&mut self, requested: &SignalShape) -> Result<SignalShape> {
        requested.validate()?;
        self.teardown();

        let config = self.reader.acquire().ok();
        let offered = self
            .transform
            .negotiate(requested, config)
            .map_err(|rejection| Error::ShapeMismatch {
                stage: self.name.clone(),
                expected: rejection.expected,
                offered: *requested,
            })?;
        offered.validate()?;

        self.transform.allocate(requested, &offered);
        let route = Route::between(requested.domain, offered.domain);
        self.negotiated = Some(Negotiated {
            input: *requested,
            route,
            dispatch: dispatch_for::<T>(route),
            output: Signal::for_shape(&offered),
        });
        tracing::debug!(stage = %self.name, %requested, %offered, %route, "stage negotiated");
        Ok(offered)
    }

    fn process(&mut self, input: &Signal) -> core::result::Result<&Signal, FaultKind> {
        let Self {
            transform,
            reader,
            negotiated,
            stats,
            ..
        } = self;
        let Some(negotiated) = negotiated.as_mut() else {
            stats.record_fault();
            return Err(ProcessError::NotNegotiated.into());
        };
        stats.record_call();
        let output = &mut negotiated.output;

        if !input.matches(&negotiated.input) {
            output.silence();
            stats.record_fault();
            return Err(ProcessError::ShapeDrift.into());
        }

        let Ok(config) = reader.acquire() else {
            if !output.copy_from(input) {
                output.silence();
            }
            stats.record_skip();
            return Ok(output);
        };

        let dispatch = negotiated.dispatch;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            dispatch(transform, config, input, output)
        }));

        match result {
            Ok(Ok(())) => Ok(output),
            Ok(Err(err)) => {
                output.silence();
                stats.record_fault();
                Err(FaultKind::Error(err))
            }
            Err(_) => {
                output.silence();
                stats.record_fault();
                Err(FaultKind::Panicked)
            }
        }
    }

    fn output(&self) -> Option<&Signal> {
        self.negotiated.as_ref().map(|n| &n.output)
    }

    fn teardown(&mut self) {
        if self.negotiated.take().is_some() {
            self.transform.teardown();
            tracing::debug!(stage = %self.name, "stage torn down");
        }
        self.publisher.reclaim();
    }

    fn is_negotiated(&self) -> bool {
        self.negotiated.is_some()
    }

    fn route(&self) -> Option<Route> {
        self.negotiated.as_ref().map(|n| n.route)
    }

    fn control(&self) -> StageControl {
        StageControl {
            name: Arc::from(self.name.as_str()),
            target: Arc::new(TransformControl::<T> {
                publisher: self.publisher.clone(),
                validator: self.transform.validator(),
                _transform: PhantomData,
            }),
        }
    }

    fn stats(&self) -> Arc<StageStats> {
        Arc::clone(&self.stats)
    }
}

trait ControlTarget: Send + Sync {
    fn apply(&self, params: &StageParams) -> core::result::Result<Published, RegistryError>;
    fn reclaim(&self) -> usize;
    fn cell_stats(&self) -> CellStats;
    fn is_closed(&self) -> bool;
}

struct TransformControl<T: Transform> {
    publisher: ConfigPublisher<T::Config>,
    validator: Option<ConfigValidator<T::Config>>,
    _transform: PhantomData<fn() -> T>,
}

impl<T: Transform> ControlTarget for TransformControl<T> {
    fn apply(&self, params: &StageParams) -> core::result::Result<Published, RegistryError> {
        let config = T::configure(params)?;
        if let Some(validate) = &self.validator {
            validate(&config)?;
        }
        Ok(self.publisher.publish(config))
    }

    fn reclaim(&self) -> usize {
        self.publisher.reclaim()
    }

    fn cell_stats(&self) -> CellStats {
        self.publisher.stats()
    }

    fn is_closed(&self) -> bool {
        self.publisher.is_closed()
    }
}

/// Cloneable control-side handle for one stage, independent of its
/// transform type.
///
/// `apply` builds a fresh snapshot from named parameters, checks it against
/// the stage instance and publishes it; it takes effect on the next fragment
/// without touching the pipeline.
#[derive(Clone)]
pub struct StageControl {
    name: Arc<str>,
    target: Arc<dyn ControlTarget>,
}

impl StageControl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, params: &StageParams) -> core::result::Result<Published, RegistryError> {
        self.target.apply(params)
    }

    /// Free the stage's retired snapshots.
    pub fn reclaim(&self) -> usize {
        self.target.reclaim()
    }

    pub fn cell_stats(&self) -> CellStats {
        self.target.cell_stats()
    }

    /// The stage has been dropped; `apply` is a no-op.
    pub fn is_closed(&self) -> bool {
        self.target.is_closed()
    }
}

impl core::fmt::Debug for StageControl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StageControl")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
