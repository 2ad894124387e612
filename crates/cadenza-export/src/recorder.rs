//! Recorder stage: passes time-domain audio through unchanged and copies it
//! into an SPSC queue for a drain worker.

use cadenza_core::{
    get_param_or, ProcessError, QueueProducer, RegistryError, ShapeRejection, SignalShape,
    StageParams, StageRegistry, TimeBuffer, Transform,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Copy fragments into the queue. Disarmed recorders are plain passthrough.
    pub armed: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { armed: true }
    }
}

/// Producer side of a recording. Accepts only `channels`-channel time
/// signals.
pub struct Recorder {
    producer: QueueProducer<f32>,
    channels: usize,
}

impl Recorder {
    pub fn new(producer: QueueProducer<f32>, channels: usize) -> Self {
        Self { producer, channels }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples that did not fit in the queue. Frames are dropped whole.
    pub fn dropped(&self) -> u64 {
        self.producer.dropped()
    }

    /// Register this recorder under `name`. The first `create` takes it;
    /// later ones fail, since a queue has exactly one producer.
    pub fn register(self, registry: &StageRegistry, name: impl Into<String>) {
        let name = name.into();
        let slot = Arc::new(Mutex::new(Some(self)));
        let taken = name.clone();
        registry.register_transform(name, move |_| {
            slot.lock().take().ok_or_else(|| {
                RegistryError::ConstructionFailed(format!("recorder '{taken}' is already in use"))
            })
        });
    }
}

impl Transform for Recorder {
    type Config = RecorderConfig;

    fn configure(params: &StageParams) -> Result<RecorderConfig, RegistryError> {
        Ok(RecorderConfig {
            armed: get_param_or(params, "armed", true, |v| v.as_bool())?,
        })
    }

    fn negotiate(
        &self,
        requested: &SignalShape,
        _config: Option<&RecorderConfig>,
    ) -> Result<SignalShape, ShapeRejection> {
        let expected = requested.into_time().with_channels(self.channels);
        if *requested != expected {
            return Err(ShapeRejection::expected(expected));
        }
        Ok(*requested)
    }

    fn time_to_time(
        &mut self,
        config: &RecorderConfig,
        input: &TimeBuffer,
        output: &mut TimeBuffer,
    ) -> Result<(), ProcessError> {
        output.samples_mut().copy_from_slice(input.samples());
        if config.armed {
            self.producer.write_frames(input.samples(), self.channels);
        }
        Ok(())
    }
}
