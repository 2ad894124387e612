//! Error types for cadenza-core.

use crate::shape::{Route, SignalShape};
use thiserror::Error;

/// Error type for cadenza-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Stage '{stage}' cannot accept {offered}; expected {expected}")]
    ShapeMismatch {
        stage: String,
        expected: SignalShape,
        offered: SignalShape,
    },

    #[error("Cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Processor belongs to a different pipeline")]
    ProcessorMismatch,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Driver: {0}")]
    Driver(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors from stage registry operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown stage type: {0}")]
    UnknownStageType(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{0}': {1}")]
    InvalidParameter(String, String),

    #[error("Construction failed: {0}")]
    ConstructionFailed(String),
}

/// Failure reported by a transform on the audio path.
///
/// `Copy` and allocation-free so it can be produced and stored on the
/// real-time thread.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    #[error("route {0} not implemented")]
    Unsupported(Route),

    #[error("fragment does not match the negotiated shape")]
    ShapeDrift,

    #[error("stage is not negotiated")]
    NotNegotiated,

    #[error("{0}")]
    Rejected(&'static str),
}

/// How a stage failed during `process`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    #[error(transparent)]
    Error(#[from] ProcessError),

    #[error("transform panicked")]
    Panicked,
}

/// A fault at a known position in the stage chain.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stage {index} faulted: {kind}")]
pub struct StageFault {
    pub index: usize,
    pub kind: FaultKind,
}
