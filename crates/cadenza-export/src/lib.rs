//! # Cadenza Export
//!
//! Recording from a running pipeline to disk.
//!
//! - [`Recorder`]: a passthrough stage that copies audio into an SPSC queue
//! - [`RecordingSession`]: the drain worker on the other end of that queue
//! - [`WavSink`]: WAV writer the session drains into
//!
//! The audio thread only ever writes to the queue; encoding and file I/O
//! happen on the worker.
//!
//! ## Feature Flags
//!
//! - `wav` (default): WAV output via hound (pure Rust)

pub mod error;
pub mod recorder;
pub mod session;

#[cfg(feature = "wav")]
pub mod wav;

pub use error::{ExportError, Result};
pub use recorder::{Recorder, RecorderConfig};
pub use session::{RecordingOptions, RecordingReport, RecordingSession};

#[cfg(feature = "wav")]
pub use wav::{BitDepth, WavConfig, WavSink, WavSummary};
