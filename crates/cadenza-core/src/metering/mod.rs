//! Audio path metering.
//!
//! - `DeadlineMeter`: callback load relative to the fragment deadline
//! - `StageStats`: per-stage call, skip, fault and timing counters

mod deadline;
mod stage;

pub use deadline::{DeadlineMeter, DeadlineMetrics};
pub use stage::{StageStats, StageTiming};
