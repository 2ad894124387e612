//! Engine configuration.

use crate::cell::DEFAULT_RETIRE_CAPACITY;
use crate::shape::SignalShape;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Longest fragment accepted by [`EngineConfig::validate`].
pub const MAX_FRAGMENT_LEN: usize = 8192;

/// Configuration for the audio engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Frames per callback.
    pub fragment_len: usize,
    pub channels: usize,
    /// Capacity of queues handed to auxiliary threads, in samples. Recording
    /// sessions built for the engine use it.
    pub queue_capacity: usize,
    /// Retirement queue length of the pipeline's stage-list cell.
    pub retire_capacity: usize,
    /// Accumulate per-stage wall-clock time.
    pub timing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            fragment_len: 256,
            channels: 2,
            queue_capacity: 44100 * 2,
            retire_capacity: DEFAULT_RETIRE_CAPACITY,
            timing: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.fragment_len == 0 || self.fragment_len > MAX_FRAGMENT_LEN {
            return Err(Error::InvalidConfig(format!(
                "fragment_len {} out of range (1-{MAX_FRAGMENT_LEN})",
                self.fragment_len
            )));
        }
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channels must be at least 1".into()));
        }
        if self.retire_capacity == 0 {
            return Err(Error::InvalidConfig(
                "retire_capacity must be at least 1".into(),
            ));
        }
        if self.queue_capacity < self.channels {
            return Err(Error::InvalidConfig(format!(
                "queue_capacity {} cannot hold one frame of {} channels",
                self.queue_capacity, self.channels
            )));
        }
        Ok(())
    }

    /// Time-domain shape the driver feeds into the pipeline.
    pub fn input_shape(&self) -> SignalShape {
        SignalShape::time(self.channels, self.fragment_len, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let config = EngineConfig {
            sample_rate: 4000.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            fragment_len: MAX_FRAGMENT_LEN + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            channels: 4,
            queue_capacity: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_input_shape() {
        let config = EngineConfig {
            sample_rate: 16000.0,
            fragment_len: 64,
            channels: 1,
            ..Default::default()
        };
        assert_eq!(config.input_shape(), SignalShape::time(1, 64, 16000.0));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "sample_rate": 48000.0, "timing": true }"#).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
        assert!(config.timing);
        assert_eq!(config.fragment_len, EngineConfig::default().fragment_len);
    }
}
