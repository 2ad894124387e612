//! Signal shape and domain routing.
//!
//! A [`SignalShape`] describes what flows across one stage boundary. Shapes are
//! threaded through the chain once at `prepare` time; after that every fragment
//! is assumed to match the negotiated shape exactly.

use crate::{Error, Result};
use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Representation of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Interleaved samples.
    Time,
    /// Per-channel complex bins.
    Frequency,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Time => f.write_str("time"),
            Domain::Frequency => f.write_str("frequency"),
        }
    }
}

/// Input/output domain pair of a stage, fixed at negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    TimeToTime,
    TimeToFrequency,
    FrequencyToTime,
    FrequencyToFrequency,
}

impl Route {
    pub fn between(input: Domain, output: Domain) -> Self {
        match (input, output) {
            (Domain::Time, Domain::Time) => Route::TimeToTime,
            (Domain::Time, Domain::Frequency) => Route::TimeToFrequency,
            (Domain::Frequency, Domain::Time) => Route::FrequencyToTime,
            (Domain::Frequency, Domain::Frequency) => Route::FrequencyToFrequency,
        }
    }

    pub fn input(self) -> Domain {
        match self {
            Route::TimeToTime | Route::TimeToFrequency => Domain::Time,
            Route::FrequencyToTime | Route::FrequencyToFrequency => Domain::Frequency,
        }
    }

    pub fn output(self) -> Domain {
        match self {
            Route::TimeToTime | Route::FrequencyToTime => Domain::Time,
            Route::TimeToFrequency | Route::FrequencyToFrequency => Domain::Frequency,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.input(), self.output())
    }
}

/// Shape of the signal crossing one stage boundary.
///
/// `fragment_len` is the number of frames per callback. `transform_len` is the
/// number of complex bins per channel in the frequency domain; for time-domain
/// shapes it is kept equal to `fragment_len`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalShape {
    pub channels: usize,
    pub domain: Domain,
    pub fragment_len: usize,
    pub transform_len: usize,
    pub sample_rate: f64,
}

impl SignalShape {
    /// Time-domain shape.
    pub fn time(channels: usize, fragment_len: usize, sample_rate: f64) -> Self {
        Self {
            channels,
            domain: Domain::Time,
            fragment_len,
            transform_len: fragment_len,
            sample_rate,
        }
    }

    /// Frequency-domain shape with `transform_len` bins per channel.
    pub fn frequency(
        channels: usize,
        fragment_len: usize,
        transform_len: usize,
        sample_rate: f64,
    ) -> Self {
        Self {
            channels,
            domain: Domain::Frequency,
            fragment_len,
            transform_len,
            sample_rate,
        }
    }

    pub fn with_channels(self, channels: usize) -> Self {
        Self { channels, ..self }
    }

    /// Same timing, frequency domain with `transform_len` bins.
    pub fn into_frequency(self, transform_len: usize) -> Self {
        Self {
            domain: Domain::Frequency,
            transform_len,
            ..self
        }
    }

    /// Same timing, time domain.
    pub fn into_time(self) -> Self {
        Self {
            domain: Domain::Time,
            transform_len: self.fragment_len,
            ..self
        }
    }

    /// Values per channel in one fragment (frames or bins).
    #[inline]
    pub fn values_per_channel(&self) -> usize {
        match self.domain {
            Domain::Time => self.fragment_len,
            Domain::Frequency => self.transform_len,
        }
    }

    /// Total values in one fragment across all channels.
    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.channels * self.values_per_channel()
    }

    /// Wall-clock budget of one fragment.
    pub fn deadline(&self) -> Duration {
        if self.sample_rate > 0.0 {
            Duration::from_secs_f64(self.fragment_len as f64 / self.sample_rate)
        } else {
            Duration::ZERO
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidShape(format!("{self}: zero channels")));
        }
        if self.fragment_len == 0 {
            return Err(Error::InvalidShape(format!("{self}: zero fragment length")));
        }
        if self.domain == Domain::Frequency && self.transform_len == 0 {
            return Err(Error::InvalidShape(format!("{self}: zero transform length")));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidShape(format!(
                "{self}: sample rate must be positive"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SignalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {} {}fr/{} @{}Hz",
            self.channels, self.domain, self.fragment_len, self.transform_len, self.sample_rate
        )
    }
}
