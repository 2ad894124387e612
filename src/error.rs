//! Centralized error type for the cadenza umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error("DSP: {0}")]
    Dsp(#[from] cadenza_dsp::Error),

    #[cfg(feature = "export")]
    #[error("Export: {0}")]
    Export(#[from] cadenza_export::ExportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<cadenza_core::RegistryError> for Error {
    fn from(e: cadenza_core::RegistryError) -> Self {
        Error::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
