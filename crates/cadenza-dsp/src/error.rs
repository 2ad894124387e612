//! Error types for cadenza-dsp

use cadenza_core::RegistryError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for RegistryError {
    fn from(e: Error) -> Self {
        RegistryError::ConstructionFailed(e.to_string())
    }
}
