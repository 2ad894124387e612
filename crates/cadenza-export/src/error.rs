//! Error types for cadenza-export

use std::io;
use thiserror::Error;

/// Export error type
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid recording options
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Pipeline or worker failure
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(feature = "wav")]
impl From<hound::Error> for ExportError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(err) => ExportError::Io(err),
            other => ExportError::Io(io::Error::other(other)),
        }
    }
}
