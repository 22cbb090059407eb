//! Error types for spibus-core

use std::path::PathBuf;

use thiserror::Error;

/// Error reported by a backend or a transfer override
///
/// Carried through [`Error::Transfer`] unmodified.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to open a bus device by path
#[derive(Debug, Error)]
#[error("Failed to open {}: {source}", .path.display())]
pub struct OpenError {
    /// Device path that could not be opened
    pub path: PathBuf,
    /// Underlying platform error
    #[source]
    pub source: std::io::Error,
}

/// Errors returned by handle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Opening the device failed
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The backend or the transfer override rejected a transfer
    #[error(transparent)]
    Transfer(BackendError),

    /// The backend could not report device settings
    #[error("Failed to query device settings: {0}")]
    Query(#[source] BackendError),

    /// The handle was closed
    #[error("SPI handle is closed")]
    Closed,
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
