//! Error types for the spidev backend

use thiserror::Error;

/// spidev specific errors
#[derive(Debug, Error)]
pub enum SpidevError {
    /// Failed to set SPI mode
    #[error("Failed to set SPI mode to {mode}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bit order
    #[error("Failed to set SPI bit order to {order}: {source}")]
    SetOrderFailed {
        order: u8,
        #[source]
        source: std::io::Error,
    },

    /// SPI transfer failed
    #[error("SPI message transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Transfer does not fit in the kernel buffer
    #[error("Transfer of {len} bytes exceeds the spidev buffer size of {max} bytes")]
    TransferTooLarge { len: usize, max: usize },

    /// Built without spidev support
    #[error("SPI is not supported on this machine")]
    Unsupported,

    /// The blocking transfer task did not complete
    #[error("SPI transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for spidev operations
pub type Result<T> = std::result::Result<T, SpidevError>;
