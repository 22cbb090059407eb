//! Transfer requests and the backend contract
//!
//! A [`TransferConfig`] is built once per transfer from the handle's current
//! settings and handed to an [`SpiBackend`], unless the handle carries a
//! [`TransferOverride`], in which case the override gets the raw input and
//! read count instead.

use core::fmt;
use core::future::Future;
use std::os::fd::RawFd;
use std::sync::Arc;

use futures_lite::future::Boxed;
use futures_lite::FutureExt;

use crate::error::BackendError;
use crate::mode::{Mode, Order};

/// One transfer request as seen by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Descriptor of the open bus device
    pub fd: RawFd,
    /// Clock speed in Hz
    pub speed: u32,
    /// Clock mode
    pub mode: Mode,
    /// Bit order
    pub order: Order,
    /// Bytes to clock out
    pub data_in: Vec<u8>,
    /// Number of bytes the caller wants back
    pub read_count: usize,
}

impl TransferConfig {
    /// Number of clock bytes the exchange needs
    ///
    /// A full-duplex exchange clocks `max(write, read)` bytes; the unused
    /// tail of the transmit side is zero padded.
    pub fn frame_len(&self) -> usize {
        self.data_in.len().max(self.read_count)
    }
}

/// Settings as reported by the device itself
///
/// Fields are `None` when the platform cannot report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Raw 32-bit mode word (includes flags beyond CPOL/CPHA)
    pub mode: Option<u32>,
    /// Bit order (0 = MSB first)
    pub order: Option<u8>,
    /// Word size in bits
    pub bits_per_word: Option<u8>,
    /// Maximum clock speed in Hz
    pub speed: Option<u32>,
}

/// Platform transfer primitive
///
/// Implementations perform exactly one half/full-duplex exchange per call
/// and resolve exactly once.
pub trait SpiBackend: Send + Sync + 'static {
    /// Whether this backend can perform transfers on the current platform
    ///
    /// Informational only: handles are never refused because of it.
    const SPI_SUPPORTED: bool;

    /// Perform one exchange
    ///
    /// `Ok(None)` means the exchange produced no output (e.g. a pure write).
    fn transfer(
        &self,
        config: TransferConfig,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, BackendError>> + Send;

    /// Query the settings currently applied to `fd`
    fn device_settings(&self, _fd: RawFd) -> Result<DeviceSettings, BackendError> {
        Ok(DeviceSettings::default())
    }
}

/// Replacement transfer function: (input bytes, read count) -> output bytes
pub type TransferOverride =
    Arc<dyn Fn(Vec<u8>, usize) -> Boxed<Result<Vec<u8>, BackendError>> + Send + Sync>;

/// Wrap an async function as a [`TransferOverride`]
///
/// ```
/// use spibus_core::transfer_override;
///
/// let zeros = transfer_override(|_data, count| async move { Ok(vec![0u8; count]) });
/// # let _ = zeros;
/// ```
pub fn transfer_override<F, Fut>(f: F) -> TransferOverride
where
    F: Fn(Vec<u8>, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, BackendError>> + Send + 'static,
{
    Arc::new(move |data, count| f(data, count).boxed())
}

/// How a handle executes its transfers
#[derive(Clone, Default)]
pub enum TransferStrategy {
    /// Hand transfers to the backend
    #[default]
    UseBackend,
    /// Hand transfers to a caller-supplied function
    UseOverride(TransferOverride),
}

impl TransferStrategy {
    /// Returns true if an override is installed
    pub fn is_override(&self) -> bool {
        matches!(self, Self::UseOverride(_))
    }
}

impl From<Option<TransferOverride>> for TransferStrategy {
    fn from(f: Option<TransferOverride>) -> Self {
        match f {
            Some(f) => Self::UseOverride(f),
            None => Self::UseBackend,
        }
    }
}

impl fmt::Debug for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseBackend => write!(f, "UseBackend"),
            Self::UseOverride(_) => write!(f, "UseOverride(..)"),
        }
    }
}
