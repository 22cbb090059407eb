//! spibus-core - Validated settings and transfer dispatch for SPI buses
//!
//! This crate provides [`SpiHandle`], a handle to one open SPI bus device
//! (e.g. `/dev/spidevX.Y`) carrying its clock mode, bit order and clock
//! speed. Transfers are dispatched to an [`SpiBackend`], the platform
//! primitive that performs the actual exchange, or to a caller-supplied
//! [`TransferOverride`].
//!
//! Settings are changed through fluent setters. Out of range values are
//! not errors: they are dropped, the previous value is kept and a warning
//! is logged.
//!
//! # Features
//!
//! - `config` - Load [`BusOptions`] from TOML files
//!
//! # Example
//!
//! ```no_run
//! use spibus_core::{Mode, SpiBackend, SpiHandle};
//!
//! async fn exchange<B: SpiBackend>(backend: B) -> Result<(), Box<dyn std::error::Error>> {
//!     let spi = SpiHandle::open("/dev/spidev0.0", backend)?;
//!     spi.set_speed(1_000_000).set_mode(Mode::M2);
//!
//!     let reply = spi.transfer(vec![0x9F, 0x00, 0x00, 0x00], 4).await?;
//!     println!("{:02X?}", reply);
//!
//!     spi.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod constraint;
pub mod error;
pub mod handle;
pub mod mode;
pub mod settings;
pub mod transfer;

pub use config::{parse_backend_string, BusOptions, ConfigError};
pub use error::{BackendError, Error, OpenError, Result};
pub use handle::{SpiHandle, DEFAULT_DEVICE};
pub use mode::{Mode, ModeFlags, Order};
pub use settings::{Settings, SettingsStore, DEFAULT_SPEED_HZ};
pub use transfer::{
    transfer_override, DeviceSettings, SpiBackend, TransferConfig, TransferOverride,
    TransferStrategy,
};
