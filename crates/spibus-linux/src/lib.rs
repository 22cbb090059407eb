//! spibus-linux - Linux spidev backend
//!
//! This crate provides [`Spidev`], an [`SpiBackend`](spibus_core::SpiBackend)
//! that drives SPI controllers exposed as `/dev/spidevX.Y` character
//! devices, where X is the bus number and Y the chip select.
//!
//! # Example
//!
//! ```no_run
//! use spibus_core::{Mode, Order};
//! use spibus_linux::open_device;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let spi = open_device("/dev/spidev0.0")?;
//! spi.set_speed(1_000_000).set_mode(Mode::M3).set_order(Order::MsbFirst);
//!
//! // Read JEDEC ID
//! let reply = spi.transfer(vec![0x9F, 0, 0, 0], 4).await?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", reply[1], reply[2], reply[3]);
//! # Ok(())
//! # }
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - May require adding user to `spi` group or using udev rules
//!
//! On other platforms the crate builds, [`SPI_SUPPORTED`] is false and every
//! transfer fails with [`SpidevError::Unsupported`].

pub mod device;
pub mod error;

// Re-exports
pub use device::{Spidev, SPI_SUPPORTED};
pub use error::{Result, SpidevError};

use spibus_core::{BusOptions, OpenError, SpiHandle, DEFAULT_DEVICE};

/// Open a spidev device with default settings
pub fn open_device(path: &str) -> std::result::Result<SpiHandle<Spidev>, OpenError> {
    SpiHandle::open(path, Spidev::new())
}

/// Open a spidev device described by bus options
///
/// Uses [`DEFAULT_DEVICE`] when no device is given. Speed, mode and order
/// go through the handle's validated setters.
///
/// # Example Options
///
/// - `dev=/dev/spidev0.0` - device path
/// - `speed=1000000` or `spispeed=1000` - clock in Hz or kHz (default: 4 MHz)
/// - `mode=0` - SPI mode 0-3 (default: 0)
/// - `order=msb` - bit order, `msb` or `lsb` (default: msb)
pub fn open_with_options(
    options: &BusOptions,
) -> std::result::Result<SpiHandle<Spidev>, OpenError> {
    for (key, value) in &options.extra {
        log::warn!("linux_spi: Unknown option: {}={}", key, value);
    }

    let device = options
        .device
        .clone()
        .unwrap_or_else(|| DEFAULT_DEVICE.into());
    let spi = SpiHandle::open(&device, Spidev::new())?;
    options.apply(&spi);

    let settings = spi.settings();
    log::info!(
        "linux_spi: Opened {} (mode={}, order={}, speed={} kHz)",
        device.display(),
        settings.mode,
        settings.order,
        settings.speed / 1000
    );

    Ok(spi)
}
