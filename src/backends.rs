//! Backend dispatch
//!
//! Opens the backend named on the command line and wraps its handle in a
//! [`Bus`], so commands can be written once and run against any backend.

use crate::registry::backend_help;
use spibus_core::{parse_backend_string, BusOptions, SpiHandle};
use std::path::Path;

#[cfg(feature = "dummy")]
use spibus_dummy::DummyBus;
#[cfg(feature = "linux-spi")]
use spibus_linux::Spidev;

/// An open bus, one variant per compiled-in backend
pub enum Bus {
    /// Simulated bus
    #[cfg(feature = "dummy")]
    Dummy(SpiHandle<DummyBus>),
    /// Linux spidev
    #[cfg(feature = "linux-spi")]
    Linux(SpiHandle<Spidev>),
}

/// Run `$body` with `$spi` bound to the handle inside a [`Bus`]
macro_rules! with_bus {
    ($bus:expr, |$spi:ident| $body:expr) => {
        match $bus {
            #[cfg(feature = "dummy")]
            $crate::backends::Bus::Dummy($spi) => $body,
            #[cfg(feature = "linux-spi")]
            $crate::backends::Bus::Linux($spi) => $body,
        }
    };
}

/// Open a bus from a backend string and an optional configuration file
///
/// Options in the backend string override those from the file.
pub fn open_bus(backend: &str, config: Option<&Path>) -> Result<Bus, Box<dyn std::error::Error>> {
    let (name, opts) = parse_backend_string(backend)?;

    let mut options = match config {
        Some(path) => {
            log::debug!("Loading bus configuration from {}", path.display());
            BusOptions::from_toml_file(path)?
        }
        None => BusOptions::default(),
    };
    options = options.merge(BusOptions::parse(&opts)?);

    match name {
        #[cfg(feature = "dummy")]
        "dummy" => Ok(Bus::Dummy(spibus_dummy::open_dummy(&options)?)),

        #[cfg(feature = "linux-spi")]
        "linux_spi" | "linux-spi" | "spidev" => {
            if !spibus_linux::SPI_SUPPORTED {
                log::warn!("linux_spi: This platform has no spidev support, transfers will fail");
            }
            Ok(Bus::Linux(spibus_linux::open_with_options(&options)?))
        }

        _ => Err(unknown_backend_error(name)),
    }
}

fn unknown_backend_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown backend: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.push_str("\nUse 'spibus list-backends' for more details");
    msg.into()
}
