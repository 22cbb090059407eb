//! spibus - SPI bus transfer tool
//!
//! Opens an SPI bus through one of the compiled-in backends, applies the
//! requested clock mode, bit order and speed, and performs a single
//! transfer, write or read.
//!
//! # Backends
//!
//! - **linux_spi** - `/dev/spidevX.Y` through the kernel spidev interface
//! - **dummy** - simulated bus answering from a fixed pattern, for dry runs

#[macro_use]
mod backends;
mod cli;
mod commands;
mod registry;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Transfer {
            backend,
            data,
            read,
        } => {
            let bus = backends::open_bus(&backend, config)?;
            with_bus!(bus, |spi| {
                commands::run_transfer(&spi, &data.0, read).await?;
                spi.close().await?;
            })
        }
        Commands::Write { backend, data } => {
            let bus = backends::open_bus(&backend, config)?;
            with_bus!(bus, |spi| {
                commands::run_write(&spi, &data.0).await?;
                spi.close().await?;
            })
        }
        Commands::Read { backend, count } => {
            let bus = backends::open_bus(&backend, config)?;
            with_bus!(bus, |spi| {
                commands::run_read(&spi, count).await?;
                spi.close().await?;
            })
        }
        Commands::Info { backend } => {
            let bus = backends::open_bus(&backend, config)?;
            with_bus!(bus, |spi| {
                commands::run_info(&spi).await?;
                spi.close().await?;
            })
        }
        Commands::ListBackends => commands::list_backends(),
    }

    Ok(())
}
