//! Transfer, read and write commands

use spibus_core::{SpiBackend, SpiHandle};

/// Format bytes as space separated hex, 16 per line
fn format_hex(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write `data` and print `read` reply bytes (default: `data.len()`)
pub async fn run_transfer<B: SpiBackend>(
    spi: &SpiHandle<B>,
    data: &[u8],
    read: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let read = read.unwrap_or(data.len());
    log::info!("Transferring {} bytes, reading {}", data.len(), read);

    let reply = spi.transfer(data, read).await?;
    if !reply.is_empty() {
        println!("{}", format_hex(&reply));
    }
    Ok(())
}

/// Write `data` without reading
pub async fn run_write<B: SpiBackend>(
    spi: &SpiHandle<B>,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Writing {} bytes", data.len());
    spi.write(data).await?;
    Ok(())
}

/// Read and print `count` bytes
pub async fn run_read<B: SpiBackend>(
    spi: &SpiHandle<B>,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Reading {} bytes", count);
    let reply = spi.read(count).await?;
    println!("{}", format_hex(&reply));
    Ok(())
}
