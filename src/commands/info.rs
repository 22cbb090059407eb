//! Info command implementation

use spibus_core::{SpiBackend, SpiHandle};

/// Print the configured settings and what the device reports
pub async fn run_info<B: SpiBackend>(spi: &SpiHandle<B>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = spi.settings();
    let fd = spi.raw_fd().await?;

    println!("Bus Information:");
    println!("  SPI supported: {}", SpiHandle::<B>::spi_supported());
    println!("  Descriptor:    {}", fd);
    println!();
    println!("Configured:");
    println!(
        "  Mode:          {} (CPOL={}, CPHA={})",
        settings.mode,
        u8::from(settings.mode.cpol()),
        u8::from(settings.mode.cpha())
    );
    println!("  Bit order:     {}", settings.order);
    println!("  Speed:         {} Hz", settings.speed);

    let reported = spi.device_settings().await?;
    println!();
    println!("Reported by device:");
    println!("  Mode:          {}", fmt_opt(reported.mode.map(|m| format!("0x{:X}", m))));
    println!("  Bit order:     {}", fmt_opt(reported.order));
    println!("  Bits per word: {}", fmt_opt(reported.bits_per_word));
    println!("  Max speed:     {}", fmt_opt(reported.speed.map(|s| format!("{} Hz", s))));

    Ok(())
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
