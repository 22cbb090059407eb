//! CLI argument parsing

use crate::registry;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bytes given on the command line as hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse hex bytes: "9f000000", "9f 00 00", "0x9f,0x00"
pub fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    let mut bytes = Vec::new();
    for token in s.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let hex = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if hex.len() % 2 != 0 {
            return Err(format!("Odd number of hex digits in '{}'", token));
        }
        for i in (0..hex.len()).step_by(2) {
            let byte = hex
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("Invalid hex value: {}", token))?;
            bytes.push(byte);
        }
    }
    Ok(HexBytes(bytes))
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use, with options [available: {}]",
        registry::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "spibus")]
#[command(author, version, about = "SPI bus transfer tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Bus configuration file (TOML, [bus] table); backend options override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full-duplex transfer: write bytes and read a reply
    Transfer {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Bytes to send, in hex (e.g. "9f000000")
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,

        /// Number of bytes to read back (default: as many as sent)
        #[arg(short = 'n', long)]
        read: Option<usize>,
    },

    /// Write bytes, discarding any reply
    Write {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Bytes to send, in hex
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Read bytes without sending data
    Read {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Number of bytes to read
        count: usize,
    },

    /// Show configured and device-reported bus settings
    Info {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// List available backends
    ListBackends,
}
