//! Bus options
//!
//! Options come from backend strings of the form
//! `name:key1=value1,key2=value2` and, with the `config` feature, from a
//! TOML file:
//!
//! ```toml
//! [bus]
//! device = "/dev/spidev0.0"
//! speed = 1000000
//! mode = 2
//! order = "lsb"
//! ```
//!
//! Values are only parsed here, not range checked: they reach the handle
//! through its validated setters, which drop out of range values with a
//! warning.

use std::path::PathBuf;

use thiserror::Error;

use crate::handle::SpiHandle;
use crate::mode::Order;
use crate::transfer::SpiBackend;

/// Option parsing errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Option not in `key=value` form
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    InvalidFormat(String),

    /// Value could not be parsed
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Option key
        key: String,
        /// Offending value
        value: String,
    },

    /// Configuration file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML
    #[cfg(feature = "config")]
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Split a backend string into its name and `key=value` options
///
/// Format: `"name"` or `"name:key1=value1,key2=value2"`.
pub fn parse_backend_string(s: &str) -> Result<(&str, Vec<(&str, &str)>), ConfigError> {
    let (name, opts) = s.split_once(':').unwrap_or((s, ""));

    let mut options = Vec::new();
    for opt in opts.split(',').filter(|o| !o.is_empty()) {
        let (key, value) = opt
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidFormat(opt.to_string()))?;
        options.push((key.trim(), value.trim()));
    }

    Ok((name, options))
}

/// Parse a bit order value: `msb`, `lsb` or a raw integer
fn parse_order(value: &str) -> Option<i64> {
    match value.parse::<Order>() {
        Ok(order) => Some(order.into()),
        Err(_) => value.parse().ok(),
    }
}

/// Raw bus options, not yet validated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusOptions {
    /// Device path (e.g. "/dev/spidev0.0")
    pub device: Option<PathBuf>,
    /// Clock speed in Hz
    pub speed: Option<f64>,
    /// Raw clock mode
    pub mode: Option<i64>,
    /// Raw bit order
    pub order: Option<i64>,
    /// Options not understood here, left for the backend
    pub extra: Vec<(String, String)>,
}

impl BusOptions {
    /// Parse options from a list of key-value pairs
    ///
    /// Recognized keys: `dev`/`device`, `speed` (Hz), `spispeed` (kHz),
    /// `mode`, `order`.
    pub fn parse(options: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let mut parsed = Self::default();
        let invalid = |key: &str, value: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        for &(key, value) in options {
            match key {
                "dev" | "device" => parsed.device = Some(PathBuf::from(value)),
                "speed" => {
                    let hz: f64 = value.parse().map_err(|_| invalid(key, value))?;
                    parsed.speed = Some(hz);
                }
                "spispeed" => {
                    let khz: f64 = value.parse().map_err(|_| invalid(key, value))?;
                    parsed.speed = Some(khz * 1000.0);
                }
                "mode" => {
                    let mode: i64 = value.parse().map_err(|_| invalid(key, value))?;
                    parsed.mode = Some(mode);
                }
                "order" => {
                    parsed.order = Some(parse_order(value).ok_or_else(|| invalid(key, value))?);
                }
                _ => parsed.extra.push((key.to_string(), value.to_string())),
            }
        }

        Ok(parsed)
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(mut self, other: BusOptions) -> Self {
        self.device = other.device.or(self.device);
        self.speed = other.speed.or(self.speed);
        self.mode = other.mode.or(self.mode);
        self.order = other.order.or(self.order);
        self.extra.extend(other.extra);
        self
    }

    /// Value of a backend-specific option
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Apply the options to a handle through its validated setters
    pub fn apply<B: SpiBackend>(&self, handle: &SpiHandle<B>) {
        if let Some(speed) = self.speed {
            handle.set_speed(speed);
        }
        if let Some(mode) = self.mode {
            handle.set_mode(mode);
        }
        if let Some(order) = self.order {
            handle.set_order(order);
        }
    }
}

#[cfg(feature = "config")]
mod file {
    use std::fs;
    use std::path::{Path, PathBuf};

    use serde::Deserialize;

    use super::{parse_order, BusOptions, ConfigError};

    #[derive(Debug, Deserialize)]
    struct ConfigFile {
        bus: Option<BusSection>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct BusSection {
        device: Option<PathBuf>,
        speed: Option<f64>,
        mode: Option<i64>,
        #[serde(default, deserialize_with = "deserialize_order")]
        order: Option<i64>,
    }

    /// Deserialize a bit order given as a number or as "msb"/"lsb"
    fn deserialize_order<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OrderOrName {
            Int(i64),
            Str(String),
        }

        match Option::<OrderOrName>::deserialize(deserializer)? {
            None => Ok(None),
            Some(OrderOrName::Int(n)) => Ok(Some(n)),
            Some(OrderOrName::Str(s)) => parse_order(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid bit order: {}", s))),
        }
    }

    impl BusOptions {
        /// Load options from a TOML file
        pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let path = path.as_ref();
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            Self::from_toml_str(&content)
        }

        /// Parse options from a TOML string
        pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
            let file: ConfigFile = toml::from_str(content)?;
            let bus = match file.bus {
                Some(bus) => bus,
                None => return Ok(Self::default()),
            };
            Ok(Self {
                device: bus.device,
                speed: bus.speed,
                mode: bus.mode,
                order: bus.order,
                extra: Vec::new(),
            })
        }
    }
}
