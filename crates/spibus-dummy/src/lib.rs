//! spibus-dummy - Software-simulated SPI bus for testing
//!
//! This crate provides a backend that answers transfers from a fixed
//! response pattern instead of hardware. It records every transfer it sees
//! and can be told to fail, which makes it useful for testing code built on
//! [`SpiHandle`] without a device attached.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spibus_core::{
    transfer_override, BackendError, BusOptions, DeviceSettings, SpiBackend, SpiHandle,
    TransferConfig, TransferOverride,
};
use thiserror::Error;

/// Descriptor opened when no device is given
pub const DEFAULT_DUMMY_DEVICE: &str = "/dev/null";

/// Dummy bus errors
#[derive(Debug, Error)]
pub enum DummyError {
    /// Failure requested through [`DummyBus::fail_next`]
    #[error("Injected SPI fault")]
    InjectedFault,

    /// Transfer exceeds the configured limit
    #[error("Transfer of {len} bytes exceeds the limit of {max} bytes")]
    TransferTooLarge { len: usize, max: usize },

    /// Unknown or malformed option
    #[error("Invalid dummy option: {0}")]
    InvalidOption(String),
}

/// How the simulated peripheral answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pattern {
    /// Return the transmitted bytes (MOSI wired to MISO)
    #[default]
    Echo,
    /// Return the transmitted bytes in reverse order
    Reverse,
    /// Return zero bytes
    Zeros,
    /// Return a constant byte
    Fill(u8),
}

impl Pattern {
    /// Build the response for a transfer
    ///
    /// The response always has exactly `read_count` bytes; bytes beyond the
    /// transmitted data are zero for `Echo` and `Reverse`.
    pub fn respond(&self, data_in: &[u8], read_count: usize) -> Vec<u8> {
        let mut out = match self {
            Pattern::Echo => data_in.to_vec(),
            Pattern::Reverse => data_in.iter().rev().copied().collect(),
            Pattern::Zeros => Vec::new(),
            Pattern::Fill(byte) => vec![*byte; read_count],
        };
        out.resize(read_count, 0);
        out
    }
}

impl FromStr for Pattern {
    type Err = DummyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "echo" | "loopback" => Ok(Pattern::Echo),
            "reverse" => Ok(Pattern::Reverse),
            "zeros" => Ok(Pattern::Zeros),
            _ => {
                let hex = s
                    .strip_prefix("fill:")
                    .ok_or_else(|| DummyError::InvalidOption(format!("pattern={}", s)))?;
                let hex = hex.trim_start_matches("0x");
                u8::from_str_radix(hex, 16)
                    .map(Pattern::Fill)
                    .map_err(|_| DummyError::InvalidOption(format!("pattern={}", s)))
            }
        }
    }
}

/// Configuration for the dummy bus
#[derive(Debug, Clone, Default)]
pub struct DummyConfig {
    /// Response pattern
    pub pattern: Pattern,
    /// Largest frame accepted, unlimited if `None`
    pub max_transfer_len: Option<usize>,
}

impl DummyConfig {
    /// Read dummy specific options (`pattern`, `max`) from bus options
    pub fn from_options(options: &BusOptions) -> Result<Self, DummyError> {
        let mut config = Self::default();
        for (key, value) in &options.extra {
            match key.as_str() {
                "pattern" => config.pattern = value.parse()?,
                "max" => {
                    let max = value
                        .parse()
                        .map_err(|_| DummyError::InvalidOption(format!("max={}", value)))?;
                    config.max_transfer_len = Some(max);
                }
                _ => log::warn!("dummy: Unknown option: {}={}", key, value),
            }
        }
        Ok(config)
    }
}

/// Simulated SPI bus
///
/// Clones share the transfer log and fault counter, so a test can keep a
/// clone to inspect what the handle sent.
#[derive(Debug, Clone, Default)]
pub struct DummyBus {
    config: DummyConfig,
    log: Arc<Mutex<Vec<TransferConfig>>>,
    faults: Arc<AtomicUsize>,
}

impl DummyBus {
    /// Create a dummy bus with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create a dummy bus answering with `pattern`
    pub fn with_pattern(pattern: Pattern) -> Self {
        Self::new(DummyConfig {
            pattern,
            ..Default::default()
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn log(&self) -> MutexGuard<'_, Vec<TransferConfig>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All transfers seen so far, oldest first
    pub fn transfers(&self) -> Vec<TransferConfig> {
        self.log().clone()
    }

    /// Most recent transfer
    pub fn last_transfer(&self) -> Option<TransferConfig> {
        self.log().last().cloned()
    }

    /// Make the next `count` transfers fail
    pub fn fail_next(&self, count: usize) {
        self.faults.store(count, Ordering::SeqCst);
    }

    fn take_fault(&self) -> bool {
        self.faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn execute(&self, config: TransferConfig) -> Result<Option<Vec<u8>>, DummyError> {
        if let Some(max) = self.config.max_transfer_len {
            let len = config.frame_len();
            if len > max {
                return Err(DummyError::TransferTooLarge { len, max });
            }
        }

        let fault = self.take_fault();
        let out = (config.read_count > 0)
            .then(|| self.config.pattern.respond(&config.data_in, config.read_count));

        log::trace!(
            "dummy: mode={} order={} speed={} write={} read={}",
            config.mode,
            config.order,
            config.speed,
            config.data_in.len(),
            config.read_count
        );
        self.log().push(config);

        if fault {
            return Err(DummyError::InjectedFault);
        }
        Ok(out)
    }
}

impl SpiBackend for DummyBus {
    const SPI_SUPPORTED: bool = true;

    async fn transfer(&self, config: TransferConfig) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.execute(config)?)
    }

    /// Reports the settings of the last transfer, as the kernel would after
    /// applying them
    fn device_settings(&self, _fd: std::os::fd::RawFd) -> Result<DeviceSettings, BackendError> {
        Ok(match self.last_transfer() {
            Some(last) => DeviceSettings {
                mode: Some(u32::from(last.mode.bits())),
                order: Some(last.order.bits()),
                bits_per_word: Some(8),
                speed: Some(last.speed),
            },
            None => DeviceSettings::default(),
        })
    }
}

/// A transfer override answering from `pattern` without any backend
pub fn pattern_override(pattern: Pattern) -> TransferOverride {
    transfer_override(move |data, count| async move { Ok(pattern.respond(&data, count)) })
}

/// Open a dummy bus handle described by bus options
///
/// The handle still needs a descriptor; [`DEFAULT_DUMMY_DEVICE`] is opened
/// unless `dev` names another path.
pub fn open_dummy(options: &BusOptions) -> Result<SpiHandle<DummyBus>, Box<dyn std::error::Error>> {
    let config = DummyConfig::from_options(options)?;
    let device = options
        .device
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_DUMMY_DEVICE));
    let spi = SpiHandle::open(device, DummyBus::new(config))?;
    options.apply(&spi);
    log::info!(
        "dummy: Opened simulated bus on {} ({:?})",
        device.display(),
        spi.backend().config().pattern
    );
    Ok(spi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibus_core::{Error, Mode, Order};

    fn handle(bus: DummyBus) -> SpiHandle<DummyBus> {
        SpiHandle::from_fd(tempfile::tempfile().unwrap(), bus)
    }

    #[test]
    fn test_patterns() {
        assert_eq!(Pattern::Echo.respond(&[1, 2, 3], 2), vec![1, 2]);
        assert_eq!(Pattern::Echo.respond(&[1, 2], 4), vec![1, 2, 0, 0]);
        assert_eq!(Pattern::Reverse.respond(&[1, 2, 3], 3), vec![3, 2, 1]);
        assert_eq!(Pattern::Zeros.respond(&[1, 2, 3], 2), vec![0, 0]);
        assert_eq!(Pattern::Fill(0xA5).respond(&[], 3), vec![0xA5; 3]);
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!("reverse".parse::<Pattern>().unwrap(), Pattern::Reverse);
        assert_eq!("loopback".parse::<Pattern>().unwrap(), Pattern::Echo);
        assert_eq!("fill:ff".parse::<Pattern>().unwrap(), Pattern::Fill(0xFF));
        assert_eq!("fill:0x5a".parse::<Pattern>().unwrap(), Pattern::Fill(0x5A));
        assert!("fill:zz".parse::<Pattern>().is_err());
        assert!("noise".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_config_from_options() {
        let options =
            BusOptions::parse(&[("pattern", "zeros"), ("max", "64"), ("mode", "1")]).unwrap();
        let config = DummyConfig::from_options(&options).unwrap();
        assert_eq!(config.pattern, Pattern::Zeros);
        assert_eq!(config.max_transfer_len, Some(64));

        let options = BusOptions::parse(&[("max", "lots")]).unwrap();
        assert!(DummyConfig::from_options(&options).is_err());
    }

    #[tokio::test]
    async fn test_loopback_scenario() {
        let bus = DummyBus::with_pattern(Pattern::Reverse);
        let spi = handle(bus.clone());
        spi.set_speed(1_000_000).set_mode(Mode::M2);

        let out = spi.transfer(vec![0x01, 0x02], 2).await.unwrap();
        assert_eq!(out, vec![0x02, 0x01]);

        let last = bus.last_transfer().unwrap();
        assert_eq!(last.speed, 1_000_000);
        assert_eq!(last.mode, Mode::M2);
        assert_eq!(last.order, Order::MsbFirst);
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let bus = DummyBus::default();
        let spi = handle(bus.clone());
        spi.write(vec![0x06]).await.unwrap();
        let out = spi.read(3).await.unwrap();
        assert_eq!(out, vec![0, 0, 0]);

        let log = bus.transfers();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].read_count, 0);
        assert_eq!(log[1].data_in, Vec::<u8>::new());
        assert_eq!(log[1].read_count, 3);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let bus = DummyBus::default();
        let spi = handle(bus.clone());
        spi.set_mode(Mode::M1);
        bus.fail_next(1);

        let err = spi.transfer_full(vec![1, 2]).await.unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
        assert_eq!(err.to_string(), "Injected SPI fault");
        assert_eq!(spi.settings().mode, Mode::M1);

        assert_eq!(spi.transfer_full(vec![1, 2]).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_transfer_limit() {
        let bus = DummyBus::new(DummyConfig {
            pattern: Pattern::Echo,
            max_transfer_len: Some(4),
        });
        let spi = handle(bus.clone());
        assert!(spi.read(5).await.is_err());
        assert!(bus.transfers().is_empty());
        assert_eq!(spi.read(4).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_device_settings_follow_last_transfer() {
        let bus = DummyBus::default();
        let spi = handle(bus);
        assert_eq!(spi.device_settings().await.unwrap(), DeviceSettings::default());

        spi.set_mode(Mode::M3).set_order(Order::LsbFirst).set_speed(2_000_000);
        spi.read(1).await.unwrap();
        let reported = spi.device_settings().await.unwrap();
        assert_eq!(reported.mode, Some(3));
        assert_eq!(reported.order, Some(1));
        assert_eq!(reported.bits_per_word, Some(8));
        assert_eq!(reported.speed, Some(2_000_000));
    }

    #[tokio::test]
    async fn test_pattern_override_bypasses_bus() {
        let bus = DummyBus::with_pattern(Pattern::Zeros);
        let spi = handle(bus.clone());
        spi.set_transfer_override(Some(pattern_override(Pattern::Fill(0x42))));

        assert_eq!(spi.read(2).await.unwrap(), vec![0x42, 0x42]);
        assert!(bus.transfers().is_empty());

        spi.set_transfer_override(None);
        assert_eq!(spi.read(2).await.unwrap(), vec![0, 0]);
        assert_eq!(bus.transfers().len(), 1);
    }

    #[test]
    fn test_open_dummy_applies_options() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dev = file.path().to_str().unwrap();
        let options = BusOptions::parse(&[
            ("dev", dev),
            ("speed", "250000"),
            ("mode", "7"),
            ("pattern", "reverse"),
        ])
        .unwrap();
        let spi = open_dummy(&options).unwrap();
        assert_eq!(spi.settings().speed, 250_000);
        assert_eq!(spi.settings().mode, Mode::M0);
        assert_eq!(spi.backend().config().pattern, Pattern::Reverse);
    }
}
