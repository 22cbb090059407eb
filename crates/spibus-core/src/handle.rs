//! SPI bus handle
//!
//! A [`SpiHandle`] owns one open bus device, its settings store and the
//! backend that performs transfers on it.
//!
//! Transfers on one handle are single-flight: the descriptor sits behind an
//! async mutex, so overlapping calls queue up and reach the backend one at a
//! time. Settings are sampled when a transfer reaches the front of the
//! queue, not when it was issued.
//!
//! Each transfer runs on its own tokio task which owns the descriptor lock,
//! so dropping the caller's future (a timeout, a lost `select!` branch) does
//! not let the next transfer or [`SpiHandle::close`] in before the backend
//! has finished.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, OpenError, Result};
use crate::settings::{Settings, SettingsStore};
use crate::transfer::{
    DeviceSettings, SpiBackend, TransferConfig, TransferOverride, TransferStrategy,
};

/// Device opened by [`SpiHandle::open_default`]
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";

/// Handle to one SPI bus device
pub struct SpiHandle<B> {
    backend: Arc<B>,
    /// `None` once closed
    fd: Arc<tokio::sync::Mutex<Option<OwnedFd>>>,
    store: Mutex<SettingsStore>,
}

impl<B: SpiBackend> SpiHandle<B> {
    /// Open a bus device for read-write access
    pub fn open(path: impl AsRef<Path>, backend: B) -> std::result::Result<Self, OpenError> {
        let path = path.as_ref();
        log::debug!("spibus: Opening device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| OpenError {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Self::from_fd(file, backend))
    }

    /// Open [`DEFAULT_DEVICE`]
    pub fn open_default(backend: B) -> std::result::Result<Self, OpenError> {
        Self::open(DEFAULT_DEVICE, backend)
    }

    /// Adopt an already open descriptor
    ///
    /// No syscall is made; the handle takes ownership of `fd` and closes it
    /// on [`close`](Self::close) or drop.
    pub fn from_fd(fd: impl Into<OwnedFd>, backend: B) -> Self {
        let fd = fd.into();
        log::debug!("spibus: Adopted fd {}", fd.as_raw_fd());
        Self {
            backend: Arc::new(backend),
            fd: Arc::new(tokio::sync::Mutex::new(Some(fd))),
            store: Mutex::new(SettingsStore::new()),
        }
    }

    /// Whether the backend supports SPI on this platform
    pub fn spi_supported() -> bool {
        B::SPI_SUPPORTED
    }

    /// The backend performing transfers
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn store(&self) -> MutexGuard<'_, SettingsStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Settings {
        self.store().settings()
    }

    /// Returns true if a transfer override is installed
    pub fn has_transfer_override(&self) -> bool {
        self.store().strategy().is_override()
    }

    /// Set the clock mode; invalid values are dropped with a warning
    pub fn set_mode(&self, mode: impl Into<i64>) -> &Self {
        self.store().set_mode(mode);
        self
    }

    /// Set the clock speed in Hz; invalid values are dropped with a warning
    pub fn set_speed(&self, speed: impl Into<f64>) -> &Self {
        self.store().set_speed(speed);
        self
    }

    /// Set the bit order; invalid values are dropped with a warning
    pub fn set_order(&self, order: impl Into<i64>) -> &Self {
        self.store().set_order(order);
        self
    }

    /// Install (`Some`) or remove (`None`) a transfer override
    pub fn set_transfer_override(&self, f: Option<TransferOverride>) -> &Self {
        self.store().set_transfer_override(f);
        self
    }

    /// Clock out `data` and read back `read_count` bytes
    ///
    /// Must be called from within a tokio runtime.
    pub async fn transfer(&self, data: impl Into<Vec<u8>>, read_count: usize) -> Result<Vec<u8>> {
        let data_in = data.into();

        let guard = self.fd.clone().lock_owned().await;
        let fd = guard.as_ref().ok_or(Error::Closed)?.as_raw_fd();

        let (settings, strategy) = {
            let store = self.store();
            (store.settings(), store.strategy().clone())
        };

        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move {
            // Held until the exchange is over, even if the caller went away
            let _guard = guard;
            dispatch(&*backend, strategy, settings, fd, data_in, read_count).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::Transfer(Box::new(e))),
        }
    }

    /// Full-duplex transfer reading back as many bytes as are written
    pub async fn transfer_full(&self, data: impl Into<Vec<u8>>) -> Result<Vec<u8>> {
        let data = data.into();
        let len = data.len();
        self.transfer(data, len).await
    }

    /// Write-only transfer
    pub async fn write(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.transfer(data, 0).await.map(|_| ())
    }

    /// Read-only transfer of `count` bytes
    pub async fn read(&self, count: usize) -> Result<Vec<u8>> {
        self.transfer(Vec::new(), count).await
    }

    /// Settings the device currently reports
    pub async fn device_settings(&self) -> Result<DeviceSettings> {
        let guard = self.fd.lock().await;
        let fd = guard.as_ref().ok_or(Error::Closed)?.as_raw_fd();
        self.backend.device_settings(fd).map_err(Error::Query)
    }

    /// Raw descriptor, for callers issuing their own platform calls
    pub async fn raw_fd(&self) -> Result<RawFd> {
        let guard = self.fd.lock().await;
        guard.as_ref().map(AsRawFd::as_raw_fd).ok_or(Error::Closed)
    }

    /// Close the device
    ///
    /// Waits for an in-flight transfer to finish. Fails with
    /// [`Error::Closed`] if the handle was already closed.
    pub async fn close(&self) -> Result<()> {
        let fd = self.fd.lock().await.take().ok_or(Error::Closed)?;
        log::debug!("spibus: Closing fd {}", fd.as_raw_fd());
        drop(fd);
        Ok(())
    }
}

async fn dispatch<B: SpiBackend>(
    backend: &B,
    strategy: TransferStrategy,
    settings: Settings,
    fd: RawFd,
    data_in: Vec<u8>,
    read_count: usize,
) -> Result<Vec<u8>> {
    match strategy {
        TransferStrategy::UseOverride(f) => {
            log::trace!(
                "spibus: override transfer on fd {} (write={}, read={})",
                fd,
                data_in.len(),
                read_count
            );
            f(data_in, read_count).await.map_err(Error::Transfer)
        }
        TransferStrategy::UseBackend => {
            let config = TransferConfig {
                fd,
                speed: settings.speed,
                mode: settings.mode,
                order: settings.order,
                data_in,
                read_count,
            };
            log::trace!(
                "spibus: transfer on fd {} (mode={}, order={}, speed={} Hz, write={}, read={})",
                fd,
                config.mode,
                config.order,
                config.speed,
                config.data_in.len(),
                config.read_count
            );
            let out = backend.transfer(config).await.map_err(Error::Transfer)?;
            Ok(out.unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::mode::{Mode, Order};
    use crate::transfer::transfer_override;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Copy, Default)]
    enum Reply {
        /// `read_count` zero bytes, `None` for pure writes
        #[default]
        Zeros,
        /// Input reversed, resized to `read_count`
        Reversed,
    }

    #[derive(Clone, Default)]
    struct StubBackend {
        reply: Reply,
        calls: Arc<Mutex<Vec<TransferConfig>>>,
        fail: Arc<AtomicBool>,
        delay: Option<Duration>,
        /// Sleep on the blocking pool, like an ioctl would
        blocking: bool,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl StubBackend {
        fn reversed() -> Self {
            Self {
                reply: Reply::Reversed,
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn blocking(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                blocking: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<TransferConfig> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SpiBackend for StubBackend {
        const SPI_SUPPORTED: bool = true;

        async fn transfer(
            &self,
            config: TransferConfig,
        ) -> std::result::Result<Option<Vec<u8>>, BackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            match self.delay {
                Some(delay) if self.blocking => {
                    tokio::task::spawn_blocking(move || std::thread::sleep(delay))
                        .await
                        .unwrap();
                }
                Some(delay) => tokio::time::sleep(delay).await,
                None => {}
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.calls.lock().unwrap().push(config.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err("bus fault".into());
            }
            if config.read_count == 0 {
                return Ok(None);
            }
            let out = match self.reply {
                Reply::Zeros => vec![0; config.read_count],
                Reply::Reversed => {
                    let mut out: Vec<u8> = config.data_in.iter().rev().copied().collect();
                    out.resize(config.read_count, 0);
                    out
                }
            };
            Ok(Some(out))
        }
    }

    fn handle(backend: StubBackend) -> SpiHandle<StubBackend> {
        SpiHandle::from_fd(tempfile::tempfile().unwrap(), backend)
    }

    #[test]
    fn test_open_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let spi = SpiHandle::open(file.path(), StubBackend::default()).unwrap();
        assert_eq!(spi.settings(), Settings::default());
    }

    #[test]
    fn test_open_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spidev9.9");
        let err = SpiHandle::open(&path, StubBackend::default())
            .err()
            .expect("open should fail");
        assert_eq!(err.path, path);
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_spi_supported() {
        assert!(SpiHandle::<StubBackend>::spi_supported());
    }

    #[test]
    fn test_fluent_setters() {
        let spi = handle(StubBackend::default());
        spi.set_speed(1_000_000)
            .set_mode(Mode::M2)
            .set_order(Order::LsbFirst)
            .set_mode(7)
            .set_speed(3.5);
        assert_eq!(
            spi.settings(),
            Settings {
                mode: Mode::M2,
                order: Order::LsbFirst,
                speed: 1_000_000,
            }
        );
    }

    #[tokio::test]
    async fn test_read_returns_requested_length() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        let out = spi.read(5).await.unwrap();
        assert_eq!(out, vec![0; 5]);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].data_in.is_empty());
        assert_eq!(calls[0].read_count, 5);
    }

    #[tokio::test]
    async fn test_write_passes_zero_read_count() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        spi.write(vec![0xAA, 0xBB]).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].data_in, vec![0xAA, 0xBB]);
        assert_eq!(calls[0].read_count, 0);
    }

    #[tokio::test]
    async fn test_no_output_resolves_empty() {
        let spi = handle(StubBackend::default());
        let out = spi.transfer(vec![1, 2, 3], 0).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_config_carries_settings() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        let fd = spi.raw_fd().await.unwrap();
        spi.set_speed(250_000).set_mode(Mode::M1).set_order(Order::LsbFirst);
        spi.transfer_full(vec![1, 2]).await.unwrap();

        let config = &backend.calls()[0];
        assert_eq!(config.fd, fd);
        assert_eq!(config.speed, 250_000);
        assert_eq!(config.mode, Mode::M1);
        assert_eq!(config.order, Order::LsbFirst);
        assert_eq!(config.read_count, 2);
    }

    #[tokio::test]
    async fn test_override_replaces_backend() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        let seen = Arc::new(Mutex::new(None));
        let seen_in = seen.clone();
        spi.set_transfer_override(Some(transfer_override(move |data, count| {
            *seen_in.lock().unwrap() = Some((data, count));
            async move { Ok(vec![0x5A; 3]) }
        })));

        let out = spi.transfer(vec![1, 2], 7).await.unwrap();
        assert_eq!(out, vec![0x5A; 3]);
        assert_eq!(*seen.lock().unwrap(), Some((vec![1, 2], 7)));
        assert!(backend.calls().is_empty());

        spi.set_transfer_override(None);
        let out = spi.transfer(vec![1, 2], 2).await.unwrap();
        assert_eq!(out, vec![0, 0]);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_override_error_propagates() {
        let spi = handle(StubBackend::default());
        spi.set_transfer_override(Some(transfer_override(|_, _| async move {
            Err::<Vec<u8>, BackendError>("simulated bus stuck".into())
        })));
        let err = spi.read(1).await.unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
        assert_eq!(err.to_string(), "simulated bus stuck");
    }

    #[tokio::test]
    async fn test_backend_error_keeps_handle_usable() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        spi.set_speed(1_000_000).set_mode(Mode::M3);

        backend.fail.store(true, Ordering::SeqCst);
        let err = spi.transfer(vec![1], 1).await.unwrap_err();
        assert!(matches!(err, Error::Transfer(_)));
        assert_eq!(err.to_string(), "bus fault");
        assert_eq!(spi.settings().speed, 1_000_000);
        assert_eq!(spi.settings().mode, Mode::M3);

        backend.fail.store(false, Ordering::SeqCst);
        assert_eq!(spi.transfer(vec![1], 1).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_loopback_scenario() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let spi = SpiHandle::open(file.path(), StubBackend::reversed()).unwrap();
        spi.set_speed(1_000_000).set_mode(Mode::M2);
        let out = spi.transfer(vec![0x01, 0x02], 2).await.unwrap();
        assert_eq!(out, vec![0x02, 0x01]);
    }

    #[tokio::test]
    async fn test_close_twice() {
        let spi = handle(StubBackend::default());
        spi.close().await.unwrap();
        assert!(matches!(spi.close().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_transfer_after_close() {
        let backend = StubBackend::default();
        let spi = handle(backend.clone());
        spi.close().await.unwrap();
        assert!(matches!(spi.read(4).await, Err(Error::Closed)));
        assert!(matches!(spi.write(vec![1]).await, Err(Error::Closed)));
        assert!(matches!(spi.raw_fd().await, Err(Error::Closed)));
        assert!(matches!(spi.device_settings().await, Err(Error::Closed)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_settings_default() {
        let spi = handle(StubBackend::default());
        assert_eq!(spi.device_settings().await.unwrap(), DeviceSettings::default());
    }

    #[tokio::test]
    async fn test_transfers_are_serialized() {
        let backend = StubBackend::slow(Duration::from_millis(20));
        let spi = handle(backend.clone());
        let (a, b, c) = tokio::join!(spi.read(1), spi.read(2), spi.read(3));
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(c.unwrap().len(), 3);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);

        let counts: Vec<usize> = backend.calls().iter().map(|c| c.read_count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_settings_sampled_at_dispatch() {
        let backend = StubBackend::slow(Duration::from_millis(20));
        let spi = handle(backend.clone());
        let (first, second) = tokio::join!(spi.read(1), async {
            spi.set_mode(Mode::M3);
            spi.read(1).await
        });
        first.unwrap();
        second.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].mode, Mode::M0);
        assert_eq!(calls[1].mode, Mode::M3);
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_transfer() {
        let backend = StubBackend::slow(Duration::from_millis(20));
        let spi = handle(backend.clone());
        let (out, closed) = tokio::join!(spi.read(2), spi.close());
        assert_eq!(out.unwrap(), vec![0, 0]);
        closed.unwrap();
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_transfer_keeps_queue() {
        let backend = StubBackend::blocking(Duration::from_millis(100));
        let spi = handle(backend.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(10), spi.read(1)).await;
        assert!(cancelled.is_err());

        assert_eq!(spi.read(2).await.unwrap(), vec![0, 0]);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);

        let counts: Vec<usize> = backend.calls().iter().map(|c| c.read_count).collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_close_waits_for_cancelled_transfer() {
        let backend = StubBackend::blocking(Duration::from_millis(100));
        let spi = handle(backend.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(10), spi.write(vec![1])).await;
        assert!(cancelled.is_err());

        spi.close().await.unwrap();
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(backend.calls().len(), 1);
        assert!(matches!(spi.read(1).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_cancelled_override_keeps_queue() {
        let spi = handle(StubBackend::default());
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let (running_in, max_in) = (running.clone(), max_running.clone());
        spi.set_transfer_override(Some(transfer_override(move |_, count| {
            let (running, max_running) = (running_in.clone(), max_in.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(vec![0xFF; count])
            }
        })));

        assert!(tokio::time::timeout(Duration::from_millis(5), spi.read(1))
            .await
            .is_err());
        assert_eq!(spi.read(3).await.unwrap(), vec![0xFF; 3]);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }
}
