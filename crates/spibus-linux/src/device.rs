//! Linux spidev backend
//!
//! Each transfer sets the mode and bit order on the descriptor, then issues
//! a single full-duplex `SPI_IOC_MESSAGE(1)` over one buffer. The ioctls
//! block, so they run on tokio's blocking pool.

use crate::error::{Result, SpidevError};

use spibus_core::{BackendError, DeviceSettings, SpiBackend, TransferConfig};

use std::os::fd::RawFd;

/// Whether this build can talk to spidev
pub const SPI_SUPPORTED: bool = cfg!(target_os = "linux");

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Linux spidev ioctl constants
#[cfg(target_os = "linux")]
mod ioctl {
    use nix::ioctl_read;
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    pub const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_LSB_FIRST: u8 = 2;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;
    const SPI_IOC_TYPE_MODE32: u8 = 5;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_read!(
        spi_ioc_rd_lsb_first,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_LSB_FIRST,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_lsb_first,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_LSB_FIRST,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_read!(spi_ioc_rd_mode32, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE32, u32);

    /// ioctl number for SPI_IOC_MESSAGE(n)
    ///
    /// SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])
    pub fn spi_ioc_message(n: usize) -> nix::sys::ioctl::ioctl_num_type {
        nix::request_code_write!(
            SPI_IOC_MAGIC,
            0,
            n * core::mem::size_of::<super::SpiIocTransfer>()
        )
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

/// Transmit buffer for a transfer: the input, zero padded to the frame length
fn frame_buffer(config: &TransferConfig) -> Vec<u8> {
    let mut buf = config.data_in.clone();
    buf.resize(config.frame_len(), 0);
    buf
}

/// Trim the received frame to what the caller asked for
fn finish_frame(mut buf: Vec<u8>, read_count: usize) -> Option<Vec<u8>> {
    if read_count == 0 {
        return None;
    }
    buf.truncate(read_count);
    Some(buf)
}

/// Linux spidev transfer backend
///
/// Stateless apart from the kernel buffer limit: everything else arrives
/// with each [`TransferConfig`].
#[derive(Debug, Clone)]
pub struct Spidev {
    /// Maximum kernel buffer size
    max_transfer_len: usize,
}

impl Default for Spidev {
    fn default() -> Self {
        Self::new()
    }
}

impl Spidev {
    /// Create a backend, reading the kernel buffer limit from sysfs
    pub fn new() -> Self {
        let max_transfer_len = get_max_kernel_buf_size();
        log::debug!(
            "linux_spi: Max kernel buffer size: {} bytes",
            max_transfer_len
        );
        Self { max_transfer_len }
    }

    /// Create a backend with an explicit transfer size limit
    pub fn with_max_transfer_len(max_transfer_len: usize) -> Self {
        Self { max_transfer_len }
    }

    /// Largest frame a single transfer may clock
    pub fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    fn check_len(&self, config: &TransferConfig) -> Result<()> {
        let len = config.frame_len();
        if len > self.max_transfer_len {
            return Err(SpidevError::TransferTooLarge {
                len,
                max: self.max_transfer_len,
            });
        }
        Ok(())
    }
}

/// Perform one transfer synchronously
#[cfg(target_os = "linux")]
fn transfer_blocking(config: &TransferConfig) -> Result<Option<Vec<u8>>> {
    let fd = config.fd;

    if config.frame_len() == 0 {
        return Ok(None);
    }

    let mode = config.mode.bits();
    unsafe {
        ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| SpidevError::SetModeFailed {
            mode,
            source: e.into(),
        })?;
    }

    let order = config.order.bits();
    unsafe {
        ioctl::spi_ioc_wr_lsb_first(fd, &order).map_err(|e| SpidevError::SetOrderFailed {
            order,
            source: e.into(),
        })?;
    }

    // Full duplex over a single buffer: received bytes overwrite the sent ones
    let mut buf = frame_buffer(config);
    let transfer = SpiIocTransfer {
        tx_buf: buf.as_ptr() as u64,
        rx_buf: buf.as_mut_ptr() as u64,
        len: buf.len() as u32,
        speed_hz: config.speed,
        bits_per_word: 8,
        ..Default::default()
    };

    let request = ioctl::spi_ioc_message(1);
    let ret = unsafe { libc::ioctl(fd, request as _, &transfer as *const SpiIocTransfer) };
    if ret < 0 {
        return Err(SpidevError::TransferFailed(std::io::Error::last_os_error()));
    }

    log::trace!(
        "linux_spi: fd {} clocked {} bytes at {} Hz",
        fd,
        transfer.len,
        transfer.speed_hz
    );

    Ok(finish_frame(buf, config.read_count))
}

#[cfg(not(target_os = "linux"))]
fn transfer_blocking(_config: &TransferConfig) -> Result<Option<Vec<u8>>> {
    Err(SpidevError::Unsupported)
}

/// Read the settings the kernel reports for `fd`
///
/// Settings the kernel refuses to report are left as `None`.
#[cfg(target_os = "linux")]
fn read_device_settings(fd: RawFd) -> DeviceSettings {
    let mut mode: u32 = 0;
    let mut order: u8 = 0;
    let mut bits: u8 = 0;
    let mut speed: u32 = 0;

    unsafe {
        DeviceSettings {
            mode: ioctl::spi_ioc_rd_mode32(fd, &mut mode).ok().map(|_| mode),
            order: ioctl::spi_ioc_rd_lsb_first(fd, &mut order)
                .ok()
                .map(|_| order),
            bits_per_word: ioctl::spi_ioc_rd_bits_per_word(fd, &mut bits)
                .ok()
                .map(|_| bits),
            speed: ioctl::spi_ioc_rd_max_speed_hz(fd, &mut speed)
                .ok()
                .map(|_| speed),
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_device_settings(_fd: RawFd) -> DeviceSettings {
    DeviceSettings::default()
}

impl SpiBackend for Spidev {
    const SPI_SUPPORTED: bool = SPI_SUPPORTED;

    async fn transfer(
        &self,
        config: TransferConfig,
    ) -> std::result::Result<Option<Vec<u8>>, BackendError> {
        self.check_len(&config)?;
        let out = tokio::task::spawn_blocking(move || transfer_blocking(&config))
            .await
            .map_err(SpidevError::from)??;
        Ok(out)
    }

    fn device_settings(&self, fd: RawFd) -> std::result::Result<DeviceSettings, BackendError> {
        Ok(read_device_settings(fd))
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("linux_spi: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("linux_spi: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}
