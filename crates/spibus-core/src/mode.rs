//! SPI clock modes and bit orders
//!
//! Both are closed enumerations. Raw integer values are only accepted
//! through [`Mode::from_raw`] and [`Order::from_raw`], so a `Mode` or
//! `Order` value is always one of the defined variants.

use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Clock phase and polarity flags
    ///
    /// Bit values match the Linux `SPI_CPHA` / `SPI_CPOL` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        /// Clock phase: sample on the trailing edge
        const CPHA = 0x01;
        /// Clock polarity: clock idles high
        const CPOL = 0x02;
    }
}

/// SPI clock mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    #[default]
    M0 = 0,
    /// Mode 1: CPOL=0, CPHA=1
    M1 = ModeFlags::CPHA.bits(),
    /// Mode 2: CPOL=1, CPHA=0
    M2 = ModeFlags::CPOL.bits(),
    /// Mode 3: CPOL=1, CPHA=1
    M3 = ModeFlags::CPOL.bits() | ModeFlags::CPHA.bits(),
}

impl Mode {
    /// All four modes, in numeric order
    pub const ALL: [Mode; 4] = [Mode::M0, Mode::M1, Mode::M2, Mode::M3];

    /// Returns true if `raw` is one of the four defined modes
    pub fn is_valid(raw: i64) -> bool {
        Self::from_raw(raw).is_some()
    }

    /// Convert a raw mode number
    pub fn from_raw(raw: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| i64::from(*m as u8) == raw)
    }

    /// Build a mode from its clock flags
    pub fn from_flags(flags: ModeFlags) -> Self {
        match (flags.contains(ModeFlags::CPOL), flags.contains(ModeFlags::CPHA)) {
            (false, false) => Mode::M0,
            (false, true) => Mode::M1,
            (true, false) => Mode::M2,
            (true, true) => Mode::M3,
        }
    }

    /// Clock flags making up this mode
    pub const fn flags(self) -> ModeFlags {
        ModeFlags::from_bits_truncate(self as u8)
    }

    /// Raw value as passed to `SPI_IOC_WR_MODE`
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Clock polarity
    pub const fn cpol(self) -> bool {
        self.flags().contains(ModeFlags::CPOL)
    }

    /// Clock phase
    pub const fn cpha(self) -> bool {
        self.flags().contains(ModeFlags::CPHA)
    }
}

impl From<Mode> for i64 {
    fn from(mode: Mode) -> Self {
        i64::from(mode.bits())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid SPI mode: {}", s))?;
        Self::from_raw(raw).ok_or_else(|| format!("Invalid SPI mode: {} (must be 0-3)", s))
    }
}

/// Bit order on the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Order {
    /// Most significant bit first
    #[default]
    MsbFirst = 0,
    /// Least significant bit first
    LsbFirst = 1,
}

impl Order {
    /// Returns true if `raw` is a defined bit order
    pub fn is_valid(raw: i64) -> bool {
        Self::from_raw(raw).is_some()
    }

    /// Convert a raw order value (0 = MSB first, 1 = LSB first)
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Order::MsbFirst),
            1 => Some(Order::LsbFirst),
            _ => None,
        }
    }

    /// Raw value as passed to `SPI_IOC_WR_LSB_FIRST`
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl From<Order> for i64 {
    fn from(order: Order) -> Self {
        i64::from(order.bits())
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::MsbFirst => write!(f, "msb"),
            Order::LsbFirst => write!(f, "lsb"),
        }
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "msb" | "msb-first" | "msb_first" | "0" => Ok(Order::MsbFirst),
            "lsb" | "lsb-first" | "lsb_first" | "1" => Ok(Order::LsbFirst),
            _ => Err(format!("Invalid bit order: {} (expected msb or lsb)", s)),
        }
    }
}
