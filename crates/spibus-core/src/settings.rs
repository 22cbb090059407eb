//! Per-handle settings store
//!
//! Holds the mode, bit order, clock speed and transfer strategy of one
//! handle. All mutation goes through the fluent setters, which run each
//! candidate through its [`Constraint`].

use crate::constraint::{is_positive, is_safe_integer, Constraint};
use crate::mode::{Mode, Order};
use crate::transfer::{TransferOverride, TransferStrategy};

/// Default SPI clock speed in Hz (4 MHz)
pub const DEFAULT_SPEED_HZ: u32 = 4_000_000;

/// Bus parameters applied to each transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Clock mode
    pub mode: Mode,
    /// Bit order
    pub order: Order,
    /// Clock speed in Hz
    pub speed: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::M0,
            order: Order::MsbFirst,
            speed: DEFAULT_SPEED_HZ,
        }
    }
}

fn speed_to_hz(speed: f64) -> Option<u32> {
    (speed <= f64::from(u32::MAX)).then_some(speed as u32)
}

fn is_mode(raw: &i64) -> bool {
    Mode::is_valid(*raw)
}

fn is_order(raw: &i64) -> bool {
    Order::is_valid(*raw)
}

static MODE: Constraint<i64, Mode> = Constraint::new("mode", &[is_mode], Mode::from_raw);
static ORDER: Constraint<i64, Order> = Constraint::new("order", &[is_order], Order::from_raw);
static SPEED: Constraint<f64, u32> =
    Constraint::new("speed", &[is_safe_integer, is_positive], speed_to_hz);

/// Settings plus transfer strategy for one handle
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    settings: Settings,
    strategy: TransferStrategy,
}

impl SettingsStore {
    /// Create a store with default settings and no override
    pub fn new() -> Self {
        Self::default()
    }

    /// Current settings
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Current transfer strategy
    pub fn strategy(&self) -> &TransferStrategy {
        &self.strategy
    }

    /// Set the clock mode
    ///
    /// Accepts a [`Mode`] or a raw mode number; values outside the four
    /// defined modes are dropped with a warning.
    pub fn set_mode(&mut self, mode: impl Into<i64>) -> &mut Self {
        self.try_set_mode(mode);
        self
    }

    /// Set the clock speed in Hz
    ///
    /// Zero, negative, fractional and out of range values are dropped with
    /// a warning.
    pub fn set_speed(&mut self, speed: impl Into<f64>) -> &mut Self {
        self.try_set_speed(speed);
        self
    }

    /// Set the bit order
    pub fn set_order(&mut self, order: impl Into<i64>) -> &mut Self {
        self.try_set_order(order);
        self
    }

    /// Install or remove a transfer override
    ///
    /// Any `Option<TransferOverride>` is a legal value, so this never rejects.
    pub fn set_transfer_override(&mut self, f: Option<TransferOverride>) -> &mut Self {
        self.strategy = TransferStrategy::from(f);
        self
    }

    /// Like [`set_mode`](Self::set_mode), but reports whether the value was accepted
    pub fn try_set_mode(&mut self, mode: impl Into<i64>) -> bool {
        MODE.apply(&mut self.settings.mode, mode.into())
    }

    /// Like [`set_speed`](Self::set_speed), but reports whether the value was accepted
    pub fn try_set_speed(&mut self, speed: impl Into<f64>) -> bool {
        SPEED.apply(&mut self.settings.speed, speed.into())
    }

    /// Like [`set_order`](Self::set_order), but reports whether the value was accepted
    pub fn try_set_order(&mut self, order: impl Into<i64>) -> bool {
        ORDER.apply(&mut self.settings.order, order.into())
    }
}
