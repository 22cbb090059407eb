//! Validation gate for configurable fields
//!
//! Every assignment of a configurable setting goes through a [`Constraint`].
//! A rejected candidate is not an error: the previous value stays in place
//! and a warning is logged naming the field and the rejected value.

use core::fmt;

/// Predicate over a candidate value
pub type Predicate<C> = fn(&C) -> bool;

/// Validation rule for one field
///
/// `C` is the type callers hand in (possibly out of range), `T` the type
/// stored once the candidate is accepted.
pub struct Constraint<C: 'static, T> {
    field: &'static str,
    predicates: &'static [Predicate<C>],
    convert: fn(C) -> Option<T>,
}

impl<C: fmt::Display + Copy, T> Constraint<C, T> {
    /// Create a constraint for `field`
    ///
    /// A candidate is accepted only if every predicate holds and `convert`
    /// yields a value.
    pub const fn new(
        field: &'static str,
        predicates: &'static [Predicate<C>],
        convert: fn(C) -> Option<T>,
    ) -> Self {
        Self {
            field,
            predicates,
            convert,
        }
    }

    /// Name of the guarded field
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Check a candidate without assigning it
    pub fn check(&self, candidate: C) -> Option<T> {
        if self.predicates.iter().all(|p| p(&candidate)) {
            (self.convert)(candidate)
        } else {
            None
        }
    }

    /// Assign `candidate` to `current` if it passes
    ///
    /// Returns whether the candidate was accepted.
    pub fn apply(&self, current: &mut T, candidate: C) -> bool {
        match self.check(candidate) {
            Some(value) => {
                *current = value;
                true
            }
            None => {
                log::warn!(
                    "Constraints prevented \"{}\" from being set to {}",
                    self.field,
                    candidate
                );
                false
            }
        }
    }
}

/// Largest integer exactly representable in an `f64`
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// True for finite, non-fractional values within the exactly representable range
pub fn is_safe_integer(value: &f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER
}

/// True for values strictly greater than zero
pub fn is_positive(value: &f64) -> bool {
    *value > 0.0
}
