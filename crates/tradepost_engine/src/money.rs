//! # Fixed-Point Currency
//!
//! **NO FLOATING POINT IN FINANCIAL CALCULATIONS**
//!
//! All currency amounts are `Coins`: a `u64` count of minor units with
//! four implicit decimal places. Deterministic on all hardware, no
//! rounding errors, auditable.
//!
//! The economy gateway deals exclusively in `Coins`; conversion to a
//! provider's native representation is the provider's problem.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TradeError, TradeResult};

/// Number of implicit decimal places.
const DECIMAL_PLACES: u32 = 4;

/// Minor units per whole coin.
const MINOR_PER_WHOLE: u64 = 10u64.pow(DECIMAL_PLACES);

/// A non-negative currency amount in fixed-point minor units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Coins(u64);

impl Coins {
    /// Zero coins.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw minor units.
    #[inline]
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates an amount from whole coins.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticOverflow` if the amount exceeds the representable
    /// range.
    pub const fn from_whole(whole: u64) -> TradeResult<Self> {
        match whole.checked_mul(MINOR_PER_WHOLE) {
            Some(minor) => Ok(Self(minor)),
            None => Err(TradeError::ArithmeticOverflow),
        }
    }

    /// Returns the raw minor-unit count.
    #[inline]
    #[must_use]
    pub const fn minor(self) -> u64 {
        self.0
    }

    /// Returns true if the amount is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticOverflow` on overflow.
    pub const fn checked_add(self, other: Self) -> TradeResult<Self> {
        match self.0.checked_add(other.0) {
            Some(minor) => Ok(Self(minor)),
            None => Err(TradeError::ArithmeticOverflow),
        }
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticOverflow` if `other` exceeds `self`.
    pub const fn checked_sub(self, other: Self) -> TradeResult<Self> {
        match self.0.checked_sub(other.0) {
            Some(minor) => Ok(Self(minor)),
            None => Err(TradeError::ArithmeticOverflow),
        }
    }

    /// Checked multiplication by an integer count.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticOverflow` on overflow.
    pub const fn checked_mul_count(self, count: u64) -> TradeResult<Self> {
        match self.0.checked_mul(count) {
            Some(minor) => Ok(Self(minor)),
            None => Err(TradeError::ArithmeticOverflow),
        }
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MINOR_PER_WHOLE;
        let frac = self.0 % MINOR_PER_WHOLE;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{frac:04}")
        }
    }
}
