//! Fixed-point money amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A money amount backed by a fixed-point decimal.
///
/// Amounts never go through floating point, so prices captured at checkout
/// compare and sum exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Decimal places a persisted price keeps.
    pub const MAX_SCALE: u32 = 4;

    /// Digits a persisted price may have before the decimal point.
    pub const MAX_INTEGER_DIGITS: u32 = 15;

    /// Wraps a decimal amount.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates an amount from a whole number of cents (e.g. 1000 = 10.00).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns true if the amount survives storage as a price unchanged:
    /// at most [`MAX_SCALE`](Self::MAX_SCALE) significant decimal places and
    /// [`MAX_INTEGER_DIGITS`](Self::MAX_INTEGER_DIGITS) integer digits.
    pub fn is_storable(&self) -> bool {
        let amount = self.0.normalize();
        let limit = Decimal::from(10_i64.pow(Self::MAX_INTEGER_DIGITS));
        amount.scale() <= Self::MAX_SCALE && amount.abs() < limit
    }

    /// Multiplies by a quantity. Saturates at the decimal range.
    pub fn multiply(&self, quantity: i32) -> Money {
        Money(self.0.saturating_mul(Decimal::from(quantity)))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rounded = self.0.abs().round_dp(2);
        if self.is_negative() {
            write!(f, "-${rounded:.2}")
        } else {
            write!(f, "${rounded:.2}")
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
