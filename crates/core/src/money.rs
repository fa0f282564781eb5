//! Fixed-point currency arithmetic and profit/payback splitting.
//!
//! Amounts are held in the smallest indivisible currency unit (for VND that
//! is the đồng itself). Nothing stored here is ever a float.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::value_object::ValueObject;

/// Monetary amount in integer minor units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sum amounts, failing with `InvalidAmount` on overflow.
    pub fn checked_sum<I>(amounts: I) -> LedgerResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| {
            acc.checked_add(m)
                .ok_or_else(|| LedgerError::invalid_amount("sum overflows"))
        })
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl ValueObject for Money {}

/// Profit percentage in basis points (1% = 100 bp).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(u32);

impl Percentage {
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    pub fn from_basis_points(bp: u32) -> LedgerResult<Self> {
        if bp > Self::MAX_BASIS_POINTS {
            return Err(LedgerError::InvalidPercentage(format!(
                "{bp} basis points exceeds 100%"
            )));
        }
        Ok(Self(bp))
    }

    /// Parse a human percentage (e.g. `2.5` for 2.5%).
    ///
    /// Fractions finer than a basis point are rounded to the nearest one.
    pub fn from_percent(pct: f64) -> LedgerResult<Self> {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(LedgerError::InvalidPercentage(format!(
                "{pct} is outside [0, 100]"
            )));
        }
        Self::from_basis_points((pct * 100.0).round() as u32)
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    pub fn as_percent(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Split `total` into the operator's profit and the customer's payback.
    ///
    /// profit = round-half-up(total × bp / 10_000); payback = total − profit.
    pub fn split(self, total: Money) -> LedgerResult<Split> {
        if total.is_negative() {
            return Err(LedgerError::invalid_amount(format!(
                "total {total} is negative"
            )));
        }

        let scaled = i128::from(total.minor_units()) * i128::from(self.0);
        let profit = (scaled + i128::from(Self::MAX_BASIS_POINTS / 2))
            / i128::from(Self::MAX_BASIS_POINTS);
        // profit <= total because bp <= 10_000, so this never truncates.
        let profit_value = Money::new(profit as i64);

        Ok(Split {
            total,
            profit_value,
            payback: Money::new(total.minor_units() - profit_value.minor_units()),
        })
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.as_percent())
    }
}

impl ValueObject for Percentage {}

/// Result of splitting a total by a profit percentage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub total: Money,
    pub profit_value: Money,
    pub payback: Money,
}

impl ValueObject for Split {}

/// `computeSplit(total, profitPct)`: validate the percentage, then split.
pub fn compute_split(total: Money, profit_pct: f64) -> LedgerResult<Split> {
    Percentage::from_percent(profit_pct)?.split(total)
}
