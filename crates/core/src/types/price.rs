//! Price display and percentage reductions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How prices are shown to members of a customer group.
///
/// Stored as an integer: `0` tax included, `1` tax excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceDisplayMethod {
    #[default]
    TaxIncluded,
    TaxExcluded,
}

impl PriceDisplayMethod {
    /// Storage value of this method.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::TaxIncluded => 0,
            Self::TaxExcluded => 1,
        }
    }

    /// Parse the storage value; unknown values yield `None`.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::TaxIncluded),
            1 => Some(Self::TaxExcluded),
            _ => None,
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TaxIncluded => "Tax included",
            Self::TaxExcluded => "Tax excluded",
        }
    }
}

/// Errors that can occur when parsing a [`Reduction`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReductionError {
    /// The percentage is negative or above 100.
    #[error("the discount value is incorrect (must be a percentage between 0 and 100)")]
    OutOfRange,
}

/// A percentage discount between 0 and 100 inclusive.
///
/// Group reductions are entered as percentages but category reductions are
/// stored as fractions (`12.5%` is stored as `0.125`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Reduction(Decimal);

impl Reduction {
    /// Parse a percentage.
    ///
    /// # Errors
    ///
    /// Returns [`ReductionError::OutOfRange`] when the value is outside `0..=100`.
    pub fn from_percent(percent: Decimal) -> Result<Self, ReductionError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(ReductionError::OutOfRange);
        }
        Ok(Self(percent))
    }

    /// Build from a stored fraction (`0.125` -> `12.5%`).
    ///
    /// # Errors
    ///
    /// Returns [`ReductionError::OutOfRange`] when the fraction is outside `0..=1`.
    pub fn from_fraction(fraction: Decimal) -> Result<Self, ReductionError> {
        Self::from_percent(fraction * Decimal::ONE_HUNDRED)
    }

    /// The percentage value.
    #[must_use]
    pub const fn percent(self) -> Decimal {
        self.0
    }

    /// The fraction stored for category reductions.
    #[must_use]
    pub fn as_fraction(self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }
}

impl TryFrom<Decimal> for Reduction {
    type Error = ReductionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_percent(value)
    }
}

impl From<Reduction> for Decimal {
    fn from(value: Reduction) -> Self {
        value.0
    }
}
