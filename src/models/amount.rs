//! Branded quantities.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::brand::Brand;
use crate::{OnrampError, Result};

/// A nonnegative integer quantity tagged with its brand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    pub brand: Brand,
    pub value: u128,
}

impl Amount {
    #[must_use]
    pub fn new(brand: &Brand, value: u128) -> Self {
        Self {
            brand: brand.clone(),
            value,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    /// Fails unless `other` carries the same brand.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] for differing brands.
    pub fn ensure_same_brand(&self, other: &Self) -> Result<()> {
        if self.brand == other.brand {
            Ok(())
        } else {
            Err(OnrampError::BrandMismatch {
                expected: self.brand.to_string(),
                actual: other.brand.to_string(),
            })
        }
    }

    /// Compares two amounts of the same brand.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] for differing brands.
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        self.ensure_same_brand(other)?;
        Ok(self.value.cmp(&other.value))
    }

    /// Adds two amounts of the same brand.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] for differing brands and
    /// [`OnrampError::InvalidRatio`] on overflow.
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        self.ensure_same_brand(other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| OnrampError::InvalidRatio(format!("{} amount overflow", self.brand)))?;
        Ok(Self::new(&self.brand, value))
    }

    /// Renders the raw value in whole units, e.g. `1_500_000` with 6
    /// decimals becomes `1.5`. `None` when the value does not fit a
    /// [`Decimal`].
    #[must_use]
    pub fn in_whole_units(&self, decimal_places: u32) -> Option<Decimal> {
        let value = i128::try_from(self.value).ok()?;
        Decimal::try_from_i128_with_scale(value, decimal_places)
            .ok()
            .map(|d| d.normalize())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.brand)
    }
}

/// Values serialize as decimal strings so 128-bit quantities survive JSON.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Amount", 2)?;
        state.serialize_field("brand", &self.brand)?;
        state.serialize_field("value", &self.value.to_string())?;
        state.end()
    }
}
