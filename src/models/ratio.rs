//! Exchange ratios between two brands.

use std::fmt;

use serde::Serialize;

use super::amount::Amount;
use super::brand::Brand;
use crate::{OnrampError, Result};

/// Integer rounding applied when a conversion does not divide exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Floor,
    Ceil,
}

/// `denominator.value` units of `denominator.brand` are worth
/// `numerator.value` units of `numerator.brand`.
///
/// The denominator is always positive. Ratios are not reduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ratio {
    numerator: Amount,
    denominator: Amount,
}

impl Ratio {
    /// Builds a ratio from raw values.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::InvalidRatio`] if `denominator` is zero.
    pub fn new(
        numerator: u128,
        numerator_brand: &Brand,
        denominator: u128,
        denominator_brand: &Brand,
    ) -> Result<Self> {
        Self::from_amounts(
            Amount::new(numerator_brand, numerator),
            Amount::new(denominator_brand, denominator),
        )
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::InvalidRatio`] if the denominator is zero.
    pub fn from_amounts(numerator: Amount, denominator: Amount) -> Result<Self> {
        if denominator.is_empty() {
            return Err(OnrampError::InvalidRatio(format!(
                "no infinite ratios, denominator was 0 {}",
                denominator.brand
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    #[must_use]
    pub fn numerator(&self) -> &Amount {
        &self.numerator
    }

    #[must_use]
    pub fn denominator(&self) -> &Amount {
        &self.denominator
    }

    /// Whether the ratio relates exactly the brands `a` and `b`, in either order.
    #[must_use]
    pub fn relates(&self, a: &Brand, b: &Brand) -> bool {
        let (num, den) = (&self.numerator.brand, &self.denominator.brand);
        (num == a && den == b) || (num == b && den == a)
    }

    /// Converts `amount` into the other brand of this ratio.
    ///
    /// An amount of the denominator brand is multiplied by
    /// `numerator / denominator`; an amount of the numerator brand by the
    /// inverse.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if `amount` is of neither
    /// brand, and [`OnrampError::InvalidRatio`] when dividing through a zero
    /// numerator or when the product overflows.
    pub fn convert(&self, amount: &Amount, rounding: Rounding) -> Result<Amount> {
        let (from, to) = if amount.brand == self.denominator.brand {
            (&self.denominator, &self.numerator)
        } else if amount.brand == self.numerator.brand {
            (&self.numerator, &self.denominator)
        } else {
            return Err(OnrampError::BrandMismatch {
                expected: format!("{} or {}", self.denominator.brand, self.numerator.brand),
                actual: amount.brand.to_string(),
            });
        };

        if from.is_empty() {
            return Err(OnrampError::InvalidRatio(format!(
                "cannot convert {} through a zero price",
                from.brand
            )));
        }

        let product = amount.value.checked_mul(to.value).ok_or_else(|| {
            OnrampError::InvalidRatio(format!("converting {amount} overflows"))
        })?;
        let value = match rounding {
            Rounding::Floor => product / from.value,
            Rounding::Ceil => product.div_ceil(from.value),
        };

        Ok(Amount::new(&to.brand, value))
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::brand::DisplayInfo;

    fn brands() -> (Brand, Brand) {
        (
            Brand::new("IST", DisplayInfo::with_decimals(6)),
            Brand::new("BLD", DisplayInfo::with_decimals(6)),
        )
    }

    #[test]
    fn zero_denominator_rejected() {
        let (ist, bld) = brands();
        let err = Ratio::new(1, &ist, 0, &bld).unwrap_err();
        assert!(matches!(err, OnrampError::InvalidRatio(_)));
    }

    #[test]
    fn converts_in_both_directions() {
        let (ist, bld) = brands();
        // 99 BLD are worth 1 IST.
        let ratio = Ratio::new(1_000_000, &ist, 99_000_000, &bld).unwrap();

        let out = ratio
            .convert(&Amount::new(&ist, 1_000_000), Rounding::Floor)
            .unwrap();
        assert_eq!(out, Amount::new(&bld, 99_000_000));

        let back = ratio
            .convert(&Amount::new(&bld, 99_000_000), Rounding::Floor)
            .unwrap();
        assert_eq!(back, Amount::new(&ist, 1_000_000));
    }

    #[test]
    fn floor_and_ceil_differ_on_remainder() {
        let (ist, bld) = brands();
        let ratio = Ratio::new(1, &ist, 3, &bld).unwrap();
        let amount = Amount::new(&bld, 10);
        assert_eq!(ratio.convert(&amount, Rounding::Floor).unwrap().value, 3);
        assert_eq!(ratio.convert(&amount, Rounding::Ceil).unwrap().value, 4);
    }

    #[test]
    fn zero_numerator_cannot_be_inverted() {
        let (ist, bld) = brands();
        let ratio = Ratio::new(0, &ist, 5, &bld).unwrap();
        assert_eq!(
            ratio
                .convert(&Amount::new(&bld, 10), Rounding::Floor)
                .unwrap()
                .value,
            0
        );
        let err = ratio
            .convert(&Amount::new(&ist, 10), Rounding::Floor)
            .unwrap_err();
        assert!(matches!(err, OnrampError::InvalidRatio(_)));
    }

    #[test]
    fn foreign_brand_rejected() {
        let (ist, bld) = brands();
        let atom = Brand::new("ATOM", DisplayInfo::with_decimals(6));
        let ratio = Ratio::new(1, &ist, 1, &bld).unwrap();
        let err = ratio
            .convert(&Amount::new(&atom, 1), Rounding::Floor)
            .unwrap_err();
        assert!(matches!(err, OnrampError::BrandMismatch { .. }));
        assert!(ratio.relates(&bld, &ist));
        assert!(!ratio.relates(&atom, &ist));
    }
}
