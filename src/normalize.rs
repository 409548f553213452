//! Decimal-adjusted starting prices for newly registered pairs.

use crate::models::{Brand, DisplayInfo, Ratio};
use crate::{OnrampError, Result};

/// Used when a brand does not report its decimal places, or reports zero.
pub const DEFAULT_DECIMAL_PLACES: u32 = 6;

/// Effective decimal places for a brand's display metadata.
#[must_use]
pub fn decimal_places(info: &DisplayInfo) -> u32 {
    match info.decimal_places {
        None | Some(0) => DEFAULT_DECIMAL_PLACES,
        Some(places) => places,
    }
}

/// Starting price for a pair: one whole unit of `brand_in` for one whole
/// unit of `brand_out`, expressed in raw units of each.
///
/// # Errors
///
/// Returns [`OnrampError::InvalidRatio`] if a brand reports more decimal
/// places than a `u128` can scale.
pub fn initial_ratio(brand_in: &Brand, brand_out: &Brand) -> Result<Ratio> {
    let unit_in = whole_unit(brand_in)?;
    let unit_out = whole_unit(brand_out)?;
    Ratio::new(unit_out, brand_out, unit_in, brand_in)
}

fn whole_unit(brand: &Brand) -> Result<u128> {
    let places = decimal_places(&brand.display_info());
    10u128.checked_pow(places).ok_or_else(|| {
        OnrampError::InvalidRatio(format!("{brand} reports {places} decimal places"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, Rounding};

    #[test]
    fn missing_or_zero_decimals_use_default() {
        assert_eq!(decimal_places(&DisplayInfo::default()), 6);
        assert_eq!(decimal_places(&DisplayInfo::with_decimals(0)), 6);
        assert_eq!(decimal_places(&DisplayInfo::with_decimals(2)), 2);
    }

    #[test]
    fn equal_decimals_give_one_to_one() {
        let ist = Brand::new("IST", DisplayInfo::with_decimals(6));
        let bld = Brand::new("BLD", DisplayInfo::with_decimals(6));
        let ratio = initial_ratio(&ist, &bld).unwrap();
        assert_eq!(ratio.numerator(), &Amount::new(&bld, 1_000_000));
        assert_eq!(ratio.denominator(), &Amount::new(&ist, 1_000_000));
    }

    #[test]
    fn differing_decimals_scale_raw_units() {
        let ist = Brand::new("IST", DisplayInfo::with_decimals(6));
        let kes = Brand::new("KES", DisplayInfo::with_decimals(2));
        let ratio = initial_ratio(&ist, &kes).unwrap();
        let out = ratio
            .convert(&Amount::new(&ist, 1_000_000), Rounding::Floor)
            .unwrap();
        assert_eq!(out, Amount::new(&kes, 100));
    }

    #[test]
    fn oversized_decimals_rejected() {
        let ist = Brand::new("IST", DisplayInfo::with_decimals(6));
        let huge = Brand::new("HUGE", DisplayInfo::with_decimals(40));
        assert!(matches!(
            initial_ratio(&ist, &huge),
            Err(OnrampError::InvalidRatio(_))
        ));
    }
}
