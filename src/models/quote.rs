//! Quotes handed to readers and the price history records persisted per pair.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::brand::DisplayInfo;

/// Absolute time as reported by the timer service, in seconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    pub abs_value: u64,
}

impl Timestamp {
    #[must_use]
    pub const fn new(abs_value: u64) -> Self {
        Self { abs_value }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abs_value)
    }
}

/// An amount together with the display metadata of its brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountWithDisplay {
    pub amount: Amount,
    pub display_info: DisplayInfo,
}

/// One entry of a pair's price history. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub amount_in: AmountWithDisplay,
    pub amount_out: AmountWithDisplay,
    pub last_updated: Timestamp,
}

impl QuoteRecord {
    /// Whole units of `amount_out` per whole unit of `amount_in`.
    #[must_use]
    pub fn display_price(&self) -> Option<Decimal> {
        let whole_in = self
            .amount_in
            .amount
            .in_whole_units(self.amount_in.display_info.decimal_places.unwrap_or(0))?;
        let whole_out = self
            .amount_out
            .amount
            .in_whole_units(self.amount_out.display_info.decimal_places.unwrap_or(0))?;
        whole_out.checked_div(whole_in).map(|d| d.normalize())
    }
}

/// What a quote asserts: `amount_in` was worth `amount_out` at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDescription {
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub timestamp: Timestamp,
}

/// Attestation minted by the quote issuer over a [`QuoteDescription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteReceipt {
    /// Name of the issuing authority.
    pub issuer: String,
    /// Per-issuer sequence number.
    pub serial: u64,
    /// Base64 HMAC tag binding the serial to the description.
    pub tag: String,
}

/// A computed quote plus the receipt that makes it verifiable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub quote_amount: QuoteDescription,
    pub receipt: QuoteReceipt,
}

impl PriceQuote {
    #[must_use]
    pub fn amount_in(&self) -> &Amount {
        &self.quote_amount.amount_in
    }

    #[must_use]
    pub fn amount_out(&self) -> &Amount {
        &self.quote_amount.amount_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::brand::Brand;
    use rust_decimal_macros::dec;

    fn record(value_in: u128, dec_in: u32, value_out: u128, dec_out: u32) -> QuoteRecord {
        let ist = Brand::new("IST", DisplayInfo::with_decimals(dec_in));
        let kes = Brand::new("KES", DisplayInfo::with_decimals(dec_out));
        QuoteRecord {
            amount_in: AmountWithDisplay {
                amount: Amount::new(&ist, value_in),
                display_info: DisplayInfo::with_decimals(dec_in),
            },
            amount_out: AmountWithDisplay {
                amount: Amount::new(&kes, value_out),
                display_info: DisplayInfo::with_decimals(dec_out),
            },
            last_updated: Timestamp::new(17),
        }
    }

    #[test]
    fn display_price_accounts_for_decimals() {
        // 1 IST (6 decimals) = 134 KES (2 decimals)
        let r = record(1_000_000, 6, 13_400, 2);
        assert_eq!(r.display_price(), Some(dec!(134)));
    }

    #[test]
    fn display_price_of_empty_input_is_none() {
        let r = record(0, 6, 13_400, 2);
        assert_eq!(r.display_price(), None);
    }

    #[test]
    fn record_serializes_in_published_shape() {
        let json = serde_json::to_value(record(1_000_000, 6, 99_000_000, 6)).unwrap();
        assert_eq!(json["amountIn"]["amount"]["brand"], "IST");
        assert_eq!(json["amountIn"]["amount"]["value"], "1000000");
        assert_eq!(json["amountIn"]["displayInfo"]["decimalPlaces"], 6);
        assert_eq!(json["amountOut"]["amount"]["value"], "99000000");
        assert_eq!(json["lastUpdated"]["absValue"], 17);
    }
}
