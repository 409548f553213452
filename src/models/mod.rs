//! Shared value types for the price registry.
//!
//! Brands identify asset kinds, amounts tag quantities with a brand, and
//! ratios relate two brands. Quotes and history records are built from
//! these.

pub mod amount;
pub mod brand;
pub mod quote;
pub mod ratio;

pub use amount::Amount;
pub use brand::{Brand, DisplayInfo};
pub use quote::{
    AmountWithDisplay, PriceQuote, QuoteDescription, QuoteReceipt, QuoteRecord, Timestamp,
};
pub use ratio::{Ratio, Rounding};
