//! Quote receipts.
//!
//! Every quote the registry hands out carries a receipt: an HMAC-SHA256 tag
//! over the quote's serial number and description, keyed by a secret only
//! the issuer holds. Holders of the issuer can check that a quote was
//! produced here and has not been altered.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::prelude::*;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::models::{Amount, PriceQuote, QuoteDescription, QuoteReceipt};
use crate::{OnrampError, Result};

/// Name under which quote receipts are issued.
pub const QUOTE_ISSUER_NAME: &str = "OnrampQuote";

const KEY_LEN: usize = 32;

/// Mints and verifies quote receipts. Shared by every pair's authority.
pub struct QuoteIssuer {
    name: String,
    key: Zeroizing<Vec<u8>>,
    next_serial: AtomicU64,
}

impl QuoteIssuer {
    /// Creates an issuer with a caller-supplied key.
    #[must_use]
    pub fn new(key: Zeroizing<Vec<u8>>) -> Self {
        Self {
            name: QUOTE_ISSUER_NAME.to_string(),
            key,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Creates an issuer with a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps `description` in a receipt.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::Config`] if the key cannot seed the MAC.
    pub fn mint(&self, description: QuoteDescription) -> Result<PriceQuote> {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let tag = self.tag(serial, &description)?;
        Ok(PriceQuote {
            quote_amount: description,
            receipt: QuoteReceipt {
                issuer: self.name.clone(),
                serial,
                tag: BASE64_STANDARD.encode(tag),
            },
        })
    }

    /// Whether `quote` carries a valid receipt from this issuer.
    #[must_use]
    pub fn verify(&self, quote: &PriceQuote) -> bool {
        if quote.receipt.issuer != self.name {
            return false;
        }
        let Ok(tag) = BASE64_STANDARD.decode(&quote.receipt.tag) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(&signing_input(quote.receipt.serial, &quote.quote_amount));
        mac.verify_slice(&tag).is_ok()
    }

    fn mac(&self) -> Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| OnrampError::Config(format!("invalid quote issuer key: {e}")))
    }

    fn tag(&self, serial: u64, description: &QuoteDescription) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(&signing_input(serial, description));
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Canonical bytes covered by the tag. Brand identity, not name, is bound.
fn signing_input(serial: u64, description: &QuoteDescription) -> Vec<u8> {
    fn amount_part(amount: &Amount) -> String {
        format!("{}#{}={}", amount.brand.alleged_name(), amount.brand.id(), amount.value)
    }
    format!(
        "{serial}|{}|{}|{}",
        amount_part(&description.amount_in),
        amount_part(&description.amount_out),
        description.timestamp.abs_value
    )
    .into_bytes()
}
