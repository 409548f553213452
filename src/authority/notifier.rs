//! Live quote stream for one input amount.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::watch;
use tracing::warn;

use super::issuer::QuoteIssuer;
use crate::models::{Amount, Brand, PriceQuote, QuoteDescription, Ratio, Rounding, Timestamp};

/// Price as of the most recent update.
#[derive(Debug, Clone)]
pub(crate) struct PriceSnapshot {
    pub(crate) ratio: Ratio,
    pub(crate) updated: Timestamp,
}

/// Yields a fresh quote for `amount_in` after every price update.
///
/// The first call to [`next`](Self::next) returns the current quote
/// immediately. A subscriber that falls behind sees the newest price; the
/// updates in between are skipped. Cloning restarts from the current price.
pub struct QuoteNotifier {
    rx: watch::Receiver<PriceSnapshot>,
    issuer: Arc<QuoteIssuer>,
    amount_in: Amount,
    brand_out: Brand,
    primed: bool,
}

impl QuoteNotifier {
    pub(crate) fn new(
        rx: watch::Receiver<PriceSnapshot>,
        issuer: Arc<QuoteIssuer>,
        amount_in: Amount,
        brand_out: Brand,
    ) -> Self {
        Self {
            rx,
            issuer,
            amount_in,
            brand_out,
            primed: false,
        }
    }

    /// Waits for the next quote. `None` once the authority is gone.
    pub async fn next(&mut self) -> Option<PriceQuote> {
        loop {
            if self.primed {
                self.rx.changed().await.ok()?;
            }
            self.primed = true;

            let snapshot = self.rx.borrow_and_update().clone();
            if let Some(quote) = self.quote(&snapshot) {
                return Some(quote);
            }
        }
    }

    /// Consumes the notifier as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = PriceQuote> {
        futures_util::stream::unfold(self, |mut notifier| async move {
            notifier.next().await.map(|quote| (quote, notifier))
        })
    }

    fn quote(&self, snapshot: &PriceSnapshot) -> Option<PriceQuote> {
        let minted = snapshot
            .ratio
            .convert(&self.amount_in, Rounding::Floor)
            .and_then(|amount_out| {
                self.issuer.mint(QuoteDescription {
                    amount_in: self.amount_in.clone(),
                    amount_out,
                    timestamp: snapshot.updated,
                })
            });
        match minted {
            Ok(quote) if quote.amount_out().brand == self.brand_out => Some(quote),
            Ok(_) => None,
            Err(e) => {
                warn!(price = %snapshot.ratio, "Skipping notifier update: {e}");
                None
            }
        }
    }
}

impl Clone for QuoteNotifier {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            issuer: Arc::clone(&self.issuer),
            amount_in: self.amount_in.clone(),
            brand_out: self.brand_out.clone(),
            primed: false,
        }
    }
}
