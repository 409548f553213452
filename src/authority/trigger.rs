//! Conditional quote triggers and the handles returned to their requesters.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use super::PriceAuthority;
use crate::models::{Amount, PriceQuote};
use crate::{OnrampError, Result};

/// Comparison between the quoted output and the caller's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Relation {
    /// Whether `actual <relation> limit` holds.
    #[must_use]
    pub fn holds(self, actual: u128, limit: u128) -> bool {
        match self {
            Self::Lt => actual < limit,
            Self::Lte => actual <= limit,
            Self::Gt => actual > limit,
            Self::Gte => actual >= limit,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "LT",
            Self::Lte => "LTE",
            Self::Gt => "GT",
            Self::Gte => "GTE",
        }
    }
}

/// Where a fired trigger delivers its quote.
pub(crate) enum Resolver {
    /// Fires once, then the trigger is removed.
    Once(Option<oneshot::Sender<PriceQuote>>),
    /// Fires on every qualifying price until cancelled.
    Repeating(mpsc::UnboundedSender<PriceQuote>),
}

pub(crate) struct Trigger {
    pub(crate) id: u64,
    pub(crate) relation: Relation,
    pub(crate) amount_in: Amount,
    pub(crate) limit: Amount,
    pub(crate) resolver: Resolver,
}

impl Trigger {
    /// The requester has gone away; nothing left to notify.
    pub(crate) fn is_abandoned(&self) -> bool {
        match &self.resolver {
            Resolver::Once(Some(tx)) => tx.is_closed(),
            Resolver::Once(None) => true,
            Resolver::Repeating(tx) => tx.is_closed(),
        }
    }

    /// Delivers `quote`. Returns `true` if the trigger should stay registered.
    pub(crate) fn fire(&mut self, quote: PriceQuote) -> bool {
        match &mut self.resolver {
            Resolver::Once(slot) => {
                if let Some(tx) = slot.take() {
                    let _ = tx.send(quote);
                }
                false
            }
            Resolver::Repeating(tx) => tx.send(quote).is_ok(),
        }
    }
}

/// A quote that resolves later: either when a price condition is met or
/// when a deadline passes.
///
/// Resolves to [`OnrampError::QuoteCancelled`] if the authority gives up on
/// it.
#[derive(Debug)]
#[must_use = "a pending quote does nothing unless awaited"]
pub struct PendingQuote {
    rx: oneshot::Receiver<PriceQuote>,
}

impl PendingQuote {
    pub(crate) fn new(rx: oneshot::Receiver<PriceQuote>) -> Self {
        Self { rx }
    }

    /// Takes the quote if it has already resolved.
    pub fn try_take(&mut self) -> Option<PriceQuote> {
        self.rx.try_recv().ok()
    }
}

impl Future for PendingQuote {
    type Output = Result<PriceQuote>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| OnrampError::QuoteCancelled))
    }
}

/// A conditional quote whose levels can be changed after registration.
///
/// Unlike a [`PendingQuote`], it stays registered after firing and resolves
/// again on every later price that satisfies its condition. Dropping the
/// handle cancels it.
pub struct MutableQuote {
    id: u64,
    authority: Arc<PriceAuthority>,
    rx: mpsc::UnboundedReceiver<PriceQuote>,
}

impl MutableQuote {
    pub(crate) fn new(
        id: u64,
        authority: Arc<PriceAuthority>,
        rx: mpsc::UnboundedReceiver<PriceQuote>,
    ) -> Self {
        Self { id, authority, rx }
    }

    /// Waits for the next time the condition holds.
    pub async fn next(&mut self) -> Option<PriceQuote> {
        self.rx.recv().await
    }

    /// Takes a quote that already fired, without waiting.
    pub fn try_next(&mut self) -> Option<PriceQuote> {
        self.rx.try_recv().ok()
    }

    /// Replaces the watched levels and re-checks them against the current price.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if the amounts do not belong
    /// to this pair, or [`OnrampError::QuoteCancelled`] if the quote is no
    /// longer registered.
    pub fn update_level(&self, amount_in: Amount, limit: Amount) -> Result<()> {
        self.authority.update_trigger(self.id, amount_in, limit)
    }

    /// Removes the quote. Nothing else is notified.
    pub fn cancel(self) {
        // Unregistration happens in `Drop`.
        drop(self);
    }
}

impl Drop for MutableQuote {
    fn drop(&mut self) {
        self.authority.remove_trigger(self.id);
    }
}
