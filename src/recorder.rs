//! Price history recorder.
//!
//! Each registered pair publishes its accepted price updates to its own
//! storage node, named by [`pair_id`] so readers can find a feed from the
//! two brand names alone.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::Result;
use crate::models::{
    Amount, AmountWithDisplay, Brand, DisplayInfo, QuoteRecord, Ratio, Timestamp,
};
use crate::normalize::decimal_places;
use crate::storage::{StorageNode, StoredEntry};

/// Canonical identifier for a pair: both alleged names in lexicographic
/// order, joined by `_`. Independent of argument order.
#[must_use]
pub fn pair_id(a: &Brand, b: &Brand) -> String {
    let (first, second) = if a.alleged_name() <= b.alleged_name() {
        (a.alleged_name(), b.alleged_name())
    } else {
        (b.alleged_name(), a.alleged_name())
    };
    format!("{first}_{second}")
}

/// Builds the history record for an accepted price: the numerator as
/// `amount_in`, the denominator as `amount_out`.
#[must_use]
pub fn record_for(price: &Ratio, last_updated: Timestamp) -> QuoteRecord {
    QuoteRecord {
        amount_in: with_display(price.numerator()),
        amount_out: with_display(price.denominator()),
        last_updated,
    }
}

fn with_display(amount: &Amount) -> AmountWithDisplay {
    AmountWithDisplay {
        amount: amount.clone(),
        display_info: DisplayInfo::with_decimals(decimal_places(&amount.brand.display_info())),
    }
}

/// Append-only writer for one pair's feed.
pub struct Recorder {
    node: Arc<dyn StorageNode>,
}

impl Recorder {
    #[must_use]
    pub fn new(node: Arc<dyn StorageNode>) -> Self {
        Self { node }
    }

    /// Storage path readers subscribe to.
    #[must_use]
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// Serializes and appends `record`, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the storage write fails.
    pub fn write(&self, record: &QuoteRecord) -> Result<u64> {
        let value = serde_json::to_string(record)?;
        let version = self.node.write(&value)?;
        debug!(path = self.path(), version, "Recorded price update");
        Ok(version)
    }

    /// Everything written so far, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub fn history(&self) -> Result<Vec<StoredEntry>> {
        self.node.entries()
    }

    /// Watches the feed's latest version.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.node.subscribe()
    }
}
