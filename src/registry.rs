//! Pair registry.
//!
//! [`PriceRegistry`] owns one [`PairEntry`] per unordered pair of brands and
//! routes every quote operation to the right [`PriceAuthority`]. Pairs are
//! keyed by [`PairKey`], so `A/B` and `B/A` name the same entry and a pair
//! can be registered only once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::authority::PriceAuthority;
use crate::authority::issuer::QuoteIssuer;
use crate::authority::notifier::QuoteNotifier;
use crate::authority::trigger::{MutableQuote, PendingQuote, Relation};
use crate::models::{Amount, Brand, PriceQuote, QuoteRecord, Ratio, Timestamp};
use crate::normalize::initial_ratio;
use crate::recorder::{Recorder, pair_id, record_for};
use crate::storage::StorageNode;
use crate::timer::TimerService;
use crate::{OnrampError, Result};

/// Order-independent key for a pair of brands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: Brand,
    high: Brand,
}

impl PairKey {
    #[must_use]
    pub fn new(a: &Brand, b: &Brand) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    #[must_use]
    pub fn brands(&self) -> (&Brand, &Brand) {
        (&self.low, &self.high)
    }
}

/// Position in a pair's update capability chain.
pub(crate) struct ChainState {
    /// Epoch of the only update capability currently accepted; 0 before
    /// any has been minted.
    pub(crate) epoch: u64,
}

/// Everything the registry holds for one pair. Never removed.
pub struct PairEntry {
    pub(crate) key: PairKey,
    pub(crate) pair_id: String,
    pub(crate) authority: Arc<PriceAuthority>,
    pub(crate) recorder: Recorder,
    pub(crate) chain: Mutex<ChainState>,
}

impl PairEntry {
    #[must_use]
    pub fn pair_id(&self) -> &str {
        &self.pair_id
    }

    #[must_use]
    pub fn authority(&self) -> &Arc<PriceAuthority> {
        &self.authority
    }

    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }
}

/// Routes quote and update operations to per-pair authorities.
pub struct PriceRegistry {
    timer: Arc<dyn TimerService>,
    feed_node: Arc<dyn StorageNode>,
    issuer: Arc<QuoteIssuer>,
    pairs: RwLock<HashMap<PairKey, Arc<PairEntry>>>,
}

impl PriceRegistry {
    /// Creates an empty registry publishing pair feeds under `feed_node`.
    #[must_use]
    pub fn new(
        timer: Arc<dyn TimerService>,
        feed_node: Arc<dyn StorageNode>,
        issuer: Arc<QuoteIssuer>,
    ) -> Self {
        Self {
            timer,
            feed_node,
            issuer,
            pairs: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the pair `brand_in`/`brand_out` at a decimal-adjusted 1:1
    /// price, with its own authority and history feed.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::DuplicateRegistration`] if the pair exists in
    /// either order; the registry is unchanged. Storage and ratio errors
    /// are propagated without registering anything.
    pub fn register(&self, brand_in: &Brand, brand_out: &Brand) -> Result<()> {
        let key = PairKey::new(brand_in, brand_out);
        let pair_id = pair_id(brand_in, brand_out);

        // Hold the write lock from the existence check through the insert.
        let mut pairs = self.pairs.write();
        if pairs.contains_key(&key) {
            return Err(OnrampError::DuplicateRegistration { pair_id });
        }

        let initial = initial_ratio(brand_in, brand_out)?;
        let node = self.feed_node.make_child_node(&pair_id)?;
        let authority = PriceAuthority::new(
            brand_in,
            brand_out,
            initial,
            Arc::clone(&self.timer),
            Arc::clone(&self.issuer),
        )?;

        info!(
            pair_id = %pair_id,
            brand_in = %brand_in,
            brand_out = %brand_out,
            path = node.path(),
            "Registered price pair"
        );
        pairs.insert(
            key.clone(),
            Arc::new(PairEntry {
                key,
                pair_id,
                authority: Arc::new(authority),
                recorder: Recorder::new(node),
                chain: Mutex::new(ChainState { epoch: 0 }),
            }),
        );
        info!(pairs = pairs.len(), "Price map size");
        Ok(())
    }

    /// Whether the pair is registered in either order.
    #[must_use]
    pub fn contains(&self, a: &Brand, b: &Brand) -> bool {
        self.pairs.read().contains_key(&PairKey::new(a, b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }

    /// Identifiers of all registered pairs, sorted.
    #[must_use]
    pub fn pair_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pairs
            .read()
            .values()
            .map(|entry| entry.pair_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Looks up the entry for a pair in either order.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] if neither order is registered.
    pub fn entry_for(&self, a: &Brand, b: &Brand) -> Result<Arc<PairEntry>> {
        self.pairs
            .read()
            .get(&PairKey::new(a, b))
            .cloned()
            .ok_or_else(|| OnrampError::UnknownPair {
                brand_in: a.to_string(),
                brand_out: b.to_string(),
            })
    }

    /// The authority for a pair in either order. Prices change only through
    /// [`update_price`](Self::update_price).
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] if neither order is registered.
    pub fn route_for(&self, a: &Brand, b: &Brand) -> Result<Arc<PriceAuthority>> {
        self.entry_for(a, b).map(|entry| Arc::clone(&entry.authority))
    }

    #[must_use]
    pub fn timer(&self) -> Arc<dyn TimerService> {
        Arc::clone(&self.timer)
    }

    /// The receipt issuer used by the pair's authority.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] if the pair is not registered.
    pub fn quote_issuer(&self, brand_in: &Brand, brand_out: &Brand) -> Result<Arc<QuoteIssuer>> {
        Ok(self.route_for(brand_in, brand_out)?.quote_issuer())
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] or the authority's error.
    pub fn quote_given(&self, amount_in: &Amount, brand_out: &Brand) -> Result<PriceQuote> {
        self.route_for(&amount_in.brand, brand_out)?
            .quote_given(amount_in, brand_out)
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] or the authority's error.
    pub fn quote_wanted(&self, brand_in: &Brand, amount_out: &Amount) -> Result<PriceQuote> {
        self.route_for(brand_in, &amount_out.brand)?
            .quote_wanted(brand_in, amount_out)
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] or the authority's error.
    pub fn make_quote_notifier(
        &self,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<QuoteNotifier> {
        self.route_for(&amount_in.brand, brand_out)?
            .make_quote_notifier(amount_in, brand_out)
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`], [`OnrampError::DeadlinePassed`]
    /// or the authority's error.
    pub fn quote_at_time(
        &self,
        deadline: Timestamp,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<PendingQuote> {
        self.route_for(&amount_in.brand, brand_out)?
            .quote_at_time(deadline, amount_in, brand_out)
    }

    /// Routes a one-shot conditional quote.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] or the authority's error.
    pub fn quote_when(
        &self,
        relation: Relation,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.route_for(&amount_in.brand, &amount_out_limit.brand)?
            .quote_when(relation, amount_in, amount_out_limit)
    }

    /// Routes a mutable conditional quote.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] or the authority's error.
    pub fn mutable_quote_when(
        &self,
        relation: Relation,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.route_for(&amount_in.brand, &amount_out_limit.brand)?
            .mutable_quote_when(relation, amount_in, amount_out_limit)
    }

    /// Sets a pair's price. Recorded like [`update_price`](Self::update_price),
    /// so the feed mirrors every accepted price.
    ///
    /// # Errors
    ///
    /// As for [`update_price`](Self::update_price).
    pub fn set_price(&self, new_price: Ratio) -> Result<()> {
        self.update_price(new_price).map(|_| ())
    }

    /// Sets the price of the pair `new_price` relates and appends it to the
    /// pair's history.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] if the pair is not registered,
    /// or a storage error if the record could not be written; the price is
    /// unchanged on error.
    pub fn update_price(&self, new_price: Ratio) -> Result<QuoteRecord> {
        let entry = self.entry_for(&new_price.numerator().brand, &new_price.denominator().brand)?;
        let mut chain = entry.chain.lock();
        self.apply_update(&entry, &mut chain, new_price)
    }

    /// Records and applies `new_price` to `entry`. Taking the chain state
    /// proves the caller holds the pair's update lock.
    pub(crate) fn apply_update(
        &self,
        entry: &PairEntry,
        _chain: &mut ChainState,
        new_price: Ratio,
    ) -> Result<QuoteRecord> {
        entry.authority.check_price(&new_price)?;

        let record = record_for(&new_price, self.timer.current_timestamp());
        entry.recorder.write(&record)?;
        entry.authority.set_price(new_price)?;

        info!(
            pair_id = %entry.pair_id,
            price = ?record.display_price(),
            "Price updated"
        );
        Ok(record)
    }
}
