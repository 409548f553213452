//! Per-pair price authority.
//!
//! A [`PriceAuthority`] holds the current price of one registered pair and
//! answers every kind of quote against it:
//! - immediate quotes ([`quote_given`](PriceAuthority::quote_given),
//!   [`quote_wanted`](PriceAuthority::quote_wanted))
//! - conditional quotes that resolve when the price crosses a limit, one-shot
//!   ([`PendingQuote`]) or re-armable ([`MutableQuote`])
//! - a live [`QuoteNotifier`] stream
//! - deadline quotes driven by the timer
//!
//! All state sits behind one lock. [`set_price`](PriceAuthority::set_price)
//! replaces the price and resolves triggers without releasing it, so every
//! trigger observes the same price and updates are applied one at a time.

pub mod issuer;
pub mod notifier;
pub mod trigger;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::models::{Amount, Brand, PriceQuote, QuoteDescription, Ratio, Rounding, Timestamp};
use crate::timer::TimerService;
use crate::{OnrampError, Result};
use issuer::QuoteIssuer;
use notifier::{PriceSnapshot, QuoteNotifier};
use trigger::{MutableQuote, PendingQuote, Relation, Resolver, Trigger};

struct AuthorityState {
    current: Ratio,
    triggers: Vec<Trigger>,
    next_trigger_id: u64,
}

/// Quote engine for one pair of brands.
pub struct PriceAuthority {
    brand_in: Brand,
    brand_out: Brand,
    timer: Arc<dyn TimerService>,
    issuer: Arc<QuoteIssuer>,
    state: Mutex<AuthorityState>,
    snapshots: watch::Sender<PriceSnapshot>,
}

impl PriceAuthority {
    /// Creates an authority starting at `initial_price`.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if `initial_price` does not
    /// relate `brand_in` and `brand_out`.
    pub fn new(
        brand_in: &Brand,
        brand_out: &Brand,
        initial_price: Ratio,
        timer: Arc<dyn TimerService>,
        issuer: Arc<QuoteIssuer>,
    ) -> Result<Self> {
        if !initial_price.relates(brand_in, brand_out) {
            return Err(pair_mismatch(brand_in, brand_out, &initial_price));
        }
        let (snapshots, _) = watch::channel(PriceSnapshot {
            ratio: initial_price.clone(),
            updated: timer.current_timestamp(),
        });
        Ok(Self {
            brand_in: brand_in.clone(),
            brand_out: brand_out.clone(),
            timer,
            issuer,
            state: Mutex::new(AuthorityState {
                current: initial_price,
                triggers: Vec::new(),
                next_trigger_id: 1,
            }),
            snapshots,
        })
    }

    #[must_use]
    pub fn brand_in(&self) -> &Brand {
        &self.brand_in
    }

    #[must_use]
    pub fn brand_out(&self) -> &Brand {
        &self.brand_out
    }

    #[must_use]
    pub fn current_price(&self) -> Ratio {
        self.state.lock().current.clone()
    }

    /// Shared receipt issuer for quotes from this authority.
    #[must_use]
    pub fn quote_issuer(&self) -> Arc<QuoteIssuer> {
        Arc::clone(&self.issuer)
    }

    #[must_use]
    pub fn timer(&self) -> Arc<dyn TimerService> {
        Arc::clone(&self.timer)
    }

    /// Number of conditional quotes still registered.
    #[must_use]
    pub fn pending_triggers(&self) -> usize {
        self.state.lock().triggers.len()
    }

    /// Quotes how much of `brand_out` `amount_in` is worth now, rounding down.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if the brands are not this
    /// pair, or [`OnrampError::InvalidRatio`] if the price cannot convert.
    pub fn quote_given(&self, amount_in: &Amount, brand_out: &Brand) -> Result<PriceQuote> {
        self.ensure_pair(&amount_in.brand, brand_out)?;
        let current = self.current_price();
        let amount_out = current.convert(amount_in, Rounding::Floor)?;
        self.mint(amount_in.clone(), amount_out)
    }

    /// Quotes how much of `brand_in` is needed to obtain `amount_out`,
    /// rounding up.
    ///
    /// # Errors
    ///
    /// Same as [`quote_given`](Self::quote_given).
    pub fn quote_wanted(&self, brand_in: &Brand, amount_out: &Amount) -> Result<PriceQuote> {
        self.ensure_pair(brand_in, &amount_out.brand)?;
        let current = self.current_price();
        let amount_in = current.convert(amount_out, Rounding::Ceil)?;
        self.mint(amount_in, amount_out.clone())
    }

    /// Replaces the current price and resolves every trigger whose
    /// condition now holds, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if `new_price` is for another
    /// pair. The price is unchanged in that case.
    pub(crate) fn set_price(&self, new_price: Ratio) -> Result<()> {
        self.check_price(&new_price)?;
        let timestamp = self.timer.current_timestamp();

        let mut state = self.state.lock();
        state.current = new_price.clone();
        self.fire_triggers(&mut state, timestamp);
        self.snapshots.send_replace(PriceSnapshot {
            ratio: new_price,
            updated: timestamp,
        });
        debug!(price = %state.current, triggers = state.triggers.len(), "Price set");
        Ok(())
    }

    /// Fails unless `price` relates exactly this pair's brands.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`].
    pub fn check_price(&self, price: &Ratio) -> Result<()> {
        if price.relates(&self.brand_in, &self.brand_out) {
            Ok(())
        } else {
            Err(pair_mismatch(&self.brand_in, &self.brand_out, price))
        }
    }

    /// Registers a one-shot conditional quote. If the condition already
    /// holds, the returned quote is resolved at the current price.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] or
    /// [`OnrampError::InvalidRatio`] as for [`quote_given`](Self::quote_given).
    pub fn quote_when(
        &self,
        relation: Relation,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.ensure_pair(&amount_in.brand, &amount_out_limit.brand)?;
        let (tx, rx) = oneshot::channel();
        let mut trigger = Trigger {
            id: 0,
            relation,
            amount_in: amount_in.clone(),
            limit: amount_out_limit.clone(),
            resolver: Resolver::Once(Some(tx)),
        };

        let mut state = self.state.lock();
        match self.evaluate(&state.current, &trigger, self.timer.current_timestamp())? {
            Some(quote) => {
                trigger.fire(quote);
            }
            None => {
                trigger.id = next_id(&mut state);
                debug!(
                    relation = relation.as_str(),
                    limit = %amount_out_limit,
                    "Registered conditional quote"
                );
                state.triggers.push(trigger);
            }
        }
        Ok(PendingQuote::new(rx))
    }

    /// Registers a conditional quote that can be re-levelled or cancelled.
    /// It fires immediately if the condition already holds, and stays
    /// registered after firing.
    ///
    /// # Errors
    ///
    /// As for [`quote_when`](Self::quote_when).
    pub fn mutable_quote_when(
        self: &Arc<Self>,
        relation: Relation,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.ensure_pair(&amount_in.brand, &amount_out_limit.brand)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        let mut trigger = Trigger {
            id: next_id(&mut state),
            relation,
            amount_in: amount_in.clone(),
            limit: amount_out_limit.clone(),
            resolver: Resolver::Repeating(tx),
        };
        if let Some(quote) =
            self.evaluate(&state.current, &trigger, self.timer.current_timestamp())?
        {
            trigger.fire(quote);
        }
        let id = trigger.id;
        state.triggers.push(trigger);
        drop(state);

        Ok(MutableQuote::new(id, Arc::clone(self), rx))
    }

    /// Returns a live stream of quotes for `amount_in`, one per price update.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::BrandMismatch`] if the brands are not this pair.
    pub fn make_quote_notifier(
        &self,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<QuoteNotifier> {
        self.ensure_pair(&amount_in.brand, brand_out)?;
        Ok(QuoteNotifier::new(
            self.snapshots.subscribe(),
            Arc::clone(&self.issuer),
            amount_in.clone(),
            brand_out.clone(),
        ))
    }

    /// Quotes `amount_in` at whatever the price is once the timer reaches
    /// `deadline`. A deadline equal to the current time resolves at once.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::DeadlinePassed`] if `deadline` is earlier than
    /// the timer's current time, [`OnrampError::BrandMismatch`] if the
    /// brands are not this pair, or [`OnrampError::Runtime`] when called
    /// outside a Tokio runtime.
    pub fn quote_at_time(
        self: &Arc<Self>,
        deadline: Timestamp,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<PendingQuote> {
        self.ensure_pair(&amount_in.brand, brand_out)?;
        let now = self.timer.current_timestamp();
        if deadline < now {
            return Err(OnrampError::DeadlinePassed {
                deadline: deadline.abs_value,
                now: now.abs_value,
            });
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OnrampError::Runtime(e.to_string()))?;

        let (mut tx, rx) = oneshot::channel();
        let wake = self.timer.wake_at(deadline);
        let authority = Arc::clone(self);
        let amount_in = amount_in.clone();
        let brand_out = brand_out.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = wake => {}
                () = tx.closed() => return,
            }
            match authority.quote_given(&amount_in, &brand_out) {
                Ok(quote) => {
                    let _ = tx.send(quote);
                }
                // Dropping `tx` resolves the pending quote as cancelled.
                Err(e) => warn!(deadline = %deadline, "Deadline quote failed: {e}"),
            }
        });
        Ok(PendingQuote::new(rx))
    }

    pub(crate) fn update_trigger(&self, id: u64, amount_in: Amount, limit: Amount) -> Result<()> {
        self.ensure_pair(&amount_in.brand, &limit.brand)?;
        let timestamp = self.timer.current_timestamp();

        let mut state = self.state.lock();
        let current = state.current.clone();
        let index = state
            .triggers
            .iter()
            .position(|t| t.id == id)
            .ok_or(OnrampError::QuoteCancelled)?;

        let trigger = &mut state.triggers[index];
        trigger.amount_in = amount_in;
        trigger.limit = limit;
        if let Some(quote) = self.evaluate(&current, trigger, timestamp)? {
            trigger.fire(quote);
        }
        Ok(())
    }

    pub(crate) fn remove_trigger(&self, id: u64) {
        self.state.lock().triggers.retain(|t| t.id != id);
    }

    fn fire_triggers(&self, state: &mut AuthorityState, timestamp: Timestamp) {
        let current = state.current.clone();
        state.triggers.retain_mut(|trigger| {
            if trigger.is_abandoned() {
                return false;
            }
            match self.evaluate(&current, trigger, timestamp) {
                Ok(Some(quote)) => trigger.fire(quote),
                Ok(None) => true,
                Err(e) => {
                    debug!(id = trigger.id, "Trigger not evaluable at this price: {e}");
                    true
                }
            }
        });
    }

    /// The quote to deliver if `trigger`'s condition holds at `price`.
    fn evaluate(
        &self,
        price: &Ratio,
        trigger: &Trigger,
        timestamp: Timestamp,
    ) -> Result<Option<PriceQuote>> {
        let amount_out = price.convert(&trigger.amount_in, Rounding::Floor)?;
        amount_out.ensure_same_brand(&trigger.limit)?;
        if !trigger.relation.holds(amount_out.value, trigger.limit.value) {
            return Ok(None);
        }
        self.issuer
            .mint(QuoteDescription {
                amount_in: trigger.amount_in.clone(),
                amount_out,
                timestamp,
            })
            .map(Some)
    }

    fn mint(&self, amount_in: Amount, amount_out: Amount) -> Result<PriceQuote> {
        self.issuer.mint(QuoteDescription {
            amount_in,
            amount_out,
            timestamp: self.timer.current_timestamp(),
        })
    }

    /// Fails unless `{a, b}` is this pair, in either order.
    fn ensure_pair(&self, a: &Brand, b: &Brand) -> Result<()> {
        let forward = *a == self.brand_in && *b == self.brand_out;
        let reverse = *a == self.brand_out && *b == self.brand_in;
        if forward || reverse {
            Ok(())
        } else {
            Err(OnrampError::BrandMismatch {
                expected: format!("{}/{}", self.brand_in, self.brand_out),
                actual: format!("{a}/{b}"),
            })
        }
    }
}

fn next_id(state: &mut AuthorityState) -> u64 {
    let id = state.next_trigger_id;
    state.next_trigger_id += 1;
    id
}

fn pair_mismatch(brand_in: &Brand, brand_out: &Brand, price: &Ratio) -> OnrampError {
    OnrampError::BrandMismatch {
        expected: format!("{brand_in}/{brand_out}"),
        actual: format!("{}/{}", price.numerator().brand, price.denominator().brand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisplayInfo;
    use crate::timer::ManualTimer;

    struct Fixture {
        ist: Brand,
        bld: Brand,
        timer: Arc<ManualTimer>,
        authority: Arc<PriceAuthority>,
    }

    fn fixture() -> Fixture {
        let ist = Brand::new("IST", DisplayInfo::with_decimals(6));
        let bld = Brand::new("BLD", DisplayInfo::with_decimals(6));
        let timer = Arc::new(ManualTimer::new(Timestamp::new(100)));
        let initial = Ratio::new(1_000_000, &bld, 1_000_000, &ist).unwrap();
        let authority = Arc::new(
            PriceAuthority::new(
                &ist,
                &bld,
                initial,
                timer.clone(),
                Arc::new(QuoteIssuer::generate()),
            )
            .unwrap(),
        );
        Fixture {
            ist,
            bld,
            timer,
            authority,
        }
    }

    fn price(f: &Fixture, bld_per_million_ist: u128) -> Ratio {
        Ratio::new(bld_per_million_ist, &f.bld, 1_000_000, &f.ist).unwrap()
    }

    #[test]
    fn quote_given_uses_current_price() {
        let f = fixture();
        f.authority.set_price(price(&f, 99_000_000)).unwrap();
        let quote = f
            .authority
            .quote_given(&Amount::new(&f.ist, 1_000_000), &f.bld)
            .unwrap();
        assert_eq!(quote.amount_out(), &Amount::new(&f.bld, 99_000_000));
        assert_eq!(quote.quote_amount.timestamp, Timestamp::new(100));
        assert!(f.authority.quote_issuer().verify(&quote));
    }

    #[test]
    fn quote_wanted_rounds_up() {
        let f = fixture();
        // 3 BLD per 1 IST
        f.authority.set_price(price(&f, 3_000_000)).unwrap();
        let quote = f
            .authority
            .quote_wanted(&f.ist, &Amount::new(&f.bld, 10))
            .unwrap();
        assert_eq!(quote.amount_in(), &Amount::new(&f.ist, 4));
    }

    #[test]
    fn set_price_rejects_foreign_pair() {
        let f = fixture();
        let atom = Brand::new("ATOM", DisplayInfo::with_decimals(6));
        let foreign = Ratio::new(1, &atom, 1, &f.ist).unwrap();
        assert!(matches!(
            f.authority.set_price(foreign),
            Err(OnrampError::BrandMismatch { .. })
        ));
        assert_eq!(f.authority.current_price(), price(&f, 1_000_000));
    }

    #[tokio::test]
    async fn quote_when_already_satisfied_resolves_now() {
        let f = fixture();
        f.authority.set_price(price(&f, 99_000_000)).unwrap();
        let mut pending = f
            .authority
            .quote_when(
                Relation::Gte,
                &Amount::new(&f.ist, 1_000_000),
                &Amount::new(&f.bld, 50_000_000),
            )
            .unwrap();
        let quote = pending.try_take().expect("resolved at registration");
        assert_eq!(quote.amount_out().value, 99_000_000);
        assert_eq!(f.authority.pending_triggers(), 0);
    }

    #[tokio::test]
    async fn quote_when_fires_on_crossing_and_is_removed() {
        let f = fixture();
        let pending = f
            .authority
            .quote_when(
                Relation::Gt,
                &Amount::new(&f.ist, 1_000_000),
                &Amount::new(&f.bld, 2_000_000),
            )
            .unwrap();
        assert_eq!(f.authority.pending_triggers(), 1);

        f.authority.set_price(price(&f, 2_000_000)).unwrap();
        assert_eq!(f.authority.pending_triggers(), 1);

        f.authority.set_price(price(&f, 2_500_000)).unwrap();
        assert_eq!(f.authority.pending_triggers(), 0);

        let quote = pending.await.unwrap();
        assert_eq!(quote.amount_out().value, 2_500_000);
    }

    #[tokio::test]
    async fn triggers_resolve_in_registration_order() {
        let f = fixture();
        let amount_in = Amount::new(&f.ist, 1_000_000);
        let mut first = f
            .authority
            .quote_when(Relation::Lt, &amount_in, &Amount::new(&f.bld, 900_000))
            .unwrap();
        let mut second = f
            .authority
            .quote_when(Relation::Lte, &amount_in, &Amount::new(&f.bld, 800_000))
            .unwrap();

        f.authority.set_price(price(&f, 700_000)).unwrap();
        let a = first.try_take().unwrap();
        let b = second.try_take().unwrap();
        assert!(a.receipt.serial < b.receipt.serial);
    }

    #[tokio::test]
    async fn mutable_quote_stays_registered_until_cancelled() {
        let f = fixture();
        let amount_in = Amount::new(&f.ist, 1_000_000);
        let mut mutable = f
            .authority
            .mutable_quote_when(Relation::Gte, &amount_in, &Amount::new(&f.bld, 2_000_000))
            .unwrap();
        assert!(mutable.try_next().is_none());

        f.authority.set_price(price(&f, 2_000_000)).unwrap();
        assert_eq!(mutable.next().await.unwrap().amount_out().value, 2_000_000);

        f.authority.set_price(price(&f, 3_000_000)).unwrap();
        assert_eq!(mutable.next().await.unwrap().amount_out().value, 3_000_000);
        assert_eq!(f.authority.pending_triggers(), 1);

        // Raise the level beyond the current price: nothing fires.
        mutable
            .update_level(amount_in.clone(), Amount::new(&f.bld, 5_000_000))
            .unwrap();
        f.authority.set_price(price(&f, 4_000_000)).unwrap();
        assert!(mutable.try_next().is_none());

        mutable.cancel();
        assert_eq!(f.authority.pending_triggers(), 0);
        f.authority.set_price(price(&f, 6_000_000)).unwrap();
    }

    #[tokio::test]
    async fn mutable_update_level_fires_when_already_met() {
        let f = fixture();
        let amount_in = Amount::new(&f.ist, 1_000_000);
        let mut mutable = f
            .authority
            .mutable_quote_when(Relation::Lt, &amount_in, &Amount::new(&f.bld, 1))
            .unwrap();
        assert!(mutable.try_next().is_none());

        mutable
            .update_level(amount_in, Amount::new(&f.bld, 2_000_000))
            .unwrap();
        assert_eq!(mutable.try_next().unwrap().amount_out().value, 1_000_000);
    }

    #[test]
    fn dropped_pending_quote_is_pruned() {
        let f = fixture();
        let pending = f
            .authority
            .quote_when(
                Relation::Gt,
                &Amount::new(&f.ist, 1),
                &Amount::new(&f.bld, 1_000),
            )
            .unwrap();
        drop(pending);
        f.authority.set_price(price(&f, 2)).unwrap();
        assert_eq!(f.authority.pending_triggers(), 0);
    }

    #[tokio::test]
    async fn notifier_yields_current_then_each_update() {
        let f = fixture();
        let mut notifier = f
            .authority
            .make_quote_notifier(&Amount::new(&f.ist, 1_000_000), &f.bld)
            .unwrap();
        assert_eq!(notifier.next().await.unwrap().amount_out().value, 1_000_000);

        f.authority.set_price(price(&f, 42_000_000)).unwrap();
        assert_eq!(notifier.next().await.unwrap().amount_out().value, 42_000_000);

        let mut restarted = notifier.clone();
        assert_eq!(
            restarted.next().await.unwrap().amount_out().value,
            42_000_000
        );
    }

    #[tokio::test]
    async fn quote_at_time_waits_for_deadline() {
        let f = fixture();
        let pending = f
            .authority
            .quote_at_time(Timestamp::new(110), &Amount::new(&f.ist, 1_000_000), &f.bld)
            .unwrap();

        f.authority.set_price(price(&f, 7_000_000)).unwrap();
        f.timer.advance_to(Timestamp::new(110));

        let quote = pending.await.unwrap();
        assert_eq!(quote.amount_out().value, 7_000_000);
        assert_eq!(quote.quote_amount.timestamp, Timestamp::new(110));
    }

    #[test]
    fn quote_at_time_rejects_past_deadline() {
        let f = fixture();
        let err = f
            .authority
            .quote_at_time(Timestamp::new(99), &Amount::new(&f.ist, 1), &f.bld)
            .unwrap_err();
        assert!(matches!(
            err,
            OnrampError::DeadlinePassed {
                deadline: 99,
                now: 100
            }
        ));
    }

    #[test]
    fn quote_at_time_outside_runtime_is_an_error() {
        let f = fixture();
        let err = f
            .authority
            .quote_at_time(Timestamp::new(100), &Amount::new(&f.ist, 1), &f.bld)
            .unwrap_err();
        assert!(matches!(err, OnrampError::Runtime(_)));
        assert_eq!(f.authority.pending_triggers(), 0);
    }
}
