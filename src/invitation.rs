//! Oracle capabilities.
//!
//! The oracle starts with a single [`RegistrationInvitation`]. Exercising
//! it registers one pair and hands back an [`UpdateInvitationMaker`] and
//! the pair's first [`UpdateInvitation`]. Each update invitation can be
//! exercised once, and exercising it returns the next one in the chain.
//!
//! Handles are move-only. Per pair, only the most recently minted update
//! invitation is accepted: minting a new one from the maker supersedes
//! whatever was outstanding.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::models::{Brand, QuoteRecord, Ratio};
use crate::registry::{PairEntry, PairKey, PriceRegistry};
use crate::{OnrampError, Result};

static NEXT_INVITATION_SERIAL: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_INVITATION_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Single-use capability to register a price pair.
pub struct RegistrationInvitation {
    registry: Arc<PriceRegistry>,
    serial: u64,
    /// Pair this invitation is limited to, if any.
    scope: Option<PairKey>,
}

/// Result of exercising a [`RegistrationInvitation`].
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub invitation_maker: UpdateInvitationMaker,
    pub first_invitation: UpdateInvitation,
}

impl RegistrationInvitation {
    pub(crate) fn new(registry: Arc<PriceRegistry>) -> Self {
        Self {
            registry,
            serial: next_serial(),
            scope: None,
        }
    }

    /// An invitation that can only register the pair `a`/`b`.
    pub(crate) fn scoped(registry: Arc<PriceRegistry>, a: &Brand, b: &Brand) -> Self {
        Self {
            scope: Some(PairKey::new(a, b)),
            ..Self::new(registry)
        }
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Registers `brand_in`/`brand_out` and returns its update capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::DuplicateRegistration`] if the pair is already
    /// registered, [`OnrampError::BrandMismatch`] if the invitation is
    /// scoped to another pair, or any error from creating the pair's
    /// storage node.
    pub fn exercise(self, brand_in: &Brand, brand_out: &Brand) -> Result<RegistrationOutcome> {
        let requested = PairKey::new(brand_in, brand_out);
        if let Some(scope) = self.scope.as_ref().filter(|scope| **scope != requested) {
            let (a, b) = scope.brands();
            return Err(OnrampError::BrandMismatch {
                expected: format!("{a}/{b}"),
                actual: format!("{brand_in}/{brand_out}"),
            });
        }
        self.registry.register(brand_in, brand_out)?;
        let entry = self.registry.entry_for(brand_in, brand_out)?;
        let invitation_maker = UpdateInvitationMaker {
            registry: Arc::clone(&self.registry),
            key: entry.key.clone(),
        };
        let first_invitation = invitation_maker.make_invitation()?;
        info!(
            serial = self.serial,
            pair_id = %entry.pair_id,
            "Registration invitation exercised"
        );
        Ok(RegistrationOutcome {
            invitation_maker,
            first_invitation,
        })
    }
}

impl fmt::Debug for RegistrationInvitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationInvitation")
            .field("serial", &self.serial)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Mints update invitations for one pair.
#[derive(Clone)]
pub struct UpdateInvitationMaker {
    registry: Arc<PriceRegistry>,
    key: PairKey,
}

impl UpdateInvitationMaker {
    /// Mints a fresh update invitation. Any invitation minted earlier for
    /// this pair stops being accepted.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`] if the pair is no longer
    /// routable.
    pub fn make_invitation(&self) -> Result<UpdateInvitation> {
        let (a, b) = self.key.brands();
        let entry = self.registry.entry_for(a, b)?;
        let epoch = {
            let mut chain = entry.chain.lock();
            chain.epoch += 1;
            chain.epoch
        };
        Ok(UpdateInvitation {
            registry: Arc::clone(&self.registry),
            entry,
            epoch,
        })
    }
}

impl fmt::Debug for UpdateInvitationMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateInvitationMaker")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Single-use capability to set one pair's price.
#[must_use = "an update invitation does nothing unless exercised"]
pub struct UpdateInvitation {
    registry: Arc<PriceRegistry>,
    entry: Arc<PairEntry>,
    epoch: u64,
}

/// Result of exercising an [`UpdateInvitation`].
#[derive(Debug)]
pub struct UpdateOutcome {
    /// Capability for the following update.
    pub next_invitation: UpdateInvitation,
    pub message: String,
    /// The history record written for this update.
    pub record: QuoteRecord,
}

impl UpdateInvitation {
    #[must_use]
    pub fn pair_id(&self) -> &str {
        &self.entry.pair_id
    }

    /// Whether this is still the pair's accepted update capability.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.entry.chain.lock().epoch == self.epoch
    }

    /// Records `new_price`, applies it to the pair's authority and returns
    /// the next invitation in the chain.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::StaleCapabilityUse`] if a newer invitation
    /// has been minted for this pair, [`OnrampError::BrandMismatch`] if
    /// `new_price` is for a different pair, or a storage error if the
    /// record could not be written. On error the price and history are
    /// unchanged and this invitation is consumed; a new one can be
    /// minted from the [`UpdateInvitationMaker`].
    pub fn exercise(self, new_price: Ratio) -> Result<UpdateOutcome> {
        let entry = self.entry;
        let mut chain = entry.chain.lock();
        if chain.epoch != self.epoch {
            warn!(
                pair_id = %entry.pair_id,
                epoch = self.epoch,
                current = chain.epoch,
                "Rejected superseded update invitation"
            );
            return Err(OnrampError::StaleCapabilityUse {
                pair_id: entry.pair_id.clone(),
            });
        }
        let record = self.registry.apply_update(&entry, &mut chain, new_price)?;
        chain.epoch += 1;
        let next_epoch = chain.epoch;
        drop(chain);

        let message = format!(
            "Price updated for pair {} - {} as {}: {}",
            record.amount_out.amount.brand,
            record.amount_in.amount.brand,
            record.amount_out.amount.value,
            record.amount_in.amount.value,
        );
        info!(pair_id = %entry.pair_id, epoch = next_epoch, "{message}");

        Ok(UpdateOutcome {
            next_invitation: UpdateInvitation {
                registry: self.registry,
                entry,
                epoch: next_epoch,
            },
            message,
            record,
        })
    }
}

impl fmt::Debug for UpdateInvitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateInvitation")
            .field("pair_id", &self.entry.pair_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::issuer::QuoteIssuer;
    use crate::models::{Amount, DisplayInfo, Timestamp};
    use crate::storage::{MemoryStorage, StorageNode};
    use crate::timer::ManualTimer;

    struct Fixture {
        registry: Arc<PriceRegistry>,
        storage: MemoryStorage,
        timer: Arc<ManualTimer>,
        ist: Brand,
        bld: Brand,
    }

    fn fixture() -> Fixture {
        let storage = MemoryStorage::root("onramp").unwrap();
        let timer = Arc::new(ManualTimer::new(Timestamp::new(10)));
        let registry = Arc::new(PriceRegistry::new(
            Arc::clone(&timer) as Arc<dyn crate::timer::TimerService>,
            storage.make_child_node("priceFeed").unwrap(),
            Arc::new(QuoteIssuer::generate()),
        ));
        Fixture {
            registry,
            storage,
            timer,
            ist: Brand::new("IST", DisplayInfo::with_decimals(6)),
            bld: Brand::new("BLD", DisplayInfo::with_decimals(6)),
        }
    }

    #[test]
    fn registration_returns_working_first_invitation() {
        let f = fixture();
        let outcome = RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.ist, &f.bld)
            .unwrap();
        assert_eq!(outcome.first_invitation.pair_id(), "BLD_IST");

        let price = Ratio::new(1_000_000, &f.ist, 99_000_000, &f.bld).unwrap();
        let updated = outcome.first_invitation.exercise(price).unwrap();
        assert_eq!(
            updated.message,
            "Price updated for pair BLD - IST as 99000000: 1000000"
        );
        assert!(updated.next_invitation.is_current());

        let quote = f
            .registry
            .quote_given(&Amount::new(&f.ist, 1_000_000), &f.bld)
            .unwrap();
        assert_eq!(quote.amount_out().value, 99_000_000);
    }

    #[test]
    fn chain_of_updates_is_recorded_in_order() {
        let f = fixture();
        let outcome = RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.ist, &f.bld)
            .unwrap();

        let mut invitation = outcome.first_invitation;
        for (t, bld) in [(10, 97_000_000u128), (12, 98_000_000), (15, 99_000_000)] {
            f.timer.advance_to(Timestamp::new(t));
            let price = Ratio::new(1_000_000, &f.ist, bld, &f.bld).unwrap();
            invitation = invitation.exercise(price).unwrap().next_invitation;
        }

        let feed = f.storage.read("onramp.priceFeed.BLD_IST");
        let stamps: Vec<u64> = feed
            .iter()
            .map(|entry| {
                let json: serde_json::Value = serde_json::from_str(&entry.value).unwrap();
                json["lastUpdated"]["absValue"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(stamps, vec![10, 12, 15]);
    }

    #[test]
    fn newer_invitation_supersedes_outstanding_one() {
        let f = fixture();
        let outcome = RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.ist, &f.bld)
            .unwrap();
        let stale = outcome.first_invitation;
        let fresh = outcome.invitation_maker.make_invitation().unwrap();
        assert!(!stale.is_current());

        let price = Ratio::new(1, &f.ist, 2, &f.bld).unwrap();
        assert!(matches!(
            stale.exercise(price.clone()),
            Err(OnrampError::StaleCapabilityUse { .. })
        ));
        assert!(f.storage.read("onramp.priceFeed.BLD_IST").is_empty());

        fresh.exercise(price).unwrap();
        assert_eq!(f.storage.read("onramp.priceFeed.BLD_IST").len(), 1);
    }

    #[test]
    fn foreign_pair_price_is_rejected() {
        let f = fixture();
        let outcome = RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.ist, &f.bld)
            .unwrap();
        let kes = Brand::new("KES", DisplayInfo::with_decimals(2));
        let before = f.registry.route_for(&f.ist, &f.bld).unwrap().current_price();

        let price = Ratio::new(1, &f.ist, 134, &kes).unwrap();
        assert!(matches!(
            outcome.first_invitation.exercise(price),
            Err(OnrampError::BrandMismatch { .. })
        ));
        assert_eq!(
            f.registry.route_for(&f.ist, &f.bld).unwrap().current_price(),
            before
        );

        let replacement = outcome.invitation_maker.make_invitation().unwrap();
        assert!(replacement.is_current());
    }

    #[test]
    fn scoped_invitation_only_registers_its_pair() {
        let f = fixture();
        let kes = Brand::new("KES", DisplayInfo::with_decimals(2));
        let invitation = RegistrationInvitation::scoped(Arc::clone(&f.registry), &f.ist, &kes);
        let err = invitation.exercise(&f.ist, &f.bld).unwrap_err();
        assert!(matches!(err, OnrampError::BrandMismatch { .. }));
        assert!(f.registry.is_empty());

        RegistrationInvitation::scoped(Arc::clone(&f.registry), &f.ist, &kes)
            .exercise(&kes, &f.ist)
            .unwrap();
        assert_eq!(f.registry.pair_ids(), vec!["IST_KES"]);
    }

    #[test]
    fn duplicate_registration_through_invitation_fails() {
        let f = fixture();
        RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.ist, &f.bld)
            .unwrap();
        let err = RegistrationInvitation::new(Arc::clone(&f.registry))
            .exercise(&f.bld, &f.ist)
            .unwrap_err();
        assert!(matches!(err, OnrampError::DuplicateRegistration { .. }));
        assert_eq!(f.registry.len(), 1);
    }
}
