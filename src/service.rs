//! Service start-up and the public operation surface.
//!
//! [`OnrampService::start`] wires a [`PriceRegistry`] to its collaborators,
//! then delivers a [`RegistrationInvitation`] to the configured oracle
//! address. Everything else on [`OnrampService`] is a thin wrapper over the
//! registry that any holder of the service can call.

use std::sync::Arc;

use tracing::{info, warn};

use crate::Result;
use crate::authority::issuer::QuoteIssuer;
use crate::authority::notifier::QuoteNotifier;
use crate::authority::trigger::{MutableQuote, PendingQuote, Relation};
use crate::config::RegistryConfig;
use crate::directory::NameDirectory;
use crate::invitation::RegistrationInvitation;
use crate::models::{Amount, Brand, PriceQuote, QuoteRecord, Ratio, Timestamp};
use crate::registry::PriceRegistry;
use crate::storage::StorageNode;
use crate::timer::TimerService;

/// Child of the root storage node that holds one feed per pair.
pub const PRICE_FEED_NODE: &str = "priceFeed";

/// Facet of the oracle's directory entry that receives invitations.
pub const DEPOSIT_FACET: &str = "depositFacet";

/// A running price registry.
pub struct OnrampService {
    registry: Arc<PriceRegistry>,
    oracle_address: String,
}

impl OnrampService {
    /// Creates the registry under `storage` and delivers the registration
    /// invitation to `config.oracle_address` through `directory`.
    ///
    /// A failed delivery is logged and does not stop the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the price feed storage node cannot be created.
    pub fn start(
        config: &RegistryConfig,
        timer: Arc<dyn TimerService>,
        storage: Arc<dyn StorageNode>,
        directory: &dyn NameDirectory,
        issuer: QuoteIssuer,
    ) -> Result<Self> {
        let feed_node = storage.make_child_node(PRICE_FEED_NODE)?;
        info!(path = feed_node.path(), issuer = issuer.name(), "Starting price registry");

        let registry = Arc::new(PriceRegistry::new(timer, feed_node, Arc::new(issuer)));
        let service = Self {
            registry,
            oracle_address: config.oracle_address.clone(),
        };

        let invitation = RegistrationInvitation::new(Arc::clone(&service.registry));
        let serial = invitation.serial();
        match directory
            .lookup(&service.oracle_address, DEPOSIT_FACET)
            .and_then(|facet| facet.receive(invitation))
        {
            Ok(()) => info!(
                address = %service.oracle_address,
                serial,
                "Registration invitation delivered"
            ),
            Err(e) => warn!(
                address = %service.oracle_address,
                serial,
                "Registration invitation not delivered: {e}"
            ),
        }

        Ok(service)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PriceRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn oracle_address(&self) -> &str {
        &self.oracle_address
    }

    /// Registers a pair directly, without issuing update invitations. Its
    /// price then changes only through [`update_price`](Self::update_price).
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::DuplicateRegistration`](crate::OnrampError::DuplicateRegistration)
    /// if the pair exists in either order.
    pub fn register_price_pair(&self, brand_in: &Brand, brand_out: &Brand) -> Result<()> {
        self.registry.register(brand_in, brand_out)
    }

    /// Mints a registration invitation limited to the pair `brand_in`/`brand_out`.
    #[must_use]
    pub fn register_new_pair(
        &self,
        brand_in: &Brand,
        brand_out: &Brand,
    ) -> RegistrationInvitation {
        let invitation =
            RegistrationInvitation::scoped(Arc::clone(&self.registry), brand_in, brand_out);
        info!(
            serial = invitation.serial(),
            brand_in = %brand_in,
            brand_out = %brand_out,
            "Registration invitation minted"
        );
        invitation
    }

    /// # Errors
    ///
    /// Returns [`OnrampError::UnknownPair`](crate::OnrampError::UnknownPair)
    /// if the pair is not registered.
    pub fn get_quote_issuer(
        &self,
        brand_in: &Brand,
        brand_out: &Brand,
    ) -> Result<Arc<QuoteIssuer>> {
        self.registry.quote_issuer(brand_in, brand_out)
    }

    #[must_use]
    pub fn get_timer_service(&self) -> Arc<dyn TimerService> {
        self.registry.timer()
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_given`].
    pub fn quote_given(&self, amount_in: &Amount, brand_out: &Brand) -> Result<PriceQuote> {
        self.registry.quote_given(amount_in, brand_out)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_wanted`].
    pub fn quote_wanted(&self, brand_in: &Brand, amount_out: &Amount) -> Result<PriceQuote> {
        self.registry.quote_wanted(brand_in, amount_out)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::make_quote_notifier`].
    pub fn make_quote_notifier(
        &self,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<QuoteNotifier> {
        self.registry.make_quote_notifier(amount_in, brand_out)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_at_time`].
    pub fn quote_at_time(
        &self,
        deadline: Timestamp,
        amount_in: &Amount,
        brand_out: &Brand,
    ) -> Result<PendingQuote> {
        self.registry.quote_at_time(deadline, amount_in, brand_out)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_when`].
    pub fn quote_when_lt(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.registry
            .quote_when(Relation::Lt, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_when`].
    pub fn quote_when_lte(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.registry
            .quote_when(Relation::Lte, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_when`].
    pub fn quote_when_gt(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.registry
            .quote_when(Relation::Gt, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::quote_when`].
    pub fn quote_when_gte(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<PendingQuote> {
        self.registry
            .quote_when(Relation::Gte, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::mutable_quote_when`].
    pub fn mutable_quote_when_lt(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.registry
            .mutable_quote_when(Relation::Lt, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::mutable_quote_when`].
    pub fn mutable_quote_when_lte(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.registry
            .mutable_quote_when(Relation::Lte, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::mutable_quote_when`].
    pub fn mutable_quote_when_gt(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.registry
            .mutable_quote_when(Relation::Gt, amount_in, amount_out_limit)
    }

    /// # Errors
    ///
    /// See [`PriceRegistry::mutable_quote_when`].
    pub fn mutable_quote_when_gte(
        &self,
        amount_in: &Amount,
        amount_out_limit: &Amount,
    ) -> Result<MutableQuote> {
        self.registry
            .mutable_quote_when(Relation::Gte, amount_in, amount_out_limit)
    }

    /// Sets and records the price of the pair `new_price` relates.
    ///
    /// # Errors
    ///
    /// See [`PriceRegistry::update_price`].
    pub fn update_price(&self, new_price: Ratio) -> Result<QuoteRecord> {
        self.registry.update_price(new_price)
    }
}
