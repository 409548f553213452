//! Shared test utilities and constants.

#![allow(dead_code)]

use std::sync::Arc;

use onramp::authority::issuer::QuoteIssuer;
use onramp::config::RegistryConfig;
use onramp::directory::{DepositFacet, InvitationPurse, MemoryDirectory};
use onramp::models::{Brand, DisplayInfo, Timestamp};
use onramp::service::{DEPOSIT_FACET, OnrampService};
use onramp::storage::MemoryStorage;
use onramp::timer::{ManualTimer, TimerService};

/// Root storage node used by every test service.
pub const ROOT_NODE: &str = "onrampPriceRegistry";

/// Feed path of the IST/BLD pair under [`ROOT_NODE`].
pub const BLD_IST_FEED: &str = "onrampPriceRegistry.priceFeed.BLD_IST";

/// A started service plus handles on its in-memory collaborators.
pub struct TestService {
    pub service: OnrampService,
    pub storage: MemoryStorage,
    pub timer: Arc<ManualTimer>,
    pub purse: Arc<InvitationPurse>,
}

/// Starts a service whose oracle address resolves to a fresh purse.
pub fn start_service() -> TestService {
    let config = RegistryConfig::default();
    let directory = MemoryDirectory::new();
    let purse = Arc::new(InvitationPurse::new());
    directory.insert(
        &config.oracle_address,
        DEPOSIT_FACET,
        Arc::clone(&purse) as Arc<dyn DepositFacet>,
    );
    start_with(&config, &directory, purse)
}

/// Starts a service against an arbitrary directory.
pub fn start_with(
    config: &RegistryConfig,
    directory: &MemoryDirectory,
    purse: Arc<InvitationPurse>,
) -> TestService {
    let storage = MemoryStorage::root(ROOT_NODE).expect("valid root node");
    let timer = Arc::new(ManualTimer::new(Timestamp::new(1_000)));
    let service = OnrampService::start(
        config,
        Arc::clone(&timer) as Arc<dyn TimerService>,
        Arc::new(storage.clone()),
        directory,
        QuoteIssuer::generate(),
    )
    .expect("service starts");
    TestService {
        service,
        storage,
        timer,
        purse,
    }
}

pub fn ist() -> Brand {
    Brand::new("IST", DisplayInfo::with_decimals(6))
}

pub fn bld() -> Brand {
    Brand::new("BLD", DisplayInfo::with_decimals(6))
}

/// Reads the `lastUpdated` timestamps of every record in a feed.
pub fn feed_timestamps(storage: &MemoryStorage, path: &str) -> Vec<u64> {
    storage
        .read(path)
        .iter()
        .map(|entry| {
            let json: serde_json::Value =
                serde_json::from_str(&entry.value).expect("record is JSON");
            json["lastUpdated"]["absValue"]
                .as_u64()
                .expect("timestamp present")
        })
        .collect()
}
