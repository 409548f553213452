use std::sync::Arc;

use onramp::OnrampError;
use onramp::authority::issuer::QuoteIssuer;
use onramp::config::fetch_config;
use onramp::directory::{DepositFacet, InvitationPurse, MemoryDirectory};
use onramp::models::{Amount, Brand, DisplayInfo, Ratio};
use onramp::service::{DEPOSIT_FACET, OnrampService};
use onramp::storage::{FileStorage, MemoryStorage, StorageNode};
use onramp::timer::SystemTimer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), OnrampError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onramp=info")),
        )
        .init();

    let app_config = fetch_config()?;
    let config = &app_config.registry;

    let storage: Arc<dyn StorageNode> = match &config.storage_dir {
        Some(dir) => Arc::new(FileStorage::open(dir, &config.storage_node)?),
        None => Arc::new(MemoryStorage::root(&config.storage_node)?),
    };
    let issuer = match &config.quote_key {
        Some(key) => QuoteIssuer::new(key.clone()),
        None => QuoteIssuer::generate(),
    };

    let directory = MemoryDirectory::new();
    let purse = Arc::new(InvitationPurse::new());
    directory.insert(
        &config.oracle_address,
        DEPOSIT_FACET,
        Arc::clone(&purse) as Arc<dyn DepositFacet>,
    );

    let service = OnrampService::start(
        config,
        Arc::new(SystemTimer::new()),
        storage,
        &directory,
        issuer,
    )?;

    let invitation = purse.take().ok_or_else(|| OnrampError::DeliveryFailure {
        address: config.oracle_address.clone(),
        reason: "registration invitation was not received".to_string(),
    })?;

    let ist = Brand::new("IST", DisplayInfo::with_decimals(6));
    let bld = Brand::new("BLD", DisplayInfo::with_decimals(6));
    let registered = invitation.exercise(&ist, &bld)?;

    let one_ist = Amount::new(&ist, 1_000_000);
    let mut notifier = service.make_quote_notifier(&one_ist, &bld)?;
    if let Some(quote) = notifier.next().await {
        info!(amount_out = %quote.amount_out(), "Initial quote");
    }

    let price = Ratio::new(1_000_000, &ist, 99_000_000, &bld)?;
    let updated = registered.first_invitation.exercise(price)?;
    info!("{}", updated.message);

    if let Some(quote) = notifier.next().await {
        info!(amount_out = %quote.amount_out(), "Notifier quote");
    }

    let quote = service.quote_given(&one_ist, &bld)?;
    info!(
        amount_in = %quote.amount_in(),
        amount_out = %quote.amount_out(),
        serial = quote.receipt.serial,
        "Quote given"
    );
    if let Some(price) = updated.record.display_price() {
        info!(%price, "BLD per IST");
    }

    Ok(())
}
