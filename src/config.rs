//! Application configuration loaded from environment variables.
//!
//! Every variable is optional:
//! - `ONRAMP_ORACLE_ADDRESS`: address the registration invitation is delivered to
//! - `ONRAMP_STORAGE_NODE`: name of the root storage node
//! - `ONRAMP_STORAGE_DIR`: directory for on-disk price feeds; in-memory when unset
//! - `ONRAMP_QUOTE_KEY`: base64 key for quote receipts; random when unset

use std::fmt;
use std::path::PathBuf;

use base64::prelude::*;
use zeroize::Zeroizing;

/// Oracle address used when `ONRAMP_ORACLE_ADDRESS` is not set.
pub const DEFAULT_ORACLE_ADDRESS: &str = "agoric1ydzxwh6f893jvpaslmaz6l8j2ulup9a7x8qvvq";

/// Root storage node name used when `ONRAMP_STORAGE_NODE` is not set.
pub const DEFAULT_STORAGE_NODE: &str = "onrampPriceRegistry";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub registry: RegistryConfig,
}

/// Settings for the price registry service.
pub struct RegistryConfig {
    pub oracle_address: String,
    pub storage_node: String,
    pub storage_dir: Option<PathBuf>,
    pub quote_key: Option<Zeroizing<Vec<u8>>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            oracle_address: DEFAULT_ORACLE_ADDRESS.to_string(),
            storage_node: DEFAULT_STORAGE_NODE.to_string(),
            storage_dir: None,
            quote_key: None,
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("oracle_address", &self.oracle_address)
            .field("storage_node", &self.storage_node)
            .field("storage_dir", &self.storage_dir)
            .field("quote_key", &self.quote_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`OnrampError::Config`](crate::OnrampError::Config) if
/// `ONRAMP_QUOTE_KEY` is not valid base64 or decodes to nothing, or if
/// `ONRAMP_STORAGE_NODE` is not a valid path segment.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let oracle_address = non_empty_var("ONRAMP_ORACLE_ADDRESS")
        .unwrap_or_else(|| DEFAULT_ORACLE_ADDRESS.to_string());

    let storage_node =
        non_empty_var("ONRAMP_STORAGE_NODE").unwrap_or_else(|| DEFAULT_STORAGE_NODE.to_string());
    crate::storage::validate_segment(&storage_node).map_err(|e| {
        crate::OnrampError::Config(format!("invalid ONRAMP_STORAGE_NODE: {e}"))
    })?;

    let storage_dir = non_empty_var("ONRAMP_STORAGE_DIR").map(PathBuf::from);

    let quote_key = non_empty_var("ONRAMP_QUOTE_KEY")
        .map(|encoded| decode_key(&encoded))
        .transpose()?;

    Ok(AppConfig {
        registry: RegistryConfig {
            oracle_address,
            storage_node,
            storage_dir,
            quote_key,
        },
    })
}

fn decode_key(encoded: &str) -> crate::Result<Zeroizing<Vec<u8>>> {
    let key = Zeroizing::new(BASE64_STANDARD.decode(encoded.trim()).map_err(|e| {
        crate::OnrampError::Config(format!("ONRAMP_QUOTE_KEY is not valid base64: {e}"))
    })?);
    if key.is_empty() {
        return Err(crate::OnrampError::Config(
            "ONRAMP_QUOTE_KEY decodes to an empty key".to_string(),
        ));
    }
    Ok(key)
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
