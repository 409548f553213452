//! Crate-level error types.
//!
//! [`OnrampError`] unifies every failure the registry can surface (routing,
//! registration, capability misuse, storage, configuration) behind a single
//! enum so callers can match on the variant they care about while still
//! using the `?` operator for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OnrampError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum OnrampError {
    /// A price pair is already registered for this unordered pair of brands.
    #[error("price pair already exists for {pair_id}")]
    DuplicateRegistration { pair_id: String },

    /// No price authority is registered in either direction.
    #[error("no price authority for {brand_in} -> {brand_out}")]
    UnknownPair { brand_in: String, brand_out: String },

    /// A ratio could not be constructed or applied.
    #[error("invalid ratio: {0}")]
    InvalidRatio(String),

    /// An update capability was superseded or already exercised.
    #[error("update capability for {pair_id} is no longer valid")]
    StaleCapabilityUse { pair_id: String },

    /// The first registration capability could not reach its recipient.
    #[error("could not deliver invitation to {address}: {reason}")]
    DeliveryFailure { address: String, reason: String },

    /// Two amounts (or an amount and a scoped capability) disagree on brand.
    #[error("brand mismatch: expected {expected}, got {actual}")]
    BrandMismatch { expected: String, actual: String },

    /// `quote_at_time` was asked for a deadline the timer has already passed.
    #[error("deadline {deadline} is before current time {now}")]
    DeadlinePassed { deadline: u64, now: u64 },

    /// A pending quote was dropped by the engine before it resolved.
    #[error("quote was cancelled before it resolved")]
    QuoteCancelled,

    /// A deferred quote was requested with no async runtime to drive it.
    #[error("no async runtime: {0}")]
    Runtime(String),

    /// The storage collaborator rejected a write or child node.
    #[error("storage error: {0}")]
    Storage(String),

    /// A configuration value could not be found or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
