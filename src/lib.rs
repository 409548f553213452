//! On-ramp price registry.
//!
//! Keeps one price authority per registered pair of brands and routes quote
//! requests to it in either direction. Prices are pushed by an oracle through
//! a chain of single-use update invitations, and every accepted price is
//! appended to the pair's history feed.

pub mod authority;
pub mod config;
pub mod directory;
pub mod error;
pub mod invitation;
pub mod models;
pub mod normalize;
pub mod recorder;
pub mod registry;
pub mod service;
pub mod storage;
pub mod timer;

pub use error::{OnrampError, Result};
