//! Storage collaborator.
//!
//! A [`StorageNode`] is one path in a hierarchical, append-only store.
//! Every write gets the next version number for that path, and readers can
//! watch the version to learn about new entries. Two adapters are provided:
//! - [`memory`] - process-local, for tests and ephemeral runs
//! - [`file`] - one JSON-lines file per path under a root directory

pub mod file;
pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{OnrampError, Result};

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Joins path segments.
pub const PATH_SEPARATOR: char = '.';

/// A persisted value and the version it was written at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub version: u64,
    pub value: String,
}

/// One node of the storage hierarchy.
pub trait StorageNode: Send + Sync {
    /// Full dotted path of this node.
    fn path(&self) -> &str;

    /// Returns the child node `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::Storage`] if `name` is not a valid segment.
    fn make_child_node(&self, name: &str) -> Result<Arc<dyn StorageNode>>;

    /// Appends `value` and returns the new version (starting at 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn write(&self, value: &str) -> Result<u64>;

    /// All entries at this path, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if stored entries cannot be read back.
    fn entries(&self) -> Result<Vec<StoredEntry>>;

    /// Watches the latest version written at this path (0 before any write).
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Checks that `name` can be used as a single path segment.
///
/// # Errors
///
/// Returns [`OnrampError::Storage`] for empty names or names containing
/// anything but ASCII alphanumerics, `_` and `-`.
pub fn validate_segment(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(OnrampError::Storage(format!(
            "invalid storage path segment {name:?}"
        )))
    }
}

/// Path of the child `name` under `parent`.
#[must_use]
pub fn child_path(parent: &str, name: &str) -> String {
    format!("{parent}{PATH_SEPARATOR}{name}")
}
