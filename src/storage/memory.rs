//! In-memory storage adapter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::{StorageNode, StoredEntry, child_path, validate_segment};
use crate::Result;

struct PathLog {
    entries: Vec<StoredEntry>,
    version: watch::Sender<u64>,
}

impl PathLog {
    fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: Vec::new(),
            version,
        }
    }
}

/// Process-local storage. Clones share the same underlying tree.
#[derive(Clone)]
pub struct MemoryStorage {
    path: String,
    logs: Arc<Mutex<HashMap<String, PathLog>>>,
}

impl MemoryStorage {
    /// Creates the root node of a fresh tree.
    ///
    /// # Errors
    ///
    /// Returns [`OnrampError::Storage`](crate::OnrampError::Storage) if
    /// `name` is not a valid segment.
    pub fn root(name: &str) -> Result<Self> {
        validate_segment(name)?;
        Ok(Self {
            path: name.to_string(),
            logs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Reads any path of this tree by name.
    #[must_use]
    pub fn read(&self, path: &str) -> Vec<StoredEntry> {
        self.logs
            .lock()
            .get(path)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    /// Paths that have been written to, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .logs
            .lock()
            .iter()
            .filter(|(_, log)| !log.entries.is_empty())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

impl StorageNode for MemoryStorage {
    fn path(&self) -> &str {
        &self.path
    }

    fn make_child_node(&self, name: &str) -> Result<Arc<dyn StorageNode>> {
        validate_segment(name)?;
        Ok(Arc::new(Self {
            path: child_path(&self.path, name),
            logs: Arc::clone(&self.logs),
        }))
    }

    fn write(&self, value: &str) -> Result<u64> {
        let mut logs = self.logs.lock();
        let log = logs.entry(self.path.clone()).or_insert_with(PathLog::new);
        let version = log.entries.len() as u64 + 1;
        log.entries.push(StoredEntry {
            version,
            value: value.to_string(),
        });
        log.version.send_replace(version);
        Ok(version)
    }

    fn entries(&self) -> Result<Vec<StoredEntry>> {
        Ok(self.read(&self.path))
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.logs
            .lock()
            .entry(self.path.clone())
            .or_insert_with(PathLog::new)
            .version
            .subscribe()
    }
}
