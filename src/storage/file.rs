//! File-backed storage adapter.
//!
//! Each path maps to `<root_dir>/<path>.jsonl`; every line is one
//! [`StoredEntry`]. Versions resume from the existing line count when a
//! tree is reopened.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{StorageNode, StoredEntry, child_path, validate_segment};
use crate::Result;

/// Durable storage rooted at a directory. Clones share version state.
#[derive(Clone)]
pub struct FileStorage {
    root_dir: PathBuf,
    path: String,
    versions: Arc<Mutex<HashMap<String, watch::Sender<u64>>>>,
}

impl FileStorage {
    /// Opens (creating if needed) a tree rooted at `root_dir` whose root
    /// node is `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is invalid or the directory cannot be created.
    pub fn open(root_dir: &Path, name: &str) -> Result<Self> {
        validate_segment(name)?;
        fs::create_dir_all(root_dir)?;
        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            path: name.to_string(),
            versions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn file_for(&self, path: &str) -> PathBuf {
        self.root_dir.join(format!("{path}.jsonl"))
    }

    fn read_file(file: &Path) -> Result<Vec<StoredEntry>> {
        let handle = match File::open(file) {
            Ok(handle) => handle,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(handle).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Gets the version sender for `path`, seeding it from disk on first use.
    fn version_sender(
        &self,
        versions: &mut HashMap<String, watch::Sender<u64>>,
    ) -> Result<watch::Sender<u64>> {
        if let Some(sender) = versions.get(&self.path) {
            return Ok(sender.clone());
        }
        let existing = Self::read_file(&self.file_for(&self.path))?;
        let latest = existing.last().map_or(0, |entry| entry.version);
        let (sender, _) = watch::channel(latest);
        versions.insert(self.path.clone(), sender.clone());
        Ok(sender)
    }
}

/// Appends `line` and runs `sync`. On failure the file is cut back to its
/// prior length, so a line is on disk only if its version was published.
fn append_synced(
    handle: &mut File,
    line: &str,
    sync: impl FnOnce(&File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let start = handle.metadata()?.len();
    let result = writeln!(handle, "{line}").and_then(|()| sync(&*handle));
    if let Err(e) = &result {
        warn!(error = %e, "Append failed, truncating to {start} bytes");
        handle.set_len(start)?;
    }
    result
}

impl StorageNode for FileStorage {
    fn path(&self) -> &str {
        &self.path
    }

    fn make_child_node(&self, name: &str) -> Result<Arc<dyn StorageNode>> {
        validate_segment(name)?;
        Ok(Arc::new(Self {
            root_dir: self.root_dir.clone(),
            path: child_path(&self.path, name),
            versions: Arc::clone(&self.versions),
        }))
    }

    fn write(&self, value: &str) -> Result<u64> {
        let mut versions = self.versions.lock();
        let sender = self.version_sender(&mut versions)?;
        let version = *sender.borrow() + 1;

        let entry = StoredEntry {
            version,
            value: value.to_string(),
        };
        let line = serde_json::to_string(&entry)?;

        let file = self.file_for(&self.path);
        let mut handle = OpenOptions::new().create(true).append(true).open(&file)?;
        append_synced(&mut handle, &line, File::sync_data)?;

        sender.send_replace(version);
        debug!(path = %self.path, version, "Appended storage entry");
        Ok(version)
    }

    fn entries(&self) -> Result<Vec<StoredEntry>> {
        let _guard = self.versions.lock();
        Self::read_file(&self.file_for(&self.path))
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        let mut versions = self.versions.lock();
        match self.version_sender(&mut versions) {
            Ok(sender) => sender.subscribe(),
            // Unreadable history: watch from zero; the next write will fail loudly.
            Err(_) => watch::channel(0).1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let root = FileStorage::open(dir.path(), "onramp").unwrap();
            let feed = root.make_child_node("priceFeed").unwrap();
            assert_eq!(feed.write(r#"{"n":1}"#).unwrap(), 1);
            assert_eq!(feed.write(r#"{"n":2}"#).unwrap(), 2);
        }

        let root = FileStorage::open(dir.path(), "onramp").unwrap();
        let feed = root.make_child_node("priceFeed").unwrap();
        assert_eq!(feed.write(r#"{"n":3}"#).unwrap(), 3);

        let entries = feed.entries().unwrap();
        let versions: Vec<u64> = entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(entries[0].value, r#"{"n":1}"#);
        assert!(dir.path().join("onramp.priceFeed.jsonl").exists());
    }

    #[test]
    fn failed_sync_does_not_leave_unversioned_line() {
        let dir = tempfile::tempdir().unwrap();
        let root = FileStorage::open(dir.path(), "onramp").unwrap();
        assert_eq!(root.write(r#"{"n":1}"#).unwrap(), 1);

        let file = dir.path().join("onramp.jsonl");
        let before = fs::metadata(&file).unwrap().len();
        let mut handle = OpenOptions::new().append(true).open(&file).unwrap();
        let err = append_synced(&mut handle, r#"{"version":2,"value":"lost"}"#, |_| {
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(fs::metadata(&file).unwrap().len(), before);

        assert_eq!(root.write(r#"{"n":2}"#).unwrap(), 2);
        let entries = root.entries().unwrap();
        let versions: Vec<u64> = entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(entries[1].value, r#"{"n":2}"#);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = FileStorage::open(dir.path(), "onramp").unwrap();
        assert!(root.entries().unwrap().is_empty());
        assert_eq!(*root.subscribe().borrow(), 0);
    }
}
