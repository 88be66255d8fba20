//! In-memory coordination store.
//!
//! [`InMemoryStore`] provides a thread-safe [`CoordinationStore`] using
//! `DashMap<String, Vec<u8>>` keyed by absolute node path. It reproduces the
//! node-tree semantics the repository depends on: recursive creation,
//! sorted child listings, subtree deletion and `NoNode` errors for missing
//! nodes.
//!
//! It also carries the hooks a recovery test needs: failure injection per
//! (operation, path), per-path read delays to force completions out of
//! listing order, and per-operation call counters.
//!
//! # Examples
//!
//! ```
//! use scheduler_recovery::store::memory::InMemoryStore;
//! use scheduler_recovery::store::backend::StoreOp;
//!
//! let store = InMemoryStore::new();
//! store.seed("/svc/tasks/t1", b"");
//! store.fail_on(StoreOp::ReadNode, "/svc/tasks/t1");
//! assert!(store.contains("/svc/tasks"));
//! ```

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::backend::{CoordinationStore, StoreError, StoreOp};

const ROOT: &str = "/";

/// Thread-safe in-memory node tree using [`DashMap`].
///
/// Ancestors are materialised as real nodes with empty payloads, the way a
/// `mkdirp` against a coordination service leaves them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: DashMap<String, Vec<u8>>,
    faults: Mutex<HashSet<(StoreOp, String)>>,
    read_delays: DashMap<String, Duration>,
    calls: DashMap<StoreOp, usize>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes, ancestors included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if a node exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        path == ROOT || self.nodes.contains_key(path)
    }

    /// Returns a copy of the payload at `path`, if the node exists.
    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes.get(path).map(|entry| entry.value().clone())
    }

    /// Creates `path` (and its ancestors) with the given payload, bypassing
    /// call counters and injected failures.
    pub fn seed(&self, path: &str, data: &[u8]) {
        self.ensure_path(path);
        self.nodes.insert(path.to_string(), data.to_vec());
    }

    /// Makes every subsequent `op` against exactly `path` fail with a
    /// [`StoreError::Backend`] until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, op: StoreOp, path: impl Into<String>) {
        self.faults.lock().insert((op, path.into()));
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.faults.lock().clear();
    }

    /// Delays every read of `path` by `delay` before it touches the tree.
    pub fn delay_reads(&self, path: impl Into<String>, delay: Duration) {
        self.read_delays.insert(path.into(), delay);
    }

    /// Number of times `op` has been invoked through the trait.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.get(&op).map_or(0, |count| *count)
    }

    fn record_call(&self, op: StoreOp, path: &str) -> Result<(), StoreError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.faults.lock().contains(&(op, path.to_string())) {
            return Err(StoreError::backend(format!("injected {op} failure on {path}")));
        }
        Ok(())
    }

    fn ensure_path(&self, path: &str) {
        let mut current = String::with_capacity(path.len());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.nodes.entry(current.clone()).or_default();
        }
    }
}

/// Returns the parent of an absolute path, `/` for top-level nodes.
fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => ROOT,
        Some((parent, _)) => parent,
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.record_call(StoreOp::ListChildren, path)?;
        if !self.contains(path) {
            return Err(StoreError::NoNode {
                path: path.to_string(),
            });
        }
        let mut children: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| parent_of(entry.key()) == path)
            .filter_map(|entry| entry.key().rsplit('/').next().map(str::to_string))
            .collect();
        children.sort();
        Ok(children)
    }

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.record_call(StoreOp::ReadNode, path)?;
        let delay = self.read_delays.get(path).map(|entry| *entry.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.data(path).ok_or_else(|| StoreError::NoNode {
            path: path.to_string(),
        })
    }

    async fn create_path(&self, path: &str) -> Result<(), StoreError> {
        self.record_call(StoreOp::CreatePath, path)?;
        self.ensure_path(path);
        Ok(())
    }

    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.record_call(StoreOp::WriteNode, path)?;
        let mut entry = self.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode {
            path: path.to_string(),
        })?;
        *entry.value_mut() = data.to_vec();
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> Result<(), StoreError> {
        self.record_call(StoreOp::DeleteNode, path)?;
        if !self.nodes.contains_key(path) {
            return Err(StoreError::NoNode {
                path: path.to_string(),
            });
        }
        let prefix = format!("{path}/");
        self.nodes
            .retain(|key, _| key != path && !key.starts_with(&prefix));
        Ok(())
    }
}
