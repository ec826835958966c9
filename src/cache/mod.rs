//! In-memory result cache.
//!
//! # Data Flow
//! ```text
//! services file / external fetchers
//!     → MemoryCache::put / replace_all
//!     → revision counter bumped (tokio watch channel)
//!     → watch states re-read the keys they depend on
//! ```
//!
//! # Design Decisions
//! - One global revision instead of per-key channels; readers compare content
//! - Values are JSON so the cache stays agnostic of result types

use std::collections::BTreeMap;

use dashmap::DashMap;
use tokio::sync::watch;

/// Cache key holding discovery results for an upstream.
pub fn endpoints_key(upstream: &str) -> String {
    format!("endpoints/{}", upstream)
}

/// Concurrent map of fetched results with change notification.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, serde_json::Value>,
    revision: watch::Sender<u64>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            entries: DashMap::new(),
            revision,
        }
    }

    /// Store a result. Writing an identical value does not bump the revision.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        if self.entries.get(&key).map(|v| *v == value).unwrap_or(false) {
            return;
        }
        self.entries.insert(key, value);
        self.bump();
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let removed = self.entries.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Replace all entries, bumping the revision once if anything changed.
    pub fn replace_all(&self, entries: BTreeMap<String, serde_json::Value>) {
        let mut changed = false;
        self.entries.retain(|k, _| {
            let keep = entries.contains_key(k);
            changed |= !keep;
            keep
        });
        for (key, value) in entries {
            if self.entries.get(&key).map(|v| *v == value).unwrap_or(false) {
                continue;
            }
            self.entries.insert(key, value);
            changed = true;
        }
        if changed {
            self.bump();
        }
    }

    /// Current revision. Increases on every effective change.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Subscribe to revision changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}
