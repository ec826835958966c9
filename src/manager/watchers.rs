//! Watcher registry and snapshot fan-out.
//!
//! Every watcher is a capacity-1 queue. Delivery is best-effort: a watcher
//! that cannot take a snapshot within the delivery timeout misses it and
//! picks up a later one instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::state::ConfigSnapshot;

/// Identifier of one watcher, unique among the watchers of a proxy.
pub type WatchId = u64;

/// Queue depth per watcher. One slot lets registration hand over the
/// current snapshot without waiting.
const WATCHER_CAPACITY: usize = 1;

/// Result of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
}

/// Registered watchers grouped by proxy id.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    watchers: HashMap<String, BTreeMap<WatchId, mpsc::Sender<Arc<ConfigSnapshot>>>>,
    // Monotonic across all proxies so an id is never handed out twice.
    next_id: WatchId,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher for `proxy_id`, seeding it with `current` if present.
    pub fn register(
        &mut self,
        proxy_id: &str,
        current: Option<Arc<ConfigSnapshot>>,
    ) -> (WatchId, mpsc::Receiver<Arc<ConfigSnapshot>>) {
        let (tx, rx) = mpsc::channel(WATCHER_CAPACITY);

        if let Some(snapshot) = current {
            // Fresh queue with one free slot, cannot fail.
            let _ = tx.try_send(snapshot);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.watchers
            .entry(proxy_id.to_string())
            .or_default()
            .insert(id, tx);

        tracing::debug!(proxy_id, watch_id = id, "Watcher registered");
        (id, rx)
    }

    /// Remove a watcher, closing its queue. Returns `false` if unknown.
    pub fn cancel(&mut self, proxy_id: &str, id: WatchId) -> bool {
        let Some(set) = self.watchers.get_mut(proxy_id) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            self.watchers.remove(proxy_id);
        }
        if removed {
            tracing::debug!(proxy_id, watch_id = id, "Watcher cancelled");
        }
        removed
    }

    /// Offer `snapshot` to every watcher of its proxy, waiting at most
    /// `timeout` per watcher.
    pub async fn broadcast(&self, snapshot: Arc<ConfigSnapshot>, timeout: Duration) -> Delivery {
        let mut outcome = Delivery::default();
        let Some(set) = self.watchers.get(&snapshot.proxy_id) else {
            return outcome;
        };

        for (id, tx) in set {
            match tx.send_timeout(snapshot.clone(), timeout).await {
                Ok(()) => outcome.delivered += 1,
                Err(_) => {
                    tracing::debug!(
                        proxy_id = %snapshot.proxy_id,
                        watch_id = id,
                        "Watcher not ready, skipping snapshot"
                    );
                    outcome.skipped += 1;
                }
            }
        }
        outcome
    }

    /// Close every queue. Returns how many watchers were dropped.
    pub fn close_all(&mut self) -> usize {
        let count = self.len();
        self.watchers.clear();
        count
    }

    /// Number of watchers for one proxy.
    pub fn count(&self, proxy_id: &str) -> usize {
        self.watchers.get(proxy_id).map(|s| s.len()).unwrap_or(0)
    }

    #[cfg(test)]
    fn contains(&self, proxy_id: &str, id: WatchId) -> bool {
        self.watchers
            .get(proxy_id)
            .map(|s| s.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of proxies with at least one watcher.
    #[cfg(test)]
    fn proxy_count(&self) -> usize {
        self.watchers.len()
    }

    /// Total watchers across all proxies.
    pub fn len(&self) -> usize {
        self.watchers.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}
