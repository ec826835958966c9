//! Tracked proxy table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::local::ServiceDescriptor;
use crate::state::{ConfigSnapshot, ProxyState};

/// Incarnation counter for tracked watch states.
pub type Generation = u64;

struct TrackedProxy {
    state: Box<dyn ProxyState>,
    generation: Generation,
}

/// Watch states keyed by proxy id. At most one live state per id.
#[derive(Default)]
pub struct ProxyTable {
    entries: HashMap<String, TrackedProxy>,
    next_generation: Generation,
}

impl ProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tracked state for `service.id` is current for these inputs.
    pub fn is_current(&self, service: &ServiceDescriptor, token: &str) -> bool {
        self.entries
            .get(&service.id)
            .map(|t| !t.state.changed(service, token))
            .unwrap_or(false)
    }

    /// Whether `generation` is still the tracked incarnation of `proxy_id`.
    pub fn is_live(&self, proxy_id: &str, generation: Generation) -> bool {
        self.entries
            .get(proxy_id)
            .map(|t| t.generation == generation)
            .unwrap_or(false)
    }

    /// Track `state` under `proxy_id`, closing any previous state first.
    pub fn insert(&mut self, proxy_id: &str, state: Box<dyn ProxyState>) -> Generation {
        self.remove(proxy_id);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries
            .insert(proxy_id.to_string(), TrackedProxy { state, generation });
        generation
    }

    /// Close and untrack a state. Returns `false` if nothing was tracked.
    pub fn remove(&mut self, proxy_id: &str) -> bool {
        match self.entries.remove(proxy_id) {
            Some(mut tracked) => {
                tracked.state.close();
                true
            }
            None => false,
        }
    }

    pub fn current_snapshot(&self, proxy_id: &str) -> Option<Arc<ConfigSnapshot>> {
        self.entries
            .get(proxy_id)
            .and_then(|t| t.state.current_snapshot())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Close every state. Returns how many were tracked.
    pub fn close_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, mut tracked) in self.entries.drain() {
            tracked.state.close();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
