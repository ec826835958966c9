//! In-memory local registry.

use std::collections::HashMap;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::local::{LocalRegistry, ServiceDescriptor};
use crate::manager::ChangeSignal;

#[derive(Debug, Clone)]
struct LocalService {
    service: ServiceDescriptor,
    token: String,
}

/// Thread-safe registry of the services registered on this agent.
#[derive(Debug, Default)]
pub struct LocalState {
    services: DashMap<String, LocalService>,
    subscribers: Mutex<Vec<ChangeSignal>>,
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a service.
    pub fn add_service(&self, service: ServiceDescriptor, token: impl Into<String>) {
        let id = service.id.clone();
        self.services.insert(
            id.clone(),
            LocalService {
                service,
                token: token.into(),
            },
        );
        tracing::debug!(service_id = %id, "Service registered");
        self.broadcast_change();
    }

    /// Deregister a service. Returns `false` if it was not registered.
    pub fn remove_service(&self, id: &str) -> bool {
        let removed = self.services.remove(id).is_some();
        if removed {
            tracing::debug!(service_id = %id, "Service deregistered");
            self.broadcast_change();
        }
        removed
    }

    /// Replace the whole service set, sending at most one notification.
    ///
    /// Returns `true` when anything changed.
    pub fn sync_services(&self, desired: Vec<(ServiceDescriptor, String)>) -> bool {
        let mut changed = false;
        let wanted: HashMap<String, (ServiceDescriptor, String)> = desired
            .into_iter()
            .map(|(svc, token)| (svc.id.clone(), (svc, token)))
            .collect();

        self.services.retain(|id, _| {
            let keep = wanted.contains_key(id);
            changed |= !keep;
            keep
        });

        for (id, (service, token)) in wanted {
            let unchanged = self
                .services
                .get(&id)
                .map(|existing| existing.service == service && existing.token == token)
                .unwrap_or(false);
            if !unchanged {
                self.services.insert(id, LocalService { service, token });
                changed = true;
            }
        }

        if changed {
            tracing::info!(services = self.services.len(), "Local services synchronized");
            self.broadcast_change();
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn broadcast_change(&self) {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for signal in subscribers.iter() {
            signal.notify();
        }
    }
}

impl LocalRegistry for LocalState {
    fn services(&self) -> HashMap<String, ServiceDescriptor> {
        self.services
            .iter()
            .map(|r| (r.key().clone(), r.value().service.clone()))
            .collect()
    }

    fn service_token(&self, id: &str) -> String {
        self.services
            .get(id)
            .map(|r| r.value().token.clone())
            .unwrap_or_default()
    }

    fn notify(&self, signal: ChangeSignal) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if !subscribers.contains(&signal) {
            subscribers.push(signal);
        }
    }

    fn stop_notify(&self, signal: &ChangeSignal) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|s| s != signal);
    }
}
