//! Watch state backed by the in-memory cache.
//!
//! Builds a snapshot from the proxy registration plus the discovery results
//! cached for each declared upstream, and publishes a new one whenever the
//! cache changes in a way that affects this proxy.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, oneshot};

use crate::cache::{endpoints_key, MemoryCache};
use crate::local::ServiceDescriptor;
use crate::state::{
    ConfigSnapshot, ProxyState, QuerySource, StateDeps, StateError, StateFactory,
};

/// Snapshot stream depth. Producers wait for the forwarder rather than drop.
const STREAM_CAPACITY: usize = 1;

/// Factory for [`CachedState`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CachedStateFactory;

impl StateFactory<MemoryCache> for CachedStateFactory {
    fn build(
        &self,
        service: &ServiceDescriptor,
        token: &str,
        deps: StateDeps<MemoryCache>,
    ) -> Result<Box<dyn ProxyState>, StateError> {
        Ok(Box::new(CachedState::new(service, token, deps)?))
    }
}

/// Watch state for one proxy, fed by a [`MemoryCache`].
pub struct CachedState {
    service: ServiceDescriptor,
    token: String,
    cache: Arc<MemoryCache>,
    source: Arc<QuerySource>,
    current: Arc<ArcSwapOption<ConfigSnapshot>>,
    stop: Option<oneshot::Sender<()>>,
    closed: bool,
}

impl CachedState {
    pub fn new(
        service: &ServiceDescriptor,
        token: &str,
        deps: StateDeps<MemoryCache>,
    ) -> Result<Self, StateError> {
        if !service.is_connect_proxy() {
            return Err(StateError::NotConnectProxy(service.id.clone()));
        }
        if service.proxy.destination_service_name.is_empty() {
            return Err(StateError::MissingDestination(service.id.clone()));
        }

        Ok(Self {
            service: service.clone(),
            token: token.to_string(),
            cache: deps.cache,
            source: deps.source,
            current: Arc::new(ArcSwapOption::empty()),
            stop: None,
            closed: false,
        })
    }
}

impl ProxyState for CachedState {
    fn changed(&self, service: &ServiceDescriptor, token: &str) -> bool {
        self.service != *service || self.token != token
    }

    fn watch(&mut self) -> Result<mpsc::Receiver<ConfigSnapshot>, StateError> {
        if self.closed {
            return Err(StateError::Closed(self.service.id.clone()));
        }
        if self.stop.is_some() {
            return Err(StateError::AlreadyWatching(self.service.id.clone()));
        }

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);

        let publisher = Publisher {
            service: self.service.clone(),
            cache: self.cache.clone(),
            current: self.current.clone(),
        };
        tracing::debug!(
            proxy_id = %self.service.id,
            datacenter = %self.source.datacenter,
            "Starting cached watch state"
        );
        tokio::spawn(publisher.run(tx, stop_rx));

        Ok(rx)
    }

    fn current_snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.current.load_full()
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for CachedState {
    fn drop(&mut self) {
        self.close();
    }
}

struct Publisher {
    service: ServiceDescriptor,
    cache: Arc<MemoryCache>,
    current: Arc<ArcSwapOption<ConfigSnapshot>>,
}

impl Publisher {
    async fn run(self, tx: mpsc::Sender<ConfigSnapshot>, mut stop: oneshot::Receiver<()>) {
        let mut revisions = self.cache.subscribe();
        let mut last: Option<ConfigSnapshot> = None;

        loop {
            let _ = revisions.borrow_and_update();
            let snapshot = self.build();

            if last.as_ref() != Some(&snapshot) {
                // Visible before it is queued; see `ProxyState::current_snapshot`.
                self.current.store(Some(Arc::new(snapshot.clone())));
                last = Some(snapshot.clone());

                tokio::select! {
                    _ = &mut stop => break,
                    sent = tx.send(snapshot) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                _ = &mut stop => break,
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::trace!(proxy_id = %self.service.id, "Cached watch state stopped");
    }

    fn build(&self) -> ConfigSnapshot {
        let upstream_endpoints: BTreeMap<String, serde_json::Value> = self
            .service
            .proxy
            .upstreams
            .iter()
            .filter_map(|u| {
                let id = u.identifier();
                self.cache.get(&endpoints_key(&id)).map(|v| (id, v))
            })
            .collect();

        ConfigSnapshot {
            proxy_id: self.service.id.clone(),
            address: self.service.address.clone(),
            port: self.service.port,
            proxy: self.service.proxy.clone(),
            upstream_endpoints,
        }
    }
}
