//! The proxy configuration manager.
//!
//! Tracks every connect proxy registered with the local agent, keeps one
//! watch state per proxy, and fans each state's snapshots out to the
//! watchers registered for that proxy.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::local::{LocalRegistry, ServiceDescriptor};
use crate::manager::proxies::{Generation, ProxyTable};
use crate::manager::watchers::{WatchId, WatcherRegistry};
use crate::manager::{ChangeSignal, ManagerError};
use crate::observability::metrics;
use crate::state::{ConfigSnapshot, QuerySource, StateDeps, StateError, StateFactory};

/// How long a broadcast waits on a single watcher before skipping it.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// External dependencies of a [`Manager`]. All collaborators are required.
pub struct ManagerConfig<C> {
    /// Cache handed through to every watch state.
    pub cache: Option<Arc<C>>,

    /// Registry watched for proxy registrations.
    pub registry: Option<Arc<dyn LocalRegistry>>,

    /// Identity of this agent, handed through to every watch state.
    pub source: Option<QuerySource>,

    /// Builds a watch state per proxy.
    pub states: Option<Arc<dyn StateFactory<C>>>,

    /// Per-watcher bound on a single delivery attempt.
    pub delivery_timeout: Duration,
}

impl<C> Default for ManagerConfig<C> {
    fn default() -> Self {
        Self {
            cache: None,
            registry: None,
            source: None,
            states: None,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

struct Shared {
    // None once the manager has been closed.
    signal: Option<ChangeSignal>,
    proxies: ProxyTable,
    watchers: WatcherRegistry,
}

struct Inner<C> {
    cache: Arc<C>,
    registry: Arc<dyn LocalRegistry>,
    source: Arc<QuerySource>,
    states: Arc<dyn StateFactory<C>>,
    delivery_timeout: Duration,
    shared: Mutex<Shared>,
}

/// Keeps configuration snapshots for local proxies and multiplexes them to
/// watchers.
///
/// Cloning yields another handle to the same manager.
pub struct Manager<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Manager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Manager<C> {
    /// Create a manager. Fails if any collaborator is missing.
    pub fn new(config: ManagerConfig<C>) -> Result<Self, ManagerError> {
        let cache = config.cache.ok_or(ManagerError::MissingCollaborator("cache"))?;
        let registry = config
            .registry
            .ok_or(ManagerError::MissingCollaborator("registry"))?;
        let source = config
            .source
            .ok_or(ManagerError::MissingCollaborator("source"))?;
        let states = config
            .states
            .ok_or(ManagerError::MissingCollaborator("states"))?;
        if config.delivery_timeout.is_zero() {
            return Err(ManagerError::InvalidConfig(
                "delivery timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                registry,
                source: Arc::new(source),
                states,
                delivery_timeout: config.delivery_timeout,
                shared: Mutex::new(Shared {
                    signal: Some(ChangeSignal::new()),
                    proxies: ProxyTable::new(),
                    watchers: WatcherRegistry::new(),
                }),
            }),
        })
    }

    /// Keep tracked proxies in sync with the local registry until closed.
    ///
    /// Must be driven by a single task. Returns [`ManagerError::Stopped`] if
    /// the manager was already closed.
    pub async fn run(&self) -> Result<(), ManagerError> {
        let signal = {
            let shared = self.inner.shared.lock().await;
            shared.signal.clone().ok_or(ManagerError::Stopped)?
        };

        let _subscription = Subscription::new(self.inner.registry.clone(), signal.clone());
        tracing::info!("Proxy config manager running");

        loop {
            self.inner.sync().await;

            if !signal.changed().await {
                break;
            }
        }

        tracing::info!("Proxy config manager stopped");
        Ok(())
    }

    /// Register interest in the snapshots of `proxy_id`.
    ///
    /// The proxy does not need to exist yet. If a snapshot is already
    /// available it is queued before this returns. On a closed manager the
    /// returned queue is already closed.
    pub async fn watch(
        &self,
        proxy_id: &str,
    ) -> (mpsc::Receiver<Arc<ConfigSnapshot>>, CancelWatch<C>) {
        let mut shared = self.inner.shared.lock().await;

        if shared.signal.is_none() {
            let (_, rx) = mpsc::channel(1);
            return (
                rx,
                CancelWatch {
                    manager: Weak::new(),
                    proxy_id: proxy_id.to_string(),
                    id: None,
                },
            );
        }

        let current = shared.proxies.current_snapshot(proxy_id);
        let (id, rx) = shared.watchers.register(proxy_id, current);
        metrics::record_watchers(shared.watchers.len());

        (
            rx,
            CancelWatch {
                manager: Arc::downgrade(&self.inner),
                proxy_id: proxy_id.to_string(),
                id: Some(id),
            },
        )
    }

    /// Stop the run loop, close every watcher queue and every watch state.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let mut shared = self.inner.shared.lock().await;
        let Some(signal) = shared.signal.take() else {
            return;
        };

        signal.close();
        let watchers = shared.watchers.close_all();
        let proxies = shared.proxies.close_all();
        metrics::record_watchers(0);
        metrics::record_tracked_proxies(0);

        tracing::info!(watchers, proxies, "Proxy config manager closed");
    }

    /// Ids of the proxies currently tracked, sorted.
    pub async fn tracked_proxies(&self) -> Vec<String> {
        let shared = self.inner.shared.lock().await;
        let mut ids = shared.proxies.ids();
        ids.sort();
        ids
    }

    /// Number of watchers registered for `proxy_id`.
    pub async fn watcher_count(&self, proxy_id: &str) -> usize {
        self.inner.shared.lock().await.watchers.count(proxy_id)
    }

    /// Whether [`Manager::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        self.inner.shared.lock().await.signal.is_none()
    }
}

impl<C: Send + Sync + 'static> Inner<C> {
    /// One reconciliation pass against the current registry contents.
    async fn sync(self: &Arc<Self>) {
        let mut shared = self.shared.lock().await;
        if shared.signal.is_none() {
            return;
        }

        let services = self.registry.services();
        for (id, service) in &services {
            if !service.is_connect_proxy() {
                continue;
            }
            let token = self.registry.service_token(id);
            if let Err(e) = self.ensure_proxy(&mut shared, service, &token) {
                tracing::error!(proxy_id = %service.id, error = %e, "Failed to watch proxy service");
                metrics::record_proxy_error();
            }
        }

        for proxy_id in shared.proxies.ids() {
            let registered = services
                .get(&proxy_id)
                .map(|s| s.is_connect_proxy())
                .unwrap_or(false);
            if !registered {
                self.remove_proxy(&mut shared, &proxy_id);
            }
        }

        metrics::record_tracked_proxies(shared.proxies.len());
        metrics::record_reconcile_pass();
    }

    /// Start tracking `service`, or rebuild its state if it changed.
    fn ensure_proxy(
        self: &Arc<Self>,
        shared: &mut Shared,
        service: &ServiceDescriptor,
        token: &str,
    ) -> Result<(), StateError> {
        if shared.proxies.is_current(service, token) {
            return Ok(());
        }

        // Release the old upstream watches before building new ones.
        if shared.proxies.remove(&service.id) {
            tracing::info!(proxy_id = %service.id, "Proxy registration changed, rebuilding watch state");
        }

        let deps = StateDeps {
            cache: self.cache.clone(),
            source: self.source.clone(),
        };
        let mut state = self.states.build(service, token, deps)?;
        let stream = match state.watch() {
            Ok(stream) => stream,
            Err(e) => {
                state.close();
                return Err(e);
            }
        };

        let generation = shared.proxies.insert(&service.id, state);
        self.spawn_forwarder(service.id.clone(), generation, stream);

        tracing::info!(proxy_id = %service.id, generation, "Tracking proxy");
        Ok(())
    }

    /// Stop tracking a proxy. Its watchers stay registered and simply stop
    /// receiving snapshots.
    fn remove_proxy(&self, shared: &mut Shared, proxy_id: &str) {
        if shared.proxies.remove(proxy_id) {
            tracing::info!(proxy_id, "Proxy deregistered, stopped tracking");
        }
    }

    /// Drain `stream` into the broadcaster until the watch state closes it.
    fn spawn_forwarder(
        self: &Arc<Self>,
        proxy_id: String,
        generation: Generation,
        mut stream: mpsc::Receiver<ConfigSnapshot>,
    ) {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(snapshot) = stream.recv().await {
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                inner.deliver(&proxy_id, generation, Arc::new(snapshot)).await;
            }
            tracing::debug!(proxy_id = %proxy_id, generation, "Snapshot stream ended");
        });
    }

    async fn deliver(&self, proxy_id: &str, generation: Generation, snapshot: Arc<ConfigSnapshot>) {
        let shared = self.shared.lock().await;
        if !shared.proxies.is_live(proxy_id, generation) {
            tracing::debug!(proxy_id, generation, "Dropping snapshot from replaced watch state");
            return;
        }

        let outcome = shared
            .watchers
            .broadcast(snapshot, self.delivery_timeout)
            .await;
        metrics::record_delivery(outcome.delivered, outcome.skipped);
    }
}

/// Unsubscribes the run loop's signal from the registry when dropped.
struct Subscription {
    registry: Arc<dyn LocalRegistry>,
    signal: ChangeSignal,
}

impl Subscription {
    fn new(registry: Arc<dyn LocalRegistry>, signal: ChangeSignal) -> Self {
        registry.notify(signal.clone());
        Self { registry, signal }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.stop_notify(&self.signal);
    }
}

/// Handle that cancels one watcher registered with [`Manager::watch`].
#[must_use = "dropping the handle leaves the watcher registered"]
pub struct CancelWatch<C> {
    manager: Weak<Inner<C>>,
    proxy_id: String,
    id: Option<WatchId>,
}

impl<C> CancelWatch<C> {
    /// Proxy this watcher was registered for.
    pub fn proxy_id(&self) -> &str {
        &self.proxy_id
    }

    /// Watch id within the proxy. `None` when the manager was already closed.
    pub fn id(&self) -> Option<WatchId> {
        self.id
    }

    /// Remove the watcher and close its queue.
    pub async fn cancel(self) {
        let (Some(inner), Some(id)) = (self.manager.upgrade(), self.id) else {
            return;
        };
        let mut shared = inner.shared.lock().await;
        shared.watchers.cancel(&self.proxy_id, id);
        metrics::record_watchers(shared.watchers.len());
    }
}

impl<C> fmt::Debug for CancelWatch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelWatch")
            .field("proxy_id", &self.proxy_id)
            .field("id", &self.id)
            .finish()
    }
}
