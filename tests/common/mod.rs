//! Shared utilities for manager integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxycfg::{
    ConfigSnapshot, LocalState, Manager, ManagerConfig, ProxyState, QuerySource,
    ServiceDescriptor, StateDeps, StateError, StateFactory,
};
use tokio::sync::mpsc;

/// Opaque cache handed through to test states.
#[derive(Debug, Default)]
pub struct TestCache {
    pub lookups: AtomicUsize,
}

/// Test-side handle onto one built watch state.
#[derive(Clone)]
pub struct StateHandle {
    pub proxy_id: String,
    pub token: String,
    tx: Arc<Mutex<Option<mpsc::Sender<ConfigSnapshot>>>>,
    current: Arc<Mutex<Option<Arc<ConfigSnapshot>>>>,
    closed: Arc<AtomicBool>,
}

impl StateHandle {
    /// Emit a snapshot on this state's stream. Returns `false` once closed.
    pub async fn publish(&self, snapshot: ConfigSnapshot) -> bool {
        let tx = self.tx.lock().unwrap().clone();
        let Some(tx) = tx else {
            return false;
        };
        *self.current.lock().unwrap() = Some(Arc::new(snapshot.clone()));
        tx.send(snapshot).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct TestState {
    service: ServiceDescriptor,
    token: String,
    stream: Option<mpsc::Receiver<ConfigSnapshot>>,
    handle: StateHandle,
}

impl ProxyState for TestState {
    fn changed(&self, service: &ServiceDescriptor, token: &str) -> bool {
        self.service != *service || self.token != token
    }

    fn watch(&mut self) -> Result<mpsc::Receiver<ConfigSnapshot>, StateError> {
        self.stream
            .take()
            .ok_or_else(|| StateError::AlreadyWatching(self.service.id.clone()))
    }

    fn current_snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.handle.current.lock().unwrap().clone()
    }

    fn close(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
        self.handle.tx.lock().unwrap().take();
    }
}

/// A state whose stream cannot be started.
struct BrokenState {
    handle: StateHandle,
}

impl ProxyState for BrokenState {
    fn changed(&self, _service: &ServiceDescriptor, _token: &str) -> bool {
        true
    }

    fn watch(&mut self) -> Result<mpsc::Receiver<ConfigSnapshot>, StateError> {
        Err(StateError::Build("stream unavailable".into()))
    }

    fn current_snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        None
    }

    fn close(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ControlInner {
    built: Vec<StateHandle>,
    fail_build: HashSet<String>,
    fail_watch: HashSet<String>,
}

/// Factory that records every state it builds and can inject failures.
#[derive(Clone, Default)]
pub struct TestFactory {
    inner: Arc<Mutex<ControlInner>>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently built state for `proxy_id`.
    pub fn latest(&self, proxy_id: &str) -> Option<StateHandle> {
        self.inner
            .lock()
            .unwrap()
            .built
            .iter()
            .rev()
            .find(|h| h.proxy_id == proxy_id)
            .cloned()
    }

    pub fn build_count(&self, proxy_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .built
            .iter()
            .filter(|h| h.proxy_id == proxy_id)
            .count()
    }

    pub fn fail_build(&self, proxy_id: &str, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.fail_build.insert(proxy_id.to_string());
        } else {
            inner.fail_build.remove(proxy_id);
        }
    }

    pub fn fail_watch(&self, proxy_id: &str, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.fail_watch.insert(proxy_id.to_string());
        } else {
            inner.fail_watch.remove(proxy_id);
        }
    }
}

impl StateFactory<TestCache> for TestFactory {
    fn build(
        &self,
        service: &ServiceDescriptor,
        token: &str,
        deps: StateDeps<TestCache>,
    ) -> Result<Box<dyn ProxyState>, StateError> {
        deps.cache.lookups.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_build.contains(&service.id) {
            return Err(StateError::Build(format!("injected failure for {}", service.id)));
        }

        let (tx, rx) = mpsc::channel(8);
        let handle = StateHandle {
            proxy_id: service.id.clone(),
            token: token.to_string(),
            tx: Arc::new(Mutex::new(Some(tx))),
            current: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        inner.built.push(handle.clone());

        if inner.fail_watch.contains(&service.id) {
            return Ok(Box::new(BrokenState { handle }));
        }

        Ok(Box::new(TestState {
            service: service.clone(),
            token: token.to_string(),
            stream: Some(rx),
            handle,
        }))
    }
}

/// Wire a manager around `local` and `factory`.
pub fn manager(
    local: &Arc<LocalState>,
    factory: &TestFactory,
    delivery_timeout: Duration,
) -> Manager<TestCache> {
    Manager::new(ManagerConfig {
        cache: Some(Arc::new(TestCache::default())),
        registry: Some(local.clone()),
        source: Some(QuerySource {
            datacenter: "dc1".into(),
            node: "node-1".into(),
            segment: String::new(),
        }),
        states: Some(Arc::new(factory.clone())),
        delivery_timeout,
    })
    .unwrap()
}

/// Spawn the run loop.
pub fn spawn_run(
    manager: &Manager<TestCache>,
) -> tokio::task::JoinHandle<Result<(), proxycfg::ManagerError>> {
    let manager = manager.clone();
    tokio::spawn(async move { manager.run().await })
}

pub fn snapshot(proxy_id: &str, port: u16) -> ConfigSnapshot {
    let mut snap = ConfigSnapshot::new(proxy_id);
    snap.port = port;
    snap
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Receive with a one second bound.
pub async fn recv(
    rx: &mut mpsc::Receiver<Arc<ConfigSnapshot>>,
) -> Option<Arc<ConfigSnapshot>> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

/// True if nothing arrives within `wait`.
pub async fn stays_quiet(rx: &mut mpsc::Receiver<Arc<ConfigSnapshot>>, wait: Duration) -> bool {
    tokio::time::timeout(wait, rx.recv()).await.is_err()
}
