//! Per-proxy watch state.
//!
//! # Data Flow
//! ```text
//! (ServiceDescriptor, token) + StateDeps { cache, source }
//!     → StateFactory::build
//!     → ProxyState::watch()  ──▶ mpsc stream of ConfigSnapshot
//!     → drained by the manager's forwarding task
//!
//! ProxyState::close()
//!     → stream ends
//!     → forwarding task exits
//! ```
//!
//! # Design Decisions
//! - The manager never looks inside a snapshot beyond its proxy id
//! - The cache type is a generic parameter; the manager only passes it along
//! - `close` must be idempotent, the manager may call it more than once

pub mod cached;
pub mod snapshot;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::local::ServiceDescriptor;

pub use cached::{CachedState, CachedStateFactory};
pub use snapshot::ConfigSnapshot;

/// Identity of the agent, used to scope upstream queries.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct QuerySource {
    pub datacenter: String,
    pub node: String,
    pub segment: String,
}

/// Failures while building or starting a watch state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("service {0} is not a connect proxy")]
    NotConnectProxy(String),

    #[error("proxy {0} is missing a destination service name")]
    MissingDestination(String),

    #[error("watch already started for proxy {0}")]
    AlreadyWatching(String),

    #[error("watch state for proxy {0} is closed")]
    Closed(String),

    #[error("failed to build watch state: {0}")]
    Build(String),
}

/// Collaborators handed to every watch state on construction.
#[derive(Debug)]
pub struct StateDeps<C> {
    pub cache: Arc<C>,
    pub source: Arc<QuerySource>,
}

impl<C> Clone for StateDeps<C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            source: self.source.clone(),
        }
    }
}

/// A live source of configuration snapshots for one proxy.
pub trait ProxyState: Send + Sync {
    /// Whether `(service, token)` differs from what this state was built with.
    fn changed(&self, service: &ServiceDescriptor, token: &str) -> bool;

    /// Start producing snapshots. The stream ends when `close` is called.
    fn watch(&mut self) -> Result<mpsc::Receiver<ConfigSnapshot>, StateError>;

    /// The most recently produced snapshot, if any.
    ///
    /// Must be updated before the snapshot is handed to the stream, so a
    /// watcher seeded from it never misses a value. The same snapshot may then
    /// reach that watcher a second time through the stream.
    fn current_snapshot(&self) -> Option<Arc<ConfigSnapshot>>;

    /// Stop producing snapshots and release upstream watches.
    fn close(&mut self);
}

/// Builds watch states for newly observed or changed proxies.
pub trait StateFactory<C>: Send + Sync {
    fn build(
        &self,
        service: &ServiceDescriptor,
        token: &str,
        deps: StateDeps<C>,
    ) -> Result<Box<dyn ProxyState>, StateError>;
}
