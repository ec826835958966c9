//! Sidecar proxy configuration manager.
//!
//! Tracks the connect proxies registered with the local agent, keeps a
//! continuously refreshed configuration snapshot for each, and fans the
//! snapshots out to any number of in-process watchers.

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod local;
pub mod manager;
pub mod observability;
pub mod state;

pub use local::{LocalRegistry, LocalState, ServiceDescriptor, ServiceKind};
pub use manager::{CancelWatch, ChangeSignal, Manager, ManagerConfig, ManagerError};
pub use state::{ConfigSnapshot, ProxyState, QuerySource, StateDeps, StateError, StateFactory};
