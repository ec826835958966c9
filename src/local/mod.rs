//! Local service registry.
//!
//! # Data Flow
//! ```text
//! service registration / deregistration
//!     → LocalState (services + tokens)
//!     → every subscribed ChangeSignal is notified
//!     → manager wakes and re-reads services()
//!
//! services file (file.rs)
//!     → parsed definitions
//!     → LocalState::sync_services + MemoryCache::replace_all
//! ```
//!
//! # Design Decisions
//! - Signals carry no payload; readers always re-read the full service set
//! - A mutation notifies every subscriber, coalescing happens in the signal

pub mod file;
pub mod service;
pub mod state;

use std::collections::HashMap;

use crate::manager::ChangeSignal;

pub use service::{ConnectProxyConfig, ServiceDescriptor, ServiceKind, Upstream};
pub use state::LocalState;

/// The authoritative view of services registered on this agent.
pub trait LocalRegistry: Send + Sync {
    /// All registered services keyed by service id.
    fn services(&self) -> HashMap<String, ServiceDescriptor>;

    /// ACL token the service was registered with (empty when none).
    fn service_token(&self, id: &str) -> String;

    /// Subscribe `signal` to change notifications.
    fn notify(&self, signal: ChangeSignal);

    /// Unsubscribe a previously registered signal.
    fn stop_notify(&self, signal: &ChangeSignal);
}
