//! Proxy configuration manager.
//!
//! # Data Flow
//! ```text
//! LocalRegistry change
//!     → ChangeSignal (single slot, coalescing)
//!     → run loop wakes, re-reads all services
//!     → ensure: build / rebuild watch state per connect proxy
//!     → remove: close states whose proxy is gone
//!
//! ProxyState stream
//!     → forwarding task (one per tracked proxy)
//!     → WatcherRegistry::broadcast
//!     → capacity-1 queue per watcher (bounded wait, skip if full)
//! ```
//!
//! # Design Decisions
//! - One mutex guards the proxy table, the watcher registry and the signal;
//!   broadcast runs under it so per-watcher delivery order is preserved
//! - The run loop is level-triggered and never applies incremental diffs
//! - Removing a proxy does not notify or close its watchers
//! - Watch ids come from a monotonic counter and are never reused
//! - Snapshots from a replaced watch state are dropped, never delivered

pub mod coordinator;
pub mod error;
pub mod proxies;
pub mod signal;
pub mod watchers;

pub use coordinator::{CancelWatch, Manager, ManagerConfig, DEFAULT_DELIVERY_TIMEOUT};
pub use error::ManagerError;
pub use signal::ChangeSignal;
pub use watchers::{Delivery, WatchId};
