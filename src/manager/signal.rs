//! Level-triggered change signal.
//!
//! A signal carries no data, only "something changed". `tokio::sync::Notify`
//! stores at most one permit, so any number of `notify` calls made while the
//! receiver is busy collapse into a single wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct SignalInner {
    notify: Notify,
    closed: AtomicBool,
}

/// Single-slot, coalescing notification handle.
///
/// Clones share the same slot. Equality is identity: two handles are equal
/// when they were cloned from the same original.
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal {
    inner: Arc<SignalInner>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. Never blocks; redundant signals are dropped.
    pub fn notify(&self) {
        if !self.is_closed() {
            self.inner.notify.notify_one();
        }
    }

    /// Wait for the next change.
    ///
    /// Returns `false` once the signal has been closed, including when the
    /// close happens while waiting.
    pub async fn changed(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.notify.notified().await;
        !self.is_closed()
    }

    /// Close the signal and wake the waiter. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_one();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl PartialEq for ChangeSignal {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ChangeSignal {}
