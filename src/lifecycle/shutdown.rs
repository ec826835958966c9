//! Shutdown coordination for the agent.
//!
//! Shutdown is a level, not an event: a subscriber created after the
//! trigger still observes it, so watcher tasks spawned late never hang.

use tokio::sync::watch;

/// Owns the shutdown flag. Cloned handles share it.
#[derive(Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Flip the flag. Returns `false` if it was already set.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopping| !std::mem::replace(stopping, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task view of the shutdown flag.
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown has been triggered, or the coordinator dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopping| *stopping).await;
    }
}
