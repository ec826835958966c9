//! Services file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::cache::MemoryCache;
use crate::local::file::ServicesFile;
use crate::local::LocalState;

/// Monitors the services file and re-applies it on change.
pub struct ServicesWatcher {
    path: PathBuf,
    poll_interval: Duration,
    local: Arc<LocalState>,
    cache: Arc<MemoryCache>,
}

impl ServicesWatcher {
    pub fn new(
        path: &Path,
        poll_interval: Duration,
        local: Arc<LocalState>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            poll_interval,
            local,
            cache,
        }
    }

    /// Load the file once and apply it.
    pub fn reload(&self) -> Result<(), crate::local::file::ServicesError> {
        let file = ServicesFile::load(&self.path)?;
        file.apply(&self.local, &self.cache);
        tracing::info!(
            path = ?self.path,
            services = file.services.len(),
            endpoints = file.endpoints.len(),
            "Services file applied"
        );
        Ok(())
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let poll_interval = self.poll_interval;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Services file change detected, reloading...");
                        if let Err(e) = self.reload() {
                            tracing::error!(
                                "Failed to reload services file: {}. Keeping current registrations.",
                                e
                            );
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(poll_interval),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Services watcher started");
        Ok(watcher)
    }
}
