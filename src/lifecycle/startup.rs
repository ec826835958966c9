//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the in-memory registry and cache
//! - Apply the services file, if configured
//! - Create the manager with its collaborators
//! - Start the services file watcher
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Registry is populated before the manager first runs, so the first
//!   reconciliation pass already sees every proxy

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;

use crate::cache::MemoryCache;
use crate::config::{AgentConfig, ServicesWatcher};
use crate::local::file::ServicesError;
use crate::local::LocalState;
use crate::manager::{Manager, ManagerConfig, ManagerError};
use crate::state::{CachedStateFactory, QuerySource};

/// Errors that abort agent startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("services file: {0}")]
    Services(#[from] ServicesError),

    #[error("services watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("manager: {0}")]
    Manager(#[from] ManagerError),
}

/// A fully wired agent.
pub struct Agent {
    pub manager: Manager<MemoryCache>,
    pub local: Arc<LocalState>,
    pub cache: Arc<MemoryCache>,
    // Dropping the watcher stops file notifications.
    _watcher: Option<RecommendedWatcher>,
}

impl Agent {
    /// Build every collaborator from `config`. Does not start the run loop.
    pub fn start(config: &AgentConfig) -> Result<Self, StartupError> {
        let local = Arc::new(LocalState::new());
        let cache = Arc::new(MemoryCache::new());

        let mut watcher = None;
        if let Some(path) = &config.registry.services_path {
            let services = ServicesWatcher::new(
                Path::new(path),
                Duration::from_secs(config.registry.poll_interval_secs),
                local.clone(),
                cache.clone(),
            );
            services.reload()?;
            if config.registry.watch_file {
                watcher = Some(services.run()?);
            }
        } else {
            tracing::warn!("No services file configured, registry starts empty");
        }

        let manager = Manager::new(ManagerConfig {
            cache: Some(cache.clone()),
            registry: Some(local.clone()),
            source: Some(QuerySource::from(&config.source)),
            states: Some(Arc::new(CachedStateFactory)),
            delivery_timeout: Duration::from_millis(config.manager.delivery_timeout_ms),
        })?;

        tracing::info!(
            datacenter = %config.source.datacenter,
            node = %config.source.node,
            services = local.len(),
            "Agent initialized"
        );

        Ok(Self {
            manager,
            local,
            cache,
            _watcher: watcher,
        })
    }
}
