//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::state::QuerySource;

/// Root configuration for the proxy config agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Identity of this agent.
    pub source: SourceConfig,

    /// Manager tuning.
    pub manager: ManagerSettings,

    /// Where local service registrations come from.
    pub registry: RegistryConfig,

    /// Proxies the agent subscribes to.
    pub watch: WatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Agent identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub datacenter: String,

    /// Node name (default: random `agent-<uuid>`).
    pub node: String,

    pub segment: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            datacenter: "dc1".to_string(),
            node: format!("agent-{}", uuid::Uuid::new_v4()),
            segment: String::new(),
        }
    }
}

impl From<&SourceConfig> for QuerySource {
    fn from(config: &SourceConfig) -> Self {
        Self {
            datacenter: config.datacenter.clone(),
            node: config.node.clone(),
            segment: config.segment.clone(),
        }
    }
}

/// Manager settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Max wait per watcher when delivering a snapshot, in milliseconds.
    pub delivery_timeout_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 100,
        }
    }
}

/// Local registry source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to a TOML services file.
    pub services_path: Option<String>,

    /// Reload the services file when it changes.
    pub watch_file: bool,

    /// Poll interval for the file watcher in seconds.
    pub poll_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            services_path: None,
            watch_file: true,
            poll_interval_secs: 2,
        }
    }
}

/// Subscriptions made by the agent itself.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WatchConfig {
    /// Proxy ids to watch.
    pub proxies: Vec<String>,

    /// Print every received snapshot as JSON on stdout.
    pub print_json: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level for the `proxycfg` target.
    pub log_level: String,

    /// Emit logs as JSON.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9102".to_string(),
        }
    }
}
