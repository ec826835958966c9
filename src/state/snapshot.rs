//! Configuration snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::local::ConnectProxyConfig;

/// Materialized configuration for one proxy.
///
/// The manager only routes on `proxy_id`; everything else is produced and
/// consumed by the watch state and the proxy-facing layers.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ConfigSnapshot {
    /// Id of the proxy service this snapshot belongs to.
    pub proxy_id: String,

    pub address: String,
    pub port: u16,

    /// Proxy settings copied from the registration.
    pub proxy: ConnectProxyConfig,

    /// Discovery results per upstream identifier.
    #[serde(default)]
    pub upstream_endpoints: BTreeMap<String, serde_json::Value>,
}

impl ConfigSnapshot {
    pub fn new(proxy_id: impl Into<String>) -> Self {
        Self {
            proxy_id: proxy_id.into(),
            ..Default::default()
        }
    }

    /// True once every declared upstream has discovery results.
    pub fn is_complete(&self) -> bool {
        self.proxy
            .upstreams
            .iter()
            .all(|u| self.upstream_endpoints.contains_key(&u.identifier()))
    }
}
