//! Service descriptors as reported by the local registry.

use serde::{Deserialize, Serialize};

/// Kind tag carried by every registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// A plain application service.
    #[default]
    Typical,
    /// A sidecar proxy fronting another service.
    ConnectProxy,
    /// A gateway between mesh segments. Not managed here.
    MeshGateway,
}

/// A service registered with the local agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ServiceDescriptor {
    /// Unique identifier on this agent.
    pub id: String,

    /// Logical service name.
    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub kind: ServiceKind,

    /// Address the service listens on.
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: u16,

    /// Proxy settings, only meaningful for `ServiceKind::ConnectProxy`.
    #[serde(default)]
    pub proxy: ConnectProxyConfig,
}

impl ServiceDescriptor {
    /// Build a connect-proxy descriptor fronting `destination`.
    pub fn connect_proxy(id: impl Into<String>, destination: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            service: id.clone(),
            id,
            kind: ServiceKind::ConnectProxy,
            proxy: ConnectProxyConfig {
                destination_service_name: destination.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_connect_proxy(&self) -> bool {
        self.kind == ServiceKind::ConnectProxy
    }
}

/// Sidecar proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectProxyConfig {
    /// Name of the service this proxy represents.
    pub destination_service_name: String,

    /// Instance id of the service this proxy represents.
    pub destination_service_id: String,

    /// Address of the local application instance.
    pub local_service_address: String,

    /// Port of the local application instance.
    pub local_service_port: u16,

    /// Upstream dependencies exposed on local ports.
    pub upstreams: Vec<Upstream>,
}

/// An upstream dependency of a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Upstream {
    /// Name of the upstream service.
    pub destination_name: String,

    /// Datacenter to resolve the upstream in (empty = local).
    #[serde(default)]
    pub datacenter: String,

    /// Local port the proxy binds for this upstream.
    #[serde(default)]
    pub local_bind_port: u16,
}

impl Upstream {
    /// Stable key used for snapshot and cache lookups.
    pub fn identifier(&self) -> String {
        if self.datacenter.is_empty() {
            self.destination_name.clone()
        } else {
            format!("{}?dc={}", self.destination_name, self.datacenter)
        }
    }
}
