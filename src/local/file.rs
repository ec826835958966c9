//! Services file support.
//!
//! A services file declares the services registered on this agent together
//! with their tokens, plus discovery results for upstreams:
//!
//! ```toml
//! [[services]]
//! id = "web-sidecar"
//! kind = "connect-proxy"
//! port = 21000
//! token = "T1"
//! [services.proxy]
//! destination_service_name = "web"
//! [[services.proxy.upstreams]]
//! destination_name = "db"
//! local_bind_port = 9191
//!
//! [endpoints]
//! db = [{ address = "10.0.0.5", port = 5432 }]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{endpoints_key, MemoryCache};
use crate::local::{LocalState, ServiceDescriptor};

/// Errors reading a services file.
#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate service id: {0}")]
    DuplicateId(String),

    #[error("service with empty id")]
    EmptyId,
}

/// One `[[services]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceDefinition {
    #[serde(flatten)]
    pub service: ServiceDescriptor,

    #[serde(default)]
    pub token: String,
}

/// A discovered upstream instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Parsed contents of a services file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesFile {
    pub services: Vec<ServiceDefinition>,
    pub endpoints: BTreeMap<String, Vec<Endpoint>>,
}

impl ServicesFile {
    pub fn load(path: &Path) -> Result<Self, ServicesError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ServicesError> {
        let file: ServicesFile = toml::from_str(content)?;
        let mut seen = std::collections::HashSet::new();
        for def in &file.services {
            if def.service.id.is_empty() {
                return Err(ServicesError::EmptyId);
            }
            if !seen.insert(def.service.id.as_str()) {
                return Err(ServicesError::DuplicateId(def.service.id.clone()));
            }
        }
        Ok(file)
    }

    /// Push the file contents into the registry and the cache.
    ///
    /// Endpoints go in first so proxies observed by the registry change see
    /// their upstreams on the first snapshot.
    pub fn apply(&self, local: &LocalState, cache: &MemoryCache) {
        let entries = self
            .endpoints
            .iter()
            .filter_map(|(name, endpoints)| {
                serde_json::to_value(endpoints)
                    .ok()
                    .map(|value| (endpoints_key(name), value))
            })
            .collect();
        cache.replace_all(entries);

        local.sync_services(
            self.services
                .iter()
                .map(|d| (d.service.clone(), d.token.clone()))
                .collect(),
        );
    }
}
