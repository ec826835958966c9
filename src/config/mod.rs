//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! agent config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!
//! services file (TOML):
//!     watcher.rs detects change
//!     → local::file parses it
//!     → LocalState / MemoryCache updated
//!     → manager observes the registry change
//! ```
//!
//! # Design Decisions
//! - Agent config is immutable once loaded; only the services file reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AgentConfig, ManagerSettings, ObservabilityConfig, RegistryConfig, SourceConfig, WatchConfig};
pub use watcher::ServicesWatcher;
