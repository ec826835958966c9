//! Manager error types.

use thiserror::Error;

/// Errors returned by the proxy configuration manager.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// A required collaborator was not supplied at construction.
    #[error("manager config is missing required field: {0}")]
    MissingCollaborator(&'static str),

    /// A setting has an unusable value.
    #[error("invalid manager config: {0}")]
    InvalidConfig(String),

    /// The manager was closed and cannot be run again.
    #[error("manager stopped")]
    Stopped,
}
