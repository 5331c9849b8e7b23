//! Gateway error types.

use mig_interfaces::InterfaceError;
use thiserror::Error;

/// Errors that can occur in the router and its gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Backend interface error.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// Invalid option or configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more gateways failed to start.
    #[error("Failed to start gateways: {0}")]
    Start(String),

    /// A gateway or interface with this name is already registered.
    #[error("Already registered: {0}")]
    AlreadyExists(String),

    /// Not found error.
    #[error("Not found: {0}")]
    NotFound(String),
}
