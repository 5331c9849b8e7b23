//! Interface error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during interface operations.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interface not connected.
    #[error("Interface not connected: {0}")]
    NotConnected(String),

    /// Hardware or remote service not reachable.
    #[error("Device not present: {0}")]
    DeviceNotPresent(String),

    /// Command not understood by the interface.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command understood but an argument is invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No reply arrived in time.
    #[error("Timed out after {0:?} waiting for reply")]
    Timeout(Duration),

    /// Reply channel dropped before a reply arrived.
    #[error("Reply cancelled: {0}")]
    Cancelled(String),

    /// No factory registered for the requested type.
    #[error("Unknown interface type: {0}")]
    UnknownType(String),

    /// Interface configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Interface-specific error.
    #[error("Interface error ({domain}): {message}")]
    Interface {
        /// Interface domain.
        domain: String,
        /// Error message.
        message: String,
    },
}

impl InterfaceError {
    /// Create an interface-specific error.
    pub fn interface(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Interface {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a not connected error.
    pub fn not_connected(domain: impl Into<String>) -> Self {
        Self::NotConnected(domain.into())
    }

    /// Check if retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::NotConnected(_) | Self::DeviceNotPresent(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = InterfaceError::interface("HomeAutomation.X10", "bad checksum");
        assert_eq!(err.to_string(), "Interface error (HomeAutomation.X10): bad checksum");
        assert!(InterfaceError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!InterfaceError::UnknownCommand("x".into()).is_transient());
    }
}
