//! Core interface traits.

use crate::sink::InterfaceEventSink;
use crate::Result;
use async_trait::async_trait;
use mig_core::{Command, InterfaceModule, MigOption, OptionSet, ResponseData};
use std::fmt::Debug;
use std::sync::Arc;

/// A pluggable backend reachable under a domain such as `HomeAutomation.X10`.
///
/// The router keeps the enable flag and the option set of each interface in
/// its registration entry and forwards option changes through
/// [`MigInterface::on_set_option`]. Calls to [`MigInterface::interface_control`]
/// are never retried by the router.
#[async_trait]
pub trait MigInterface: Send + Sync + Debug {
    /// Domain this interface answers for.
    fn domain(&self) -> &str;

    /// Called after an option of this interface changed.
    async fn on_set_option(&self, _option: &MigOption) -> Result<()> {
        Ok(())
    }

    /// Open the connection to the device or service.
    async fn connect(&self) -> Result<()>;

    /// Close the connection. Must be safe to call when already disconnected.
    async fn disconnect(&self) -> Result<()>;

    /// Whether [`MigInterface::connect`] succeeded and no disconnect happened since.
    fn is_connected(&self) -> bool;

    /// Whether the underlying hardware or service can be found at all.
    fn is_device_present(&self) -> bool {
        true
    }

    /// Modules currently exposed by this interface.
    async fn get_modules(&self) -> Vec<InterfaceModule>;

    /// Execute a command addressed to this interface.
    ///
    /// `Ok(None)` means the command was accepted but produced no payload.
    async fn interface_control(&self, command: &Command) -> Result<Option<ResponseData>>;

    /// Hand the interface the sink it reports events through.
    fn set_event_sink(&self, sink: InterfaceEventSink);
}

/// Factory for creating interfaces from configuration.
#[async_trait]
pub trait InterfaceFactory: Send + Sync {
    /// Create an interface instance for `domain` with its initial options.
    async fn create(&self, domain: &str, options: &OptionSet) -> Result<Arc<dyn MigInterface>>;

    /// Get the type name this factory creates.
    fn interface_type(&self) -> &str;
}
