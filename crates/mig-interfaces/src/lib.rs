//! Backend interface abstractions for MIG.
//!
//! This crate defines the contract every pluggable backend (device driver)
//! implements, together with the helpers backends share: an event sink for
//! reporting property changes, reply correlation with timeouts, cancellable
//! timers, and a factory registry used to build interfaces from configuration.

pub mod error;
pub mod traits;
pub mod sink;
pub mod reply;
pub mod timer;
pub mod registry;
pub mod virtual_device;

pub use error::InterfaceError;
pub use traits::{InterfaceFactory, MigInterface};
pub use sink::{EventSinkSlot, InterfaceEvent, InterfaceEventSink};
pub use reply::{PendingReplies, ReplyHandle};
pub use timer::TimerTask;
pub use registry::InterfaceRegistry;
pub use virtual_device::{VirtualInterface, VirtualInterfaceFactory};

/// Result type for interface operations.
pub type Result<T> = std::result::Result<T, InterfaceError>;
