//! # mig-core
//!
//! Core types and configuration for MIG, the multi interface gateway.
//!
//! - **Commands**: parsing of `domain/address/command/options...` routing strings
//! - **Events**: property change records broadcast to every transport
//! - **Responses**: payloads assigned to client requests
//! - **Configuration**: JSON5 loading, validation and persistence

pub mod command;
pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod module;
pub mod option;
pub mod paths;
pub mod response;

// Re-exports for convenience
pub use command::Command;
pub use config::Config;
pub use error::ConfigError;
pub use event::{Event, EventValue};
pub use module::{InterfaceModule, ModuleType};
pub use option::{MigOption, OptionSet};
pub use response::{ResponseData, ResponseStatus, ResponseText, Status};
