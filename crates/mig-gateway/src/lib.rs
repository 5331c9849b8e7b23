//! Request router and gateways for MIG.
//!
//! This crate provides:
//! - [`MigService`], which owns gateways, interfaces and dynamic API handlers
//!   and runs the dispatch pipeline
//! - the HTTP gateway (API calls, Server-Sent-Events, static files)
//! - the WebSocket and raw TCP gateways
//! - [`build_service`] for assembling a service from a configuration file

pub mod builder;
pub mod dynamic_api;
pub mod error;
pub mod gateway;
pub mod http;
pub mod request;
pub mod service;
pub mod tcp;
pub mod websocket;

pub use builder::build_service;
pub use dynamic_api::{handler_fn, ApiHandler, HandlerRegistry};
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::WebServiceGateway;
pub use request::{ClientRequest, RequestContext};
pub use service::{Dispatcher, MigService, ServiceEvent, MANAGEMENT_DOMAIN};
pub use tcp::TcpSocketGateway;
pub use websocket::WebSocketGateway;

#[doc(hidden)]
pub use async_trait;
pub use mig_core;

/// Result type for router and gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
