//! Client requests flowing through the dispatch pipeline.

use mig_core::{Command, ResponseData};
use std::borrow::Cow;
use std::net::SocketAddr;

/// Per-connection details supplied by the originating transport.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,

    /// Identifier of the connection the request arrived on.
    pub connection_id: String,

    /// HTTP method, for requests received by the HTTP gateway.
    pub method: Option<String>,
}

impl RequestContext {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ..Default::default()
        }
    }

    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// A command together with its origin, body and eventual response.
///
/// The request counts as handled from the moment a response is assigned.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    command: Command,
    gateway: String,
    context: RequestContext,
    body: Vec<u8>,
    response: Option<ResponseData>,
}

impl ClientRequest {
    pub fn new(gateway: impl Into<String>, command: Command, context: RequestContext) -> Self {
        Self {
            command,
            gateway: gateway.into(),
            context,
            body: Vec::new(),
            response: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Name of the gateway the request arrived on.
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_handled(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&ResponseData> {
        self.response.as_ref()
    }

    /// Assign the response, marking the request handled.
    pub fn set_response(&mut self, response: impl Into<ResponseData>) {
        self.response = Some(response.into());
    }

    pub fn take_response(&mut self) -> Option<ResponseData> {
        self.response.take()
    }
}
