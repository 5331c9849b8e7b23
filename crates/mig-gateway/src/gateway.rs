//! Gateway abstraction shared by all transports.

use crate::error::GatewayError;
use crate::service::Dispatcher;
use crate::Result;
use async_trait::async_trait;
use mig_core::{Event, MigOption, OptionSet};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A wire transport that feeds client requests into the router.
///
/// Requests are passed to the [`Dispatcher`] received in
/// [`Gateway::start`], which runs the gateway's pre-process hooks, the
/// built-in routing and, for requests still unanswered, the post-process
/// hooks.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Gateway name, unique within a service.
    fn name(&self) -> &str;

    /// Bind listeners and start serving.
    async fn start(&self, dispatcher: Dispatcher) -> Result<()>;

    /// Release listeners and connection tasks. Safe to call after a failed
    /// or partial start and when not running.
    async fn stop(&self) -> Result<()>;

    /// Called after an option of this gateway changed.
    async fn on_set_option(&self, option: &MigOption) -> Result<()>;

    /// Deliver an event raised by an interface or the application.
    async fn on_interface_property_changed(&self, event: &Event);

    /// Address the main listener is bound to while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Bind a listener from `Host` and `Port` options.
///
/// `Port` `0` binds an ephemeral port; see [`Gateway::local_addr`].
pub(crate) async fn bind(options: &OptionSet, default_port: u16) -> Result<TcpListener> {
    let host = match options.value("Host") {
        "" | "*" | "+" => "0.0.0.0",
        host => host,
    };
    let port = match options.value("Port").trim() {
        "" => default_port,
        raw => raw
            .parse::<u16>()
            .map_err(|_| GatewayError::Config(format!("invalid Port '{}'", raw)))?,
    };

    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })
}

/// A running accept loop and the token that stops it.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    pub(crate) token: CancellationToken,
    pub(crate) local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub(crate) fn new(token: CancellationToken, local_addr: SocketAddr, task: JoinHandle<()>) -> Self {
        Self {
            token,
            local_addr,
            task,
        }
    }

    /// Cancel the token and wait for the accept loop to exit.
    pub(crate) async fn shutdown(self, gateway: &str) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(gateway, error = %e, "listener task ended abnormally");
            }
        }
        debug!(gateway, addr = %self.local_addr, "listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let mut options = OptionSet::new();
        options.set("Host", "127.0.0.1");
        options.set("Port", "0");

        let listener = bind(&options, 8080).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_port() {
        let mut options = OptionSet::new();
        options.set("Port", "http");
        assert!(matches!(
            bind(&options, 8080).await,
            Err(GatewayError::Config(_))
        ));
    }
}
