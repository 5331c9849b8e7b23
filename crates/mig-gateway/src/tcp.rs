//! Raw TCP gateway.
//!
//! Frames are newline-delimited UTF-8 lines. Each inbound line is a routing
//! string; responses and router events are written as one JSON line each.

use crate::gateway::{bind, Gateway, ListenerHandle};
use crate::request::{ClientRequest, RequestContext};
use crate::service::Dispatcher;
use crate::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mig_core::config::TCP_SOCKET_GATEWAY;
use mig_core::{Command, Event, MigOption, OptionSet, ResponseData, ResponseText};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 4646;

/// Longest accepted inbound line, in bytes.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

const BROADCAST_CAPACITY: usize = 1024;

pub struct TcpSocketGateway {
    options: RwLock<OptionSet>,
    events: broadcast::Sender<String>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Default for TcpSocketGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSocketGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            options: RwLock::new(OptionSet::new()),
            events,
            listener: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Gateway for TcpSocketGateway {
    fn name(&self) -> &str {
        TCP_SOCKET_GATEWAY
    }

    async fn start(&self, dispatcher: Dispatcher) -> Result<()> {
        if self.listener.lock().is_some() {
            return Ok(());
        }

        let options = self.options.read().clone();
        let listener = bind(&options, DEFAULT_PORT).await?;
        let local_addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            self.events.clone(),
            token.clone(),
        ));

        info!(addr = %local_addr, "TCP gateway listening");
        *self.listener.lock() = Some(ListenerHandle::new(token, local_addr, task));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            handle.shutdown(self.name()).await;
        }
        Ok(())
    }

    async fn on_set_option(&self, option: &MigOption) -> Result<()> {
        self.options
            .write()
            .set(option.name.clone(), option.value.clone());
        Ok(())
    }

    async fn on_interface_property_changed(&self, event: &Event) {
        match event.to_json() {
            Ok(json) => {
                let _ = self.events.send(json);
            }
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|h| h.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    events: broadcast::Sender<String>,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote_addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    remote_addr,
                    dispatcher.clone(),
                    events.subscribe(),
                    token.child_token(),
                ));
            }
            Err(e) => warn!(error = %e, "TCP accept failed"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    dispatcher: Dispatcher,
    mut events: broadcast::Receiver<String>,
    token: CancellationToken,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(connection = %connection_id, remote = %remote_addr, "TCP client connected");

    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = framed.next() => match frame {
                Some(Ok(line)) => {
                    let routing = line.trim();
                    if routing.is_empty() {
                        continue;
                    }
                    let context = RequestContext::new(connection_id.clone())
                        .with_remote_addr(Some(remote_addr));
                    let request = ClientRequest::new(TCP_SOCKET_GATEWAY, Command::parse(routing), context);
                    let mut request = dispatcher.dispatch(request).await;

                    if let Some(response) = request.take_response() {
                        if let Err(e) = framed.send(response_line(response)).await {
                            debug!(connection = %connection_id, error = %e, "TCP write failed");
                            break;
                        }
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(connection = %connection_id, limit = MAX_FRAME_LENGTH, "frame too long, closing");
                    break;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    debug!(connection = %connection_id, error = %e, "TCP read failed");
                    break;
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(json) => {
                    if let Err(e) = framed.send(json).await {
                        debug!(connection = %connection_id, error = %e, "TCP write failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection = %connection_id, skipped, "client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(connection = %connection_id, "TCP client disconnected");
}

/// One JSON line for a response. Plain text and bytes are wrapped as `ResponseText`.
fn response_line(response: ResponseData) -> String {
    match response {
        ResponseData::Json(value) => value.to_string(),
        other => {
            let wrapped = ResponseText::new(other.to_text());
            serde_json::to_string(&wrapped).unwrap_or_else(|_| "{}".to_string())
        }
    }
}
