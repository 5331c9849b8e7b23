//! WebSocket gateway.
//!
//! Each inbound text or binary frame carries a routing string on its first
//! line and an optional request body on the remaining lines. A handled
//! response is written back on the same socket. Every router event is sent
//! as JSON to all open sockets.

use crate::gateway::{bind, Gateway, ListenerHandle};
use crate::request::{ClientRequest, RequestContext};
use crate::service::Dispatcher;
use crate::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use mig_core::config::WEB_SOCKET_GATEWAY;
use mig_core::{Command, Event, MigOption, OptionSet, ResponseData};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default WebSocket port.
pub const DEFAULT_PORT: u16 = 8181;

const BROADCAST_CAPACITY: usize = 1024;

struct WsState {
    options: RwLock<OptionSet>,
    events: broadcast::Sender<String>,
    clients: AtomicUsize,
}

impl WsState {
    /// Whether the handshake carries the configured Basic credentials.
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let (username, password) = {
            let options = self.options.read();
            (
                options.value("Username").to_string(),
                options.value("Password").to_string(),
            )
        };
        if username.is_empty() || password.is_empty() {
            return true;
        }

        let Some(encoded) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };
        STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map(|credentials| credentials == format!("{}:{}", username, password))
            .unwrap_or(false)
    }
}

#[derive(Clone)]
struct AppState {
    ws: Arc<WsState>,
    dispatcher: Dispatcher,
    token: CancellationToken,
}

/// The WebSocket gateway. Accepts upgrades on any path of its own listener.
pub struct WebSocketGateway {
    state: Arc<WsState>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Default for WebSocketGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: Arc::new(WsState {
                options: RwLock::new(OptionSet::new()),
                events,
                clients: AtomicUsize::new(0),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Number of open sockets.
    pub fn client_count(&self) -> usize {
        self.state.clients.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for WebSocketGateway {
    fn name(&self) -> &str {
        WEB_SOCKET_GATEWAY
    }

    async fn start(&self, dispatcher: Dispatcher) -> Result<()> {
        if self.listener.lock().is_some() {
            return Ok(());
        }

        let options = self.state.options.read().clone();
        let listener = bind(&options, DEFAULT_PORT).await?;
        let local_addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let app = Router::new()
            .fallback(ws_handler)
            .with_state(AppState {
                ws: self.state.clone(),
                dispatcher,
                token: token.clone(),
            });

        let shutdown = token.clone();
        let task = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "WebSocket server failed");
            }
        });

        info!(addr = %local_addr, "WebSocket gateway listening");
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
        self.state
            .options
            .write()
            .set(option.name.clone(), option.value.clone());
        Ok(())
    }

    async fn on_interface_property_changed(&self, event: &Event) {
        match event.to_json() {
            Ok(json) => {
                // No receivers just means no open sockets
                let _ = self.state.events.send(json);
            }
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|h| h.local_addr)
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr);

    if !state.ws.authorized(&headers) {
        warn!(remote = ?remote_addr, "WebSocket handshake rejected");
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.headers_mut().insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"MIG\""),
        );
        return response;
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, remote_addr))
}

async fn handle_socket(socket: WebSocket, state: AppState, remote_addr: Option<SocketAddr>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    state.ws.clients.fetch_add(1, Ordering::SeqCst);
    info!(connection = %connection_id, remote = ?remote_addr, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.ws.events.subscribe();

    loop {
        tokio::select! {
            _ = state.token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => match event {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection = %connection_id, skipped, "client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            message = receiver.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(connection = %connection_id, error = %e, "WebSocket read failed");
                        break;
                    }
                };

                let context = RequestContext::new(connection_id.clone()).with_remote_addr(remote_addr);
                if let Some(reply) = handle_frame(&state.dispatcher, context, &frame).await {
                    if sender.send(reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    state.ws.clients.fetch_sub(1, Ordering::SeqCst);
    info!(connection = %connection_id, "WebSocket client disconnected");
}

/// Dispatch one inbound frame and build the reply, if any.
async fn handle_frame(
    dispatcher: &Dispatcher,
    context: RequestContext,
    frame: &[u8],
) -> Option<Message> {
    let (routing, body) = split_frame(frame)?;
    let request = ClientRequest::new(WEB_SOCKET_GATEWAY, Command::parse(routing), context)
        .with_body(body);
    let mut request = dispatcher.dispatch(request).await;

    match request.take_response()? {
        ResponseData::Bytes(bytes) => Some(Message::Binary(bytes)),
        response => Some(Message::Text(response.to_text())),
    }
}

/// Split a frame into its routing string and body. Empty frames yield `None`.
fn split_frame(frame: &[u8]) -> Option<(String, Vec<u8>)> {
    let (head, body) = match frame.iter().position(|b| *b == b'\n') {
        Some(pos) => (&frame[..pos], frame[pos + 1..].to_vec()),
        None => (frame, Vec::new()),
    };
    let routing = String::from_utf8_lossy(head).trim().to_string();
    if routing.is_empty() {
        return None;
    }
    Some((routing, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frame() {
        assert_eq!(
            split_frame(b"Dom/1/Cmd\r\nline one\nline two"),
            Some(("Dom/1/Cmd".to_string(), b"line one\nline two".to_vec()))
        );
        assert_eq!(
            split_frame(b"Dom/1/Cmd"),
            Some(("Dom/1/Cmd".to_string(), Vec::new()))
        );
        assert_eq!(split_frame(b"  \nbody"), None);
    }

    #[test]
    fn test_handshake_credentials() {
        let gateway = WebSocketGateway::new();
        let mut headers = HeaderMap::new();
        assert!(gateway.state.authorized(&headers));

        gateway.state.options.write().set("Username", "admin");
        gateway.state.options.write().set("Password", "secret");
        assert!(!gateway.state.authorized(&headers));

        let value = format!("Basic {}", STANDARD.encode("admin:secret"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        assert!(gateway.state.authorized(&headers));

        let value = format!("Basic {}", STANDARD.encode("admin:wrong"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        assert!(!gateway.state.authorized(&headers));
    }

    #[tokio::test]
    async fn test_handle_frame_replies_with_response() {
        let service = crate::service::MigService::new();
        service
            .handlers()
            .register(
                "Echo/1/Body",
                crate::api_handler!(|request: ClientRequest| async move {
                    Ok(Some(ResponseData::from(request.body_text().into_owned())))
                }),
            )
            .await;

        let reply = handle_frame(
            &service.dispatcher(),
            RequestContext::new("c1"),
            b"Echo/1/Body\nhello",
        )
        .await;
        assert!(matches!(reply, Some(Message::Text(text)) if text == "hello"));

        let reply = handle_frame(&service.dispatcher(), RequestContext::new("c1"), b"No/1/One").await;
        assert!(reply.is_none());
    }
}
