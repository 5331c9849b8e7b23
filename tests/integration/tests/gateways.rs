//! Gateway integration tests over real sockets.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use mig_core::{Event, OptionSet, ResponseData};
use mig_gateway::{
    handler_fn, ClientRequest, Gateway, MigService, TcpSocketGateway, WebServiceGateway,
    WebSocketGateway,
};
use mig_interfaces::{InterfaceFactory, VirtualInterfaceFactory};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

fn loopback(extra: &[(&str, &str)]) -> OptionSet {
    let mut options = OptionSet::new();
    options.set("Host", "127.0.0.1");
    options.set("Port", "0");
    for (name, value) in extra {
        options.set(*name, *value);
    }
    options
}

async fn local_addr(service: &MigService, gateway: &str) -> SocketAddr {
    service
        .gateway(gateway)
        .await
        .and_then(|g| g.local_addr())
        .expect("gateway should be listening")
}

async fn register_echo(service: &MigService) {
    service
        .handlers()
        .register(
            "Echo/1/Say",
            handler_fn(|request: ClientRequest| async move {
                let text = request.command().option(0).into_owned();
                Ok(Some(ResponseData::from(text)))
            }),
        )
        .await;
}

async fn next_json(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Value {
    let line = tokio::time::timeout(TIMEOUT, lines.next_line())
        .await
        .expect("timed out waiting for a line")
        .unwrap()
        .expect("connection closed");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_tcp_gateway_routes_commands_and_events() {
    let service = MigService::new();
    service
        .add_gateway(Arc::new(TcpSocketGateway::new()), loopback(&[]))
        .await
        .unwrap();

    let mut options = OptionSet::new();
    options.set("Modules", "1");
    let interface = VirtualInterfaceFactory
        .create("HomeAutomation.Virtual", &options)
        .await
        .unwrap();
    service.add_interface(interface, true, options).await.unwrap();
    service.start().await.unwrap();

    let addr = local_addr(&service, "TcpSocketGateway").await;
    let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"HomeAutomation.Virtual/1/Control.On\n")
        .await
        .unwrap();

    // The response and the resulting event may arrive in either order
    let received = [next_json(&mut lines).await, next_json(&mut lines).await];
    assert!(received.iter().any(|v| v["Status"] == "Ok"));
    let event = received
        .iter()
        .find(|v| v.get("Property").is_some())
        .expect("event line");
    assert_eq!(event["Domain"], "HomeAutomation.Virtual");
    assert_eq!(event["Source"], "1");
    assert_eq!(event["Property"], "Status.Level");
    assert_eq!(event["Value"], 1.0);

    writer
        .write_all(b"MIGService.Interfaces/HomeAutomation.Virtual/IsEnabled.Set/0\n")
        .await
        .unwrap();
    assert_eq!(next_json(&mut lines).await["Status"], "Ok");

    writer
        .write_all(b"MIGService.Interfaces/HomeAutomation.Virtual/IsEnabled.Get\n")
        .await
        .unwrap();
    assert_eq!(next_json(&mut lines).await["ResponseValue"], "0");

    // Disabled interfaces are no longer routed to, so nothing comes back
    writer
        .write_all(b"HomeAutomation.Virtual/1/Control.Off\n")
        .await
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(300), lines.next_line())
            .await
            .is_err()
    );

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_websocket_gateway_replies_and_broadcasts() {
    let service = MigService::new();
    register_echo(&service).await;
    service
        .add_gateway(Arc::new(WebSocketGateway::new()), loopback(&[]))
        .await
        .unwrap();
    service.start().await.unwrap();

    let addr = local_addr(&service, "WebSocketGateway").await;
    let url = format!("ws://{}/events", addr);
    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    // A reply proves the connection loop, and its event subscription, is live
    for socket in [&mut first, &mut second] {
        socket
            .send(Message::Text("Echo/1/Say/hello%20there".to_string()))
            .await
            .unwrap();
        let reply = tokio::time::timeout(TIMEOUT, socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply, Message::Text("hello there".to_string()));
    }

    service.raise_event(Event::new("Test.Domain", "42", "Sensor", "Meter.Watts", 12.5));

    for socket in [&mut first, &mut second] {
        let frame = tokio::time::timeout(TIMEOUT, socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = frame else {
            panic!("expected a text frame, got {:?}", frame);
        };
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["Domain"], "Test.Domain");
        assert_eq!(event["Property"], "Meter.Watts");
        assert_eq!(event["Value"], 12.5);
    }

    service.stop().await.unwrap();
    let closed = tokio::time::timeout(TIMEOUT, first.next()).await.unwrap();
    assert!(matches!(closed, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn test_websocket_handshake_requires_configured_credentials() {
    let service = MigService::new();
    service
        .add_gateway(
            Arc::new(WebSocketGateway::new()),
            loopback(&[("Username", "admin"), ("Password", "secret")]),
        )
        .await
        .unwrap();
    service.start().await.unwrap();

    let url = format!("ws://{}/", local_addr(&service, "WebSocketGateway").await);
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());

    let mut request = url.as_str().into_client_request().unwrap();
    let credentials = format!("Basic {}", STANDARD.encode("admin:secret"));
    request
        .headers_mut()
        .insert("Authorization", HeaderValue::from_str(&credentials).unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_ok());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_http_gateway_serves_api_over_socket() {
    let service = MigService::new();
    register_echo(&service).await;
    service
        .add_gateway(Arc::new(WebServiceGateway::new()), loopback(&[("BaseUrl", "/mig/")]))
        .await
        .unwrap();
    service.start().await.unwrap();

    let addr = local_addr(&service, "WebServiceGateway").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /mig/api/Echo/1/Say/hi HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("hi"), "{}", response);

    service.stop().await.unwrap();
    assert!(service.gateway("WebServiceGateway").await.unwrap().local_addr().is_none());
}
