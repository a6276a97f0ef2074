//! Exec sessions against a scripted exec websocket.
//!
//! The fake server speaks the channel-multiplexed exec protocol: it greets
//! on stdout, echoes stdin back, records resizes and ends the process with
//! a status frame when it receives `exit` or `fail`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway::cluster::{ClusterClient, WebSocketExecTransport};
use gateway::config::ClusterConfig;
use gateway::session::{AttachmentError, BridgeOptions, SessionBridge};
use protocol::{ApiRequest, ChannelFrame, StreamChannel, TerminalSize, EXEC_SUBPROTOCOL};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, PartialEq)]
enum ServerEvent {
    Handshake {
        uri: String,
        authorization: Option<String>,
        protocol: Option<String>,
    },
    Resize(TerminalSize),
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn spawn_exec_server() -> (SocketAddr, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();

        let handshake_events = events.clone();
        let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let _ = handshake_events.send(ServerEvent::Handshake {
                uri: request.uri().to_string(),
                authorization: header(request, "authorization"),
                protocol: header(request, "sec-websocket-protocol"),
            });
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(EXEC_SUBPROTOCOL));
            Ok(response)
        };

        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        let greeting = ChannelFrame::new(StreamChannel::Stdout, b"welcome\n".to_vec());
        ws.send(Message::Binary(greeting.encode())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            let Message::Binary(data) = message else {
                continue;
            };
            let frame = ChannelFrame::decode(&data).unwrap();
            match frame.channel {
                StreamChannel::Resize => {
                    let size: TerminalSize = serde_json::from_slice(&frame.payload).unwrap();
                    let _ = events.send(ServerEvent::Resize(size));
                }
                StreamChannel::Stdin if frame.payload == b"exit\n" => {
                    let status = ChannelFrame::new(StreamChannel::Status, br#"{"status":"Success"}"#.to_vec());
                    let _ = ws.send(Message::Binary(status.encode())).await;
                    break;
                }
                StreamChannel::Stdin if frame.payload == b"fail\n" => {
                    let status = ChannelFrame::new(
                        StreamChannel::Status,
                        br#"{"status":"Failure","message":"command terminated with non-zero exit code","reason":"NonZeroExitCode"}"#.to_vec(),
                    );
                    let _ = ws.send(Message::Binary(status.encode())).await;
                    break;
                }
                StreamChannel::Stdin => {
                    let echo = ChannelFrame::new(StreamChannel::Stdout, frame.payload);
                    let _ = ws.send(Message::Binary(echo.encode())).await;
                }
                _ => {}
            }
        }
    });

    (addr, rx)
}

fn bridge_for() -> SessionBridge<WebSocketExecTransport> {
    SessionBridge::new(WebSocketExecTransport::new("bash"), BridgeOptions::default())
}

fn client_for(addr: SocketAddr) -> ClusterClient {
    ClusterClient::new(
        &ClusterConfig {
            name: "test".to_string(),
            server: format!("http://{}", addr),
            token: Some("secret".to_string()),
            insecure_skip_tls_verify: false,
        },
        Duration::from_secs(30),
    )
    .unwrap()
}

fn exec_request() -> ApiRequest {
    ApiRequest {
        cluster: "test".to_string(),
        timeout: 30,
        url: "/api/v1/namespaces/default/pods/foo/exec".to_string(),
        container: Some("app".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_exec_session_streams_and_finishes() {
    let (addr, mut events) = spawn_exec_server().await;
    let bridge = bridge_for();

    let id = bridge
        .start_exec_session(exec_request(), client_for(addr))
        .unwrap();
    let mut terminal = bridge.attach(&id).unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        ServerEvent::Handshake {
            uri: "/api/v1/namespaces/default/pods/foo/exec?command=bash&container=app&stdin=true&stdout=true&stderr=true&tty=true".to_string(),
            authorization: Some("Bearer secret".to_string()),
            protocol: Some(EXEC_SUBPROTOCOL.to_string()),
        }
    );

    assert_eq!(terminal.read().await.unwrap().as_ref(), b"welcome\n");

    terminal.resize(TerminalSize::new(120, 40)).unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        ServerEvent::Resize(TerminalSize::new(120, 40))
    );

    terminal.write(&b"ls\n"[..]).await.unwrap();
    assert_eq!(terminal.read().await.unwrap().as_ref(), b"ls\n");

    terminal.write(&b"exit\n"[..]).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), terminal.wait())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
}

#[tokio::test]
async fn test_exec_failure_status_is_reported() {
    let (addr, _events) = spawn_exec_server().await;
    let bridge = bridge_for();

    let id = bridge
        .start_exec_session(exec_request(), client_for(addr))
        .unwrap();
    let mut terminal = bridge.attach(&id).unwrap();
    assert_eq!(terminal.read().await.unwrap().as_ref(), b"welcome\n");

    terminal.write(&b"fail\n"[..]).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), terminal.wait())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Err(AttachmentError::Remote(
            "command terminated with non-zero exit code".to_string()
        ))
    );

    let late = bridge.terminals().get(&id).unwrap().bound().peek();
    assert_eq!(late, Some(outcome));
}

#[tokio::test]
async fn test_dropping_attacher_detaches_session() {
    let (addr, _events) = spawn_exec_server().await;
    let bridge = bridge_for();

    let id = bridge
        .start_exec_session(exec_request(), client_for(addr))
        .unwrap();
    let mut terminal = bridge.attach(&id).unwrap();
    assert_eq!(terminal.read().await.unwrap().as_ref(), b"welcome\n");
    drop(terminal);

    let mut bound = bridge.terminals().get(&id).unwrap().bound();
    let outcome = tokio::time::timeout(Duration::from_secs(10), bound.wait())
        .await
        .unwrap();
    assert_eq!(outcome, Err(AttachmentError::Detached));
}
