//! Exec over the channel-multiplexed cluster websocket.
//!
//! Every binary message starts with a channel byte: 0 stdin, 1 stdout,
//! 2 stderr, 3 status, 4 resize. The remote process is finished once a
//! status frame arrives or the socket closes.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::{ApiRequest, ChannelFrame, ExecStatus, StreamChannel, EXEC_SUBPROTOCOL};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use super::ClusterClient;
use crate::session::{AttachmentError, ExecTransport, ResizeEvents, TerminalIo};

/// Shell used when neither a command nor a shell is requested.
pub const DEFAULT_SHELL: &str = "sh";

/// An open exec websocket that has not started streaming yet.
#[derive(Debug)]
pub struct ExecConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// [`ExecTransport`] over the cluster exec websocket.
#[derive(Debug, Clone)]
pub struct WebSocketExecTransport {
    default_shell: String,
}

impl Default for WebSocketExecTransport {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl WebSocketExecTransport {
    pub fn new(default_shell: impl Into<String>) -> Self {
        Self {
            default_shell: default_shell.into(),
        }
    }

    pub fn default_shell(&self) -> &str {
        &self.default_shell
    }

    /// Command argv for `request`: explicit command, else the requested
    /// shell, else the default shell.
    pub fn command_for(&self, request: &ApiRequest) -> Vec<String> {
        if !request.command.is_empty() {
            return request.command.clone();
        }
        match request.shell.as_deref() {
            Some(shell) if !shell.is_empty() => vec![shell.to_string()],
            _ => vec![self.default_shell.clone()],
        }
    }

    /// Query parameters of the exec endpoint.
    pub fn exec_query(&self, request: &ApiRequest) -> Vec<(&'static str, String)> {
        let mut query: Vec<_> = self
            .command_for(request)
            .into_iter()
            .map(|arg| ("command", arg))
            .collect();
        if let Some(container) = request.container.as_deref().filter(|c| !c.is_empty()) {
            query.push(("container", container.to_string()));
        }
        for stream in ["stdin", "stdout", "stderr", "tty"] {
            query.push((stream, "true".to_string()));
        }
        query
    }
}

impl ExecTransport for WebSocketExecTransport {
    type Client = ClusterClient;
    type Connection = ExecConnection;

    async fn connect(
        &self,
        client: &ClusterClient,
        request: &ApiRequest,
    ) -> Result<ExecConnection, AttachmentError> {
        let url = client
            .websocket_url(&request.url, &self.exec_query(request))
            .map_err(|e| AttachmentError::Unreachable(e.to_string()))?;

        let mut ws_request = url
            .as_str()
            .into_client_request()
            .map_err(|e| AttachmentError::Unreachable(e.to_string()))?;
        let headers = ws_request.headers_mut();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(EXEC_SUBPROTOCOL),
        );
        if let Some(token) = client.token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| AttachmentError::Unreachable(format!("invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let connector = if client.insecure() {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| AttachmentError::Unreachable(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        tracing::debug!(cluster = %client.name(), url = %url, "Connecting exec websocket");

        let (ws, _) = connect_async_tls_with_config(ws_request, None, false, connector)
            .await
            .map_err(|e| AttachmentError::Unreachable(format!("exec websocket failed: {}", e)))?;

        Ok(ExecConnection { ws })
    }

    async fn stream(
        &self,
        connection: ExecConnection,
        terminal: TerminalIo,
        mut resize: ResizeEvents,
    ) -> Result<(), AttachmentError> {
        let (mut ws_sink, mut ws_stream) = connection.ws.split();
        let TerminalIo { mut input, output } = terminal;

        loop {
            tokio::select! {
                message = ws_stream.next() => match message {
                    Some(Ok(WsMessage::Binary(data))) => {
                        let frame = match ChannelFrame::decode(&data) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::debug!(error = %e, "Ignoring malformed exec frame");
                                continue;
                            }
                        };
                        match frame.channel {
                            StreamChannel::Stdout | StreamChannel::Stderr => {
                                if output.send(Bytes::from(frame.payload)).await.is_err() {
                                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                                    return Err(AttachmentError::Detached);
                                }
                            }
                            StreamChannel::Status => {
                                let status = ExecStatus::from_payload(&frame.payload)
                                    .map_err(|e| AttachmentError::Io(e.to_string()))?;
                                return if status.is_success() {
                                    Ok(())
                                } else {
                                    Err(AttachmentError::Remote(status.describe()))
                                };
                            }
                            StreamChannel::Stdin | StreamChannel::Resize => {}
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(AttachmentError::Io(e.to_string())),
                },
                data = input.recv() => match data {
                    Some(data) => {
                        let frame = ChannelFrame::stdin(&data);
                        ws_sink
                            .send(WsMessage::Binary(frame.encode()))
                            .await
                            .map_err(|e| AttachmentError::Io(e.to_string()))?;
                    }
                    None => {
                        let _ = ws_sink.send(WsMessage::Close(None)).await;
                        return Err(AttachmentError::Detached);
                    }
                },
                Some(size) = resize.next() => {
                    let frame = ChannelFrame::resize(size)
                        .map_err(|e| AttachmentError::Io(e.to_string()))?;
                    ws_sink
                        .send(WsMessage::Binary(frame.encode()))
                        .await
                        .map_err(|e| AttachmentError::Io(e.to_string()))?;
                    tracing::debug!(width = size.width, height = size.height, "Applied terminal resize");
                }
            }
        }
    }
}
