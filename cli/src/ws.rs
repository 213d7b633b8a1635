//! WebSocket transport for the room client.

use std::time::Duration;

use client::{ConnectError, Established, LinkEvent, RoomConnector, RoomLink};
use frames::{ClientMessage, RoomKind, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::CliError;

type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// How long the server may take to answer `join`/`resume`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// `ws://` or `wss://` root derived from the server's HTTP base URL.
pub fn ws_base(base_url: &str) -> Result<String, CliError> {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }
    if base.starts_with("ws://") || base.starts_with("wss://") {
        return Ok(base.to_owned());
    }
    Err(CliError::InvalidBaseUrl(base_url.to_owned()))
}

#[must_use]
pub fn room_url(ws_base: &str, kind: RoomKind, room_id: &str) -> String {
    format!("{ws_base}/api/rooms/{kind}/{room_id}/ws")
}

pub struct WsConnector {
    ws_base: String,
}

impl WsConnector {
    /// # Errors
    ///
    /// Returns [`CliError::InvalidBaseUrl`] for a URL that is not http(s) or
    /// ws(s).
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        Ok(Self { ws_base: ws_base(base_url)? })
    }
}

#[async_trait::async_trait]
impl RoomConnector for WsConnector {
    type Link = WsLink;

    async fn connect(
        &self,
        kind: RoomKind,
        room_id: &str,
        hello: ClientMessage,
    ) -> Result<Established<WsLink>, ConnectError> {
        let url = room_url(&self.ws_base, kind, room_id);
        let (mut stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        stream
            .send(Message::Text(frames::encode(&hello).into()))
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, next_server_message(&mut stream))
            .await
            .map_err(|_| ConnectError::Transport("timed out waiting for joined".to_owned()))?;

        match reply? {
            ServerMessage::Joined { session_id, token, state } => {
                debug!(%url, %session_id, "handshake complete");
                Ok(Established { session_id, token, state, link: WsLink { stream } })
            }
            ServerMessage::Error { code, message } => Err(ConnectError::Rejected { code, message }),
            other => {
                warn!(?other, "unexpected handshake reply");
                Err(ConnectError::Closed)
            }
        }
    }
}

/// First decodable server frame; a close before it is a handshake failure.
async fn next_server_message(stream: &mut Stream) -> Result<ServerMessage, ConnectError> {
    loop {
        let Some(message) = stream.next().await else {
            return Err(ConnectError::Closed);
        };
        match message.map_err(|e| ConnectError::Transport(e.to_string()))? {
            Message::Text(text) => match frames::decode_server(text.as_str()) {
                Ok(message) => return Ok(message),
                Err(e) => warn!(error = %e, "invalid server frame"),
            },
            Message::Close(_) => return Err(ConnectError::Closed),
            _ => {}
        }
    }
}

pub struct WsLink {
    stream: Stream,
}

#[async_trait::async_trait]
impl RoomLink for WsLink {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), ConnectError> {
        self.stream
            .send(Message::Text(frames::encode(message).into()))
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> LinkEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match frames::decode_server(text.as_str()) {
                    Ok(message) => return LinkEvent::Message(message),
                    Err(e) => warn!(error = %e, "invalid server frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return LinkEvent::Closed { code: frame.map(|f| u16::from(f.code)) };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket error");
                    return LinkEvent::Closed { code: None };
                }
                None => return LinkEvent::Closed { code: None },
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame { code: CloseCode::Normal, reason: "bye".into() };
        let _ = self.stream.close(Some(frame)).await;
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
