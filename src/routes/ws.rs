//! WebSocket handler: relay between one socket and one room actor.
//!
//! DESIGN
//! ======
//! The socket task never touches room state. It turns the first frame into
//! a join or resume request, then runs a `select!` loop:
//! - Incoming client frames -> decode -> forward to the room actor
//! - Outbound frames from the actor -> encode -> socket
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade -> first text frame must be `join` or `resume`
//! 2. Room replies with a seat; the `joined` frame arrives on the channel
//! 3. Relay until the socket drops, the client says `leave`, or the room
//!    closes the connection
//! 4. Report the leave to the room; only an explicit `leave` is consented

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frames::{CLOSE_NORMAL, CLOSE_REJECTED, ClientMessage, RoomKind, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::ErrorCode;
use crate::services::actor::{self, Connection, Outbound, RoomHandle};
use crate::services::room::{RoomError, Seat, SessionId};
use crate::state::{AppState, RoomKey, is_valid_room_id};

/// How long a fresh socket may stay silent before its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts to reach a room whose actor is shutting down.
const ATTACH_ATTEMPTS: usize = 3;

/// The only frames accepted before a seat exists.
enum Hello {
    Join { name: String, avatar: Option<u8> },
    Resume { token: String },
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path((kind, room_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(kind) = kind.parse::<RoomKind>() else {
        return (StatusCode::NOT_FOUND, "unknown room kind").into_response();
    };
    if !is_valid_room_id(&room_id) {
        return (StatusCode::BAD_REQUEST, "invalid room id").into_response();
    }

    let key = RoomKey::new(kind, room_id);
    ws.on_upgrade(move |socket| run_ws(socket, state, key))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, key: RoomKey) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.client_channel_capacity);
    let conn = Connection { id: conn_id, tx };

    let Some(hello) = recv_hello(&mut socket, conn_id).await else {
        close(&mut socket, CLOSE_REJECTED, "expected join or resume").await;
        return;
    };

    let (handle, seat) = match attach(&state, &key, hello, conn).await {
        Ok(attached) => attached,
        Err(e) => {
            warn!(%conn_id, room_id = %key.room_id, code = e.error_code(), retryable = e.retryable(), error = %e, "ws: join rejected");
            let _ = send_message(&mut socket, &ServerMessage::error(e.error_code(), e.to_string())).await;
            close(&mut socket, CLOSE_REJECTED, &e.to_string()).await;
            return;
        }
    };

    let session_id = seat.session_id;
    info!(%conn_id, %session_id, kind = %key.kind, room_id = %key.room_id, "ws: client attached");

    let consented = relay(&mut socket, &handle, session_id, conn_id, &mut rx).await;
    handle.leave(session_id, conn_id, consented).await;

    info!(%conn_id, %session_id, consented, "ws: client detached");
}

/// Wait for the first frame and accept only `join` or `resume`.
async fn recv_hello(socket: &mut WebSocket, conn_id: Uuid) -> Option<Hello> {
    let wait = async {
        loop {
            match socket.recv().await? {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Binary(_) | Message::Close(_)) | Err(_) => return None,
            }
        }
    };
    let text = tokio::time::timeout(HANDSHAKE_TIMEOUT, wait).await.ok()??;

    match frames::decode_client(text.as_str()) {
        Ok(ClientMessage::Join { name, avatar }) => Some(Hello::Join { name, avatar }),
        Ok(ClientMessage::Resume { token }) => Some(Hello::Resume { token }),
        Ok(_) => {
            warn!(%conn_id, "ws: first frame was not join or resume");
            None
        }
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: invalid handshake frame");
            None
        }
    }
}

/// Seat the connection, retrying when it races a room that is closing.
async fn attach(
    state: &AppState,
    key: &RoomKey,
    hello: Hello,
    conn: Connection,
) -> Result<(RoomHandle, Seat), RoomError> {
    for _ in 0..ATTACH_ATTEMPTS {
        let handle = actor::get_or_spawn(state, key).await;
        let result = match &hello {
            Hello::Join { name, avatar } => handle.join(name.clone(), *avatar, conn.clone()).await,
            Hello::Resume { token } => handle.resume(token.clone(), conn.clone()).await,
        };
        match result {
            Ok(seat) => return Ok((handle, seat)),
            Err(RoomError::Closed) => debug!(conn_id = %conn.id, "ws: room closed during attach; retrying"),
            Err(e) => return Err(e),
        }
    }
    Err(RoomError::Closed)
}

/// Relay frames until the connection ends. Returns true for a consented leave.
async fn relay(
    socket: &mut WebSocket,
    handle: &RoomHandle,
    session_id: SessionId,
    conn_id: Uuid,
    rx: &mut mpsc::Receiver<Outbound>,
) -> bool {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { return false };
                match msg {
                    Message::Text(text) => match frames::decode_client(text.as_str()) {
                        Ok(ClientMessage::Leave) => {
                            close(socket, CLOSE_NORMAL, "left").await;
                            return true;
                        }
                        Ok(message) => {
                            if !handle.message(session_id, conn_id, message).await {
                                close(socket, CLOSE_NORMAL, "room closed").await;
                                return false;
                            }
                        }
                        Err(e) => warn!(%conn_id, %session_id, error = %e, "ws: invalid inbound frame"),
                    },
                    Message::Close(_) => return false,
                    _ => {}
                }
            }
            outbound = rx.recv() => match outbound {
                Some(Outbound::Message(message)) => {
                    if send_message(socket, &message).await.is_err() {
                        return false;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    info!(%conn_id, %session_id, code, reason = %reason, "ws: closed by room");
                    close(socket, code, &reason).await;
                    return false;
                }
                None => return false,
            }
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    match message {
        ServerMessage::Error { code, message } => warn!(code = %code, message = %message, "ws: send error"),
        ServerMessage::Joined { session_id, .. } => info!(%session_id, "ws: send joined"),
        ServerMessage::State { .. } | ServerMessage::EmojiThrown { .. } => debug!("ws: send frame"),
    }
    socket
        .send(Message::Text(frames::encode(message).into()))
        .await
        .map_err(|_| ())
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
