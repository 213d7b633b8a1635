use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::*;
use crate::state::test_helpers;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, crate::routes::app(state)).await;
    });
    addr
}

async fn connect(addr: SocketAddr, kind: &str, room: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/api/rooms/{kind}/{room}/ws")).await.expect("connect");
    ws
}

async fn send(ws: &mut Client, message: &ClientMessage) {
    ws.send(WsMessage::Text(frames::encode(message).into())).await.expect("send");
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("receive timed out")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return frames::decode_server(text.as_str()).expect("server frame decodes");
        }
    }
}

async fn recv_close(ws: &mut Client) -> u16 {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next()).await.expect("close timed out");
        match msg {
            Some(Ok(WsMessage::Close(Some(frame)))) => return u16::from(frame.code),
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

async fn join(ws: &mut Client, name: &str) -> (String, String) {
    send(ws, &ClientMessage::Join { name: name.to_owned(), avatar: None }).await;
    match recv(ws).await {
        ServerMessage::Joined { session_id, token, .. } => (session_id, token),
        other => panic!("expected joined, got {other:?}"),
    }
}

/// Next state frame, skipping animation events.
async fn recv_state(ws: &mut Client) -> frames::RoomSnapshot {
    loop {
        match recv(ws).await {
            ServerMessage::State { state } => return state,
            ServerMessage::EmojiThrown { .. } => {}
            other => panic!("expected state, got {other:?}"),
        }
    }
}

// =============================================================================
// handshake
// =============================================================================

#[tokio::test]
async fn join_returns_session_token_and_state() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ws = connect(addr, "scrum", "sprint-1").await;

    send(&mut ws, &ClientMessage::Join { name: "Ada".to_owned(), avatar: Some(9) }).await;
    match recv(&mut ws).await {
        ServerMessage::Joined { session_id, token, state } => {
            assert_eq!(token.len(), 64);
            assert_eq!(state.room_id, "sprint-1");
            assert_eq!(state.kind, RoomKind::Scrum);
            let me = state.participant(&session_id).expect("self in state");
            assert_eq!(me.name, "Ada");
            assert_eq!(me.avatar, 9);
        }
        other => panic!("expected joined, got {other:?}"),
    }
}

#[tokio::test]
async fn first_frame_other_than_join_is_rejected() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ws = connect(addr, "scrum", "sprint-1").await;

    send(&mut ws, &ClientMessage::Vote { vote: "3".to_owned() }).await;
    assert_eq!(recv_close(&mut ws).await, CLOSE_REJECTED);
}

#[tokio::test]
async fn unknown_room_kind_is_not_upgraded() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    assert!(connect_async(format!("ws://{addr}/api/rooms/poker/x/ws")).await.is_err());
    assert!(connect_async(format!("ws://{addr}/api/rooms/scrum/bad%20id/ws")).await.is_err());
}

#[tokio::test]
async fn full_room_reports_error_then_closes() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut seated = Vec::new();
    for name in ["a", "b", "c"] {
        let mut ws = connect(addr, "scrum", "packed").await;
        join(&mut ws, name).await;
        seated.push(ws);
    }

    let mut late = connect(addr, "scrum", "packed").await;
    send(&mut late, &ClientMessage::Join { name: "d".to_owned(), avatar: None }).await;
    match recv(&mut late).await {
        ServerMessage::Error { code, message } => {
            assert_eq!(code, "E_ROOM_FULL");
            assert!(message.contains("full"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(recv_close(&mut late).await, CLOSE_REJECTED);
}

// =============================================================================
// lifecycle
// =============================================================================

#[tokio::test]
async fn dropped_socket_resumes_with_vote_intact() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ada = connect(addr, "scrum", "flaky").await;
    let (ada_id, token) = join(&mut ada, "Ada").await;
    let mut grace = connect(addr, "scrum", "flaky").await;
    join(&mut grace, "Grace").await;
    recv_state(&mut ada).await;

    send(&mut ada, &ClientMessage::Vote { vote: "5".to_owned() }).await;
    recv_state(&mut grace).await;
    drop(ada);

    let held = recv_state(&mut grace).await;
    let seat = held.participant(&ada_id).expect("seat held");
    assert_eq!(seat.status, frames::Status::Disconnected);
    assert!(seat.voted);

    let mut back = connect(addr, "scrum", "flaky").await;
    send(&mut back, &ClientMessage::Resume { token }).await;
    match recv(&mut back).await {
        ServerMessage::Joined { session_id, state, .. } => {
            assert_eq!(session_id, ada_id);
            let me = state.participant(&ada_id).expect("self");
            assert_eq!(me.vote, "5");
            assert_eq!(me.status, frames::Status::Ready);
        }
        other => panic!("expected joined, got {other:?}"),
    }
}

#[tokio::test]
async fn leave_message_removes_seat_immediately() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ada = connect(addr, "scrum", "polite").await;
    let (ada_id, token) = join(&mut ada, "Ada").await;
    let mut grace = connect(addr, "scrum", "polite").await;
    join(&mut grace, "Grace").await;

    send(&mut ada, &ClientMessage::Leave).await;
    assert_eq!(recv_close(&mut ada).await, CLOSE_NORMAL);

    let after = recv_state(&mut grace).await;
    assert!(after.participant(&ada_id).is_none());

    let mut again = connect(addr, "scrum", "polite").await;
    send(&mut again, &ClientMessage::Resume { token }).await;
    assert!(matches!(recv(&mut again).await, ServerMessage::Error { code, .. } if code == "E_UNKNOWN_SESSION"));
}

#[tokio::test]
async fn same_name_from_second_tab_closes_first_with_replaced_code() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut first = connect(addr, "retro", "tabs").await;
    join(&mut first, "Ada").await;

    let mut second = connect(addr, "retro", "tabs").await;
    join(&mut second, "Ada").await;

    assert!(matches!(recv(&mut first).await, ServerMessage::Error { code, .. } if code == "E_SESSION_REPLACED"));
    assert_eq!(recv_close(&mut first).await, frames::CLOSE_REPLACED);
}

#[tokio::test]
async fn board_edit_reaches_every_participant() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ada = connect(addr, "retro", "board").await;
    join(&mut ada, "Ada").await;
    let mut grace = connect(addr, "retro", "board").await;
    join(&mut grace, "Grace").await;
    recv_state(&mut ada).await;

    send(&mut ada, &ClientMessage::AddItem { column_id: "went-well".to_owned(), content: "demo day".to_owned() }).await;

    let seen = recv_state(&mut grace).await;
    let column = seen.column("went-well").expect("column");
    assert_eq!(column.items.len(), 1);
    assert_eq!(column.items[0].author_name, "Ada");
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut ada = connect(addr, "scrum", "noisy").await;
    join(&mut ada, "Ada").await;

    ada.send(WsMessage::Text("{\"type\":\"launch\"}".into())).await.expect("send");
    send(&mut ada, &ClientMessage::Vote { vote: "2".to_owned() }).await;

    let state = recv_state(&mut ada).await;
    assert!(state.participants[0].voted);
}

// =============================================================================
// http
// =============================================================================

#[tokio::test]
async fn healthz_responds_ok() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    assert!(response.starts_with("HTTP/1.1 200"));
}
