//! Room actors: one tokio task per live room.
//!
//! DESIGN
//! ======
//! Every command for a room goes through a bounded mpsc channel to the
//! task that owns its [`Room`]. The task applies commands one at a time,
//! wakes for the room's next timer deadline, and after each step turns the
//! room's outbox into per-connection frames. No lock guards room state.
//!
//! Connections are keyed by session. Each carries a connection id so a
//! late `Leave` from a socket that was already replaced is ignored.
//!
//! LIFECYCLE
//! =========
//! 1. First join spawns the actor, loading the board for retro rooms
//! 2. Commands and timers run until the room has no participants
//! 3. Final board save, then deregistration under the registry write lock
//! 4. Commands that raced the shutdown are answered with `RoomError::Closed`

use std::collections::HashMap;
use std::sync::Arc;

use frames::{ClientMessage, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::ErrorCode;
use crate::services::persistence::{SnapshotStore, load_board, save_snapshot};
use crate::services::room::{Effect, Room, RoomError, Seat, SessionId};
use crate::state::{AppState, RoomKey, RoomRegistry};

// =============================================================================
// TYPES
// =============================================================================

/// What a room asks a connection's socket task to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

/// Outbound half of one websocket, registered with the room it joined.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub tx: mpsc::Sender<Outbound>,
}

pub enum RoomCommand {
    Join {
        name: String,
        avatar: Option<u8>,
        conn: Connection,
        reply: oneshot::Sender<Result<Seat, RoomError>>,
    },
    Resume {
        token: String,
        conn: Connection,
        reply: oneshot::Sender<Result<Seat, RoomError>>,
    },
    Message {
        session_id: SessionId,
        conn_id: Uuid,
        message: ClientMessage,
    },
    Leave {
        session_id: SessionId,
        conn_id: Uuid,
        consented: bool,
    },
}

/// Cloneable address of a running room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    instance: Uuid,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    #[cfg(test)]
    #[must_use]
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Take a new seat. The `joined` frame arrives on `conn`.
    ///
    /// # Errors
    ///
    /// Returns the room's rejection, or [`RoomError::Closed`] if the actor
    /// shut down before answering.
    pub async fn join(&self, name: String, avatar: Option<u8>, conn: Connection) -> Result<Seat, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Join { name, avatar, conn, reply }, rx).await
    }

    /// Reclaim a seat by token. The `joined` frame arrives on `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownSession`] for a dead token, or
    /// [`RoomError::Closed`] if the actor shut down before answering.
    pub async fn resume(&self, token: String, conn: Connection) -> Result<Seat, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Resume { token, conn, reply }, rx).await
    }

    /// Forward a client message. Returns false if the room is gone.
    pub async fn message(&self, session_id: SessionId, conn_id: Uuid, message: ClientMessage) -> bool {
        self.tx
            .send(RoomCommand::Message { session_id, conn_id, message })
            .await
            .is_ok()
    }

    /// Report a closed connection.
    pub async fn leave(&self, session_id: SessionId, conn_id: Uuid, consented: bool) {
        let _ = self
            .tx
            .send(RoomCommand::Leave { session_id, conn_id, consented })
            .await;
    }

    async fn request(
        &self,
        command: RoomCommand,
        rx: oneshot::Receiver<Result<Seat, RoomError>>,
    ) -> Result<Seat, RoomError> {
        self.tx.send(command).await.map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)?
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Handle for the room at `key`, spawning its actor if none is running.
pub async fn get_or_spawn(state: &AppState, key: &RoomKey) -> RoomHandle {
    {
        let rooms = state.rooms.read().await;
        if let Some(handle) = rooms.get(key).filter(|h| !h.is_closed()) {
            return handle.clone();
        }
    }

    let board = if key.kind.has_board() { Some(load_board(state.store.as_ref(), &key.room_id).await) } else { None };

    let mut rooms = state.rooms.write().await;
    if let Some(handle) = rooms.get(key).filter(|h| !h.is_closed()) {
        return handle.clone();
    }

    let (tx, rx) = mpsc::channel(state.config.room_command_capacity);
    let handle = RoomHandle { instance: Uuid::new_v4(), tx };
    let actor = RoomActor {
        key: key.clone(),
        instance: handle.instance,
        room: Room::new(key.room_id.clone(), key.kind, state.config.room, board),
        connections: HashMap::new(),
        rx,
        store: Arc::clone(&state.store),
        registry: Arc::clone(&state.rooms),
    };
    rooms.insert(key.clone(), handle.clone());
    info!(kind = %key.kind, room_id = %key.room_id, instance = %handle.instance, "room opened");
    tokio::spawn(actor.run());
    handle
}

// =============================================================================
// ACTOR
// =============================================================================

struct RoomActor {
    key: RoomKey,
    instance: Uuid,
    room: Room,
    connections: HashMap<SessionId, Connection>,
    rx: mpsc::Receiver<RoomCommand>,
    store: Arc<dyn SnapshotStore>,
    registry: RoomRegistry,
}

impl RoomActor {
    async fn run(mut self) {
        loop {
            let deadline = self.room.next_deadline();
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    self.apply(command).await;
                }
                () = sleep_until(deadline) => {
                    self.room.fire_due(Instant::now());
                    self.flush(None).await;
                }
            }

            if self.room.is_empty() && self.close().await {
                break;
            }
        }
        info!(kind = %self.key.kind, room_id = %self.key.room_id, "room closed");
    }

    async fn apply(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join { name, avatar, conn, reply } => {
                let result = self.room.join(&name, avatar);
                self.seat(result, conn, reply).await;
            }
            RoomCommand::Resume { token, conn, reply } => {
                let result = self.room.resume(&token);
                self.seat(result, conn, reply).await;
            }
            RoomCommand::Message { session_id, conn_id, message } => {
                if !self.is_current(session_id, conn_id) {
                    debug!(room_id = %self.key.room_id, %session_id, "message from replaced connection dropped");
                    return;
                }
                self.room.handle(session_id, message, Instant::now());
                if self.room.participant(session_id).is_none() {
                    self.connections.remove(&session_id);
                }
                self.flush(None).await;
            }
            RoomCommand::Leave { session_id, conn_id, consented } => {
                if !self.is_current(session_id, conn_id) {
                    return;
                }
                self.connections.remove(&session_id);
                self.room.leave(session_id, consented, Instant::now());
                self.flush(None).await;
            }
        }
    }

    /// Register `conn` for a granted seat and greet it with `joined`.
    async fn seat(
        &mut self,
        result: Result<Seat, RoomError>,
        conn: Connection,
        reply: oneshot::Sender<Result<Seat, RoomError>>,
    ) {
        match result {
            Ok(seat) => {
                if let Some(previous) = self.connections.insert(seat.session_id, conn.clone())
                    && previous.id != conn.id
                {
                    info!(room_id = %self.key.room_id, session_id = %seat.session_id, "closing superseded connection");
                    deliver(&previous, Outbound::Close {
                        code: frames::CLOSE_REPLACED,
                        reason: "session resumed elsewhere".to_owned(),
                    });
                }
                let joined = ServerMessage::Joined {
                    session_id: seat.session_id.to_string(),
                    token: seat.token.clone(),
                    state: self.room.snapshot_for(Some(seat.session_id)),
                };
                deliver(&conn, Outbound::Message(joined));
                let session_id = seat.session_id;
                let _ = reply.send(Ok(seat));
                self.flush(Some(session_id)).await;
            }
            Err(e) => {
                if matches!(e, RoomError::Full(_)) {
                    warn!(room_id = %self.key.room_id, code = e.error_code(), "join rejected: room full");
                }
                let _ = reply.send(Err(e));
                self.flush(None).await;
            }
        }
    }

    /// Turn the room's outbox into frames. `greeted` already holds the
    /// current state in its `joined` frame.
    async fn flush(&mut self, greeted: Option<SessionId>) {
        let outbox = self.room.take_outbox();

        for effect in outbox.effects {
            match effect {
                Effect::Broadcast(message) => {
                    for conn in self.connections.values() {
                        deliver(conn, Outbound::Message(message.clone()));
                    }
                }
                Effect::Disconnect { session_id, code, reason } => {
                    if let Some(conn) = self.connections.remove(&session_id) {
                        deliver(&conn, Outbound::Message(ServerMessage::error("E_SESSION_REPLACED", reason.clone())));
                        deliver(&conn, Outbound::Close { code, reason });
                    }
                }
                Effect::Save(snapshot) => {
                    save_snapshot(self.store.as_ref(), &snapshot).await;
                }
            }
        }

        if outbox.state_changed {
            for (session_id, conn) in &self.connections {
                if Some(*session_id) == greeted {
                    continue;
                }
                let state = self.room.snapshot_for(Some(*session_id));
                deliver(conn, Outbound::Message(ServerMessage::State { state }));
            }
        }
    }

    /// Save and deregister an empty room. Returns false if commands arrived
    /// in the meantime and the room must keep running.
    async fn close(&mut self) -> bool {
        if let Some(snapshot) = self.room.final_snapshot() {
            save_snapshot(self.store.as_ref(), &snapshot).await;
        }

        let mut rooms = self.registry.write().await;
        if !self.rx.is_empty() {
            return false;
        }
        if rooms.get(&self.key).is_some_and(|h| h.instance == self.instance) {
            rooms.remove(&self.key);
        }
        self.rx.close();
        drop(rooms);

        while let Ok(command) = self.rx.try_recv() {
            match command {
                RoomCommand::Join { reply, .. } | RoomCommand::Resume { reply, .. } => {
                    let _ = reply.send(Err(RoomError::Closed));
                }
                RoomCommand::Message { .. } | RoomCommand::Leave { .. } => {}
            }
        }
        true
    }

    fn is_current(&self, session_id: SessionId, conn_id: Uuid) -> bool {
        self.connections.get(&session_id).is_some_and(|c| c.id == conn_id)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Best-effort send; a slow or gone client never blocks the room.
fn deliver(conn: &Connection, outbound: Outbound) {
    if let Err(e) = conn.tx.try_send(outbound) {
        match e {
            mpsc::error::TrySendError::Full(_) => warn!(conn_id = %conn.id, "client channel full; dropping frame"),
            mpsc::error::TrySendError::Closed(_) => debug!(conn_id = %conn.id, "client channel closed"),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "actor_test.rs"]
mod tests;
