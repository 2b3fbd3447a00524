//! WebSocket server and connection handling.

use crate::broadcast::ConnectionHub;
use crate::lobby::Lobby;
use crate::orchestrator::{GameOrchestrator, OrchestratorConfig};
use crate::protocol::{ClientMessage, RoomStatus, ServerMessage};
use crate::store::MemoryStore;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use ludo_core::Color;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A connection's seat
#[derive(Debug, Clone)]
struct Membership {
    room_code: String,
    color: Color,
}

/// Server state shared across all connections.
pub struct ServerState {
    pub orchestrator: Arc<GameOrchestrator>,
    pub lobby: Lobby,
    pub hub: Arc<ConnectionHub>,
    /// Seat held by each connection
    memberships: DashMap<Uuid, Membership>,
}

impl ServerState {
    pub fn new(config: OrchestratorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(ConnectionHub::new());
        let orchestrator = Arc::new(GameOrchestrator::new(store.clone(), hub.clone(), config));
        let lobby = Lobby::new(store, orchestrator.clone());

        Self {
            orchestrator,
            lobby,
            hub,
            memberships: DashMap::new(),
        }
    }

    fn send_error(&self, connection_id: Uuid, code: &str, message: impl ToString) {
        self.hub.send_to(
            connection_id,
            ServerMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Free the connection's seat and stop its subscription
    fn release_seat(&self, connection_id: Uuid) -> Option<Membership> {
        let (_, membership) = self.memberships.remove(&connection_id)?;
        self.hub.unsubscribe(&membership.room_code, connection_id);

        match self
            .lobby
            .leave(&membership.room_code, membership.color.as_str())
        {
            Ok(Some(room)) => {
                self.hub
                    .broadcast_to_room(&membership.room_code, ServerMessage::RoomUpdated { room });
            }
            Ok(None) => self.hub.close_room(&membership.room_code),
            Err(e) => warn!(room = %membership.room_code, error = %e, "leave failed"),
        }
        Some(membership)
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Ludo server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.hub.register(connection_id, tx);

    let welcome = ServerMessage::Welcome { connection_id };
    ws_sender
        .send(Message::Text(serde_json::to_string(&welcome)?.into()))
        .await?;

    // Forward queued messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(connection_id, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, e);
                    state.send_error(connection_id, "BAD_REQUEST", e);
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                state.hub.send_to(connection_id, ServerMessage::Pong);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    handle_disconnect(connection_id, &state);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Handle a client message.
///
/// Game actions run synchronously through the orchestrator; the acting
/// client gets the resulting state back directly, everyone in the room gets
/// the broadcast envelope.
pub fn handle_message(connection_id: Uuid, msg: ClientMessage, state: &ServerState) {
    match msg {
        ClientMessage::CreateRoom { name } => match state.lobby.create_room(name) {
            Ok(room) => state
                .hub
                .send_to(connection_id, ServerMessage::RoomCreated { room }),
            Err(e) => state.send_error(connection_id, e.kind(), e),
        },

        ClientMessage::JoinRoom {
            room_code,
            player_name,
            preferred_color,
        } => {
            if state.memberships.contains_key(&connection_id) {
                state.send_error(connection_id, "CONFLICT", "Already seated in a room");
                return;
            }
            match state
                .lobby
                .join(&room_code, &player_name, preferred_color.as_deref())
            {
                Ok((room, player)) => {
                    state.memberships.insert(
                        connection_id,
                        Membership {
                            room_code: room_code.clone(),
                            color: player.color,
                        },
                    );
                    state
                        .hub
                        .broadcast_to_room(&room_code, ServerMessage::RoomUpdated { room: room.clone() });
                    state.hub.subscribe(&room_code, connection_id);
                    state
                        .hub
                        .send_to(connection_id, ServerMessage::JoinedRoom { room, player });
                }
                Err(e) => state.send_error(connection_id, e.kind(), e),
            }
        }

        ClientMessage::LeaveRoom => {
            if state.release_seat(connection_id).is_some() {
                state.hub.send_to(connection_id, ServerMessage::LeftRoom);
            }
        }

        ClientMessage::StartGame => {
            let Some(room_code) = state
                .memberships
                .get(&connection_id)
                .map(|m| m.room_code.clone())
            else {
                state.send_error(connection_id, "CONFLICT", "Not in a room");
                return;
            };

            let started = state
                .lobby
                .start(&room_code)
                .map_err(|e| (e.kind(), e.to_string()))
                .and_then(|room| {
                    state
                        .orchestrator
                        .state(&room_code)
                        .map(|view| (room, view))
                        .map_err(|e| (e.kind(), e.to_string()))
                });

            match started {
                Ok((room, view)) => {
                    state
                        .hub
                        .broadcast_to_room(&room_code, ServerMessage::RoomUpdated { room });
                    state
                        .hub
                        .broadcast_to_room(&room_code, ServerMessage::GameStarted { state: view });
                }
                Err((code, message)) => state.send_error(connection_id, code, message),
            }
        }

        ClientMessage::Roll { room_code, color } => {
            match state.orchestrator.roll(&room_code, &color) {
                Ok(view) => state
                    .hub
                    .send_to(connection_id, ServerMessage::GameState { state: view }),
                Err(e) => {
                    info!(room = %room_code, color = %color, error = %e, "roll rejected");
                    state.send_error(connection_id, e.kind(), e);
                }
            }
        }

        ClientMessage::Move {
            room_code,
            color,
            token_index,
            dice,
        } => match state
            .orchestrator
            .move_token(&room_code, &color, token_index, dice)
        {
            Ok(view) => state
                .hub
                .send_to(connection_id, ServerMessage::GameState { state: view }),
            Err(e) => {
                info!(room = %room_code, color = %color, token = token_index, error = %e, "move rejected");
                state.send_error(connection_id, e.kind(), e);
            }
        },

        ClientMessage::GetState { room_code } => match state.orchestrator.state(&room_code) {
            Ok(view) => state
                .hub
                .send_to(connection_id, ServerMessage::GameState { state: view }),
            Err(e) => state.send_error(connection_id, e.kind(), e),
        },

        ClientMessage::ListRooms => {
            let rooms = state.lobby.list_rooms();
            state
                .hub
                .send_to(connection_id, ServerMessage::RoomList { rooms });
        }

        ClientMessage::Ping => {
            state.hub.send_to(connection_id, ServerMessage::Pong);
        }
    }
}

/// Handle a closed connection.
///
/// Seats in a running game stay taken since the turn order was fixed at
/// start. Once the last seated connection of a started room is gone the
/// room is torn down.
pub fn handle_disconnect(connection_id: Uuid, state: &ServerState) {
    let started = state
        .memberships
        .get(&connection_id)
        .and_then(|m| state.lobby.room(&m.room_code).ok())
        .map(|room| room.status == RoomStatus::Started)
        .unwrap_or(false);

    if !started {
        state.release_seat(connection_id);
    } else if let Some((_, membership)) = state.memberships.remove(&connection_id) {
        let abandoned = !state
            .memberships
            .iter()
            .any(|m| m.room_code == membership.room_code);
        if abandoned {
            if let Err(e) = state.lobby.teardown(&membership.room_code) {
                warn!(room = %membership.room_code, error = %e, "teardown failed");
            }
            state.hub.close_room(&membership.room_code);
        }
    }
    state.hub.disconnect(connection_id);
}
