//! WebSocket protocol messages for Ludo multiplayer.

use chrono::{DateTime, Utc};
use ludo_core::{BoardState, Color, TokenPosition, TOKENS_PER_COLOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a new room
    CreateRoom { name: Option<String> },

    /// Take a seat in an existing room
    JoinRoom {
        room_code: String,
        player_name: String,
        preferred_color: Option<String>,
    },

    /// Give up the current seat
    LeaveRoom,

    /// Start the game in the current room
    StartGame,

    /// Roll the dice
    Roll { room_code: String, color: String },

    /// Move a token with the pending roll, or an explicit dice value when allowed
    Move {
        room_code: String,
        color: String,
        token_index: usize,
        dice: Option<u8>,
    },

    /// Fetch the current state of a room
    GetState { room_code: String },

    /// List all rooms
    ListRooms,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with assigned connection ID
    Welcome { connection_id: Uuid },

    /// Room created successfully
    RoomCreated { room: RoomInfo },

    /// Seated in a room
    JoinedRoom { room: RoomInfo, player: PlayerInfo },

    /// Left room successfully
    LeftRoom,

    /// Room seating changed
    RoomUpdated { room: RoomInfo },

    /// Game started
    GameStarted { state: GameStateView },

    /// Broadcast after every committed action
    GameEvent(GameEventEnvelope),

    /// Direct reply carrying the current state
    GameState { state: GameStateView },

    /// All rooms, oldest first
    RoomList { rooms: Vec<RoomInfo> },

    /// Error occurred
    Error { code: String, message: String },

    /// Pong response
    Pong,
}

/// Canonical state payload returned to callers and broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub room_code: String,
    /// `None` until the room has started
    pub current_turn_color: Option<Color>,
    pub last_dice_roll: Option<u8>,
    pub tokens: BTreeMap<Color, [TokenPosition; TOKENS_PER_COLOR]>,
    pub updated_at: DateTime<Utc>,
}

impl GameStateView {
    pub fn from_board(room_code: &str, board: &BoardState, updated_at: DateTime<Utc>) -> Self {
        Self {
            room_code: room_code.to_string(),
            current_turn_color: Some(board.current_turn),
            last_dice_roll: board.last_dice,
            tokens: board.tokens.clone(),
            updated_at,
        }
    }

    /// View of a room whose game has not started
    pub fn not_started(room_code: &str) -> Self {
        Self {
            room_code: room_code.to_string(),
            current_turn_color: None,
            last_dice_roll: None,
            tokens: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Kind of state change being broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    DiceRolled,
    GameStateUpdated,
}

/// Broadcast payload: the full new state, never a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub state: GameStateView,
    pub meta: EventMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub room_code: String,
}

impl GameEventEnvelope {
    pub fn new(room_code: &str, event_type: EventType, state: GameStateView) -> Self {
        Self {
            event_type,
            state,
            meta: EventMeta {
                room_code: room_code.to_string(),
            },
        }
    }
}

/// Room information for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub code: String,
    pub name: Option<String>,
    pub players: Vec<PlayerInfo>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
}

/// Seated player information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub color: Color,
    pub turn_index: u8,
}

/// Room status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Lobby,
    Started,
}
