//! Room lifecycle: create, join, leave, start, tear down.

use crate::orchestrator::GameOrchestrator;
use crate::protocol::{PlayerInfo, RoomInfo, RoomStatus};
use crate::store::{MemoryStore, RoomRecord, Seat, StoreError, StoredGame};
use chrono::Utc;
use ludo_core::{BoardError, BoardState, Color};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// Characters used in room codes; no 0/O or 1/I
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;
const CODE_ATTEMPTS: usize = 100;

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("No players in room")]
    NoPlayers,

    #[error("Game already started")]
    GameAlreadyStarted,

    #[error("Failed to generate room code")]
    CodeExhausted,

    #[error("Failed to create initial board: {0}")]
    Board(#[from] BoardError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl LobbyError {
    /// Stable code for transport error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            LobbyError::RoomNotFound => "NOT_FOUND",
            LobbyError::Board(_) | LobbyError::Store(_) => "INTERNAL_ERROR",
            _ => "CONFLICT",
        }
    }
}

impl From<StoreError> for LobbyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(_) => LobbyError::RoomNotFound,
            other => LobbyError::Store(other),
        }
    }
}

/// Seating and game start, on top of the in-memory store.
pub struct Lobby {
    store: Arc<MemoryStore>,
    orchestrator: Arc<GameOrchestrator>,
    rng: Mutex<StdRng>,
}

impl Lobby {
    pub fn new(store: Arc<MemoryStore>, orchestrator: Arc<GameOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a room under a fresh code.
    pub fn create_room(&self, name: Option<String>) -> Result<RoomInfo, LobbyError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = self.generate_code();
            let room = RoomRecord::new(code.clone(), name.clone());
            let info = room_info(&room);
            if self.store.insert_room(room) {
                info!(room = %code, name = ?name, "room created");
                return Ok(info);
            }
        }
        Err(LobbyError::CodeExhausted)
    }

    /// Seat a player, honouring `preferred_color` when it is free.
    pub fn join(
        &self,
        room_code: &str,
        player_name: &str,
        preferred_color: Option<&str>,
    ) -> Result<(RoomInfo, PlayerInfo), LobbyError> {
        let (room, seat) = self.store.update_room(room_code, |room| -> Result<_, LobbyError> {
            if room.is_started() {
                return Err(LobbyError::GameAlreadyStarted);
            }
            let color = assign_color(room, preferred_color)?;
            let seat = Seat {
                name: player_name.to_string(),
                color,
                turn_index: next_turn_index(room),
            };
            room.seats.push(seat.clone());
            Ok((room_info(room), seat))
        })??;

        info!(room = room_code, color = %seat.color, name = player_name, "player joined");
        Ok((room, player_info(&seat)))
    }

    /// Free a seat. Leaving with a colour that is not seated is a no-op.
    ///
    /// Returns the updated room, or `None` when the last player left and
    /// the room was torn down.
    pub fn leave(&self, room_code: &str, color: &str) -> Result<Option<RoomInfo>, LobbyError> {
        let color = Color::parse(color);
        let (room, emptied) = self.store.update_room(room_code, |room| {
            let before = room.seats.len();
            room.seats.retain(|s| Some(s.color) != color);
            let removed = room.seats.len() < before;
            (room_info(room), removed && room.seats.is_empty())
        })?;

        if let Some(color) = color {
            info!(room = room_code, color = %color, "player left");
        }
        if emptied {
            self.teardown(room_code)?;
            return Ok(None);
        }
        Ok(Some(room))
    }

    /// Start the game: snapshot turn order from seating and store a fresh board.
    ///
    /// Starting an already started room is a no-op.
    pub fn start(&self, room_code: &str) -> Result<RoomInfo, LobbyError> {
        let (room, first) = self.store.update_room(room_code, |room| -> Result<_, LobbyError> {
            if room.seats.is_empty() {
                return Err(LobbyError::NoPlayers);
            }
            if room.is_started() {
                return Ok((room_info(room), None));
            }

            let order = room.seating_order();
            let first = order[0];
            let board = BoardState::initial(&order, first);
            room.game = Some(StoredGame {
                board_json: board.to_json()?,
                turn_order: order,
                updated_at: Utc::now(),
            });
            Ok((room_info(room), Some(first)))
        })??;

        if let Some(first) = first {
            info!(room = room_code, first_turn = %first, "game started");
        }
        Ok(room)
    }

    /// Remove a room and everything the orchestrator holds for it
    pub fn teardown(&self, room_code: &str) -> Result<(), LobbyError> {
        self.store
            .remove_room(room_code)
            .ok_or(LobbyError::RoomNotFound)?;
        self.orchestrator.evict(room_code);
        info!(room = room_code, "room torn down");
        Ok(())
    }

    pub fn room(&self, room_code: &str) -> Result<RoomInfo, LobbyError> {
        self.store
            .room(room_code)
            .map(|r| room_info(&r))
            .ok_or(LobbyError::RoomNotFound)
    }

    /// Every room, oldest first
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = self.store.rooms();
        rooms.sort_by(|a, b| (a.created_at, &a.code).cmp(&(b.created_at, &b.code)));
        rooms.iter().map(room_info).collect()
    }

    fn generate_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Preferred colour if free, otherwise the first free colour in canonical order.
fn assign_color(room: &RoomRecord, preferred: Option<&str>) -> Result<Color, LobbyError> {
    let available: Vec<Color> = Color::ALL
        .into_iter()
        .filter(|c| room.seats.iter().all(|s| s.color != *c))
        .collect();

    let preferred = preferred.and_then(Color::parse);
    match preferred {
        Some(color) if available.contains(&color) => Ok(color),
        _ => available.first().copied().ok_or(LobbyError::RoomFull),
    }
}

/// One past the highest seat taken, so indices stay unique after someone leaves
fn next_turn_index(room: &RoomRecord) -> u8 {
    room.seats
        .iter()
        .map(|s| s.turn_index + 1)
        .max()
        .unwrap_or(0)
}

fn player_info(seat: &Seat) -> PlayerInfo {
    PlayerInfo {
        name: seat.name.clone(),
        color: seat.color,
        turn_index: seat.turn_index,
    }
}

fn room_info(room: &RoomRecord) -> RoomInfo {
    let mut players: Vec<PlayerInfo> = room.seats.iter().map(player_info).collect();
    players.sort_by_key(|p| p.turn_index);
    RoomInfo {
        code: room.code.clone(),
        name: room.name.clone(),
        players,
        status: if room.is_started() {
            RoomStatus::Started
        } else {
            RoomStatus::Lobby
        },
        created_at: room.created_at,
    }
}
