//! Room and game-session storage.
//!
//! The orchestrator only sees [`SessionStore`]: load the stored game for a
//! room and save a new one. [`MemoryStore`] is the in-process implementation
//! that also carries the lobby's room records.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ludo_core::Color;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A started game as persisted for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGame {
    /// Board in its JSON form
    pub board_json: String,
    /// Colours in turn order, fixed when the game started
    pub turn_order: Vec<Color>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence seen by the game orchestrator.
///
/// A game saved for a room must be visible to every later `load` of that room.
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` means the room exists but its game has not started.
    fn load_game(&self, room_code: &str) -> Result<Option<StoredGame>, StoreError>;

    fn save_game(&self, room_code: &str, game: StoredGame) -> Result<(), StoreError>;
}

/// A seated player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub name: String,
    pub color: Color,
    /// Position in turn order, assigned on join
    pub turn_index: u8,
}

/// Everything known about a room
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub code: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub seats: Vec<Seat>,
    /// Present once the room has started
    pub game: Option<StoredGame>,
}

impl RoomRecord {
    pub fn new(code: String, name: Option<String>) -> Self {
        Self {
            code,
            name,
            created_at: Utc::now(),
            seats: Vec::new(),
            game: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.game.is_some()
    }

    /// Seated colours ordered by turn index
    pub fn seating_order(&self) -> Vec<Color> {
        let mut seats: Vec<&Seat> = self.seats.iter().collect();
        seats.sort_by_key(|s| s.turn_index);
        seats.into_iter().map(|s| s.color).collect()
    }
}

/// In-memory room storage.
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, RoomRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a room unless its code is already taken. Returns whether it was inserted.
    pub fn insert_room(&self, room: RoomRecord) -> bool {
        match self.rooms.entry(room.code.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(room);
                true
            }
        }
    }

    pub fn contains(&self, room_code: &str) -> bool {
        self.rooms.contains_key(room_code)
    }

    /// Snapshot of a room
    pub fn room(&self, room_code: &str) -> Option<RoomRecord> {
        self.rooms.get(room_code).map(|r| r.value().clone())
    }

    /// Run `f` with exclusive access to one room.
    pub fn update_room<R>(
        &self,
        room_code: &str,
        f: impl FnOnce(&mut RoomRecord) -> R,
    ) -> Result<R, StoreError> {
        let mut room = self
            .rooms
            .get_mut(room_code)
            .ok_or_else(|| StoreError::RoomNotFound(room_code.to_string()))?;
        Ok(f(&mut room))
    }

    pub fn remove_room(&self, room_code: &str) -> Option<RoomRecord> {
        self.rooms.remove(room_code).map(|(_, room)| room)
    }

    /// Snapshot of every room
    pub fn rooms(&self) -> Vec<RoomRecord> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }
}

impl SessionStore for MemoryStore {
    fn load_game(&self, room_code: &str) -> Result<Option<StoredGame>, StoreError> {
        self.rooms
            .get(room_code)
            .map(|room| room.game.clone())
            .ok_or_else(|| StoreError::RoomNotFound(room_code.to_string()))
    }

    fn save_game(&self, room_code: &str, game: StoredGame) -> Result<(), StoreError> {
        self.update_room(room_code, |room| room.game = Some(game))
    }
}
