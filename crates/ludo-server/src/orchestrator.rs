//! Authoritative game actions.
//!
//! Every roll or move for a room runs inside that room's exclusive section:
//! load the stored game, validate, mutate through the rules engine, save,
//! broadcast. Two actions on the same room never interleave; rooms never
//! block each other.

use crate::broadcast::Broadcaster;
use crate::protocol::{EventType, GameStateView};
use crate::store::{SessionStore, StoreError, StoredGame};
use chrono::Utc;
use dashmap::DashMap;
use ludo_core::{
    is_valid_dice, normalize_color, BoardState, Color, LoopingTrack, MoveRecord, TrackRule,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Most recent moves kept per room; older ones are dropped first
pub const HISTORY_LIMIT: usize = 2048;

/// Errors surfaced to the caller of an action. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Game not started")]
    NotStarted,

    #[error("Not your turn: waiting for {expected}, got {actual}")]
    TurnViolation { expected: Color, actual: String },

    #[error("{0}")]
    PreconditionViolation(String),

    #[error("Invalid move: token {token_index} cannot move with {dice}")]
    IllegalMove { token_index: usize, dice: u8 },

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl OrchestratorError {
    /// Stable code for transport error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::RoomNotFound(_) => "NOT_FOUND",
            OrchestratorError::NotStarted => "NOT_STARTED",
            OrchestratorError::TurnViolation { .. } => "TURN_VIOLATION",
            OrchestratorError::PreconditionViolation(_) => "PRECONDITION_VIOLATION",
            OrchestratorError::IllegalMove { .. } => "ILLEGAL_MOVE",
            OrchestratorError::InternalInconsistency(_) => "INTERNAL_INCONSISTENCY",
            OrchestratorError::Store(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(code) => OrchestratorError::RoomNotFound(code),
            other => OrchestratorError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Accept a caller-supplied dice value on `move` instead of the server's roll
    pub allow_dice_override: bool,
}

/// Serializes and applies game actions per room.
pub struct GameOrchestrator {
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<dyn Broadcaster>,
    config: OrchestratorConfig,
    track: Box<dyn TrackRule + Send + Sync>,
    rng: Mutex<StdRng>,
    /// One exclusive section per room code, created on first use
    sections: DashMap<String, Arc<Mutex<()>>>,
    /// Last `HISTORY_LIMIT` applied moves per room, oldest first
    history: DashMap<String, VecDeque<MoveRecord>>,
}

impl GameOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        broadcaster: Arc<dyn Broadcaster>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            config,
            track: Box::new(LoopingTrack),
            rng: Mutex::new(StdRng::from_entropy()),
            sections: DashMap::new(),
            history: DashMap::new(),
        }
    }

    /// Use a fixed seed for dice rolls
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Replace the on-track movement rule
    pub fn with_track(mut self, track: impl TrackRule + Send + Sync + 'static) -> Self {
        self.track = Box::new(track);
        self
    }

    /// Roll the dice for the colour whose turn it is.
    ///
    /// Rolling again before moving overwrites the pending value.
    pub fn roll(&self, room_code: &str, color: &str) -> Result<GameStateView, OrchestratorError> {
        self.exclusive(room_code, || {
            let (mut board, game) = self.load(room_code)?;
            let color = check_turn(&board, color)?;

            let dice = board.roll_dice(&mut *lock(&self.rng));

            let view = self.commit(room_code, &board, game.turn_order, EventType::DiceRolled)?;
            info!(room = room_code, color = %color, dice, "dice rolled");
            Ok(view)
        })
    }

    /// Move one of the acting colour's tokens.
    ///
    /// Uses `dice_override` when given (and permitted), otherwise the pending roll.
    pub fn move_token(
        &self,
        room_code: &str,
        color: &str,
        token_index: usize,
        dice_override: Option<u8>,
    ) -> Result<GameStateView, OrchestratorError> {
        self.exclusive(room_code, || {
            let (mut board, game) = self.load(room_code)?;
            let color = check_turn(&board, color)?;
            let dice = self.resolve_dice(&board, dice_override)?;

            if !board.valid_moves(color, dice).contains(&token_index) {
                return Err(OrchestratorError::IllegalMove { token_index, dice });
            }

            let record = board
                .apply_move_with(self.track.as_ref(), color, token_index, dice)
                .map_err(|e| OrchestratorError::InternalInconsistency(e.to_string()))?;
            board.advance_turn(&game.turn_order, record.extra_turn);
            if !record.extra_turn {
                board.last_dice = None;
            }

            let view =
                self.commit(room_code, &board, game.turn_order, EventType::GameStateUpdated)?;
            info!(
                room = room_code,
                color = %color,
                token = token_index,
                dice,
                from = %record.from,
                to = %record.to,
                captured = record.captured.len(),
                extra_turn = record.extra_turn,
                "move applied"
            );
            self.record_move(room_code, record);
            Ok(view)
        })
    }

    /// Current state of a room; an empty view if its game has not started.
    pub fn state(&self, room_code: &str) -> Result<GameStateView, OrchestratorError> {
        match self.store.load_game(room_code)? {
            Some(game) => {
                let board = parse_board(&game)?;
                Ok(GameStateView::from_board(room_code, &board, game.updated_at))
            }
            None => Ok(GameStateView::not_started(room_code)),
        }
    }

    /// Most recent moves applied in a room, oldest first, at most `HISTORY_LIMIT`
    pub fn history(&self, room_code: &str) -> Vec<MoveRecord> {
        self.history
            .get(room_code)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget everything held for a room. Called when the room is torn down.
    pub fn evict(&self, room_code: &str) {
        self.sections.remove(room_code);
        self.history.remove(room_code);
        debug!(room = room_code, "room evicted");
    }

    /// Number of rooms with a live exclusive section
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Run `action` while holding the room's exclusive section.
    ///
    /// The section is dropped again if the room turned out not to exist, so
    /// actions on unknown codes leave nothing behind.
    fn exclusive<T>(
        &self,
        room_code: &str,
        action: impl FnOnce() -> Result<T, OrchestratorError>,
    ) -> Result<T, OrchestratorError> {
        let section = self.section(room_code);
        let result = {
            let _guard = lock(&section);
            action()
        };
        drop(section);

        if matches!(result, Err(OrchestratorError::RoomNotFound(_))) {
            // a waiter still holding a clone keeps the entry alive
            self.sections
                .remove_if(room_code, |_, s| Arc::strong_count(s) == 1);
        }
        result
    }

    fn section(&self, room_code: &str) -> Arc<Mutex<()>> {
        self.sections
            .entry(room_code.to_string())
            .or_default()
            .clone()
    }

    fn record_move(&self, room_code: &str, record: MoveRecord) {
        let mut history = self.history.entry(room_code.to_string()).or_default();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn load(&self, room_code: &str) -> Result<(BoardState, StoredGame), OrchestratorError> {
        let game = self
            .store
            .load_game(room_code)?
            .ok_or(OrchestratorError::NotStarted)?;
        let board = parse_board(&game)?;
        Ok((board, game))
    }

    fn resolve_dice(
        &self,
        board: &BoardState,
        dice_override: Option<u8>,
    ) -> Result<u8, OrchestratorError> {
        let dice = match dice_override {
            Some(_) if !self.config.allow_dice_override => {
                return Err(OrchestratorError::PreconditionViolation(
                    "Dice override not permitted".to_string(),
                ));
            }
            Some(dice) => dice,
            None => board.last_dice.ok_or_else(|| {
                OrchestratorError::PreconditionViolation("Roll dice first".to_string())
            })?,
        };
        if !is_valid_dice(dice) {
            return Err(OrchestratorError::PreconditionViolation(format!(
                "Dice value {} out of range",
                dice
            )));
        }
        Ok(dice)
    }

    /// Persist the board, then broadcast it. Nothing is broadcast if the save fails.
    fn commit(
        &self,
        room_code: &str,
        board: &BoardState,
        turn_order: Vec<Color>,
        event_type: EventType,
    ) -> Result<GameStateView, OrchestratorError> {
        let board_json = board
            .to_json()
            .map_err(|e| OrchestratorError::InternalInconsistency(e.to_string()))?;
        let updated_at = Utc::now();

        self.store
            .save_game(
                room_code,
                StoredGame {
                    board_json,
                    turn_order,
                    updated_at,
                },
            )
            .map_err(|e| {
                warn!(room = room_code, error = %e, "failed to persist board");
                OrchestratorError::from(e)
            })?;

        let view = GameStateView::from_board(room_code, board, updated_at);
        self.broadcaster.publish(room_code, event_type, &view);
        Ok(view)
    }
}

fn parse_board(game: &StoredGame) -> Result<BoardState, OrchestratorError> {
    BoardState::from_json(&game.board_json)
        .map_err(|e| OrchestratorError::InternalInconsistency(e.to_string()))
}

/// The acting colour, if it holds the turn
fn check_turn(board: &BoardState, color: &str) -> Result<Color, OrchestratorError> {
    if normalize_color(color) != board.current_turn.as_str() {
        return Err(OrchestratorError::TurnViolation {
            expected: board.current_turn,
            actual: color.to_string(),
        });
    }
    Ok(board.current_turn)
}

/// A panic inside a section leaves no partial state behind (nothing is
/// saved before validation passes), so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RoomRecord};
    use ludo_core::{TokenPosition, TRACK_LENGTH};

    struct Silent;

    impl Broadcaster for Silent {
        fn publish(&self, _: &str, _: EventType, _: &GameStateView) {}
    }

    fn started(store: &MemoryStore, code: &str, board: &BoardState, order: Vec<Color>) {
        store.insert_room(RoomRecord::new(code.to_string(), None));
        store
            .save_game(
                code,
                StoredGame {
                    board_json: board.to_json().unwrap(),
                    turn_order: order,
                    updated_at: Utc::now(),
                },
            )
            .unwrap();
    }

    fn orchestrator(store: Arc<MemoryStore>, allow_override: bool) -> GameOrchestrator {
        GameOrchestrator::new(
            store,
            Arc::new(Silent),
            OrchestratorConfig {
                allow_dice_override: allow_override,
            },
        )
        .with_seed(1)
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrchestratorError::NotStarted.kind(), "NOT_STARTED");
        assert_eq!(
            OrchestratorError::from(StoreError::RoomNotFound("X".into())),
            OrchestratorError::RoomNotFound("X".into())
        );
        assert_eq!(
            OrchestratorError::from(StoreError::Unavailable("down".into())).kind(),
            "STORAGE_ERROR"
        );
    }

    #[test]
    fn test_override_rejected_when_not_permitted() {
        let store = Arc::new(MemoryStore::new());
        let order = vec![Color::Red, Color::Green];
        started(&store, "ROOM01", &BoardState::initial(&order, Color::Red), order);
        let orch = orchestrator(store, false);

        assert!(matches!(
            orch.move_token("ROOM01", "RED", 0, Some(6)),
            Err(OrchestratorError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_out_of_range_override_rejected() {
        let store = Arc::new(MemoryStore::new());
        let order = vec![Color::Red, Color::Green];
        started(&store, "ROOM01", &BoardState::initial(&order, Color::Red), order);
        let orch = orchestrator(store, true);

        for dice in [0, 7, 255] {
            assert!(matches!(
                orch.move_token("ROOM01", "RED", 0, Some(dice)),
                Err(OrchestratorError::PreconditionViolation(_))
            ));
        }
    }

    #[test]
    fn test_corrupt_board_is_internal_inconsistency() {
        let store = Arc::new(MemoryStore::new());
        store.insert_room(RoomRecord::new("ROOM01".into(), None));
        store
            .save_game(
                "ROOM01",
                StoredGame {
                    board_json: "{\"currentTurn\":\"PINK\"}".into(),
                    turn_order: vec![Color::Red],
                    updated_at: Utc::now(),
                },
            )
            .unwrap();
        let orch = orchestrator(store, false);

        assert_eq!(orch.roll("ROOM01", "RED").unwrap_err().kind(), "INTERNAL_INCONSISTENCY");
    }

    #[test]
    fn test_history_and_evict() {
        let store = Arc::new(MemoryStore::new());
        let order = vec![Color::Red, Color::Green];
        started(&store, "ROOM01", &BoardState::initial(&order, Color::Red), order);
        let orch = orchestrator(store, true);

        orch.move_token("ROOM01", "red", 2, Some(6)).unwrap();
        let history = orch.history("ROOM01");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].token_index, 2);
        assert_eq!(history[0].to, TokenPosition::Track(0));
        assert_eq!(orch.section_count(), 1);

        orch.evict("ROOM01");
        assert!(orch.history("ROOM01").is_empty());
        assert_eq!(orch.section_count(), 0);
    }

    #[test]
    fn test_unknown_rooms_leave_no_sections() {
        let orch = orchestrator(Arc::new(MemoryStore::new()), true);

        for i in 0..1000 {
            assert!(matches!(
                orch.roll(&format!("GHOST{}", i), "RED"),
                Err(OrchestratorError::RoomNotFound(_))
            ));
            assert!(matches!(
                orch.move_token(&format!("NOPE{}", i), "RED", 0, Some(6)),
                Err(OrchestratorError::RoomNotFound(_))
            ));
        }
        assert_eq!(orch.section_count(), 0);
    }

    #[test]
    fn test_rejected_action_on_known_room_keeps_section() {
        let store = Arc::new(MemoryStore::new());
        store.insert_room(RoomRecord::new("LOBBY1".into(), None));
        let orch = orchestrator(store, false);

        assert_eq!(orch.roll("LOBBY1", "RED"), Err(OrchestratorError::NotStarted));
        assert_eq!(orch.section_count(), 1);
    }

    #[test]
    fn test_history_keeps_most_recent_moves() {
        let store = Arc::new(MemoryStore::new());
        let order = vec![Color::Red];
        let mut board = BoardState::initial(&order, Color::Red);
        board.tokens.get_mut(&Color::Red).unwrap()[0] = TokenPosition::Track(0);
        started(&store, "ROOM01", &board, order);
        let orch = orchestrator(store, true);

        for _ in 0..HISTORY_LIMIT + 3 {
            orch.move_token("ROOM01", "RED", 0, Some(1)).unwrap();
        }

        let history = orch.history("ROOM01");
        assert_eq!(history.len(), HISTORY_LIMIT);
        // the three oldest moves (0 -> 1, 1 -> 2, 2 -> 3) were dropped
        assert_eq!(history[0].from, TokenPosition::Track(3));
        let last_to = ((HISTORY_LIMIT + 3) % TRACK_LENGTH as usize) as u8;
        assert_eq!(history[HISTORY_LIMIT - 1].to, TokenPosition::Track(last_to));
    }
}
