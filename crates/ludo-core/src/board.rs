//! Board representation.
//!
//! A board is the complete snapshot of one room's match: whose turn it is,
//! the pending dice value and where every token sits. It is the single
//! source of truth; nothing derived is cached alongside it.
//!
//! The JSON form keeps the historical shape used by stored games and
//! clients:
//!
//! ```json
//! {
//!   "currentTurn": "RED",
//!   "lastDice": 6,
//!   "tokens": { "RED": ["0", "HOME", "HOME", "HOME"], "GREEN": ["HOME", "HOME", "HOME", "HOME"] }
//! }
//! ```

use crate::color::Color;
use crate::error::BoardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of squares on the shared outer loop
pub const TRACK_LENGTH: u8 = 52;

/// Tokens owned by every colour
pub const TOKENS_PER_COLOR: usize = 4;

/// Dice value required to bring a token out of the yard
pub const HOME_EXIT_ROLL: u8 = 6;

/// Faces on the die
pub const DICE_FACES: u8 = 6;

const HOME_MARKER: &str = "HOME";
const FINISHED_MARKER: &str = "FINISHED";

/// Where a single token currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TokenPosition {
    /// In the starting yard, not yet on the track
    Home,
    /// On the outer loop, `0..TRACK_LENGTH`
    Track(u8),
    /// Done. The looping track never produces this on its own.
    Finished,
}

impl TokenPosition {
    /// Track index if the token is on the loop
    pub fn track_index(&self) -> Option<u8> {
        match self {
            TokenPosition::Track(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_home(&self) -> bool {
        matches!(self, TokenPosition::Home)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TokenPosition::Finished)
    }
}

impl fmt::Display for TokenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenPosition::Home => f.write_str(HOME_MARKER),
            TokenPosition::Track(i) => write!(f, "{}", i),
            TokenPosition::Finished => f.write_str(FINISHED_MARKER),
        }
    }
}

impl From<TokenPosition> for String {
    fn from(pos: TokenPosition) -> Self {
        pos.to_string()
    }
}

impl TryFrom<String> for TokenPosition {
    type Error = BoardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            HOME_MARKER => return Ok(TokenPosition::Home),
            FINISHED_MARKER => return Ok(TokenPosition::Finished),
            _ => {}
        }
        match value.parse::<u8>() {
            Ok(i) if i < TRACK_LENGTH => Ok(TokenPosition::Track(i)),
            _ => Err(BoardError::InvalidPosition(value)),
        }
    }
}

/// The full mutable game snapshot for one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    /// Whose action is expected next
    pub current_turn: Color,
    /// Most recent roll not yet consumed by a move
    pub last_dice: Option<u8>,
    /// Token positions per seated colour; the array index is the token's identity
    pub tokens: BTreeMap<Color, [TokenPosition; TOKENS_PER_COLOR]>,
}

impl BoardState {
    /// Parse a board from its stored JSON form
    pub fn from_json(json: &str) -> Result<Self, BoardError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the board to its stored JSON form
    pub fn to_json(&self) -> Result<String, BoardError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Positions of a colour's tokens, if that colour is seated
    pub fn tokens_of(&self, color: Color) -> Option<&[TokenPosition; TOKENS_PER_COLOR]> {
        self.tokens.get(&color)
    }

    /// Position of one token
    pub fn position(&self, color: Color, token_index: usize) -> Option<TokenPosition> {
        self.tokens_of(color)?.get(token_index).copied()
    }

    /// Colours seated on this board, in canonical order
    pub fn colors(&self) -> impl Iterator<Item = Color> + '_ {
        self.tokens.keys().copied()
    }
}
