//! Ludo - rules engine for a four-colour match
//!
//! This crate provides the pure game logic, including:
//! - Player colours and lenient colour normalization
//! - Board representation with its stored JSON shape
//! - Legal move computation, move application with captures, turn order
//!
//! # Architecture
//!
//! The engine holds no state of its own. Every operation is a function of a
//! [`BoardState`] and explicit arguments, so the server decides where boards
//! live and how access to them is serialized.
//!
//! # Modules
//!
//! - [`color`]: The four seat colours
//! - [`board`]: Token positions and the board snapshot
//! - [`rules`]: Moves, captures, extra turns and turn advancement
//! - [`error`]: Rule and serialization errors

pub mod board;
pub mod color;
pub mod error;
pub mod rules;

// Re-export commonly used types
pub use board::{
    BoardState, TokenPosition, DICE_FACES, HOME_EXIT_ROLL, TOKENS_PER_COLOR, TRACK_LENGTH,
};
pub use color::{normalize_color, Color, UnknownColor};
pub use error::{BoardError, RuleError};
pub use rules::{is_valid_dice, LoopingTrack, MoveRecord, TrackRule};
