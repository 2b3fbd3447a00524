//! Error types for the rules engine.

use crate::color::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a move cannot be applied to the board
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RuleError {
    #[error("Cannot leave HOME without a 6 (rolled {dice})")]
    CannotLeaveHome { dice: u8 },

    #[error("Token already finished")]
    TokenFinished,

    #[error("{color} has no token {index}")]
    NoSuchToken { color: Color, index: usize },
}

/// Errors raised while reading or writing the board's JSON form
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BoardError {
    #[error("Invalid token position: {0}")]
    InvalidPosition(String),

    #[error("Board serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        BoardError::Serialization(e.to_string())
    }
}
