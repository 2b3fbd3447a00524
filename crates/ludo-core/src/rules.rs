//! Turn and movement rules.
//!
//! Every operation here is a deterministic function of the board and its
//! explicit arguments. Nothing touches storage or the network.

use crate::board::{
    BoardState, TokenPosition, DICE_FACES, HOME_EXIT_ROLL, TOKENS_PER_COLOR, TRACK_LENGTH,
};
use crate::color::Color;
use crate::error::RuleError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decides where a token already on the track lands.
///
/// This is the one place a stricter rule set (home stretch, exact landing)
/// plugs in.
pub trait TrackRule {
    fn advance(&self, from: u8, dice: u8) -> TokenPosition;
}

/// Tokens loop around the outer track forever and never finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopingTrack;

impl TrackRule for LoopingTrack {
    fn advance(&self, from: u8, dice: u8) -> TokenPosition {
        let next = (u16::from(from) + u16::from(dice)) % u16::from(TRACK_LENGTH);
        TokenPosition::Track(next as u8)
    }
}

/// Everything that happened when a token moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub color: Color,
    pub token_index: usize,
    pub dice: u8,
    pub from: TokenPosition,
    pub to: TokenPosition,
    /// Opposing tokens sent back home by this move
    pub captured: Vec<(Color, usize)>,
    pub extra_turn: bool,
}

impl BoardState {
    /// Fresh board: every seated colour has all tokens at home, no dice pending.
    ///
    /// `first_turn` is expected to be part of `turn_order`; this is not checked.
    pub fn initial(turn_order: &[Color], first_turn: Color) -> Self {
        let tokens: BTreeMap<_, _> = turn_order
            .iter()
            .map(|&color| (color, [TokenPosition::Home; TOKENS_PER_COLOR]))
            .collect();

        Self {
            current_turn: first_turn,
            last_dice: None,
            tokens,
        }
    }

    /// Indices of the tokens `color` may move with `dice`.
    ///
    /// Home tokens need a six, finished tokens never move, and anything on
    /// the track is always movable. An unseated colour has no moves.
    pub fn valid_moves(&self, color: Color, dice: u8) -> Vec<usize> {
        let Some(tokens) = self.tokens_of(color) else {
            return Vec::new();
        };

        tokens
            .iter()
            .enumerate()
            .filter(|(_, pos)| match pos {
                TokenPosition::Home => dice == HOME_EXIT_ROLL,
                TokenPosition::Track(_) => true,
                TokenPosition::Finished => false,
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Move a token on the looping track. Returns whether the mover earned an extra turn.
    pub fn apply_move(
        &mut self,
        color: Color,
        token_index: usize,
        dice: u8,
    ) -> Result<bool, RuleError> {
        self.apply_move_with(&LoopingTrack, color, token_index, dice)
            .map(|record| record.extra_turn)
    }

    /// Move a token using `track` for on-track movement.
    ///
    /// Captures every opposing token on the destination square and records
    /// `dice` as the last roll. The board is untouched on error.
    pub fn apply_move_with<T: TrackRule + ?Sized>(
        &mut self,
        track: &T,
        color: Color,
        token_index: usize,
        dice: u8,
    ) -> Result<MoveRecord, RuleError> {
        let from = self
            .position(color, token_index)
            .ok_or(RuleError::NoSuchToken {
                color,
                index: token_index,
            })?;

        let to = match from {
            TokenPosition::Home if dice != HOME_EXIT_ROLL => {
                return Err(RuleError::CannotLeaveHome { dice });
            }
            TokenPosition::Home => TokenPosition::Track(0),
            TokenPosition::Finished => return Err(RuleError::TokenFinished),
            TokenPosition::Track(p) => track.advance(p, dice),
        };

        if let Some(slot) = self
            .tokens
            .get_mut(&color)
            .and_then(|t| t.get_mut(token_index))
        {
            *slot = to;
        }

        let mut captured = Vec::new();
        if let TokenPosition::Track(square) = to {
            for (&other, positions) in self.tokens.iter_mut() {
                if other == color {
                    continue;
                }
                for (i, pos) in positions.iter_mut().enumerate() {
                    if *pos == TokenPosition::Track(square) {
                        *pos = TokenPosition::Home;
                        captured.push((other, i));
                    }
                }
            }
        }

        self.last_dice = Some(dice);

        Ok(MoveRecord {
            color,
            token_index,
            dice,
            from,
            to,
            captured,
            extra_turn: dice == HOME_EXIT_ROLL,
        })
    }

    /// Pass the turn to the next colour in `turn_order` unless an extra turn was earned.
    ///
    /// A current colour missing from the order is treated as sitting at index 0.
    pub fn advance_turn(&mut self, turn_order: &[Color], extra_turn: bool) {
        if extra_turn || turn_order.is_empty() {
            return;
        }
        let idx = turn_order
            .iter()
            .position(|&c| c == self.current_turn)
            .unwrap_or(0);
        self.current_turn = turn_order[(idx + 1) % turn_order.len()];
    }

    /// Draw a fresh dice value and store it as pending
    pub fn roll_dice<R: Rng>(&mut self, rng: &mut R) -> u8 {
        let dice = rng.gen_range(1..=DICE_FACES);
        self.last_dice = Some(dice);
        dice
    }
}

/// Whether `dice` is a face of the die
pub fn is_valid_dice(dice: u8) -> bool {
    (1..=DICE_FACES).contains(&dice)
}
