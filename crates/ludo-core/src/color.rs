//! Player colours.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four seats on a Ludo board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
}

impl Color {
    /// All colours in canonical seating order
    pub const ALL: [Color; 4] = [Color::Red, Color::Green, Color::Blue, Color::Yellow];

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "RED",
            Color::Green => "GREEN",
            Color::Blue => "BLUE",
            Color::Yellow => "YELLOW",
        }
    }

    /// Normalize loose client input and parse it.
    ///
    /// Returns `None` when the input does not name one of the four colours.
    pub fn parse(input: &str) -> Option<Color> {
        normalize_color(input).parse().ok()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a canonical colour name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown colour: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for Color {
    type Err = UnknownColor;

    /// Strict parse: only the canonical upper-case names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

/// Case-insensitive match against the four colour names.
///
/// On a match the canonical upper-case name is returned. Anything else is
/// handed back untouched, so callers must not assume the result is canonical.
pub fn normalize_color(input: &str) -> &str {
    let upper = input.trim().to_uppercase();
    match Color::ALL.into_iter().find(|c| c.as_str() == upper) {
        Some(color) => color.as_str(),
        None => input,
    }
}
