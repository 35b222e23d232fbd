use crate::error::SettleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opposing parties in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Fixed participant roles. Side A plays side B; the `2` seats are only
/// occupied in doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    A1,
    A2,
    B1,
    B2,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::A1, Slot::A2, Slot::B1, Slot::B2];

    pub fn side(&self) -> Side {
        match self {
            Slot::A1 | Slot::A2 => Side::A,
            Slot::B1 | Slot::B2 => Side::B,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::A1 => "A1",
            Slot::A2 => "A2",
            Slot::B1 => "B1",
            Slot::B2 => "B2",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = SettleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(Slot::A1),
            "A2" => Ok(Slot::A2),
            "B1" => Ok(Slot::B1),
            "B2" => Ok(Slot::B2),
            other => Err(SettleError::InvalidSlot(other.to_string())),
        }
    }
}
