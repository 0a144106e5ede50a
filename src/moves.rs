//! Moves as reported by the engine and as written on the wire.
//!
//! The engine speaks UCI long algebraic notation (`e2e4`, `e7e8q`); the
//! HTTP response carries the same information split into `from`, `to` and an
//! optional `promotion` key.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveParseError {
    #[error("invalid square: {0:?}")]
    Square(String),
    #[error("invalid promotion piece: {0:?}")]
    Promotion(char),
    #[error("invalid move: {0:?}")]
    Move(String),
}

/// A board square, file `a..=h` and rank `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Zero-based file and rank. Returns `None` when off the board.
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }
}

impl FromStr for Square {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(MoveParseError::Square(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| MoveParseError::Square(s.to_string()))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, (b'1' + self.rank) as char)
    }
}

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Piece a pawn promotes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Promotion {
    #[serde(rename = "b")]
    Bishop,
    #[serde(rename = "n")]
    Knight,
    #[serde(rename = "q")]
    Queen,
    #[serde(rename = "r")]
    Rook,
}

impl Promotion {
    pub fn from_char(c: char) -> Result<Self, MoveParseError> {
        match c.to_ascii_lowercase() {
            'b' => Ok(Promotion::Bishop),
            'n' => Ok(Promotion::Knight),
            'q' => Ok(Promotion::Queen),
            'r' => Ok(Promotion::Rook),
            _ => Err(MoveParseError::Promotion(c)),
        }
    }
}

/// The move an engine settled on. Serialized unmodified into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BestMove {
    pub from: Square,
    pub to: Square,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
}

impl BestMove {
    /// Parse UCI long algebraic notation, e.g. `g1f3` or `a7a8n`.
    ///
    /// The null move `0000` is not a move and is rejected; callers handle it
    /// before getting here.
    pub fn from_uci(s: &str) -> Result<Self, MoveParseError> {
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(MoveParseError::Move(s.to_string()));
        }
        let from = s[0..2].parse()?;
        let to = s[2..4].parse()?;
        let promotion = s[4..].chars().next().map(Promotion::from_char).transpose()?;
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for BestMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(p) = self.promotion {
            let c = match p {
                Promotion::Bishop => 'b',
                Promotion::Knight => 'n',
                Promotion::Queen => 'q',
                Promotion::Rook => 'r',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
