//! Participant, scope and game kind identifiers
//!
//! Chat platforms identify users and channels by opaque integers. This module
//! wraps them in distinct types so a participant can never be confused with
//! the scope (channel) a round is bound to, and defines the kinds of game a
//! round can run.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// A participant identity as delivered by the transport layer
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(u64);

impl Id {
    /// Wraps a raw platform user id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw platform user id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// The chat context (e.g. a channel) a round is bound to
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ScopeKey(u64);

impl ScopeKey {
    /// Wraps a raw platform channel id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw platform channel id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for ScopeKey {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().trim_start_matches('#').parse()?))
    }
}

/// The kinds of game a round can run
///
/// The declaration order is the order in which the generic answer router
/// looks for an open round in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum GameKind {
    /// Free-text question with one or more acceptable answers
    Trivia,
    /// Guess a secret integer
    NumberGuess,
    /// Multiplayer rock-paper-scissors revealed at expiry
    RockPaperScissors,
}

impl GameKind {
    /// All kinds in router priority order
    pub const ALL: [GameKind; 3] = [
        GameKind::Trivia,
        GameKind::NumberGuess,
        GameKind::RockPaperScissors,
    ];
}

impl Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GameKind::Trivia => "trivia",
            GameKind::NumberGuess => "number guessing",
            GameKind::RockPaperScissors => "rock-paper-scissors",
        })
    }
}
