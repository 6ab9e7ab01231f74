//! Rock-paper-scissors choices and the beats relation
//!
//! Both the immediate duel and the multiplayer round resolve through
//! [`Choice::beats`], so the two modes can never disagree.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the three hand shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Choice {
    /// Beats scissors
    Rock,
    /// Beats rock
    Paper,
    /// Beats paper
    Scissors,
}

/// The string did not name a valid choice
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not rock, paper, or scissors")]
pub struct ParseError(pub String);

impl Choice {
    /// Every choice, in declaration order
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// Whether `self` beats `other`
    pub fn beats(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Scissors, Choice::Paper)
                | (Choice::Paper, Choice::Rock)
        )
    }

    /// Picks a choice uniformly at random
    pub fn random() -> Self {
        Self::ALL[fastrand::usize(..Self::ALL.len())]
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        })
    }
}

impl FromStr for Choice {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rock" | "r" => Ok(Choice::Rock),
            "paper" | "p" => Ok(Choice::Paper),
            "scissors" | "scissor" | "s" => Ok(Choice::Scissors),
            _ => Err(ParseError(s.trim().to_owned())),
        }
    }
}

/// Result of a single duel from the challenger's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DuelOutcome {
    /// The challenger's choice beats the house choice
    Win,
    /// Both picked the same shape
    Tie,
    /// The house choice beats the challenger's choice
    Lose,
}

/// Resolves `challenger` against `house`
pub fn duel(challenger: Choice, house: Choice) -> DuelOutcome {
    if challenger == house {
        DuelOutcome::Tie
    } else if challenger.beats(house) {
        DuelOutcome::Win
    } else {
        DuelOutcome::Lose
    }
}
