//! # Chat Games Library
//!
//! This library runs timed multiplayer mini-games (trivia, number guessing
//! and rock-paper-scissors) inside a chat assistant. Participants submit
//! answers asynchronously while a countdown runs; when a round expires its
//! submissions are tallied once, fastest correct answer first, and the
//! results are announced to the scope the round was started in.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use std::time::Duration;

use derive_where::derive_where;
use itertools::Itertools;
use serde::Serialize;

pub mod answer;
pub mod choice;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod countdown;
pub mod leaderboard;
pub mod participant;
pub mod persona;
pub mod questions;
pub mod registry;
pub mod round_id;
pub mod session;
pub mod tally;

/// Out-of-band messages delivered to a scope while rounds run
///
/// Each message carries its rendered text next to the structured data it
/// was rendered from, so transports can either print it or build their own
/// presentation.
#[serde_with::serde_as]
#[derive(Debug, Serialize, Clone)]
pub enum Announcement {
    /// Remaining-time progress of an open round
    Countdown {
        /// The round counting down
        round_id: round_id::RoundId,
        /// Kind of the round
        kind: participant::GameKind,
        /// Time left until the round closes
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        remaining: Duration,
        /// Human readable message
        text: String,
    },
    /// Final results of a closed round
    Results {
        /// The scored round
        tally: tally::Tally,
        /// Leaderboard points credited for the round
        awarded: Vec<(participant::Id, u64)>,
        /// Human readable message
        text: String,
    },
}

impl Announcement {
    /// The rendered text of the announcement
    pub fn text(&self) -> &str {
        match self {
            Announcement::Countdown { text, .. } | Announcement::Results { text, .. } => text,
        }
    }

    /// Round the announcement is about
    pub fn round_id(&self) -> round_id::RoundId {
        match self {
            Announcement::Countdown { round_id, .. } => *round_id,
            Announcement::Results { tally, .. } => tally.round_id,
        }
    }
}

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// Used wherever a long list is shown in chat: the near misses of a trivia
/// round, or the top of a leaderboard, while still reporting how many
/// entries there were in total.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector holding up to `limit` items of `list`
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items left out of [`TruncatedVec::items`]
    pub fn hidden_count(&self) -> usize {
        self.exact_count.saturating_sub(self.items.len())
    }
}
