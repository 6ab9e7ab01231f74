//! Scope leaderboards
//!
//! Each scope keeps cumulative points across its tallied rounds. Winners
//! earn points that shrink linearly with how long they took: an instant
//! answer earns the full amount, an answer at the time limit earns half.
//! Everyone else mentioned in a result is recorded with zero points so they
//! still appear in the standings.

use std::{collections::HashMap, time::Duration};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    TruncatedVec,
    constants::leaderboard::{DISPLAY_LIMIT, POINTS_AWARDED},
    participant::{Id, ScopeKey},
    tally::Tally,
};

/// Points for an answer taking `taken` out of `full`
///
/// Decreases linearly from `full_points_awarded` at zero to half of it at
/// `full`; answers past `full` are clamped to half.
pub fn calculate_score(full: Duration, taken: Duration, full_points_awarded: u64) -> u64 {
    if full.is_zero() {
        return full_points_awarded;
    }
    let fraction = (taken.as_secs_f64() / full.as_secs_f64()).min(1.);
    (full_points_awarded as f64 * (1. - fraction / 2.)) as u64
}

/// Score information for a participant
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ScoreMessage {
    /// Total points earned in the scope
    pub points: u64,
    /// Current position in the standings (0-indexed)
    pub position: usize,
}

/// Cumulative points of a single scope
#[derive(Debug, Default, Clone)]
pub struct Leaderboard {
    /// Totals in descending order (cached)
    scores_descending: Vec<(Id, u64)>,
    /// Total and position of each participant (cached)
    score_and_position: HashMap<Id, (u64, usize)>,
}

impl Leaderboard {
    /// Adds the scores of one round and re-ranks
    pub fn add_scores(&mut self, scores: &[(Id, u64)]) {
        let mut summary: HashMap<Id, u64> = self
            .score_and_position
            .iter()
            .map(|(id, (points, _))| (*id, *points))
            .collect();

        for (id, points) in scores {
            *summary.entry(*id).or_default() += points;
        }

        let scores_descending = summary
            .into_iter()
            .sorted_by_key(|(id, points)| (std::cmp::Reverse(*points), *id))
            .collect_vec();

        self.score_and_position = scores_descending
            .iter()
            .enumerate()
            .map(|(position, (id, points))| (*id, (*points, position)))
            .collect();

        self.scores_descending = scores_descending;
    }

    /// Totals in descending order, truncated to `limit` entries
    pub fn scores_descending(&self, limit: usize) -> TruncatedVec<(Id, u64)> {
        TruncatedVec::new(
            self.scores_descending.iter().copied(),
            limit,
            self.scores_descending.len(),
        )
    }

    /// Total and position of `id`, if they have ever been recorded
    pub fn score(&self, id: Id) -> Option<ScoreMessage> {
        let (points, position) = self.score_and_position.get(&id)?;
        Some(ScoreMessage {
            points: *points,
            position: *position,
        })
    }
}

/// Leaderboards of every scope
#[derive(Debug, Default)]
pub struct Leaderboards {
    boards: HashMap<ScopeKey, Leaderboard>,
}

impl Leaderboards {
    /// Credits the result of a tallied round and returns what was awarded
    ///
    /// Rounds nobody took part in leave the standings untouched.
    pub fn record(&mut self, tally: &Tally) -> Vec<(Id, u64)> {
        let winners = tally.winners();
        let mentioned = tally.mentioned();
        if mentioned.is_empty() {
            return Vec::new();
        }

        let scores = mentioned
            .into_iter()
            .map(|id| {
                let points = winners
                    .iter()
                    .find(|placing| placing.participant == id)
                    .map_or(0, |placing| {
                        calculate_score(tally.timeout, placing.elapsed, POINTS_AWARDED)
                    });
                (id, points)
            })
            .collect_vec();

        self.boards
            .entry(tally.scope)
            .or_default()
            .add_scores(&scores);
        scores
    }

    /// Standings of `scope`, best first
    pub fn standings(&self, scope: ScopeKey) -> TruncatedVec<(Id, u64)> {
        self.boards
            .get(&scope)
            .map(|board| board.scores_descending(DISPLAY_LIMIT))
            .unwrap_or_default()
    }

    /// The leaderboard of `scope`, if anything was recorded there
    pub fn get(&self, scope: ScopeKey) -> Option<&Leaderboard> {
        self.boards.get(&scope)
    }
}
