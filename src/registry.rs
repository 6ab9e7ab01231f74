//! Round registry
//!
//! The registry is the single authoritative store of open rounds and of the
//! per-participant pointers into them. Every mutating method re-validates the
//! round (exists, not closed, not already submitted) inside the call itself,
//! so a caller that suspended between reading and writing can never act on a
//! stale view.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use enum_map::EnumMap;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    choice::Choice,
    participant::{GameKind, Id, ScopeKey},
    round_id::{Allocator, Exhausted, RoundId},
};

/// What a round is scored against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnswerSpec {
    /// A trivia question and its canonical answer variants (never empty)
    Trivia {
        /// The question text shown to participants
        question: String,
        /// Canonical, lower-cased acceptable answers
        answers: Vec<String>,
    },
    /// A secret integer drawn from `1..=max`
    NumberGuess {
        /// The number to guess
        secret: i64,
        /// Upper bound announced to participants
        max: i64,
    },
    /// Rock-paper-scissors resolves by comparing submissions
    RockPaperScissors,
}

impl AnswerSpec {
    /// The game kind this spec belongs to
    pub fn kind(&self) -> GameKind {
        match self {
            AnswerSpec::Trivia { .. } => GameKind::Trivia,
            AnswerSpec::NumberGuess { .. } => GameKind::NumberGuess,
            AnswerSpec::RockPaperScissors => GameKind::RockPaperScissors,
        }
    }
}

/// A submitted value, typed by the entry point that accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::From)]
pub enum Value {
    /// Free text (trivia answers)
    Text(String),
    /// A parsed integer guess
    Number(i64),
    /// A rock-paper-scissors choice
    Choice(Choice),
}

/// One participant's accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// The submitted value
    pub value: Value,
    /// Time between round creation and acceptance of the submission
    pub elapsed: Duration,
}

/// A shared unit of play
#[derive(Debug, Clone)]
pub struct Round {
    id: RoundId,
    scope: ScopeKey,
    created_at: Instant,
    timeout: Duration,
    answer_spec: AnswerSpec,
    submissions: HashMap<Id, Submission>,
    closed: bool,
}

impl Round {
    /// Builds a detached round, used for scoring snapshots outside the registry
    pub fn new(
        id: RoundId,
        scope: ScopeKey,
        timeout: Duration,
        answer_spec: AnswerSpec,
        submissions: HashMap<Id, Submission>,
    ) -> Self {
        Self {
            id,
            scope,
            created_at: Instant::now(),
            timeout,
            answer_spec,
            submissions,
            closed: true,
        }
    }

    /// The round's unique id
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// The kind of game this round runs
    pub fn kind(&self) -> GameKind {
        self.answer_spec.kind()
    }

    /// The scope (channel) the round is bound to
    pub fn scope(&self) -> ScopeKey {
        self.scope
    }

    /// Monotonic creation time
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// How long the round accepts submissions
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// What submissions are scored against
    pub fn answer_spec(&self) -> &AnswerSpec {
        &self.answer_spec
    }

    /// All accepted submissions
    pub fn submissions(&self) -> &HashMap<Id, Submission> {
        &self.submissions
    }

    fn accepts_at(&self, now: Instant) -> bool {
        !self.closed && now.saturating_duration_since(self.created_at) < self.timeout
    }
}

/// Ephemeral pointer from a participant to the round they engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRoundRef {
    /// The bound round
    pub round_id: RoundId,
    /// Kind of the bound round
    pub kind: GameKind,
}

/// Reasons a submission is rejected without touching state
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitError {
    /// The participant already has a submission in this round
    #[error("already submitted")]
    AlreadySubmitted,
    /// The round is closed or its time limit has passed
    #[error("round expired")]
    Expired,
    /// The round no longer exists
    #[error("round not found")]
    NotFound,
    /// The round reached the maximum number of participants
    #[error("maximum number of participants reached")]
    RoundFull,
}

/// Authoritative store of rounds and participant bindings
#[derive(Debug, Default)]
pub struct Registry {
    allocator: Allocator,
    rounds: HashMap<RoundId, Round>,
    /// Open round ids per kind, ascending so the scope scan is deterministic
    open: EnumMap<GameKind, BTreeSet<RoundId>>,
    bindings: HashMap<Id, PlayerRoundRef>,
}

impl Registry {
    /// Creates a registry whose id counter starts at `first_id`
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            allocator: Allocator::starting_at(first_id),
            ..Self::default()
        }
    }

    /// Stores a new open round and returns its id
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if no further id can be allocated; ids are
    /// never reused.
    pub fn create(
        &mut self,
        scope: ScopeKey,
        timeout: Duration,
        answer_spec: AnswerSpec,
    ) -> Result<RoundId, Exhausted> {
        let id = self.allocator.allocate()?;
        let kind = answer_spec.kind();

        self.rounds.insert(
            id,
            Round {
                id,
                scope,
                created_at: Instant::now(),
                timeout,
                answer_spec,
                submissions: HashMap::default(),
                closed: false,
            },
        );
        self.open[kind].insert(id);

        info!(round = %id, %kind, %scope, ?timeout, "round created");
        Ok(id)
    }

    /// Points `participant` at `round_id`, replacing any earlier pointer
    pub fn bind(&mut self, participant: Id, round_id: RoundId, kind: GameKind) {
        self.bindings
            .insert(participant, PlayerRoundRef { round_id, kind });
    }

    /// The participant's current pointer, if any
    pub fn binding(&self, participant: Id) -> Option<PlayerRoundRef> {
        self.bindings.get(&participant).copied()
    }

    /// Finds the round `participant` should submit to
    ///
    /// Prefers the participant's own binding when it is still open; a stale
    /// binding is dropped. Otherwise the first open round of `kind` in
    /// `scope` (lowest id) is bound to the participant and returned.
    pub fn resolve(&mut self, participant: Id, scope: ScopeKey, kind: GameKind) -> Option<RoundId> {
        if let Some(binding) = self.binding(participant) {
            if binding.kind == kind {
                if self.is_open(binding.round_id) {
                    return Some(binding.round_id);
                }
                debug!(round = %binding.round_id, %participant, "dropping stale binding");
                self.bindings.remove(&participant);
            }
        }

        let round_id = self.find_open(scope, kind)?;
        self.bind(participant, round_id, kind);
        Some(round_id)
    }

    /// First open round of `kind` in `scope`, without binding anyone
    pub fn find_open(&self, scope: ScopeKey, kind: GameKind) -> Option<RoundId> {
        self.open[kind].iter().copied().find(|id| {
            self.rounds
                .get(id)
                .is_some_and(|round| round.scope == scope && !round.closed)
        })
    }

    /// Number of open rounds of `kind` in `scope`
    pub fn open_count(&self, scope: ScopeKey, kind: GameKind) -> usize {
        self.open[kind]
            .iter()
            .filter(|id| self.rounds.get(id).is_some_and(|r| r.scope == scope))
            .count()
    }

    /// Whether `round_id` exists and has not been closed
    pub fn is_open(&self, round_id: RoundId) -> bool {
        self.rounds.get(&round_id).is_some_and(|r| !r.closed)
    }

    /// Read access to a stored round
    pub fn get(&self, round_id: RoundId) -> Option<&Round> {
        self.rounds.get(&round_id)
    }

    /// Records `participant`'s submission, timestamped now
    ///
    /// # Errors
    ///
    /// See [`SubmitError`]; a rejected submission never mutates the round.
    pub fn record_submission(
        &mut self,
        round_id: RoundId,
        participant: Id,
        value: Value,
    ) -> Result<Duration, SubmitError> {
        self.record_submission_at(round_id, participant, value, Instant::now())
    }

    pub(crate) fn record_submission_at(
        &mut self,
        round_id: RoundId,
        participant: Id,
        value: Value,
        now: Instant,
    ) -> Result<Duration, SubmitError> {
        let Some(round) = self.rounds.get_mut(&round_id) else {
            self.drop_binding_to(participant, round_id);
            return Err(SubmitError::NotFound);
        };

        if !round.accepts_at(now) {
            self.drop_binding_to(participant, round_id);
            return Err(SubmitError::Expired);
        }

        if round.submissions.contains_key(&participant) {
            return Err(SubmitError::AlreadySubmitted);
        }

        if round.submissions.len() >= crate::constants::round::MAX_PARTICIPANTS {
            return Err(SubmitError::RoundFull);
        }

        let elapsed = now.saturating_duration_since(round.created_at);
        round
            .submissions
            .insert(participant, Submission { value, elapsed });
        self.bindings.remove(&participant);

        debug!(round = %round_id, %participant, ?elapsed, "submission recorded");
        Ok(elapsed)
    }

    /// Closes and removes a round, returning its final snapshot
    ///
    /// Only the first call for a given id receives the snapshot; every later
    /// call gets `None`. Bindings that point at the round are cleared.
    pub fn close_and_remove(&mut self, round_id: RoundId) -> Option<Round> {
        let mut round = self.rounds.remove(&round_id)?;
        round.closed = true;
        self.open[round.kind()].remove(&round_id);
        self.bindings.retain(|_, binding| binding.round_id != round_id);

        info!(
            round = %round_id,
            submissions = round.submissions.len(),
            "round closed"
        );
        Some(round)
    }

    /// Closes and removes every round in `scope`, returning the removed ids
    pub fn discard_scope(&mut self, scope: ScopeKey) -> Vec<RoundId> {
        let ids = self
            .rounds
            .values()
            .filter(|round| round.scope == scope)
            .map(Round::id)
            .sorted()
            .collect_vec();

        for id in &ids {
            self.close_and_remove(*id);
        }

        ids
    }

    fn drop_binding_to(&mut self, participant: Id, round_id: RoundId) {
        if self
            .bindings
            .get(&participant)
            .is_some_and(|binding| binding.round_id == round_id)
        {
            self.bindings.remove(&participant);
        }
    }
}
