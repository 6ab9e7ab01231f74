//! Public entry points of the game engine
//!
//! The [`Coordinator`] is what the command layer talks to. It owns all
//! shared state explicitly: the round registry, the question selector, the
//! scope leaderboards and the handles of running countdown tasks. Every
//! entry point returns the reply for the participant who issued the command;
//! anything that happens later (countdowns, results) goes out through the
//! [`Announcer`].
//!
//! Registry mutations happen while holding the registry lock and never
//! across an `.await`, so the check and the write of a submission can never
//! be interleaved with another task's.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use garde::Validate;
use heck::ToTitleCase;
use itertools::Itertools;
use rustrict::CensorStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    Announcement, TruncatedVec,
    answer::canonical_answers,
    choice::{Choice, DuelOutcome, duel},
    config::{self, Options},
    constants::{number_guess, trivia::MAX_ANSWER_LENGTH},
    countdown::{self, CountdownHandle, CountdownSink, Schedule},
    leaderboard::{Leaderboards, ScoreMessage},
    participant::{GameKind, Id, ScopeKey},
    persona::{Line, Persona},
    questions::{Selector, Source, StaticPool},
    registry::{AnswerSpec, Registry, Round, SubmitError, Value},
    round_id::{Exhausted, RoundId},
    session::{Announcer, CollaboratorError, IdentityResolver, KnowledgeStore, TextGenerator},
    tally::{GuessOutcome, Outcome, Placing, RpsOutcome, Tally, TriviaOutcome, tally},
};

/// Fatal failures of an entry point
#[derive(Error, Debug)]
pub enum Error {
    /// No further round id can be allocated
    #[error("cannot start round: {0}")]
    IdExhausted(#[from] Exhausted),
    /// The engine options are invalid
    #[error(transparent)]
    Options(#[from] config::Error),
    /// Every question source, the static pool included, is empty
    #[error("no trivia question available")]
    NoQuestion,
}

/// Assembles a [`Coordinator`]
pub struct Builder {
    options: Options,
    announcer: Arc<dyn Announcer>,
    identities: Arc<dyn IdentityResolver>,
    persona: Persona,
    generator: Option<Arc<dyn TextGenerator>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    pool: Option<StaticPool>,
    first_round_id: Option<u64>,
}

impl Builder {
    /// Uses `options` instead of the defaults
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Uses `persona` for response lines
    #[must_use]
    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Adds a generative question source
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Adds a knowledge store question source
    #[must_use]
    pub fn knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Replaces the built-in question pool
    #[must_use]
    pub fn pool(mut self, pool: StaticPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Starts round ids at `first` instead of 1
    #[must_use]
    pub fn first_round_id(mut self, first: u64) -> Self {
        self.first_round_id = Some(first);
        self
    }

    /// Validates the options and builds the coordinator
    ///
    /// # Errors
    ///
    /// Returns [`Error::Options`] if the options are out of bounds.
    pub fn build(self) -> Result<Coordinator, Error> {
        self.options.validate().map_err(config::Error::from)?;

        let mut selector = Selector::new(&self.options);
        if let Some(generator) = self.generator {
            selector = selector.with_generator(generator);
        }
        if let Some(knowledge) = self.knowledge {
            selector = selector.with_knowledge(knowledge);
        }
        if let Some(pool) = self.pool {
            selector = selector.with_pool(pool);
        }

        let registry = self
            .first_round_id
            .map_or_else(Registry::default, Registry::with_first_id);

        Ok(Coordinator {
            inner: Arc::new(Inner {
                registry: Arc::new(Mutex::new(registry)),
                selector,
                leaderboards: Mutex::new(Leaderboards::default()),
                countdowns: Mutex::new(HashMap::new()),
                announcer: self.announcer,
                identities: self.identities,
                persona: self.persona,
                options: self.options,
            }),
        })
    }
}

struct Inner {
    registry: Arc<Mutex<Registry>>,
    selector: Selector,
    leaderboards: Mutex<Leaderboards>,
    countdowns: Mutex<HashMap<RoundId, CountdownHandle>>,
    announcer: Arc<dyn Announcer>,
    identities: Arc<dyn IdentityResolver>,
    persona: Persona,
    options: Options,
}

/// Runs rounds on behalf of the command layer
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

fn time_span(duration: Duration) -> String {
    pluralizer::pluralize(
        "second",
        isize::try_from(duration.as_secs()).unwrap_or(isize::MAX),
        true,
    )
}

fn seconds(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

fn display_answer(answer: &str) -> String {
    answer.to_title_case()
}

impl Coordinator {
    /// Starts assembling a coordinator around the two required collaborators
    pub fn builder(
        announcer: Arc<dyn Announcer>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Builder {
        Builder {
            options: Options::default(),
            announcer,
            identities,
            persona: Persona::default(),
            generator: None,
            knowledge: None,
            pool: None,
            first_round_id: None,
        }
    }

    /// Starts a trivia round in `scope`
    ///
    /// `source` forces a question source; `None` walks the whole chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdExhausted`] if no round id is left, or
    /// [`Error::NoQuestion`] if there is nothing to ask.
    pub async fn start_trivia(
        &self,
        participant: Id,
        scope: ScopeKey,
        source: Option<Source>,
    ) -> Result<String, Error> {
        let question = self
            .inner
            .selector
            .select(source)
            .await
            .ok_or(Error::NoQuestion)?;

        tokio::time::sleep(self.inner.options.start_delay).await;

        let answer_spec = AnswerSpec::Trivia {
            question: question.prompt.clone(),
            answers: canonical_answers(&question.answer_key),
        };
        let timeout = self.start(participant, scope, answer_spec).await?;

        let line = self.inner.persona.say(
            Line::TriviaStart,
            &[("question", question.prompt.as_str())],
            "Question: {question}",
        );
        Ok(format!("{line} You have {}.", time_span(timeout)))
    }

    /// Starts a number guessing round in `scope` with a secret in `1..=max`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdExhausted`] if no round id is left.
    pub async fn start_number_guess(
        &self,
        participant: Id,
        scope: ScopeKey,
        max: Option<i64>,
    ) -> Result<String, Error> {
        let max = max.unwrap_or(self.inner.options.guessing_max);
        if !(1..=number_guess::MAX_MAX).contains(&max) {
            return Ok(format!(
                "Pick a maximum between 1 and {}!",
                number_guess::MAX_MAX
            ));
        }

        let secret = fastrand::i64(1..=max);
        let timeout = self
            .start(participant, scope, AnswerSpec::NumberGuess { secret, max })
            .await?;

        let line = self.inner.persona.say(Line::Start, &[], "Let's play!");
        Ok(format!(
            "{line} I picked a number between 1 and {max}. Try to guess it within {}!",
            time_span(timeout)
        ))
    }

    /// Starts a multiplayer rock-paper-scissors round in `scope`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdExhausted`] if no round id is left.
    pub async fn start_rps_round(&self, participant: Id, scope: ScopeKey) -> Result<String, Error> {
        let timeout = self
            .start(participant, scope, AnswerSpec::RockPaperScissors)
            .await?;

        let line = self.inner.persona.say(Line::Start, &[], "Let's play!");
        Ok(format!(
            "{line} Rock, paper or scissors? Everyone has {} to throw.",
            time_span(timeout)
        ))
    }

    /// Creates the round, binds the starter and spawns its countdown
    ///
    /// Returns the round's time limit.
    async fn start(
        &self,
        participant: Id,
        scope: ScopeKey,
        answer_spec: AnswerSpec,
    ) -> Result<Duration, Error> {
        let kind = answer_spec.kind();
        let timeout = self.inner.options.timeout(kind);
        let (round_id, created_at) = {
            let mut registry = self.inner.registry.lock().await;
            let round_id = registry.create(scope, timeout, answer_spec)?;
            registry.bind(participant, round_id, kind);
            let created_at = registry
                .get(round_id)
                .map_or_else(tokio::time::Instant::now, Round::created_at);
            (round_id, created_at)
        };

        let handle = countdown::spawn(
            self.inner.registry.clone(),
            self.inner.clone(),
            round_id,
            Schedule {
                created_at,
                timeout,
                announce_interval: self.inner.options.announce_interval,
                poll_interval: self.inner.options.poll_interval,
            },
        );

        let mut countdowns = self.inner.countdowns.lock().await;
        countdowns.retain(|_, handle| !handle.is_finished());
        countdowns.insert(round_id, handle);

        info!(round = %round_id, %participant, %kind, "round started");
        Ok(timeout)
    }

    /// Submits a trivia answer to the participant's round in `scope`
    pub async fn submit_answer(&self, participant: Id, scope: ScopeKey, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return "You have to actually answer something!".to_owned();
        }
        if text.chars().count() > MAX_ANSWER_LENGTH {
            return "That answer is way too long.".to_owned();
        }
        self.inner
            .submit(participant, scope, GameKind::Trivia, text.to_owned().into())
            .await
    }

    /// Submits a number guess to the participant's round in `scope`
    pub async fn submit_guess(&self, participant: Id, scope: ScopeKey, raw: &str) -> String {
        let Ok(guess) = raw.trim().parse::<i64>() else {
            return "That's not a whole number!".to_owned();
        };
        self.inner
            .submit(participant, scope, GameKind::NumberGuess, guess.into())
            .await
    }

    /// Throws a rock-paper-scissors choice
    ///
    /// Joins the open round in `scope` if there is one; otherwise plays an
    /// immediate duel against a random house choice.
    pub async fn play_rps(&self, participant: Id, scope: ScopeKey, raw: &str) -> String {
        let choice = match raw.parse::<Choice>() {
            Ok(choice) => choice,
            Err(error) => {
                debug!(%participant, %error, "rejected choice");
                return "Pick rock, paper, or scissors!".to_owned();
            }
        };

        let has_round = {
            let registry = self.inner.registry.lock().await;
            registry
                .binding(participant)
                .is_some_and(|binding| {
                    binding.kind == GameKind::RockPaperScissors
                        && registry.is_open(binding.round_id)
                })
                || registry
                    .find_open(scope, GameKind::RockPaperScissors)
                    .is_some()
        };

        if has_round {
            self.inner
                .submit(
                    participant,
                    scope,
                    GameKind::RockPaperScissors,
                    Value::Choice(choice),
                )
                .await
        } else {
            self.inner.render_duel(choice, Choice::random())
        }
    }

    /// Routes a free-form answer to whichever round the participant is in
    ///
    /// The participant's own binding wins; otherwise the scope is scanned
    /// for an open round, trivia first, then number guessing, then
    /// rock-paper-scissors.
    pub async fn answer(&self, participant: Id, scope: ScopeKey, text: &str) -> String {
        let kind = {
            let registry = self.inner.registry.lock().await;
            registry
                .binding(participant)
                .filter(|binding| registry.is_open(binding.round_id))
                .map(|binding| binding.kind)
                .or_else(|| {
                    GameKind::ALL
                        .into_iter()
                        .find(|kind| registry.find_open(scope, *kind).is_some())
                })
        };

        match kind {
            Some(GameKind::Trivia) => self.submit_answer(participant, scope, text).await,
            Some(GameKind::NumberGuess) => self.submit_guess(participant, scope, text).await,
            Some(GameKind::RockPaperScissors) => match text.parse::<Choice>() {
                Ok(choice) => {
                    self.inner
                        .submit(
                            participant,
                            scope,
                            GameKind::RockPaperScissors,
                            Value::Choice(choice),
                        )
                        .await
                }
                Err(_) => "Pick rock, paper, or scissors!".to_owned(),
            },
            None => self.inner.no_active_game(None),
        }
    }

    /// Asks the magic 8-ball, after a dramatic pause
    pub async fn magic_8ball(&self, question: &str) -> String {
        if question.trim().is_empty() {
            return "You have to ask the 8-ball something!".to_owned();
        }

        tokio::time::sleep(self.inner.options.magic_8ball_delay).await;

        let action = self
            .inner
            .persona
            .say(Line::Magic8BallAction, &[], "Shakes the 8-ball...");
        format!("{action}\n\n{}", self.inner.persona.magic_8ball_answer())
    }

    /// Aborts every round in `scope` without tallying and returns the reply
    pub async fn reset(&self, scope: ScopeKey) -> String {
        let discarded = self.inner.registry.lock().await.discard_scope(scope);

        let mut countdowns = self.inner.countdowns.lock().await;
        for round_id in &discarded {
            if let Some(handle) = countdowns.remove(round_id) {
                handle.abort();
            }
        }
        drop(countdowns);

        info!(%scope, rounds = discarded.len(), "scope reset");
        if discarded.is_empty() {
            "There was nothing to reset.".to_owned()
        } else {
            format!(
                "Cancelled {}.",
                pluralizer::pluralize(
                    "round",
                    discarded.len().try_into().unwrap_or(isize::MAX),
                    true
                )
            )
        }
    }

    /// Closes and tallies `round_id` right away
    ///
    /// Returns `None` if the round was already closed, in which case nothing
    /// is announced. The countdown is only cancelled once this call has
    /// claimed the round, so a task already concluding it runs to the end.
    pub async fn finish_round(&self, round_id: RoundId) -> Option<Announcement> {
        let round = self.inner.registry.lock().await.close_and_remove(round_id)?;
        if let Some(handle) = self.inner.countdowns.lock().await.remove(&round_id) {
            handle.abort();
        }

        let scope = round.scope();
        let announcement = self.inner.conclude(round).await;
        if let Err(error) = self.inner.announcer.announce(scope, &announcement).await {
            warn!(round = %round_id, %error, "result announcement failed");
        }
        Some(announcement)
    }

    /// Cumulative points of `scope`, best first
    pub async fn leaderboard(&self, scope: ScopeKey) -> TruncatedVec<(Id, u64)> {
        self.inner.leaderboards.lock().await.standings(scope)
    }

    /// Rendered standings of `scope`
    pub async fn standings(&self, scope: ScopeKey) -> String {
        let standings = self.leaderboard(scope).await;
        if standings.exact_count() == 0 {
            return "Nobody has scored here yet.".to_owned();
        }

        let ids = standings.items().iter().map(|(id, _)| *id).collect_vec();
        let names = self.inner.names(&ids).await;
        let mut lines = standings
            .items()
            .iter()
            .enumerate()
            .map(|(position, (id, points))| {
                format!("{}. {} ({points})", position + 1, names[id])
            })
            .collect_vec();
        if standings.hidden_count() > 0 {
            lines.push(format!("...and {} more", standings.hidden_count()));
        }
        lines.join("\n")
    }

    /// The participant's total and rank in `scope`
    pub async fn score(&self, participant: Id, scope: ScopeKey) -> String {
        let score = self
            .inner
            .leaderboards
            .lock()
            .await
            .get(scope)
            .and_then(|board| board.score(participant));

        match score {
            Some(ScoreMessage { points, position }) => format!(
                "You're #{} here with {}.",
                position + 1,
                pluralizer::pluralize("point", isize::try_from(points).unwrap_or(isize::MAX), true)
            ),
            None => "You haven't scored here yet.".to_owned(),
        }
    }
}

impl Inner {
    async fn submit(
        &self,
        participant: Id,
        scope: ScopeKey,
        kind: GameKind,
        value: Value,
    ) -> String {
        let mut registry = self.registry.lock().await;

        let Some(round_id) = registry.resolve(participant, scope, kind) else {
            return self.no_active_game(Some(kind));
        };
        if registry.open_count(scope, kind) > 1 {
            warn!(
                %scope,
                %kind,
                round = %round_id,
                "several open rounds in scope, using the oldest"
            );
        }

        if let (Value::Number(guess), Some(AnswerSpec::NumberGuess { max, .. })) =
            (&value, registry.get(round_id).map(Round::answer_spec))
        {
            if !(1..=*max).contains(guess) {
                return format!("Guess a number between 1 and {max}!");
            }
        }

        let locked_in = match &value {
            Value::Text(_) => None,
            Value::Number(guess) => Some(guess.to_string()),
            Value::Choice(choice) => Some(choice.to_string()),
        };
        let result = registry.record_submission(round_id, participant, value);
        drop(registry);

        match result {
            Ok(elapsed) => match locked_in {
                Some(value) => format!("Locked in {value}! Results when time runs out."),
                None => format!(
                    "Locked in after {}! Results when time runs out.",
                    seconds(elapsed)
                ),
            },
            Err(SubmitError::AlreadySubmitted) => "You already answered this round!".to_owned(),
            Err(SubmitError::Expired) => "Too late, that round is over!".to_owned(),
            Err(SubmitError::NotFound) => self.no_active_game(Some(kind)),
            Err(SubmitError::RoundFull) => "This round is full, sorry!".to_owned(),
        }
    }

    fn no_active_game(&self, kind: Option<GameKind>) -> String {
        let line = self.persona.say(Line::NoActiveGame, &[], "No active game.");
        let command = match kind {
            Some(GameKind::Trivia) | None => "!trivia",
            Some(GameKind::NumberGuess) => "!game guess",
            Some(GameKind::RockPaperScissors) => "!rps-round",
        };
        format!("{line} Start one with {command}")
    }

    fn render_duel(&self, challenger: Choice, house: Choice) -> String {
        let choice = challenger.to_string();
        let house_choice = house.to_string();
        match duel(challenger, house) {
            DuelOutcome::Tie => self.persona.say(
                Line::Tie,
                &[("choice", house_choice.as_str())],
                "We both picked {choice}!",
            ),
            DuelOutcome::Win => format!(
                "{} You picked {choice}, I picked {house_choice}.",
                self.persona.say(Line::Win, &[], "You won!")
            ),
            DuelOutcome::Lose => format!(
                "{} I picked {house_choice}, you picked {choice}.",
                self.persona.say(Line::Lose, &[], "I won!")
            ),
        }
    }

    /// Display labels of `ids`, falling back to the raw identity
    async fn names(&self, ids: &[Id]) -> HashMap<Id, String> {
        let mut names = HashMap::with_capacity(ids.len());
        for id in ids {
            let name = match self.identities.display_name(*id).await {
                Ok(name) if !name.trim().is_empty() => rustrict::trim_whitespace(&name).to_owned(),
                Ok(_) => id.to_string(),
                Err(error) => {
                    debug!(participant = %id, %error, "identity lookup failed");
                    id.to_string()
                }
            };
            names.insert(*id, name);
        }
        names
    }

    /// Scores a closed round, credits the leaderboard and renders the result
    async fn conclude(&self, round: Round) -> Announcement {
        let tally = tally(&round);
        let awarded = self.leaderboards.lock().await.record(&tally);
        self.countdowns.lock().await.remove(&tally.round_id);

        let text = self.render(&tally).await;
        info!(
            round = %tally.round_id,
            participants = tally.participants,
            winners = tally.winners().len(),
            "round tallied"
        );
        Announcement::Results {
            tally,
            awarded,
            text,
        }
    }

    async fn render(&self, tally: &Tally) -> String {
        let names = self.names(&tally.mentioned()).await;
        let name = |id: &Id| names.get(id).cloned().unwrap_or_else(|| id.to_string());
        let listed = |placings: &[Placing]| {
            placings
                .iter()
                .map(|placing| {
                    format!(
                        "{} ({})",
                        name(&placing.participant),
                        seconds(placing.elapsed)
                    )
                })
                .join(", ")
        };

        let header = format!("Round #{} ({}) is over!", tally.round_id, tally.kind());
        let body = match (&tally.outcome, &tally.answer_spec) {
            (Outcome::NoParticipants, AnswerSpec::Trivia { answers, .. }) => format!(
                "Nobody answered. The answer was {}.",
                display_answer(answers.first().map_or("", String::as_str))
            ),
            (Outcome::NoParticipants, AnswerSpec::NumberGuess { secret, .. }) => {
                format!("Nobody guessed. The number was {secret}.")
            }
            (Outcome::NoParticipants, AnswerSpec::RockPaperScissors) => {
                "Nobody threw anything.".to_owned()
            }
            (Outcome::Trivia(outcome), AnswerSpec::Trivia { answers, .. }) => {
                self.render_trivia(outcome, answers, &name, &listed)
            }
            (Outcome::NumberGuess(outcome), AnswerSpec::NumberGuess { secret, .. }) => {
                match outcome {
                    GuessOutcome::Exact { winners } => format!(
                        "{} {} guessed {secret} exactly!",
                        self.persona.say(Line::Win, &[], "Congrats!"),
                        listed(winners)
                    ),
                    GuessOutcome::Closest { distance, guesses } => format!(
                        "Nobody hit {secret}. Closest, off by {distance}: {}.",
                        guesses
                            .iter()
                            .map(|(id, guess)| format!("{} ({guess})", name(id)))
                            .join(", ")
                    ),
                    GuessOutcome::NoValidGuesses => {
                        format!("No valid guesses. The number was {secret}.")
                    }
                }
            }
            (Outcome::RockPaperScissors(outcome), _) => match outcome {
                RpsOutcome::Winners {
                    choice,
                    beaten,
                    winners,
                    ..
                } => format!(
                    "{} beats {beaten}! {} {}",
                    display_answer(&choice.to_string()),
                    self.persona.say(Line::Win, &[], "You won!"),
                    listed(winners)
                ),
                RpsOutcome::Draw { choices } => {
                    let shapes = choices.iter().map(|(_, choice)| *choice).unique().collect_vec();
                    match shapes[..] {
                        [only] => self.persona.say(
                            Line::Tie,
                            &[("choice", only.to_string().as_str())],
                            "Everyone picked {choice}!",
                        ),
                        _ => "Every shape showed up, it's a draw!".to_owned(),
                    }
                }
            },
            (outcome, answer_spec) => {
                warn!(
                    round = %tally.round_id,
                    ?outcome,
                    ?answer_spec,
                    "outcome does not match round kind"
                );
                "Results are unavailable.".to_owned()
            }
        };

        format!("{header} {body}")
    }

    fn render_trivia(
        &self,
        outcome: &TriviaOutcome,
        answers: &[String],
        name: &dyn Fn(&Id) -> String,
        listed: &dyn Fn(&[Placing]) -> String,
    ) -> String {
        let answer = display_answer(answers.first().map_or("", String::as_str));
        match outcome {
            TriviaOutcome::Winners { winners, incorrect } => {
                let Some(first) = winners.first() else {
                    return format!("The answer was {answer}.");
                };
                let time = first.elapsed.as_secs().to_string();
                let line = if first.elapsed < self.options.fast_threshold {
                    self.persona.say(
                        Line::TriviaFastCorrect,
                        &[("time", time.as_str())],
                        "Wow, {time}s! Impressive!",
                    )
                } else {
                    self.persona.say(
                        Line::TriviaCorrect,
                        &[("time", time.as_str())],
                        "Correct! You took {time}s.",
                    )
                };

                let mut text = format!(
                    "{} got it first in {}. {line} The answer was {answer}.",
                    name(&first.participant),
                    seconds(first.elapsed)
                );
                if winners.len() > 1 {
                    text.push_str(&format!(" Also correct: {}.", listed(&winners[1..])));
                }
                if !incorrect.is_empty() {
                    text.push_str(&format!(
                        " {}.",
                        pluralizer::pluralize(
                            "wrong answer",
                            incorrect.len().try_into().unwrap_or(isize::MAX),
                            true,
                        )
                    ));
                }
                text
            }
            TriviaOutcome::NoWinner {
                answer: first_variant,
                also_acceptable,
                near_misses,
            } => {
                let mut text = self.persona.say(
                    Line::TriviaTimeout,
                    &[("answer", display_answer(first_variant).as_str())],
                    "Time's up! The answer was {answer}.",
                );
                if !also_acceptable.is_empty() {
                    text.push_str(&format!(" Also accepted: {}.", also_acceptable.join(", ")));
                }
                if !near_misses.items().is_empty() {
                    let misses = near_misses
                        .items()
                        .iter()
                        .map(|(id, said)| {
                            let said = if said.is_inappropriate() {
                                said.censor()
                            } else {
                                said.clone()
                            };
                            format!("{} said \"{said}\"", name(id))
                        })
                        .join(", ");
                    text.push_str(&format!(" Close calls: {misses}"));
                    if near_misses.hidden_count() > 0 {
                        text.push_str(&format!(" and {} more", near_misses.hidden_count()));
                    }
                    text.push('.');
                }
                text
            }
        }
    }
}

#[async_trait]
impl CountdownSink for Inner {
    async fn countdown(
        &self,
        round_id: RoundId,
        remaining: Duration,
    ) -> Result<(), CollaboratorError> {
        let Some((scope, answer_spec)) = self
            .registry
            .lock()
            .await
            .get(round_id)
            .map(|round| (round.scope(), round.answer_spec().clone()))
        else {
            return Ok(());
        };

        let left = time_span(remaining);
        let text = match &answer_spec {
            AnswerSpec::Trivia { question, .. } => format!("{left} left! {question}"),
            AnswerSpec::NumberGuess { max, .. } => {
                format!("{left} left to guess a number between 1 and {max}!")
            }
            AnswerSpec::RockPaperScissors => {
                format!("{left} left to throw rock, paper or scissors!")
            }
        };

        let announcement = Announcement::Countdown {
            round_id,
            kind: answer_spec.kind(),
            remaining,
            text,
        };
        self.announcer.announce(scope, &announcement).await
    }

    async fn expired(&self, round: Round) -> Result<(), CollaboratorError> {
        let scope = round.scope();
        let announcement = self.conclude(round).await;
        self.announcer.announce(scope, &announcement).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    const SCOPE: ScopeKey = ScopeKey::new(100);
    const OTHER: ScopeKey = ScopeKey::new(200);
    const ALICE: Id = Id::new(1);
    const BOB: Id = Id::new(2);
    const CAROL: Id = Id::new(3);

    #[derive(Default)]
    struct Outbox(StdMutex<Vec<(ScopeKey, Announcement)>>);

    impl Outbox {
        fn results(&self) -> Vec<(ScopeKey, Announcement)> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, a)| matches!(a, Announcement::Results { .. }))
                .cloned()
                .collect()
        }

        fn countdowns(&self) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, a)| matches!(a, Announcement::Countdown { .. }))
                .count()
        }
    }

    #[async_trait]
    impl Announcer for Outbox {
        async fn announce(
            &self,
            scope: ScopeKey,
            announcement: &Announcement,
        ) -> Result<(), CollaboratorError> {
            self.0.lock().unwrap().push((scope, announcement.clone()));
            Ok(())
        }
    }

    struct Names;

    #[async_trait]
    impl IdentityResolver for Names {
        async fn display_name(&self, participant: Id) -> Result<String, CollaboratorError> {
            match participant.get() {
                1 => Ok("Alice".to_owned()),
                2 => Ok("Bob".to_owned()),
                _ => Err(CollaboratorError::Unavailable("no profile".to_owned())),
            }
        }
    }

    fn coordinator(outbox: &Arc<Outbox>) -> Coordinator {
        Coordinator::builder(outbox.clone(), Arc::new(Names))
            .pool(StaticPool::new(vec![(
                "What's the capital of Japan?".to_owned(),
                "Tokyo".to_owned(),
            )]))
            .build()
            .unwrap()
    }

    async fn wait(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    fn results_tally(outbox: &Outbox) -> Tally {
        let results = outbox.results();
        assert_eq!(results.len(), 1, "expected exactly one result");
        match &results[0].1 {
            Announcement::Results { tally, .. } => tally.clone(),
            Announcement::Countdown { .. } => unreachable!(),
        }
    }

    async fn open_round(games: &Coordinator, kind: GameKind) -> RoundId {
        games.inner.registry.lock().await.find_open(SCOPE, kind).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_trivia_fastest_correct_wins() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);

        let reply = games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        assert!(reply.contains("What's the capital of Japan?"));
        assert!(reply.contains("30 seconds"));

        wait(0.5).await;
        games.submit_answer(CAROL, SCOPE, "Osaka").await;
        wait(0.5).await;
        games.submit_answer(BOB, SCOPE, "tokyo ").await;
        wait(2.0).await;
        games.submit_answer(ALICE, SCOPE, "Tokyo").await;

        wait(30.0).await;

        let tally = results_tally(&outbox);
        assert_eq!(tally.winners()[0].participant, BOB);
        assert!((tally.winners()[0].elapsed.as_secs_f64() - 1.0).abs() < 0.01);
        assert_eq!(tally.winners()[1].participant, ALICE);
        let Outcome::Trivia(TriviaOutcome::Winners { incorrect, .. }) = &tally.outcome else {
            panic!("expected winners");
        };
        assert_eq!(incorrect, &vec![CAROL]);

        let (scope, announcement) = &outbox.results()[0];
        assert_eq!(*scope, SCOPE);
        assert!(announcement.text().contains("Bob got it first in 1.0s"));
        assert!(announcement.text().contains("Impressive!"));
        assert!(announcement.text().contains("Tokyo"));
        assert_eq!(outbox.countdowns(), 2);

        let standings = games.leaderboard(SCOPE).await;
        assert_eq!(standings.items()[0].0, BOB);
        let registry = games.inner.registry.lock().await;
        assert!(registry.find_open(SCOPE, GameKind::Trivia).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_answer_is_rejected() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();

        assert!(games.submit_answer(BOB, SCOPE, "Kyoto").await.starts_with("Locked in"));
        assert_eq!(
            games.submit_answer(BOB, SCOPE, "Tokyo").await,
            "You already answered this round!"
        );

        wait(31.0).await;
        let tally = results_tally(&outbox);
        assert!(tally.winners().is_empty());
        assert_eq!(tally.participants, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_without_round() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);

        assert_eq!(
            games.answer(ALICE, SCOPE, "tokyo").await,
            "No active game. Start one with !trivia"
        );
        assert_eq!(
            games.submit_guess(ALICE, SCOPE, "5").await,
            "No active game. Start one with !game guess"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_are_scoped() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();

        assert!(
            games
                .submit_answer(BOB, OTHER, "tokyo")
                .await
                .starts_with("No active game")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_number_guess_validation() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        let reply = games.start_number_guess(ALICE, SCOPE, Some(10)).await.unwrap();
        assert!(reply.contains("between 1 and 10"));

        assert_eq!(
            games.submit_guess(BOB, SCOPE, "ten").await,
            "That's not a whole number!"
        );
        assert_eq!(
            games.submit_guess(BOB, SCOPE, "11").await,
            "Guess a number between 1 and 10!"
        );
        assert_eq!(
            games.submit_guess(BOB, SCOPE, " 7 ").await,
            "Locked in 7! Results when time runs out."
        );

        assert_eq!(
            games.start_number_guess(ALICE, SCOPE, Some(0)).await.unwrap(),
            "Pick a maximum between 1 and 1000000!"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_number_guess_exact_beats_closer_in_time() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_number_guess(ALICE, SCOPE, Some(1)).await.unwrap();

        games.answer(ALICE, SCOPE, "1").await;
        wait(46.0).await;

        let tally = results_tally(&outbox);
        assert_eq!(tally.winners()[0].participant, ALICE);
        assert!(outbox.results()[0].1.text().contains("guessed 1 exactly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rps_duel_without_round() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);

        let reply = games.play_rps(ALICE, SCOPE, "rock").await;
        assert!(
            reply.contains("We both picked rock!")
                || reply.contains("You picked rock, I picked scissors.")
                || reply.contains("I picked paper, you picked rock.")
        );
        assert_eq!(
            games.play_rps(ALICE, SCOPE, "lizard").await,
            "Pick rock, paper, or scissors!"
        );
        assert!(outbox.results().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rps_round_reveals_at_expiry() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_rps_round(ALICE, SCOPE).await.unwrap();

        assert_eq!(
            games.play_rps(ALICE, SCOPE, "rock").await,
            "Locked in rock! Results when time runs out."
        );
        games.answer(BOB, SCOPE, "scissors").await;
        wait(21.0).await;

        let tally = results_tally(&outbox);
        let Outcome::RockPaperScissors(RpsOutcome::Winners { winners, losers, .. }) = &tally.outcome
        else {
            panic!("expected winners");
        };
        assert_eq!(winners[0].participant, ALICE);
        assert_eq!(losers, &vec![BOB]);
        assert!(outbox.results()[0].1.text().contains("Rock beats scissors!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_prefers_trivia_then_guess() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_number_guess(ALICE, SCOPE, Some(5)).await.unwrap();

        assert!(games.answer(BOB, SCOPE, "3").await.starts_with("Locked in 3"));

        games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        assert!(
            games
                .answer(CAROL, SCOPE, "tokyo")
                .await
                .starts_with("Locked in after")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_without_tally() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        games.start_rps_round(ALICE, OTHER).await.unwrap();
        games.submit_answer(BOB, SCOPE, "tokyo").await;

        assert_eq!(games.reset(SCOPE).await, "Cancelled 1 round.");
        assert_eq!(games.reset(SCOPE).await, "There was nothing to reset.");
        assert!(games.answer(BOB, SCOPE, "tokyo").await.starts_with("No active game"));

        wait(40.0).await;
        let results = outbox.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, OTHER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_round_tallies_once() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        let round_id = open_round(&games, GameKind::Trivia).await;
        games.submit_answer(ALICE, SCOPE, "TOKYO").await;

        let announcement = games.finish_round(round_id).await.unwrap();
        assert_eq!(announcement.round_id(), round_id);
        assert!(games.finish_round(round_id).await.is_none());

        wait(40.0).await;
        assert_eq!(outbox.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_round_after_expiry_leaves_tally_to_countdown() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_rps_round(ALICE, SCOPE).await.unwrap();
        games.play_rps(BOB, SCOPE, "rock").await;
        let round_id = open_round(&games, GameKind::RockPaperScissors).await;

        // The countdown claims the round, then parks on the leaderboard lock
        let leaderboards = games.inner.leaderboards.lock().await;
        wait(21.0).await;
        assert!(games.inner.registry.lock().await.get(round_id).is_none());
        assert!(games.finish_round(round_id).await.is_none());
        assert!(outbox.results().is_empty());

        drop(leaderboards);
        wait(1.0).await;
        assert_eq!(results_tally(&outbox).round_id, round_id);
        assert_eq!(games.leaderboard(SCOPE).await.items()[0].0, BOB);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_reports_position() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        assert_eq!(games.score(BOB, SCOPE).await, "You haven't scored here yet.");

        games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        wait(1.0).await;
        games.answer(BOB, SCOPE, "tokyo").await;
        games.answer(CAROL, SCOPE, "kyoto").await;
        wait(30.0).await;

        assert!(games.score(BOB, SCOPE).await.starts_with("You're #1 here with "));
        assert!(games.score(CAROL, SCOPE).await.starts_with("You're #2 here with 0 points"));
        assert_eq!(games.score(BOB, OTHER).await, "You haven't scored here yet.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_participants_result() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();

        wait(31.0).await;
        let tally = results_tally(&outbox);
        assert!(matches!(tally.outcome, Outcome::NoParticipants));
        assert!(outbox.results()[0].1.text().contains("Nobody answered"));
        assert_eq!(games.standings(SCOPE).await, "Nobody has scored here yet.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_identity_falls_back_to_raw_id() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);
        games.start_trivia(ALICE, SCOPE, None).await.unwrap();
        games.submit_answer(CAROL, SCOPE, "tokyo").await;

        wait(31.0).await;
        assert!(outbox.results()[0].1.text().contains("3 got it first"));
        assert!(games.standings(SCOPE).await.starts_with("1. 3 ("));
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_exhaustion_fails_start() {
        let outbox = Arc::new(Outbox::default());
        let games = Coordinator::builder(outbox.clone(), Arc::new(Names))
            .first_round_id(u64::MAX)
            .build()
            .unwrap();

        games.start_rps_round(ALICE, SCOPE).await.unwrap();
        assert!(matches!(
            games.start_rps_round(ALICE, OTHER).await,
            Err(Error::IdExhausted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_options_fail_build() {
        let outbox = Arc::new(Outbox::default());
        let result = Coordinator::builder(outbox, Arc::new(Names))
            .options(Options {
                trivia_timeout: Duration::from_secs(1),
                ..Options::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Options(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_magic_8ball() {
        let outbox = Arc::new(Outbox::default());
        let games = coordinator(&outbox);

        let started = tokio::time::Instant::now();
        assert_eq!(
            games.magic_8ball("Will it rain?").await,
            "Shakes the 8-ball...\n\nMaybe?"
        );
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            games.magic_8ball("   ").await,
            "You have to ask the 8-ball something!"
        );
    }
}
