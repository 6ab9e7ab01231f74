//! Scoring of closed rounds
//!
//! [`tally`] is a pure function of a round snapshot: it partitions the
//! submissions into correct and incorrect, ranks winners by how quickly they
//! answered, and reports the per-kind fallback results (closest guess, drawn
//! hands, correct answer reveal). An empty round always yields
//! [`Outcome::NoParticipants`], never an "everyone was wrong" result.

use std::{collections::HashMap, time::Duration};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    TruncatedVec,
    answer::is_correct,
    choice::Choice,
    constants::trivia::NEAR_MISS_LIMIT,
    participant::{GameKind, Id, ScopeKey},
    registry::{AnswerSpec, Round, Submission, Value},
    round_id::RoundId,
};

/// A ranked participant and how long they took
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placing {
    /// The participant
    pub participant: Id,
    /// Time from round start to acceptance of their submission
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub elapsed: Duration,
}

/// Trivia results
#[derive(Debug, Clone, Serialize)]
pub enum TriviaOutcome {
    /// At least one participant answered correctly
    Winners {
        /// Correct participants, fastest first
        winners: Vec<Placing>,
        /// Participants who answered incorrectly
        incorrect: Vec<Id>,
    },
    /// Every participant answered incorrectly
    NoWinner {
        /// The first canonical variant, used as the display answer
        answer: String,
        /// The remaining canonical variants
        also_acceptable: Vec<String>,
        /// A few incorrect answers submitted closest to the deadline
        near_misses: TruncatedVec<(Id, String)>,
    },
}

/// Number guessing results
#[derive(Debug, Clone, Serialize)]
pub enum GuessOutcome {
    /// Someone guessed the secret exactly
    Exact {
        /// Exact guessers, fastest first
        winners: Vec<Placing>,
    },
    /// Nobody was exact; everyone at the minimum distance shares the result
    Closest {
        /// Absolute distance from the secret
        distance: u64,
        /// Every participant at that distance with their guess
        guesses: Vec<(Id, i64)>,
    },
    /// No submission held an integer
    NoValidGuesses,
}

/// Multiplayer rock-paper-scissors results
#[derive(Debug, Clone, Serialize)]
pub enum RpsOutcome {
    /// Exactly two shapes were thrown, so one of them won
    Winners {
        /// The winning shape
        choice: Choice,
        /// The shape it beat
        beaten: Choice,
        /// Participants who threw the winning shape, fastest first
        winners: Vec<Placing>,
        /// Participants who threw the beaten shape
        losers: Vec<Id>,
    },
    /// One shape only, or all three, were thrown
    Draw {
        /// Every valid throw
        choices: Vec<(Id, Choice)>,
    },
}

/// Per-kind scoring result
#[derive(Debug, Clone, Serialize)]
pub enum Outcome {
    /// Nobody submitted anything
    NoParticipants,
    /// Trivia scoring result
    Trivia(TriviaOutcome),
    /// Number guessing scoring result
    NumberGuess(GuessOutcome),
    /// Rock-paper-scissors scoring result
    RockPaperScissors(RpsOutcome),
}

/// The full result of a round, ready to be announced
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    /// The tallied round
    pub round_id: RoundId,
    /// Scope the results are announced to
    pub scope: ScopeKey,
    /// The round's time limit
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    /// What the round was scored against
    pub answer_spec: AnswerSpec,
    /// Number of submissions considered
    pub participants: usize,
    /// The scoring result
    pub outcome: Outcome,
}

impl Tally {
    /// Kind of the tallied round
    pub fn kind(&self) -> GameKind {
        self.answer_spec.kind()
    }

    /// Participants who won, fastest first; empty when nobody won outright
    pub fn winners(&self) -> &[Placing] {
        match &self.outcome {
            Outcome::Trivia(TriviaOutcome::Winners { winners, .. })
            | Outcome::NumberGuess(GuessOutcome::Exact { winners })
            | Outcome::RockPaperScissors(RpsOutcome::Winners { winners, .. }) => winners,
            _ => &[],
        }
    }

    /// Every participant mentioned in the result, for display-name lookup
    pub fn mentioned(&self) -> Vec<Id> {
        let ids: Vec<Id> = match &self.outcome {
            Outcome::NoParticipants => Vec::new(),
            Outcome::Trivia(TriviaOutcome::Winners { winners, incorrect }) => winners
                .iter()
                .map(|p| p.participant)
                .chain(incorrect.iter().copied())
                .collect(),
            Outcome::Trivia(TriviaOutcome::NoWinner { near_misses, .. }) => {
                near_misses.items().iter().map(|(id, _)| *id).collect()
            }
            Outcome::NumberGuess(GuessOutcome::Exact { winners }) => {
                winners.iter().map(|p| p.participant).collect()
            }
            Outcome::NumberGuess(GuessOutcome::Closest { guesses, .. }) => {
                guesses.iter().map(|(id, _)| *id).collect()
            }
            Outcome::NumberGuess(GuessOutcome::NoValidGuesses) => Vec::new(),
            Outcome::RockPaperScissors(RpsOutcome::Winners {
                winners, losers, ..
            }) => winners
                .iter()
                .map(|p| p.participant)
                .chain(losers.iter().copied())
                .collect(),
            Outcome::RockPaperScissors(RpsOutcome::Draw { choices }) => {
                choices.iter().map(|(id, _)| *id).collect()
            }
        };
        ids.into_iter().unique().collect()
    }
}

/// Scores a closed round
pub fn tally(round: &Round) -> Tally {
    let submissions = round.submissions();

    let outcome = if submissions.is_empty() {
        Outcome::NoParticipants
    } else {
        match round.answer_spec() {
            AnswerSpec::Trivia { answers, .. } => {
                Outcome::Trivia(tally_trivia(submissions, answers))
            }
            AnswerSpec::NumberGuess { secret, .. } => {
                Outcome::NumberGuess(tally_number_guess(submissions, *secret))
            }
            AnswerSpec::RockPaperScissors => {
                Outcome::RockPaperScissors(tally_rock_paper_scissors(submissions))
            }
        }
    };

    Tally {
        round_id: round.id(),
        scope: round.scope(),
        timeout: round.timeout(),
        answer_spec: round.answer_spec().clone(),
        participants: submissions.len(),
        outcome,
    }
}

fn fastest_first(placings: impl Iterator<Item = Placing>) -> Vec<Placing> {
    placings
        .sorted_by_key(|p| (p.elapsed, p.participant))
        .collect_vec()
}

fn tally_trivia(submissions: &HashMap<Id, Submission>, answers: &[String]) -> TriviaOutcome {
    let (correct, incorrect): (Vec<_>, Vec<_>) = submissions
        .iter()
        .map(|(id, submission)| {
            let text = match &submission.value {
                Value::Text(text) => text.clone(),
                Value::Number(n) => n.to_string(),
                Value::Choice(c) => c.to_string(),
            };
            (*id, text, submission.elapsed)
        })
        .partition(|(_, text, _)| is_correct(text, answers));

    if correct.is_empty() {
        let near_misses = incorrect
            .iter()
            .sorted_by_key(|(id, _, elapsed)| (std::cmp::Reverse(*elapsed), *id))
            .map(|(id, text, _)| (*id, text.trim().to_owned()));

        return TriviaOutcome::NoWinner {
            answer: answers.first().cloned().unwrap_or_default(),
            also_acceptable: answers.iter().skip(1).cloned().collect_vec(),
            near_misses: TruncatedVec::new(near_misses, NEAR_MISS_LIMIT, incorrect.len()),
        };
    }

    TriviaOutcome::Winners {
        winners: fastest_first(correct.into_iter().map(|(participant, _, elapsed)| Placing {
            participant,
            elapsed,
        })),
        incorrect: incorrect.into_iter().map(|(id, _, _)| id).sorted().collect_vec(),
    }
}

fn tally_number_guess(submissions: &HashMap<Id, Submission>, secret: i64) -> GuessOutcome {
    let guesses = submissions
        .iter()
        .filter_map(|(id, submission)| match &submission.value {
            Value::Number(n) => Some((*id, *n, submission.elapsed)),
            Value::Text(text) => text
                .trim()
                .parse::<i64>()
                .ok()
                .map(|n| (*id, n, submission.elapsed)),
            Value::Choice(_) => None,
        })
        .collect_vec();

    let exact = guesses
        .iter()
        .filter(|(_, guess, _)| *guess == secret)
        .map(|(participant, _, elapsed)| Placing {
            participant: *participant,
            elapsed: *elapsed,
        })
        .collect_vec();

    if !exact.is_empty() {
        return GuessOutcome::Exact {
            winners: fastest_first(exact.into_iter()),
        };
    }

    let Some(distance) = guesses
        .iter()
        .map(|(_, guess, _)| guess.abs_diff(secret))
        .min()
    else {
        return GuessOutcome::NoValidGuesses;
    };

    GuessOutcome::Closest {
        distance,
        guesses: guesses
            .iter()
            .filter(|(_, guess, _)| guess.abs_diff(secret) == distance)
            .map(|(id, guess, _)| (*id, *guess))
            .sorted()
            .collect_vec(),
    }
}

fn tally_rock_paper_scissors(submissions: &HashMap<Id, Submission>) -> RpsOutcome {
    let throws = submissions
        .iter()
        .filter_map(|(id, submission)| match &submission.value {
            Value::Choice(choice) => Some((*id, *choice, submission.elapsed)),
            Value::Text(text) => text
                .parse::<Choice>()
                .ok()
                .map(|choice| (*id, choice, submission.elapsed)),
            Value::Number(_) => None,
        })
        .collect_vec();

    let shapes = throws.iter().map(|(_, choice, _)| *choice).unique().collect_vec();

    if let [a, b] = shapes[..] {
        let (choice, beaten) = if a.beats(b) { (a, b) } else { (b, a) };
        return RpsOutcome::Winners {
            choice,
            beaten,
            winners: fastest_first(
                throws
                    .iter()
                    .filter(|(_, thrown, _)| *thrown == choice)
                    .map(|(participant, _, elapsed)| Placing {
                        participant: *participant,
                        elapsed: *elapsed,
                    }),
            ),
            losers: throws
                .iter()
                .filter(|(_, thrown, _)| *thrown == beaten)
                .map(|(id, _, _)| *id)
                .sorted()
                .collect_vec(),
        };
    }

    RpsOutcome::Draw {
        choices: throws
            .into_iter()
            .map(|(id, choice, _)| (id, choice))
            .sorted()
            .collect_vec(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::answer::canonical_answers;

    const A: Id = Id::new(1);
    const B: Id = Id::new(2);
    const C: Id = Id::new(3);

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn round(answer_spec: AnswerSpec, submissions: Vec<(Id, Value, Duration)>) -> Round {
        Round::new(
            RoundId::from_raw(1),
            ScopeKey::new(1),
            Duration::from_secs(30),
            answer_spec,
            submissions
                .into_iter()
                .map(|(id, value, elapsed)| (id, Submission { value, elapsed }))
                .collect(),
        )
    }

    fn trivia(key: &str, submissions: Vec<(Id, &str, f64)>) -> Round {
        round(
            AnswerSpec::Trivia {
                question: "Q?".to_owned(),
                answers: canonical_answers(key),
            },
            submissions
                .into_iter()
                .map(|(id, text, s)| (id, Value::Text(text.to_owned()), secs(s)))
                .collect(),
        )
    }

    fn guesses(secret: i64, submissions: Vec<(Id, i64, f64)>) -> Round {
        round(
            AnswerSpec::NumberGuess { secret, max: 100 },
            submissions
                .into_iter()
                .map(|(id, n, s)| (id, Value::Number(n), secs(s)))
                .collect(),
        )
    }

    fn throws(submissions: Vec<(Id, Choice, f64)>) -> Round {
        round(
            AnswerSpec::RockPaperScissors,
            submissions
                .into_iter()
                .map(|(id, c, s)| (id, Value::Choice(c), secs(s)))
                .collect(),
        )
    }

    #[test]
    fn test_trivia_fastest_correct_wins() {
        let result = tally(&trivia(
            "Tokyo",
            vec![(A, "Tokyo", 3.0), (B, "tokyo ", 1.0), (C, "Osaka", 0.5)],
        ));

        let Outcome::Trivia(TriviaOutcome::Winners { winners, incorrect }) = &result.outcome else {
            panic!("expected winners, got {:?}", result.outcome);
        };
        assert_eq!(winners[0], Placing { participant: B, elapsed: secs(1.0) });
        assert_eq!(winners[1].participant, A);
        assert_eq!(incorrect, &vec![C]);
        assert_eq!(result.winners()[0].participant, B);
    }

    #[test]
    fn test_trivia_any_variant_is_correct() {
        let result = tally(&trivia(
            "NYC | New York",
            vec![(A, "new york", 2.0), (B, "NYC", 4.0)],
        ));
        assert_eq!(result.winners().len(), 2);
    }

    #[test]
    fn test_trivia_no_winner_reveals_answer() {
        let result = tally(&trivia(
            "Jupiter / the gas giant",
            vec![(A, "Saturn", 1.0), (B, "Mars", 29.0), (C, "Venus", 15.0)],
        ));

        let Outcome::Trivia(TriviaOutcome::NoWinner {
            answer,
            also_acceptable,
            near_misses,
        }) = &result.outcome
        else {
            panic!("expected no winner, got {:?}", result.outcome);
        };
        assert_eq!(answer, "jupiter");
        assert_eq!(also_acceptable, &vec!["the gas giant".to_owned()]);
        assert_eq!(near_misses.exact_count(), 3);
        assert_eq!(
            near_misses.items(),
            &[(B, "Mars".to_owned()), (C, "Venus".to_owned())]
        );
        assert!(result.winners().is_empty());
    }

    #[test]
    fn test_empty_round_is_distinct_from_all_wrong() {
        let empty = tally(&trivia("Tokyo", vec![]));
        let all_wrong = tally(&trivia("Tokyo", vec![(A, "Kyoto", 1.0)]));

        assert!(matches!(empty.outcome, Outcome::NoParticipants));
        assert!(matches!(
            all_wrong.outcome,
            Outcome::Trivia(TriviaOutcome::NoWinner { .. })
        ));
        assert_eq!(empty.participants, 0);

        let empty_guess = tally(&guesses(42, vec![]));
        assert!(matches!(empty_guess.outcome, Outcome::NoParticipants));
        let empty_rps = tally(&throws(vec![]));
        assert!(matches!(empty_rps.outcome, Outcome::NoParticipants));
    }

    #[test]
    fn test_number_exact_beats_faster_wrong() {
        let result = tally(&guesses(42, vec![(A, 42, 5.0), (B, 40, 1.0)]));
        let Outcome::NumberGuess(GuessOutcome::Exact { winners }) = &result.outcome else {
            panic!("expected exact, got {:?}", result.outcome);
        };
        assert_eq!(winners, &vec![Placing { participant: A, elapsed: secs(5.0) }]);
    }

    #[test]
    fn test_number_exact_ties_are_reported_together() {
        let result = tally(&guesses(42, vec![(A, 42, 5.0), (B, 42, 5.0), (C, 41, 1.0)]));
        assert_eq!(result.winners().len(), 2);
    }

    #[test]
    fn test_number_joint_closest() {
        let result = tally(&guesses(42, vec![(A, 40, 1.0), (B, 44, 9.0), (C, 10, 0.1)]));
        let Outcome::NumberGuess(GuessOutcome::Closest { distance, guesses }) = &result.outcome
        else {
            panic!("expected closest, got {:?}", result.outcome);
        };
        assert_eq!(*distance, 2);
        assert_eq!(guesses, &vec![(A, 40), (B, 44)]);
        assert!(result.winners().is_empty());
    }

    #[test]
    fn test_number_non_integer_submissions_are_excluded() {
        let result = tally(&round(
            AnswerSpec::NumberGuess { secret: 7, max: 10 },
            vec![
                (A, Value::Text("seven".to_owned()), secs(1.0)),
                (B, Value::Text(" 6 ".to_owned()), secs(2.0)),
            ],
        ));
        let Outcome::NumberGuess(GuessOutcome::Closest { distance, guesses }) = &result.outcome
        else {
            panic!("expected closest, got {:?}", result.outcome);
        };
        assert_eq!(*distance, 1);
        assert_eq!(guesses, &vec![(B, 6)]);

        let only_junk = tally(&round(
            AnswerSpec::NumberGuess { secret: 7, max: 10 },
            vec![(A, Value::Text("seven".to_owned()), secs(1.0))],
        ));
        assert!(matches!(
            only_junk.outcome,
            Outcome::NumberGuess(GuessOutcome::NoValidGuesses)
        ));
    }

    #[test]
    fn test_rps_two_shapes_has_winners() {
        let result = tally(&throws(vec![
            (A, Choice::Rock, 3.0),
            (B, Choice::Scissors, 1.0),
            (C, Choice::Rock, 2.0),
        ]));
        let Outcome::RockPaperScissors(RpsOutcome::Winners {
            choice,
            beaten,
            winners,
            losers,
        }) = &result.outcome
        else {
            panic!("expected winners, got {:?}", result.outcome);
        };
        assert_eq!(*choice, Choice::Rock);
        assert_eq!(*beaten, Choice::Scissors);
        assert_eq!(winners.iter().map(|p| p.participant).collect_vec(), vec![C, A]);
        assert_eq!(losers, &vec![B]);
    }

    #[test]
    fn test_rps_draws() {
        let one_shape = tally(&throws(vec![(A, Choice::Paper, 1.0), (B, Choice::Paper, 2.0)]));
        assert!(matches!(
            one_shape.outcome,
            Outcome::RockPaperScissors(RpsOutcome::Draw { .. })
        ));

        let all_shapes = tally(&throws(vec![
            (A, Choice::Paper, 1.0),
            (B, Choice::Rock, 2.0),
            (C, Choice::Scissors, 3.0),
        ]));
        let Outcome::RockPaperScissors(RpsOutcome::Draw { choices }) = &all_shapes.outcome else {
            panic!("expected draw, got {:?}", all_shapes.outcome);
        };
        assert_eq!(choices.len(), 3);
    }

    #[test]
    fn test_mentioned_lists_each_participant_once() {
        let result = tally(&trivia(
            "Tokyo",
            vec![(A, "Tokyo", 3.0), (B, "Osaka", 1.0)],
        ));
        assert_eq!(result.mentioned(), vec![A, B]);
    }
}
