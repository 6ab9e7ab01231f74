//! Engine options
//!
//! All timings and tunables of the round engine live in [`Options`], which
//! is deserialized from JSON (durations as milliseconds) and validated with
//! `garde` before use. Missing fields take the defaults from
//! [`crate::constants`].

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{countdown, magic_8ball, number_guess, questions, round, trivia},
    participant::GameKind,
};

type ValidationResult = garde::Result;

/// Validates that a duration falls within `[MIN_SECONDS, MAX_SECONDS]`
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is outside the bounds.
pub fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    val: &Duration,
    _ctx: &(),
) -> ValidationResult {
    if (Duration::from_secs(MIN_SECONDS)..=Duration::from_secs(MAX_SECONDS)).contains(val) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{MIN_SECONDS},{MAX_SECONDS}] seconds",
        )))
    }
}

/// Validates that a duration falls within `[MIN_MILLIS, MAX_MILLIS]`
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is outside the bounds.
pub fn validate_duration_millis<const MIN_MILLIS: u64, const MAX_MILLIS: u64>(
    val: &Duration,
    _ctx: &(),
) -> ValidationResult {
    if (Duration::from_millis(MIN_MILLIS)..=Duration::from_millis(MAX_MILLIS)).contains(val) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{MIN_MILLIS},{MAX_MILLIS}] milliseconds",
        )))
    }
}

/// Options could not be loaded
#[derive(Error, Debug)]
pub enum Error {
    /// The JSON did not describe an options object
    #[error("malformed options: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A value was outside its allowed bounds
    #[error("invalid options: {0}")]
    Invalid(#[from] garde::Report),
}

/// Tunables of the round engine
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// Time a trivia round accepts answers
    #[garde(custom(validate_duration::<{ round::MIN_TIMEOUT }, { round::MAX_TIMEOUT }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub trivia_timeout: Duration,
    /// Time a number guessing round accepts guesses
    #[garde(custom(validate_duration::<{ round::MIN_TIMEOUT }, { round::MAX_TIMEOUT }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub number_guess_timeout: Duration,
    /// Time a multiplayer rock-paper-scissors round accepts choices
    #[garde(custom(validate_duration::<{ round::MIN_TIMEOUT }, { round::MAX_TIMEOUT }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub rock_paper_scissors_timeout: Duration,
    /// Spacing of the remaining-time announcements
    #[garde(custom(validate_duration::<
        { countdown::MIN_ANNOUNCE_INTERVAL },
        { countdown::MAX_ANNOUNCE_INTERVAL },
    >))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub announce_interval: Duration,
    /// How often a countdown task checks the clock
    #[garde(custom(validate_duration_millis::<
        { countdown::MIN_POLL_INTERVAL_MILLIS },
        { countdown::MAX_POLL_INTERVAL_MILLIS },
    >))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    /// Trivia winners faster than this get the fast flavor line
    #[garde(custom(validate_duration::<0, { round::MAX_TIMEOUT }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub fast_threshold: Duration,
    /// Pause before a trivia question is revealed
    #[garde(custom(validate_duration::<0, { trivia::MAX_START_DELAY }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub start_delay: Duration,
    /// Pause before the magic 8-ball answers
    #[garde(custom(validate_duration::<0, { magic_8ball::MAX_DELAY }>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub magic_8ball_delay: Duration,
    /// Default upper bound of the secret number
    #[garde(range(min = 1, max = number_guess::MAX_MAX))]
    pub guessing_max: i64,
    /// Number of recent questions remembered for de-duplication
    #[garde(range(
        min = questions::MIN_HISTORY_CAPACITY,
        max = questions::MAX_HISTORY_CAPACITY
    ))]
    pub history_capacity: usize,
    /// Similarity ratio above which a candidate question is rejected
    #[garde(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f64,
    /// Candidates drawn from one question source before moving on
    #[garde(range(min = 1, max = questions::MAX_MAX_ATTEMPTS))]
    pub max_attempts: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trivia_timeout: Duration::from_secs(round::TRIVIA_TIMEOUT),
            number_guess_timeout: Duration::from_secs(round::NUMBER_GUESS_TIMEOUT),
            rock_paper_scissors_timeout: Duration::from_secs(round::ROCK_PAPER_SCISSORS_TIMEOUT),
            announce_interval: Duration::from_secs(countdown::ANNOUNCE_INTERVAL),
            poll_interval: Duration::from_millis(countdown::POLL_INTERVAL_MILLIS),
            fast_threshold: Duration::from_secs(trivia::FAST_THRESHOLD),
            start_delay: Duration::from_secs(trivia::START_DELAY),
            magic_8ball_delay: Duration::from_secs(magic_8ball::DELAY),
            guessing_max: number_guess::DEFAULT_MAX,
            history_capacity: questions::HISTORY_CAPACITY,
            similarity_threshold: questions::SIMILARITY_THRESHOLD,
            max_attempts: questions::MAX_ATTEMPTS,
        }
    }
}

impl Options {
    /// Parses and validates options from JSON
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for invalid JSON and [`Error::Invalid`]
    /// when a value is outside its bounds.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// The time limit of a round of `kind`
    pub fn timeout(&self, kind: GameKind) -> Duration {
        match kind {
            GameKind::Trivia => self.trivia_timeout,
            GameKind::NumberGuess => self.number_guess_timeout,
            GameKind::RockPaperScissors => self.rock_paper_scissors_timeout,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = Options::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.timeout(GameKind::Trivia), Duration::from_secs(30));
        assert_eq!(options.fast_threshold, Duration::from_secs(5));
        assert_eq!(options.guessing_max, 100);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let options = Options::from_json(r#"{"trivia_timeout": 15000}"#).unwrap();
        assert_eq!(options.trivia_timeout, Duration::from_secs(15));
        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.history_capacity, 20);
    }

    #[test]
    fn test_from_json_rejects_out_of_bounds() {
        assert!(matches!(
            Options::from_json(r#"{"trivia_timeout": 1000}"#),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"poll_interval": 5000}"#),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"similarity_threshold": 1.5}"#),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(matches!(
            Options::from_json("not json"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration::<5, 600>(&Duration::from_secs(5), &()).is_ok());
        assert!(validate_duration::<5, 600>(&Duration::from_secs(4), &()).is_err());
        assert!(validate_duration::<5, 600>(&Duration::from_secs(601), &()).is_err());
        assert!(validate_duration::<0, 10>(&Duration::ZERO, &()).is_ok());
        assert!(validate_duration::<5, 600>(&Duration::from_secs(600), &()).is_ok());
        assert!(validate_duration::<5, 600>(&Duration::from_secs_f64(600.9), &()).is_err());
        assert!(validate_duration::<5, 600>(&Duration::from_secs_f64(4.9), &()).is_err());
    }

    #[test]
    fn test_validate_duration_millis() {
        assert!(validate_duration_millis::<10, 999>(&Duration::from_millis(250), &()).is_ok());
        assert!(validate_duration_millis::<10, 999>(&Duration::from_millis(5), &()).is_err());
        assert!(validate_duration_millis::<10, 999>(&Duration::from_secs(1), &()).is_err());
        assert!(validate_duration_millis::<10, 999>(&Duration::from_micros(999_500), &()).is_err());
    }

    #[test]
    fn test_options_serialize_durations_as_millis() {
        let json = serde_json::to_value(Options::default()).unwrap();
        assert_eq!(json["trivia_timeout"], 30_000);
        assert_eq!(json["poll_interval"], 250);
    }
}
