//! Configuration constants for the round engine
//!
//! This module contains the default timings and the validation bounds used
//! by [`crate::config::Options`], grouped by the component they constrain.

/// Round lifecycle constants shared by every game kind
pub mod round {
    /// Default time a trivia round stays open, in seconds
    pub const TRIVIA_TIMEOUT: u64 = 30;
    /// Default time a number guessing round stays open, in seconds
    pub const NUMBER_GUESS_TIMEOUT: u64 = 45;
    /// Default time a multiplayer rock-paper-scissors round stays open, in seconds
    pub const ROCK_PAPER_SCISSORS_TIMEOUT: u64 = 20;
    /// Minimum time limit of any round, in seconds
    pub const MIN_TIMEOUT: u64 = 5;
    /// Maximum time limit of any round, in seconds
    pub const MAX_TIMEOUT: u64 = 600;
    /// Maximum number of participants accepted into a single round
    pub const MAX_PARTICIPANTS: usize = 1000;
}

/// Countdown scheduler constants
pub mod countdown {
    /// Default spacing of remaining-time announcements, in seconds
    pub const ANNOUNCE_INTERVAL: u64 = 10;
    /// Minimum spacing of remaining-time announcements, in seconds
    pub const MIN_ANNOUNCE_INTERVAL: u64 = 1;
    /// Maximum spacing of remaining-time announcements, in seconds
    pub const MAX_ANNOUNCE_INTERVAL: u64 = 300;
    /// Default polling period of the countdown task, in milliseconds
    pub const POLL_INTERVAL_MILLIS: u64 = 250;
    /// Minimum polling period, in milliseconds
    pub const MIN_POLL_INTERVAL_MILLIS: u64 = 10;
    /// Maximum polling period, in milliseconds (must stay sub-second)
    pub const MAX_POLL_INTERVAL_MILLIS: u64 = 999;
}

/// Trivia constants
pub mod trivia {
    /// Answers faster than this many seconds get the "fast" flavor line
    pub const FAST_THRESHOLD: u64 = 5;
    /// Pause before a freshly started question is revealed, in seconds
    pub const START_DELAY: u64 = 1;
    /// Maximum pause before a question is revealed, in seconds
    pub const MAX_START_DELAY: u64 = 10;
    /// Maximum number of incorrect submissions surfaced when nobody wins
    pub const NEAR_MISS_LIMIT: usize = 2;
    /// Maximum length of a submitted answer in characters
    pub const MAX_ANSWER_LENGTH: usize = 200;
}

/// Number guessing constants
pub mod number_guess {
    /// Default upper bound of the secret number
    pub const DEFAULT_MAX: i64 = 100;
    /// Largest upper bound a caller may request
    pub const MAX_MAX: i64 = 1_000_000;
}

/// Question selection constants
pub mod questions {
    /// Number of recently used questions remembered for de-duplication
    pub const HISTORY_CAPACITY: usize = 20;
    /// Minimum history capacity
    pub const MIN_HISTORY_CAPACITY: usize = 1;
    /// Maximum history capacity
    pub const MAX_HISTORY_CAPACITY: usize = 500;
    /// Candidates more similar than this to a remembered question are rejected
    pub const SIMILARITY_THRESHOLD: f64 = 0.85;
    /// Attempts per source before falling through to the next one
    pub const MAX_ATTEMPTS: usize = 3;
    /// Largest allowed number of attempts per source
    pub const MAX_MAX_ATTEMPTS: usize = 20;
    /// Knowledge store category that trivia is filed under
    pub const KNOWLEDGE_CATEGORY: &str = "trivia";
}

/// Magic 8-ball constants
pub mod magic_8ball {
    /// Dramatic pause before the answer, in seconds
    pub const DELAY: u64 = 2;
    /// Maximum dramatic pause, in seconds
    pub const MAX_DELAY: u64 = 10;
}

/// Leaderboard constants
pub mod leaderboard {
    /// Points awarded to an instant winner; halves linearly towards the timeout
    pub const POINTS_AWARDED: u64 = 1000;
    /// Number of entries shown in standings
    pub const DISPLAY_LIMIT: usize = 10;
}
