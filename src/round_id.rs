//! Round ID allocation
//!
//! Round IDs are small integers handed out by a monotonic counter. An ID is
//! never reused, even after its round has been tallied and removed, so a late
//! reference to an old round can never land on a newer one.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A unique identifier for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundId(u64);

impl RoundId {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for RoundId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for RoundId {
    fn deserialize<D>(deserializer: D) -> Result<RoundId, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(u64::deserialize(deserializer)?))
    }
}

impl FromStr for RoundId {
    type Err = ParseIntError;

    /// Parses a round ID from its decimal representation
    ///
    /// # Errors
    ///
    /// Returns a `ParseIntError` if the string is not a decimal integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().trim_start_matches('#').parse()?))
    }
}

/// The counter has handed out every representable ID
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("round id space exhausted")]
pub struct Exhausted;

/// Monotonic source of [`RoundId`]s
#[derive(Debug)]
pub struct Allocator {
    next: Option<u64>,
}

impl Default for Allocator {
    fn default() -> Self {
        Self { next: Some(1) }
    }
}

impl Allocator {
    /// Creates an allocator whose first ID is `first`
    pub fn starting_at(first: u64) -> Self {
        Self { next: Some(first) }
    }

    /// Hands out the next ID
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] once the last representable ID has been issued;
    /// the allocator never wraps around.
    pub fn allocate(&mut self) -> Result<RoundId, Exhausted> {
        let current = self.next.ok_or(Exhausted)?;
        self.next = current.checked_add(1);
        Ok(RoundId(current))
    }
}
