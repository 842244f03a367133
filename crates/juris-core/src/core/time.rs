// crates/juris-core/src/core/time.rs
// ============================================================================
// Module: Juris Time Model
// Description: Canonical timestamp representation for aggregates and logs.
// Purpose: Provide deterministic, replayable time values across Juris records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Juris engines never read the wall clock directly. Every operation takes
//! explicit [`Timestamp`] arguments supplied by the host, and timer expiry is
//! a pure function of stored fields plus a supplied now. This keeps replay
//! deterministic and lets tests drive time with literal values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in Juris aggregates and audit rows.
///
/// # Invariants
/// - Values are unix epoch milliseconds, explicitly provided by callers.
/// - Monotonicity within an aggregate is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from unix epoch seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(1_000))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn unix_millis(self) -> i64 {
        self.0
    }

    /// Returns whole seconds elapsed from `earlier` to `self` (negative when
    /// `self` precedes `earlier`).
    #[must_use]
    pub const fn seconds_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0).div_euclid(1_000)
    }

    /// Returns the timestamp advanced by the given number of seconds.
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds.saturating_mul(1_000)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
