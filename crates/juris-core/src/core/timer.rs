// crates/juris-core/src/core/timer.rs
// ============================================================================
// Module: Juris Phase Timers
// Description: Server-authoritative phase timing derived from stored fields.
// Purpose: Make timer expiry a pure function of stored state plus a supplied now.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Timers are not in-memory facts. A phase timer is the stored pair
//! (start timestamp, duration) plus accumulated pause seconds; remaining time
//! is always derived as `duration − (now − started_at − pause_accumulated)`.
//! Any process may observe expiry on read and trigger the consequent
//! auto-submission; no background worker is required for correctness.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Phase Window
// ============================================================================

/// The started/duration pair of a running phase.
///
/// # Invariants
/// - Both fields are always set together; a timerless phase stores no window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    /// Timestamp at which the phase entered its timed window.
    pub started_at: Timestamp,
    /// Allowed seconds for the phase.
    pub duration_seconds: i64,
}

// ============================================================================
// SECTION: Phase Timer
// ============================================================================

/// Stored timing facts for the current phase of a session or round.
///
/// # Invariants
/// - `pause_accumulated_seconds` only grows, and only via resume.
/// - `paused_at` is set exactly while the aggregate sits in PAUSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhaseTimer {
    /// Running window; `None` when the current phase is untimed.
    pub window: Option<PhaseWindow>,
    /// Seconds spent paused across the life of the window.
    pub pause_accumulated_seconds: i64,
    /// When the current pause began, if paused.
    pub paused_at: Option<Timestamp>,
}

impl PhaseTimer {
    /// Starts a fresh window, clearing any pause bookkeeping.
    #[must_use]
    pub const fn started(started_at: Timestamp, duration_seconds: i64) -> Self {
        Self {
            window: Some(PhaseWindow { started_at, duration_seconds }),
            pause_accumulated_seconds: 0,
            paused_at: None,
        }
    }

    /// Freezes the timer at `now` for a pause transition.
    #[must_use]
    pub const fn paused(self, now: Timestamp) -> Self {
        Self { paused_at: Some(now), ..self }
    }

    /// Resumes the timer at `now`, folding the pause into the accumulator.
    #[must_use]
    pub fn resumed(self, now: Timestamp) -> Self {
        let paused_seconds = self.paused_at.map_or(0, |paused_at| now.seconds_since(paused_at));
        Self {
            window: self.window,
            pause_accumulated_seconds: self
                .pause_accumulated_seconds
                .saturating_add(paused_seconds.max(0)),
            paused_at: None,
        }
    }

    /// Extends the running window by additional seconds.
    #[must_use]
    pub fn extended(self, additional_seconds: i64) -> Self {
        let window = self.window.map(|window| PhaseWindow {
            started_at: window.started_at,
            duration_seconds: window.duration_seconds.saturating_add(additional_seconds),
        });
        Self { window, ..self }
    }

    /// Authoritative remaining seconds at `now`, clamped to zero.
    ///
    /// Returns `None` when the phase is untimed. While paused, the result is
    /// frozen at the remaining time observed at the pause instant.
    #[must_use]
    pub fn remaining_seconds(&self, now: Timestamp) -> Option<i64> {
        let window = self.window?;
        let effective_now = self.paused_at.unwrap_or(now);
        let elapsed = effective_now
            .seconds_since(window.started_at)
            .saturating_sub(self.pause_accumulated_seconds);
        Some(window.duration_seconds.saturating_sub(elapsed).max(0))
    }

    /// Returns true when a running (unpaused) window has no time left.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.paused_at.is_none() && self.remaining_seconds(now) == Some(0)
    }
}
