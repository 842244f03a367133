// crates/juris-core/src/core/turn.rs
// ============================================================================
// Module: Juris Turns
// Description: Individual speaking slots and their submission facts.
// Purpose: Model timed turns whose submitted content becomes immutable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A turn is one speaker's timed slot within a round. Turn rows are created
//! up-front from the roster so the speaking order is fixed before the first
//! word. Once submitted, by the speaker or by the timer, transcript and
//! submission time never change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ParticipantId;
use crate::core::identifiers::RoundId;
use crate::core::identifiers::TurnId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum transcript size in bytes accepted by the engine.
pub const MAX_TRANSCRIPT_BYTES: usize = 65_536;

// ============================================================================
// SECTION: Turn Rows
// ============================================================================

/// A single speaking slot within a round.
///
/// # Invariants
/// - `(round_id, turn_order)` and `(round_id, participant_id)` are unique.
/// - Once `is_submitted` is true, `transcript` and `submitted_at` are frozen.
/// - The `allowed_seconds` ceiling is enforced by the engine, not the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn identifier.
    pub id: TurnId,
    /// Owning round identifier.
    pub round_id: RoundId,
    /// Speaking participant.
    pub participant_id: ParticipantId,
    /// 1-based position in the round's speaking order.
    pub turn_order: u32,
    /// Speaking seconds allowed.
    pub allowed_seconds: i64,
    /// Set when the speaker starts.
    pub started_at: Option<Timestamp>,
    /// Set at submission.
    pub submitted_at: Option<Timestamp>,
    /// Submitted argument text; empty until submission.
    pub transcript: String,
    /// Word count derived at submission.
    pub word_count: u32,
    /// True once submitted (manually or by timer).
    pub is_submitted: bool,
    /// True when the timer submitted on the speaker's behalf.
    pub auto_submitted: bool,
}

impl Turn {
    /// Returns true when the turn has started but not yet been submitted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.started_at.is_some() && !self.is_submitted
    }

    /// Elapsed speaking seconds, when both endpoints are recorded.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.submitted_at) {
            (Some(started), Some(submitted)) => Some(submitted.seconds_since(started)),
            _ => None,
        }
    }
}

/// New turn row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    /// Speaking participant.
    pub participant_id: ParticipantId,
    /// 1-based position in the round's speaking order.
    pub turn_order: u32,
    /// Speaking seconds allowed.
    pub allowed_seconds: i64,
}

/// Counts whitespace-separated words in a transcript.
#[must_use]
pub fn word_count(transcript: &str) -> u32 {
    u32::try_from(transcript.split_whitespace().count()).unwrap_or(u32::MAX)
}
