// crates/juris-core/src/core/participant.rs
// ============================================================================
// Module: Juris Participants
// Description: Participant membership rows and the deterministic slot table.
// Purpose: Model who sits where in a session, with race-safe uniqueness facts.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A participant is a user's membership in one session. Speaking participants
//! occupy one of exactly four slots with the fixed composition
//! `(PETITIONER,1) (RESPONDENT,1) (PETITIONER,2) (RESPONDENT,2)`; observers
//! carry no slot and are unbounded. The slot table is a pure function of the
//! join position: no randomness, no timestamp ordering, no client input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ParticipantId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum speaking participants per session. Not configurable.
pub const MAX_PARTICIPANTS: u32 = 4;

// ============================================================================
// SECTION: Sides and Slots
// ============================================================================

/// Side of the argument in moot court.
///
/// # Invariants
/// - Variants are stable for serialization and slot uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Petitioner side (argues first).
    Petitioner,
    /// Respondent side.
    Respondent,
}

impl Side {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Petitioner => "PETITIONER",
            Self::Respondent => "RESPONDENT",
        }
    }

    /// Parses the canonical uppercase label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PETITIONER" => Some(Self::Petitioner),
            "RESPONDENT" => Some(Self::Respondent),
            _ => None,
        }
    }
}

/// Speaking slot: a side plus a speaker number within that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Side of the argument.
    pub side: Side,
    /// Speaker number within the side (1 or 2).
    pub speaker_number: u8,
}

/// Deterministic slot for a 1-based join position.
///
/// The mapping is fixed: 1 → (PETITIONER,1), 2 → (RESPONDENT,1),
/// 3 → (PETITIONER,2), 4 → (RESPONDENT,2). Returns `None` outside 1..=4.
#[must_use]
pub const fn slot_for_position(position: u32) -> Option<Slot> {
    match position {
        1 => Some(Slot { side: Side::Petitioner, speaker_number: 1 }),
        2 => Some(Slot { side: Side::Respondent, speaker_number: 1 }),
        3 => Some(Slot { side: Side::Petitioner, speaker_number: 2 }),
        4 => Some(Slot { side: Side::Respondent, speaker_number: 2 }),
        _ => None,
    }
}

// ============================================================================
// SECTION: Participant Rows
// ============================================================================

/// Live connection status reported by the delivery layer.
///
/// # Invariants
/// - Derived state; always rebuildable from the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Participant has an active connection.
    #[default]
    Connected,
    /// Participant dropped; may reconnect.
    Disconnected,
}

/// A user's membership in a session.
///
/// # Invariants
/// - `(session_id, user_id)` is unique among active rows.
/// - `slot` is unique per session when present; observers carry `None`.
/// - Rows are deactivated by flag, never destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Owning session identifier.
    pub session_id: SessionId,
    /// Member user identifier.
    pub user_id: UserId,
    /// Speaking slot; `None` for observers.
    pub slot: Option<Slot>,
    /// Join timestamp.
    pub joined_at: Timestamp,
    /// Deactivation flag; inactive rows free their slot facts.
    pub is_active: bool,
    /// Live connection status.
    pub connection: ConnectionStatus,
    /// Last time the delivery layer saw this participant.
    pub last_seen_at: Timestamp,
}

impl Participant {
    /// Returns true when the participant occupies a speaking slot.
    #[must_use]
    pub const fn is_speaker(&self) -> bool {
        self.slot.is_some()
    }
}

/// New participant row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    /// Owning session identifier.
    pub session_id: SessionId,
    /// Member user identifier.
    pub user_id: UserId,
    /// Speaking slot; `None` for observers.
    pub slot: Option<Slot>,
    /// Join timestamp.
    pub joined_at: Timestamp,
}

// ============================================================================
// SECTION: Assignment Outcome
// ============================================================================

/// Result of a join request, idempotent across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    /// Session joined.
    pub session_id: SessionId,
    /// Joining user.
    pub user_id: UserId,
    /// Assigned slot.
    pub slot: Slot,
    /// 1-based join position backing the slot.
    pub position: u32,
    /// False when an existing membership was returned unchanged.
    pub is_new: bool,
}
