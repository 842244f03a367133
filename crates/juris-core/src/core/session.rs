// crates/juris-core/src/core/session.rs
// ============================================================================
// Module: Juris Sessions
// Description: Session aggregate and its lifecycle state vocabulary.
// Purpose: Model the top-level moot-court exercise with optimistic versioning.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A session is the top-level aggregate: it owns participants, rounds, and at
//! most one leaderboard snapshot. The lifecycle is driven by the data-driven
//! transition table in [`crate::core::transitions`]; this module only models
//! the stored facts. States are stored as short strings from a closed set and
//! validated at the domain layer, which stays portable across databases.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstitutionId;
use crate::core::identifiers::SessionCode;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;
use crate::core::timer::PhaseTimer;

// ============================================================================
// SECTION: Session States
// ============================================================================

/// Session lifecycle states.
///
/// # Invariants
/// - Variants are stable for serialization and the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Session exists but is not yet open for joins.
    Created,
    /// Session is open for participant joins.
    Preparing,
    /// Petitioner argument phase.
    ArgumentPetitioner,
    /// Respondent argument phase.
    ArgumentRespondent,
    /// Rebuttal phase.
    Rebuttal,
    /// Sur-rebuttal phase.
    SurRebuttal,
    /// Judges are evaluating.
    Judging,
    /// Terminal: session completed.
    Completed,
    /// Terminal: session cancelled.
    Cancelled,
    /// Session is paused; `previous_state` records where to resume.
    Paused,
}

impl SessionState {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Preparing => "PREPARING",
            Self::ArgumentPetitioner => "ARGUMENT_PETITIONER",
            Self::ArgumentRespondent => "ARGUMENT_RESPONDENT",
            Self::Rebuttal => "REBUTTAL",
            Self::SurRebuttal => "SUR_REBUTTAL",
            Self::Judging => "JUDGING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Paused => "PAUSED",
        }
    }

    /// Parses the canonical uppercase label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(Self::Created),
            "PREPARING" => Some(Self::Preparing),
            "ARGUMENT_PETITIONER" => Some(Self::ArgumentPetitioner),
            "ARGUMENT_RESPONDENT" => Some(Self::ArgumentRespondent),
            "REBUTTAL" => Some(Self::Rebuttal),
            "SUR_REBUTTAL" => Some(Self::SurRebuttal),
            "JUDGING" => Some(Self::Judging),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            "PAUSED" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Returns true for COMPLETED and CANCELLED.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true when participants may join.
    #[must_use]
    pub const fn is_joinable(self) -> bool {
        matches!(self, Self::Preparing)
    }
}

// ============================================================================
// SECTION: Session Aggregate
// ============================================================================

/// The top-level moot-court session aggregate.
///
/// # Invariants
/// - `session_code` is globally unique.
/// - At most one non-terminal session exists per owning faculty.
/// - `version` increases by exactly one per successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Institution scope.
    pub institution_id: InstitutionId,
    /// Owning faculty user.
    pub faculty_id: UserId,
    /// Human-typeable join code.
    pub session_code: SessionCode,
    /// Current lifecycle state.
    pub state: SessionState,
    /// State to resume into from PAUSED.
    pub previous_state: Option<SessionState>,
    /// Phase timing facts for the current state.
    pub timer: PhaseTimer,
    /// Optimistic version counter.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Timestamp of the last state change.
    pub state_updated_at: Timestamp,
    /// Set when the session reaches COMPLETED.
    pub completed_at: Option<Timestamp>,
    /// Set when the session reaches CANCELLED.
    pub cancelled_at: Option<Timestamp>,
    /// Cleared when the session reaches a terminal state.
    pub is_active: bool,
}

/// New session row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// Institution scope.
    pub institution_id: InstitutionId,
    /// Owning faculty user.
    pub faculty_id: UserId,
    /// Join code; the store retries generation on a uniqueness clash.
    pub session_code: SessionCode,
    /// Creation timestamp.
    pub created_at: Timestamp,
}
