// crates/juris-core/src/core/round.rs
// ============================================================================
// Module: Juris Rounds
// Description: Round aggregate, its state vocabulary, and opponent references.
// Purpose: Model a single argumentative bout with versioned, resumable phases.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A round is one bout within a session. Its state machine shares the
//! argument-phase vocabulary of the session and adds WAITING, JUDGE_QUESTIONS,
//! and SCORING. Rounds carry their own pause/resume bookkeeping, independent
//! of the owning session's.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RoundId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;
use crate::core::timer::PhaseTimer;

// ============================================================================
// SECTION: Round States
// ============================================================================

/// Round lifecycle states.
///
/// # Invariants
/// - Variants are stable for serialization and the adjacency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundState {
    /// Round exists, speakers not yet arguing.
    Waiting,
    /// Petitioner argument phase.
    ArgumentPetitioner,
    /// Respondent argument phase.
    ArgumentRespondent,
    /// Rebuttal phase.
    Rebuttal,
    /// Sur-rebuttal phase.
    SurRebuttal,
    /// Judge questioning phase.
    JudgeQuestions,
    /// Judges are entering scores.
    Scoring,
    /// Terminal: round completed.
    Completed,
    /// Terminal: round cancelled.
    Cancelled,
    /// Round is paused; `previous_state` records where to resume.
    Paused,
}

impl RoundState {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::ArgumentPetitioner => "ARGUMENT_PETITIONER",
            Self::ArgumentRespondent => "ARGUMENT_RESPONDENT",
            Self::Rebuttal => "REBUTTAL",
            Self::SurRebuttal => "SUR_REBUTTAL",
            Self::JudgeQuestions => "JUDGE_QUESTIONS",
            Self::Scoring => "SCORING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Paused => "PAUSED",
        }
    }

    /// Parses the canonical uppercase label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(Self::Waiting),
            "ARGUMENT_PETITIONER" => Some(Self::ArgumentPetitioner),
            "ARGUMENT_RESPONDENT" => Some(Self::ArgumentRespondent),
            "REBUTTAL" => Some(Self::Rebuttal),
            "SUR_REBUTTAL" => Some(Self::SurRebuttal),
            "JUDGE_QUESTIONS" => Some(Self::JudgeQuestions),
            "SCORING" => Some(Self::Scoring),
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

    /// Returns true for the argument phases speakers deliver turns in.
    #[must_use]
    pub const fn is_argument_phase(self) -> bool {
        matches!(
            self,
            Self::ArgumentPetitioner | Self::ArgumentRespondent | Self::Rebuttal | Self::SurRebuttal
        )
    }
}

// ============================================================================
// SECTION: Opponent References
// ============================================================================

/// Reference to a seat in a round: a real user or a synthetic opponent.
///
/// # Invariants
/// - Synthetic opponents never appear in leaderboard entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum SeatRef {
    /// A real user occupies the seat.
    User(UserId),
    /// A synthetic opponent fills an otherwise empty seat.
    Synthetic,
}

impl SeatRef {
    /// Returns the user id when the seat is held by a real user.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Synthetic => None,
        }
    }
}

// ============================================================================
// SECTION: Round Aggregate
// ============================================================================

/// A single argumentative bout within a session.
///
/// # Invariants
/// - `version` is strictly monotonic across successful mutations.
/// - PAUSED requires `previous_state` set to a resumable phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round identifier.
    pub id: RoundId,
    /// Owning session identifier.
    pub session_id: SessionId,
    /// 1-based round number within the session.
    pub round_number: u32,
    /// Petitioner seat.
    pub petitioner: SeatRef,
    /// Respondent seat.
    pub respondent: SeatRef,
    /// Judge seat, when a judge is attached.
    pub judge: Option<SeatRef>,
    /// Current lifecycle state.
    pub state: RoundState,
    /// State to resume into from PAUSED.
    pub previous_state: Option<RoundState>,
    /// Phase timing facts for the current state.
    pub timer: PhaseTimer,
    /// Optimistic version counter.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Set when the round reaches a terminal state.
    pub ended_at: Option<Timestamp>,
}

/// New round row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRound {
    /// Owning session identifier.
    pub session_id: SessionId,
    /// 1-based round number within the session.
    pub round_number: u32,
    /// Petitioner seat.
    pub petitioner: SeatRef,
    /// Respondent seat.
    pub respondent: SeatRef,
    /// Judge seat, when a judge is attached.
    pub judge: Option<SeatRef>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}
