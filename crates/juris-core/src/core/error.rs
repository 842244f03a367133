// crates/juris-core/src/core/error.rs
// ============================================================================
// Module: Juris Error Codes
// Description: Stable wire-level error codes for every core failure.
// Purpose: Give transports a closed taxonomy to map onto status codes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every failure surfaced by a Juris engine carries one of these stable codes
//! alongside a human-readable message. Delivery layers map codes to HTTP
//! status (400 validation, 403 forbidden, 404 not found, 409 conflict, 422
//! precondition, 500 internal); the mapping hint is carried here as data so
//! transports stay out of the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error codes for the Juris wire contract.
///
/// # Invariants
/// - Variants and their wire forms never change meaning once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Actor's role does not permit the operation.
    UnauthorizedRole,
    /// Actor is authenticated but not allowed to touch this aggregate.
    Forbidden,
    /// Referenced aggregate does not exist in the actor's institution.
    NotFound,
    /// Session is not in a joinable state.
    SessionNotJoinable,
    /// Session already holds its maximum participant composition.
    SessionFull,
    /// User already joined; treated as success by the assignment engine.
    DuplicateJoin,
    /// A uniqueness race was detected and the caller should retry.
    RaceCondition,
    /// Requested state transition is not in the allowed adjacency table.
    InvalidTransition,
    /// Optimistic version check failed against a concurrent writer.
    ConcurrentModification,
    /// A transition precondition (e.g. all rounds complete) does not hold.
    PreconditionFailed,
    /// Turn operation attempted out of speaking order.
    NotCurrentSpeaker,
    /// Turn has not been started yet.
    TurnNotStarted,
    /// Turn was already submitted (manually or by timer).
    TurnAlreadySubmitted,
    /// Phase timer already expired for the attempted operation.
    TimeExpired,
    /// Evaluation is finalized and immutable.
    EvaluationLocked,
    /// Input failed rubric or shape validation.
    ValidationFailed,
    /// Session leaderboard was already frozen.
    AlreadyFrozen,
    /// Freeze attempted before every team has a finalized evaluation.
    IncompleteTournament,
    /// Stored snapshot checksum no longer matches its entries.
    ChecksumMismatch,
    /// Event append lost an optimistic sequence race.
    ConcurrentWrite,
    /// Internal store failure.
    Internal,
}

impl ErrorCode {
    /// Returns the stable wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnauthorizedRole => "UNAUTHORIZED_ROLE",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::SessionNotJoinable => "SESSION_NOT_JOINABLE",
            Self::SessionFull => "SESSION_FULL",
            Self::DuplicateJoin => "DUPLICATE_JOIN",
            Self::RaceCondition => "RACE_CONDITION",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::NotCurrentSpeaker => "NOT_CURRENT_SPEAKER",
            Self::TurnNotStarted => "TURN_NOT_STARTED",
            Self::TurnAlreadySubmitted => "TURN_ALREADY_SUBMITTED",
            Self::TimeExpired => "TIME_EXPIRED",
            Self::EvaluationLocked => "EVALUATION_LOCKED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::AlreadyFrozen => "ALREADY_FROZEN",
            Self::IncompleteTournament => "INCOMPLETE_TOURNAMENT",
            Self::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Self::ConcurrentWrite => "CONCURRENT_WRITE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Returns the suggested HTTP status for delivery layers.
    #[must_use]
    pub const fn http_status_hint(self) -> u16 {
        match self {
            Self::ValidationFailed => 400,
            Self::UnauthorizedRole | Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::SessionNotJoinable
            | Self::SessionFull
            | Self::DuplicateJoin
            | Self::RaceCondition
            | Self::InvalidTransition
            | Self::ConcurrentModification
            | Self::TurnAlreadySubmitted
            | Self::EvaluationLocked
            | Self::AlreadyFrozen
            | Self::ConcurrentWrite => 409,
            Self::PreconditionFailed
            | Self::NotCurrentSpeaker
            | Self::TurnNotStarted
            | Self::TimeExpired
            | Self::IncompleteTournament
            | Self::ChecksumMismatch => 422,
            Self::Internal => 500,
        }
    }

    /// Returns true for conflicts that engines retry with bounded backoff.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ConcurrentModification | Self::ConcurrentWrite)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
