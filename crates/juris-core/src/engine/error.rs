// crates/juris-core/src/engine/error.rs
// ============================================================================
// Module: Juris Engine Errors
// Description: Typed engine failures carrying stable wire codes.
// Purpose: Give every engine one error surface that transports can map.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! Every engine returns [`EngineError`]. Each variant maps to exactly one
//! stable [`ErrorCode`]; store-level failures fold in through a single
//! conversion so no error is swallowed silently. Concurrency conflicts are
//! marked retryable and engines retry them with the bounded backoff schedule
//! before surfacing them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ErrorCode;
use crate::core::EvaluationId;
use crate::core::SessionId;
use crate::core::Side;
use crate::core::SnapshotId;
use crate::core::TurnId;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Engine Errors
// ============================================================================

/// Failures surfaced by the Juris engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Actor's role does not permit the operation.
    #[error("only students can join as participants")]
    UnauthorizedRole,
    /// Actor may not touch this aggregate.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Why the actor was refused.
        reason: String,
    },
    /// Referenced aggregate does not exist in the actor's institution.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Raw identifier.
        id: u64,
    },
    /// Session is not open for joins.
    #[error("session {session_id} is not joinable (state: {state})")]
    SessionNotJoinable {
        /// Session refused.
        session_id: SessionId,
        /// Its current state label.
        state: &'static str,
    },
    /// Session already holds its maximum participant composition.
    #[error("session {session_id} is full (max {max} participants)")]
    SessionFull {
        /// Session refused.
        session_id: SessionId,
        /// Maximum speaking participants.
        max: u32,
    },
    /// A slot uniqueness race was detected; the caller should retry.
    #[error("position {side} #{speaker_number} was just taken; please try again", side = .side.as_str())]
    RaceCondition {
        /// Side of the contested slot.
        side: Side,
        /// Speaker number of the contested slot.
        speaker_number: u8,
    },
    /// Requested transition is not in the allowed adjacency table.
    #[error("cannot transition {from_state} -> {to_state}; allowed: {allowed}", allowed = .allowed.join(", "))]
    InvalidTransition {
        /// Current state label.
        from_state: String,
        /// Requested state label.
        to_state: String,
        /// Allowed next-state labels, in table order.
        allowed: Vec<String>,
    },
    /// Optimistic version check failed against a concurrent writer.
    #[error("concurrent modification: expected version {expected}, found {found}")]
    ConcurrentModification {
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },
    /// A transition or governance precondition does not hold.
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Which precondition failed.
        reason: String,
    },
    /// Turn operation attempted out of speaking order.
    #[error("turn {turn_id} is not the current speaker slot")]
    NotCurrentSpeaker {
        /// Offending turn.
        turn_id: TurnId,
    },
    /// Turn has not been started.
    #[error("turn {turn_id} has not been started")]
    TurnNotStarted {
        /// Offending turn.
        turn_id: TurnId,
    },
    /// Turn was already submitted, manually or by timer.
    #[error("turn {turn_id} was already submitted")]
    TurnAlreadySubmitted {
        /// Offending turn.
        turn_id: TurnId,
    },
    /// Phase timer already expired for the attempted operation.
    #[error("phase time expired")]
    TimeExpired,
    /// Evaluation is finalized and immutable.
    #[error("evaluation {evaluation_id} is locked and cannot be modified")]
    EvaluationLocked {
        /// Locked evaluation.
        evaluation_id: EvaluationId,
    },
    /// Input failed rubric or shape validation.
    #[error("validation failed: {detail}")]
    ValidationFailed {
        /// What failed validation.
        detail: String,
    },
    /// Session leaderboard was already frozen.
    #[error("session {session_id} leaderboard is already frozen")]
    AlreadyFrozen {
        /// Session whose snapshot exists.
        session_id: SessionId,
    },
    /// Freeze attempted before every participant has a finalized evaluation.
    #[error("incomplete tournament: {detail}")]
    IncompleteTournament {
        /// Which participants lack finalized evaluations.
        detail: String,
    },
    /// Stored snapshot checksum no longer matches its entries.
    #[error("snapshot {snapshot_id} checksum mismatch")]
    ChecksumMismatch {
        /// Tampered snapshot.
        snapshot_id: SnapshotId,
    },
    /// Event append lost an optimistic sequence race.
    #[error("concurrent write: {0}")]
    ConcurrentWrite(String),
    /// Store failure without a finer domain meaning.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Returns the stable wire code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnauthorizedRole => ErrorCode::UnauthorizedRole,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } | Self::Store(StoreError::NotFound(_)) => ErrorCode::NotFound,
            Self::SessionNotJoinable { .. } => ErrorCode::SessionNotJoinable,
            Self::SessionFull { .. } => ErrorCode::SessionFull,
            Self::RaceCondition { .. } => ErrorCode::RaceCondition,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::ConcurrentModification { .. }
            | Self::Store(StoreError::VersionConflict { .. }) => ErrorCode::ConcurrentModification,
            Self::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            Self::NotCurrentSpeaker { .. } => ErrorCode::NotCurrentSpeaker,
            Self::TurnNotStarted { .. } => ErrorCode::TurnNotStarted,
            Self::TurnAlreadySubmitted { .. } => ErrorCode::TurnAlreadySubmitted,
            Self::TimeExpired => ErrorCode::TimeExpired,
            Self::EvaluationLocked { .. } => ErrorCode::EvaluationLocked,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::AlreadyFrozen { .. } => ErrorCode::AlreadyFrozen,
            Self::IncompleteTournament { .. } => ErrorCode::IncompleteTournament,
            Self::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            Self::ConcurrentWrite(_) | Self::Store(StoreError::SequenceConflict { .. }) => {
                ErrorCode::ConcurrentWrite
            }
            Self::Store(_) => ErrorCode::Internal,
        }
    }

    /// Returns true when a bounded retry may resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}
