// crates/juris-core/src/interfaces/mod.rs
// ============================================================================
// Module: Juris Interfaces
// Description: Backend-agnostic store contracts for aggregates and events.
// Purpose: Define the persistence surfaces the Juris engines operate through.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Juris persists state without embedding a backend.
//! Every mutating method accepts the audit draft that must commit in the same
//! transaction as the domain write; readers see either both or neither.
//! Implementations must be deterministic and fail closed on missing or
//! invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AggregateRef;
use crate::core::AuditDraft;
use crate::core::AuditEvent;
use crate::core::ConnectionStatus;
use crate::core::EvaluationId;
use crate::core::EvaluationTarget;
use crate::core::EventCursor;
use crate::core::JudgeAssignment;
use crate::core::JudgeEvaluation;
use crate::core::LeaderboardEntry;
use crate::core::LeaderboardSnapshot;
use crate::core::NewJudgeAssignment;
use crate::core::NewJudgeEvaluation;
use crate::core::NewLeaderboardEntry;
use crate::core::NewParticipant;
use crate::core::NewRound;
use crate::core::NewSession;
use crate::core::NewSnapshot;
use crate::core::NewTurn;
use crate::core::Participant;
use crate::core::ParticipantId;
use crate::core::Round;
use crate::core::RoundId;
use crate::core::RoundState;
use crate::core::RubricVersion;
use crate::core::RubricVersionId;
use crate::core::Session;
use crate::core::SessionCode;
use crate::core::SessionId;
use crate::core::SessionState;
use crate::core::SnapshotId;
use crate::core::Timestamp;
use crate::core::TransitionRule;
use crate::core::Turn;
use crate::core::TurnId;
use crate::core::UserId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Store errors surfaced to the engines.
///
/// Engines translate these into the stable wire codes; stores never invent
/// domain semantics beyond the constraint classes below.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O failure.
    #[error("store io error: {0}")]
    Io(String),
    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic version check failed.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },
    /// Event append lost an expected-previous-sequence race.
    #[error("sequence conflict: expected previous {expected}, found {found}")]
    SequenceConflict {
        /// Sequence the caller expected.
        expected: u64,
        /// Sequence actually stored.
        found: u64,
    },
    /// A uniqueness constraint rejected the write.
    #[error("unique violation on {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },
    /// The target row is immutable (submitted turn, finalized evaluation).
    #[error("immutable row: {0}")]
    Immutable(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// One page of the global event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    /// Events in global order.
    pub events: Vec<AuditEvent>,
    /// Cursor to resume from.
    pub next_cursor: EventCursor,
}

/// Append-only audit event log.
pub trait EventLog {
    /// Appends an event, assigning the next per-aggregate sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append(&self, aggregate: AggregateRef, draft: AuditDraft) -> Result<AuditEvent, StoreError>;

    /// Appends an event only when the aggregate's latest sequence equals
    /// `expected_previous` (0 for an empty stream).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SequenceConflict`] when another writer advanced
    /// the stream first.
    fn append_after(
        &self,
        aggregate: AggregateRef,
        draft: AuditDraft,
        expected_previous: u64,
    ) -> Result<AuditEvent, StoreError>;

    /// Replays one aggregate's stream from a sequence number (inclusive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn replay(
        &self,
        aggregate: AggregateRef,
        from_sequence: u64,
    ) -> Result<Vec<AuditEvent>, StoreError>;

    /// Reads events across aggregates after the cursor, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn since(&self, cursor: EventCursor, limit: usize) -> Result<EventPage, StoreError>;
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Persistence surface for session aggregates and their transition table.
pub trait SessionStore {
    /// Inserts a session, enforcing code uniqueness and the one-active-session
    /// rule per faculty. The audit draft commits with the insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] on `session_code` or
    /// `faculty_active_session`.
    fn create_session(&self, new: NewSession, audit: AuditDraft) -> Result<Session, StoreError>;

    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_session(&self, id: SessionId) -> Result<Session, StoreError>;

    /// Finds a session by join code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find_session_by_code(&self, code: &SessionCode) -> Result<Option<Session>, StoreError>;

    /// Writes an updated session when the stored version matches
    /// `expected_version`. The audit draft commits with the write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] on concurrent modification.
    fn update_session(
        &self,
        session: &Session,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Session, StoreError>;

    /// Returns the data-driven session transition table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the table cannot be read.
    fn session_rules(&self) -> Result<Vec<TransitionRule<SessionState>>, StoreError>;
}

// ============================================================================
// SECTION: Participant Store
// ============================================================================

/// Persistence surface for participant membership rows.
pub trait ParticipantStore {
    /// Inserts a participant, enforcing `(session, user)` and
    /// `(session, side, speaker)` uniqueness. The audit draft commits with
    /// the insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] naming `participant_slot` or
    /// `participant_user`.
    fn insert_participant(
        &self,
        new: NewParticipant,
        audit: AuditDraft,
    ) -> Result<Participant, StoreError>;

    /// Loads a participant by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_participant(&self, id: ParticipantId) -> Result<Participant, StoreError>;

    /// Finds a user's active membership in a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn participant_for_user(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError>;

    /// Counts active speaking participants in a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn count_active_speakers(&self, session_id: SessionId) -> Result<u32, StoreError>;

    /// Lists active participants in join order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn roster(&self, session_id: SessionId) -> Result<Vec<Participant>, StoreError>;

    /// Records delivery-layer connection facts; derived state, no audit row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn update_connection(
        &self,
        id: ParticipantId,
        status: ConnectionStatus,
        last_seen_at: Timestamp,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Round Store
// ============================================================================

/// Persistence surface for rounds, their turns, and the round rule table.
pub trait RoundStore {
    /// Inserts a round with its up-front turn order in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn create_round(
        &self,
        new: NewRound,
        turns: Vec<NewTurn>,
        audit: AuditDraft,
    ) -> Result<(Round, Vec<Turn>), StoreError>;

    /// Loads a round by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_round(&self, id: RoundId) -> Result<Round, StoreError>;

    /// Lists a session's rounds in round-number order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn rounds_for_session(&self, session_id: SessionId) -> Result<Vec<Round>, StoreError>;

    /// Writes an updated round when the stored version matches
    /// `expected_version`. The audit draft commits with the write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] on concurrent modification.
    fn update_round(
        &self,
        round: &Round,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Round, StoreError>;

    /// Returns the data-driven round transition table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the table cannot be read.
    fn round_rules(&self) -> Result<Vec<TransitionRule<RoundState>>, StoreError>;

    /// Loads a turn by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_turn(&self, id: TurnId) -> Result<Turn, StoreError>;

    /// Lists a round's turns in speaking order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn turns_for_round(&self, round_id: RoundId) -> Result<Vec<Turn>, StoreError>;

    /// Writes an updated turn. Submitted turns are immutable; the first
    /// submission wins and later writes fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Immutable`] when the stored turn is already
    /// submitted.
    fn update_turn(&self, turn: &Turn, audit: AuditDraft) -> Result<Turn, StoreError>;
}

// ============================================================================
// SECTION: Rubric Store
// ============================================================================

/// Persistence surface for frozen rubric versions.
pub trait RubricStore {
    /// Stores a rubric version. Versions are immutable; re-puts of an
    /// existing id fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when the id already exists.
    fn put_rubric(&self, rubric: RubricVersion) -> Result<(), StoreError>;

    /// Loads a rubric version by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_rubric(&self, id: RubricVersionId) -> Result<RubricVersion, StoreError>;
}

// ============================================================================
// SECTION: Evaluation Store
// ============================================================================

/// Persistence surface for judge assignments and evaluations.
pub trait EvaluationStore {
    /// Inserts a judge assignment, enforcing `(judge, target)` uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] on a duplicate assignment.
    fn put_assignment(&self, new: NewJudgeAssignment) -> Result<JudgeAssignment, StoreError>;

    /// Finds the assignment linking a judge to a target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn assignment_for(
        &self,
        judge_id: UserId,
        target: EvaluationTarget,
    ) -> Result<Option<JudgeAssignment>, StoreError>;

    /// Inserts a draft evaluation, enforcing `(target, judge)` uniqueness.
    /// The audit draft commits with the insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] on a duplicate evaluation.
    fn insert_evaluation(
        &self,
        new: NewJudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError>;

    /// Writes an updated evaluation. Finalized rows are immutable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Immutable`] when the stored row is final.
    fn update_evaluation(
        &self,
        evaluation: &JudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError>;

    /// Loads an evaluation by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_evaluation(&self, id: EvaluationId) -> Result<JudgeEvaluation, StoreError>;

    /// Finds a judge's evaluation of a target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn evaluation_for(
        &self,
        target: EvaluationTarget,
        judge_id: UserId,
    ) -> Result<Option<JudgeEvaluation>, StoreError>;

    /// Lists finalized evaluations for a target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn finalized_for_target(
        &self,
        target: EvaluationTarget,
    ) -> Result<Vec<JudgeEvaluation>, StoreError>;

    /// Lists finalized evaluations across a session's rounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn finalized_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<JudgeEvaluation>, StoreError>;

    /// True when the judge holds any assignment in the session's rounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn judge_has_assignment_in_session(
        &self,
        judge_id: UserId,
        session_id: SessionId,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Leaderboard Store
// ============================================================================

/// Persistence surface for leaderboard snapshots and entries.
pub trait LeaderboardStore {
    /// Inserts a snapshot with all entry rows in a single transaction,
    /// enforcing one snapshot per session. The audit draft commits with the
    /// insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when the session is already
    /// frozen.
    fn insert_snapshot(
        &self,
        new: NewSnapshot,
        entries: Vec<NewLeaderboardEntry>,
        audit: AuditDraft,
    ) -> Result<(LeaderboardSnapshot, Vec<LeaderboardEntry>), StoreError>;

    /// Loads a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn load_snapshot(&self, id: SnapshotId) -> Result<LeaderboardSnapshot, StoreError>;

    /// Finds the snapshot for a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn snapshot_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LeaderboardSnapshot>, StoreError>;

    /// Lists a snapshot's entries in rank order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn snapshot_entries(&self, id: SnapshotId) -> Result<Vec<LeaderboardEntry>, StoreError>;

    /// Writes governance-flag changes. Everything outside the governance
    /// lattice (checksum, entries, freeze metadata) is immutable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Immutable`] when a frozen field differs.
    fn update_snapshot_governance(
        &self,
        snapshot: &LeaderboardSnapshot,
        audit: AuditDraft,
    ) -> Result<LeaderboardSnapshot, StoreError>;
}

// ============================================================================
// SECTION: Combined Store
// ============================================================================

/// Convenience supertrait for hosts wiring every engine to one backend.
pub trait CoreStore:
    EventLog
    + SessionStore
    + ParticipantStore
    + RoundStore
    + RubricStore
    + EvaluationStore
    + LeaderboardStore
{
}

impl<T> CoreStore for T where
    T: EventLog
        + SessionStore
        + ParticipantStore
        + RoundStore
        + RubricStore
        + EvaluationStore
        + LeaderboardStore
{
}
