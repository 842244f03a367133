// crates/juris-core/src/core/mod.rs
// ============================================================================
// Module: Juris Core Types
// Description: Canonical Juris domain schema and aggregate structures.
// Purpose: Provide stable, serializable types for sessions, rounds, and scores.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! Juris core types define the session, participant, round, turn, rubric,
//! evaluation, leaderboard, and audit structures. These types are the
//! canonical source of truth for any derived API surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod checksum;
pub mod error;
pub mod evaluation;
pub mod identifiers;
pub mod identity;
pub mod leaderboard;
pub mod participant;
pub mod round;
pub mod rubric;
pub mod session;
pub mod time;
pub mod timer;
pub mod transitions;
pub mod turn;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AggregateRef;
pub use audit::AggregateType;
pub use audit::AuditDraft;
pub use audit::AuditEvent;
pub use audit::EventCursor;
pub use audit::actions;
pub use checksum::HashError;
pub use checksum::canonical_json_bytes;
pub use checksum::hash_canonical_json;
pub use checksum::sha256_hex;
pub use error::ErrorCode;
pub use evaluation::AggregateRow;
pub use evaluation::EvaluationSubject;
pub use evaluation::EvaluationTarget;
pub use evaluation::JudgeAssignment;
pub use evaluation::JudgeEvaluation;
pub use evaluation::JudgingView;
pub use evaluation::NewJudgeAssignment;
pub use evaluation::NewJudgeEvaluation;
pub use identifiers::AssignmentId;
pub use identifiers::EvaluationId;
pub use identifiers::InstitutionId;
pub use identifiers::ParticipantId;
pub use identifiers::RoundId;
pub use identifiers::RubricVersionId;
pub use identifiers::SessionCode;
pub use identifiers::SessionCodeError;
pub use identifiers::SessionId;
pub use identifiers::SnapshotId;
pub use identifiers::TurnId;
pub use identifiers::UserId;
pub use identity::Actor;
pub use identity::Identity;
pub use identity::Role;
pub use leaderboard::GovernanceState;
pub use leaderboard::LeaderboardEntry;
pub use leaderboard::LeaderboardSnapshot;
pub use leaderboard::NewLeaderboardEntry;
pub use leaderboard::NewSnapshot;
pub use leaderboard::PublicationMode;
pub use leaderboard::canonical_entry_bytes;
pub use leaderboard::canonical_row;
pub use leaderboard::compute_checksum;
pub use leaderboard::format_tie_breaker;
pub use leaderboard::format_total_score;
pub use participant::AssignmentOutcome;
pub use participant::ConnectionStatus;
pub use participant::MAX_PARTICIPANTS;
pub use participant::NewParticipant;
pub use participant::Participant;
pub use participant::Side;
pub use participant::Slot;
pub use participant::slot_for_position;
pub use round::NewRound;
pub use round::Round;
pub use round::RoundState;
pub use round::SeatRef;
pub use rubric::RubricCriterion;
pub use rubric::RubricVersion;
pub use rubric::ScoreMap;
pub use rubric::ScoreValidationError;
pub use session::NewSession;
pub use session::Session;
pub use session::SessionState;
pub use time::Timestamp;
pub use timer::PhaseTimer;
pub use timer::PhaseWindow;
pub use transitions::TransitionRule;
pub use transitions::TriggerType;
pub use transitions::round_transition_rules;
pub use transitions::session_transition_rules;
pub use turn::MAX_TRANSCRIPT_BYTES;
pub use turn::NewTurn;
pub use turn::Turn;
pub use turn::word_count;
