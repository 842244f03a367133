// crates/juris-core/src/core/evaluation.rs
// ============================================================================
// Module: Juris Evaluations
// Description: Judge assignments, blind views, and immutable evaluation rows.
// Purpose: Model per-judge scores that freeze permanently at finalization.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! A judge evaluation scores one participant's performance in one round under
//! a frozen rubric version. Evaluations begin as drafts and become immutable
//! at finalization; `is_draft` and `is_final` are mutually exclusive. Blind
//! assignments require the engine's blind projection, the only authorized way
//! to produce content for a judge, so raw identity never reaches judging
//! code paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AssignmentId;
use crate::core::identifiers::EvaluationId;
use crate::core::identifiers::ParticipantId;
use crate::core::identifiers::RoundId;
use crate::core::identifiers::RubricVersionId;
use crate::core::identifiers::UserId;
use crate::core::rubric::ScoreMap;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Evaluation Targets
// ============================================================================

/// The object under evaluation: a participant's performance in a round.
///
/// Project-library evaluation lives with the project collaborator outside the
/// core; within a session the round-participant pair is the scoring unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationTarget {
    /// Round in which the performance occurred.
    pub round_id: RoundId,
    /// Participant being scored.
    pub participant_id: ParticipantId,
}

// ============================================================================
// SECTION: Judge Assignments
// ============================================================================

/// Link between a judge and an evaluation target.
///
/// # Invariants
/// - `(judge_id, target)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeAssignment {
    /// Assignment identifier.
    pub id: AssignmentId,
    /// Evaluating judge.
    pub judge_id: UserId,
    /// Object under evaluation.
    pub target: EvaluationTarget,
    /// When true, the judge may only see the blind projection.
    pub is_blind: bool,
}

/// New judge assignment handed to the store for insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewJudgeAssignment {
    /// Evaluating judge.
    pub judge_id: UserId,
    /// Object under evaluation.
    pub target: EvaluationTarget,
    /// When true, the judge may only see the blind projection.
    pub is_blind: bool,
}

// ============================================================================
// SECTION: Blind Projection Artifacts
// ============================================================================

/// Identity-bearing subject material loaded for judging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSubject {
    /// Participant under evaluation.
    pub participant_id: ParticipantId,
    /// Participant display name.
    pub participant_name: String,
    /// Team name, when the participant argues for a team.
    pub team_name: Option<String>,
    /// Participant email.
    pub email: Option<String>,
    /// Submission title.
    pub title: Option<String>,
    /// Content presented to the judge (e.g. transcript text).
    pub content: String,
}

/// Artifact presented to a judge; identity stripped when the assignment is blind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgingView {
    /// Opaque handle replacing identity (e.g. `Participant #42`).
    pub handle: String,
    /// Title, omitted when blind and title stripping was requested.
    pub title: Option<String>,
    /// Content under evaluation.
    pub content: String,
    /// Notices shown to the judge about what was withheld.
    pub blind_warnings: Vec<String>,
}

// ============================================================================
// SECTION: Evaluation Rows
// ============================================================================

/// An individual judge's scoring of a target.
///
/// # Invariants
/// - `(target, judge_id)` is unique.
/// - `is_draft` and `is_final` are never both true.
/// - Once `is_final` is true, every field except audit references is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    /// Evaluation identifier.
    pub id: EvaluationId,
    /// Object under evaluation.
    pub target: EvaluationTarget,
    /// Evaluating judge.
    pub judge_id: UserId,
    /// Rubric version the scores were validated against.
    pub rubric_version_id: RubricVersionId,
    /// Criterion code to integer score.
    pub scores: ScoreMap,
    /// Derived total under the rubric's totaling rule.
    pub total_score: BigDecimal,
    /// Free-form remarks from the judge.
    pub remarks: Option<String>,
    /// True while the evaluation may still change.
    pub is_draft: bool,
    /// True once the evaluation is immutable.
    pub is_final: bool,
    /// Set at finalization.
    pub finalized_at: Option<Timestamp>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last modification timestamp.
    pub updated_at: Timestamp,
}

impl JudgeEvaluation {
    /// Returns true when the given judge may still edit this evaluation.
    #[must_use]
    pub fn can_edit(&self, judge_id: UserId) -> bool {
        self.judge_id == judge_id && self.is_draft && !self.is_final
    }
}

/// New evaluation row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJudgeEvaluation {
    /// Object under evaluation.
    pub target: EvaluationTarget,
    /// Evaluating judge.
    pub judge_id: UserId,
    /// Rubric version the scores were validated against.
    pub rubric_version_id: RubricVersionId,
    /// Criterion code to integer score.
    pub scores: ScoreMap,
    /// Derived total under the rubric's totaling rule.
    pub total_score: BigDecimal,
    /// Free-form remarks from the judge.
    pub remarks: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Aggregation Results
// ============================================================================

/// One ranked row of an evaluation aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Participant being ranked.
    pub participant_id: ParticipantId,
    /// Mean total score across finalized evaluations.
    pub mean_total_score: BigDecimal,
    /// Number of finalized evaluations contributing.
    pub evaluation_count: u32,
    /// Competition rank (ties share a rank; the next rank is skipped).
    pub rank: u32,
}
