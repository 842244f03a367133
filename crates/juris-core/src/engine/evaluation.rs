// crates/juris-core/src/engine/evaluation.rs
// ============================================================================
// Module: Juris Evaluation Engine
// Description: Blind-safe judge scoring with immutable finalization.
// Purpose: Produce reproducible scores under a frozen rubric version.
// Dependencies: crate::{core, engine, interfaces}, bigdecimal, serde_json, tracing
// ============================================================================

//! ## Overview
//! Judges score a round participant under a frozen rubric version. Scores are
//! validated on every ingress: full criterion coverage, integers in
//! `[0, max]`, no excess keys. Drafts upsert freely; finalization re-validates
//! and freezes the row forever; every later write fails `EVALUATION_LOCKED`.
//! Blind assignments go through the blind projection, the only authorized way
//! to build judge-facing content; raw records never reach judging code paths.
//! Scoring is a deterministic function of stored integers; no model is ever
//! consulted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use bigdecimal::RoundingMode;
use serde_json::json;
use tracing::info;

use crate::core::AggregateRef;
use crate::core::AggregateRow;
use crate::core::AggregateType;
use crate::core::AuditDraft;
use crate::core::EvaluationId;
use crate::core::EvaluationSubject;
use crate::core::EvaluationTarget;
use crate::core::Identity;
use crate::core::JudgeAssignment;
use crate::core::JudgeEvaluation;
use crate::core::JudgingView;
use crate::core::NewJudgeEvaluation;
use crate::core::ParticipantId;
use crate::core::Role;
use crate::core::RubricVersionId;
use crate::core::ScoreMap;
use crate::core::SessionId;
use crate::core::Timestamp;
use crate::core::actions;
use crate::core::identity::Actor;
use crate::engine::error::EngineError;
use crate::engine::locks::AggregateLocks;
use crate::interfaces::EvaluationStore;
use crate::interfaces::EventLog;
use crate::interfaces::ParticipantStore;
use crate::interfaces::RoundStore;
use crate::interfaces::RubricStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A draft create-or-update request from a judge.
#[derive(Debug, Clone)]
pub struct EvaluationUpsertRequest {
    /// Object under evaluation.
    pub target: EvaluationTarget,
    /// Acting judge identity.
    pub identity: Identity,
    /// Rubric version to validate against.
    pub rubric_version_id: RubricVersionId,
    /// Criterion code to integer score.
    pub scores: ScoreMap,
    /// Free-form remarks.
    pub remarks: Option<String>,
    /// Caller IP for the audit row.
    pub ip_address: Option<String>,
    /// Request timestamp.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Blind Projection
// ============================================================================

/// Builds the judge-facing view of a subject.
///
/// For blind assignments the projection strips participant names, team names,
/// and emails, replaces identity with an opaque handle, and optionally strips
/// the title. This function is the only authorized path to judge-facing
/// content under a blind assignment.
#[must_use]
pub fn prepare_blind_view(
    assignment: &JudgeAssignment,
    subject: &EvaluationSubject,
    strip_title: bool,
) -> JudgingView {
    if !assignment.is_blind {
        return JudgingView {
            handle: subject.participant_name.clone(),
            title: subject.title.clone(),
            content: subject.content.clone(),
            blind_warnings: Vec::new(),
        };
    }
    let mut warnings = vec![
        "Participant identity is hidden for blind evaluation".to_owned(),
        "Team identity is hidden for blind evaluation".to_owned(),
        "Contact details are hidden for blind evaluation".to_owned(),
    ];
    let title = if strip_title {
        warnings.push("Submission title is hidden for blind evaluation".to_owned());
        None
    } else {
        subject.title.clone()
    };
    JudgingView {
        handle: format!("Participant #{}", subject.participant_id),
        title,
        content: subject.content.clone(),
        blind_warnings: warnings,
    }
}

// ============================================================================
// SECTION: Evaluation Engine
// ============================================================================

/// Judge evaluation engine.
pub struct EvaluationEngine<S> {
    /// Backing store.
    store: S,
    /// Per-evaluation serialization.
    locks: AggregateLocks,
}

impl<S> EvaluationEngine<S>
where
    S: EvaluationStore + RubricStore + RoundStore + SessionStore + ParticipantStore + EventLog,
{
    /// Creates an evaluation engine over a store.
    pub const fn new(store: S, locks: AggregateLocks) -> Self {
        Self { store, locks }
    }

    /// Creates or updates a draft evaluation.
    ///
    /// # Errors
    ///
    /// Returns `FORBIDDEN` without a judge assignment, `VALIDATION_FAILED`
    /// for score shape errors, `EVALUATION_LOCKED` once finalized.
    pub fn create_or_update(
        &self,
        request: &EvaluationUpsertRequest,
    ) -> Result<JudgeEvaluation, EngineError> {
        self.check_scope(request.target, &request.identity)?;
        if !matches!(request.identity.role, Role::Judge)
            && !request.identity.role.has_faculty_authority()
        {
            return Err(EngineError::Forbidden {
                reason: "only judges may submit evaluations".to_owned(),
            });
        }
        let assignment =
            self.store.assignment_for(request.identity.user_id, request.target)?;
        if assignment.is_none() {
            return Err(EngineError::Forbidden {
                reason: "no judge assignment for this target".to_owned(),
            });
        }

        let rubric = match self.store.load_rubric(request.rubric_version_id) {
            Ok(rubric) => rubric,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound {
                    entity: "rubric version",
                    id: request.rubric_version_id.get(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = rubric.validate_scores(&request.scores) {
            return Err(EngineError::ValidationFailed { detail: err.to_string() });
        }
        let total_score = rubric.total_score(&request.scores);

        let existing = self.store.evaluation_for(request.target, request.identity.user_id)?;
        match existing {
            None => {
                let audit = AuditDraft::success(
                    actions::EVALUATION_CREATED,
                    Actor::User(request.identity.user_id),
                    request.now,
                )
                .with_payload(json!({ "total_score": total_score.to_string() }))
                .with_ip(request.ip_address.clone());
                let new = NewJudgeEvaluation {
                    target: request.target,
                    judge_id: request.identity.user_id,
                    rubric_version_id: request.rubric_version_id,
                    scores: request.scores.clone(),
                    total_score,
                    remarks: request.remarks.clone(),
                    created_at: request.now,
                };
                let stored = self.store.insert_evaluation(new, audit)?;
                info!(evaluation_id = stored.id.get(), "evaluation created");
                Ok(stored)
            }
            Some(evaluation) if evaluation.is_final => {
                Err(EngineError::EvaluationLocked { evaluation_id: evaluation.id })
            }
            Some(evaluation) => {
                let eval_ref =
                    AggregateRef::new(AggregateType::Evaluation, evaluation.id.get());
                self.locks.with_lock(eval_ref, || {
                    let mut updated = evaluation.clone();
                    updated.rubric_version_id = request.rubric_version_id;
                    updated.scores = request.scores.clone();
                    updated.total_score = total_score.clone();
                    updated.remarks = request.remarks.clone();
                    updated.updated_at = request.now;
                    let audit = AuditDraft::success(
                        actions::EVALUATION_UPDATED,
                        Actor::User(request.identity.user_id),
                        request.now,
                    )
                    .with_payload(json!({ "total_score": total_score.to_string() }))
                    .with_ip(request.ip_address.clone());
                    match self.store.update_evaluation(&updated, audit) {
                        Ok(stored) => {
                            info!(evaluation_id = stored.id.get(), "evaluation updated");
                            Ok(stored)
                        }
                        Err(StoreError::Immutable(_)) => {
                            Err(EngineError::EvaluationLocked { evaluation_id: evaluation.id })
                        }
                        Err(err) => Err(err.into()),
                    }
                })
            }
        }
    }

    /// Finalizes an evaluation, making it immutable.
    ///
    /// Idempotent: finalizing a finalized row returns it unchanged and writes
    /// no new audit event.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` when stored scores no longer satisfy the
    /// rubric, `FORBIDDEN` for non-owners.
    pub fn finalize(
        &self,
        evaluation_id: EvaluationId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<JudgeEvaluation, EngineError> {
        let evaluation = match self.store.load_evaluation(evaluation_id) {
            Ok(evaluation) => evaluation,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound {
                    entity: "evaluation",
                    id: evaluation_id.get(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        self.check_scope(evaluation.target, identity)?;
        if evaluation.judge_id != identity.user_id && !identity.role.has_faculty_authority() {
            return Err(EngineError::Forbidden {
                reason: "only the evaluating judge may finalize".to_owned(),
            });
        }

        if evaluation.is_final {
            return Ok(evaluation);
        }

        let rubric = self.store.load_rubric(evaluation.rubric_version_id)?;
        if let Err(err) = rubric.validate_scores(&evaluation.scores) {
            return Err(EngineError::ValidationFailed { detail: err.to_string() });
        }

        let eval_ref = AggregateRef::new(AggregateType::Evaluation, evaluation.id.get());
        self.locks.with_lock(eval_ref, || {
            let mut updated = evaluation.clone();
            updated.is_draft = false;
            updated.is_final = true;
            updated.finalized_at = Some(now);
            updated.updated_at = now;
            let audit = AuditDraft::success(
                actions::EVALUATION_FINALIZED,
                Actor::User(identity.user_id),
                now,
            )
            .with_payload(json!({ "total_score": updated.total_score.to_string() }));
            match self.store.update_evaluation(&updated, audit) {
                Ok(stored) => {
                    info!(evaluation_id = stored.id.get(), "evaluation finalized");
                    Ok(stored)
                }
                // Lost a finalize race: the winner's row is the answer.
                Err(StoreError::Immutable(_)) => Ok(self.store.load_evaluation(evaluation.id)?),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Aggregates finalized evaluations for a session into a ranked list.
    ///
    /// Only finalized rows contribute. Participants rank by mean total score
    /// descending with competition ranking: ties share a rank and the next
    /// rank is skipped by group size.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the store fails.
    pub fn aggregate_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AggregateRow>, EngineError> {
        let finalized = self.store.finalized_for_session(session_id)?;
        let mut by_participant: Vec<(ParticipantId, Vec<&JudgeEvaluation>)> = Vec::new();
        for evaluation in &finalized {
            let participant_id = evaluation.target.participant_id;
            match by_participant.iter_mut().find(|(id, _)| *id == participant_id) {
                Some((_, group)) => group.push(evaluation),
                None => by_participant.push((participant_id, vec![evaluation])),
            }
        }

        let mut rows: Vec<AggregateRow> = by_participant
            .into_iter()
            .map(|(participant_id, group)| {
                let count = u32::try_from(group.len()).unwrap_or(u32::MAX);
                let sum: BigDecimal =
                    group.iter().map(|evaluation| evaluation.total_score.clone()).sum();
                let mean = (sum / BigDecimal::from(count.max(1)))
                    .with_scale_round(2, RoundingMode::HalfUp);
                AggregateRow {
                    participant_id,
                    mean_total_score: mean,
                    evaluation_count: count,
                    rank: 0,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.mean_total_score
                .cmp(&a.mean_total_score)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        let mut previous: Option<(BigDecimal, u32)> = None;
        for (index, row) in rows.iter_mut().enumerate() {
            let position = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
            row.rank = match &previous {
                Some((score, rank)) if *score == row.mean_total_score => *rank,
                _ => position,
            };
            previous = Some((row.mean_total_score.clone(), row.rank));
        }
        Ok(rows)
    }

    /// Enforces institution scoping for a target, failing closed.
    fn check_scope(
        &self,
        target: EvaluationTarget,
        identity: &Identity,
    ) -> Result<(), EngineError> {
        let round = match self.store.load_round(target.round_id) {
            Ok(round) => round,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound {
                    entity: "round",
                    id: target.round_id.get(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let session = self.store.load_session(round.session_id)?;
        if session.institution_id != identity.institution_id {
            return Err(EngineError::Forbidden {
                reason: "evaluation target belongs to another institution".to_owned(),
            });
        }
        let participant = self.store.load_participant(target.participant_id)?;
        if participant.session_id != session.id {
            return Err(EngineError::ValidationFailed {
                detail: "participant does not belong to the target round's session".to_owned(),
            });
        }
        Ok(())
    }
}
