// crates/juris-core/src/engine/leaderboard.rs
// ============================================================================
// Module: Juris Leaderboard Engine
// Description: Immutable freeze, governance lattice, and checksum verification.
// Purpose: Freeze a session's ranking into a tamper-evident, governed artifact.
// Dependencies: crate::{core, engine, interfaces}, bigdecimal, serde_json, tracing
// ============================================================================

//! ## Overview
//! Freezing reads only finalized evaluations, averages them per participant,
//! breaks ties with the per-criterion rule, assigns dense ranks, and writes
//! snapshot plus entries in one transaction with a SHA-256 checksum over the
//! canonical row encoding. The snapshot then moves through the governance
//! lattice (faculty submit, approvers finalize, publication only from
//! FINALIZED) and can only ever be soft-invalidated. A checksum that stops
//! matching its entries is a tamper signal: the engine reports it and a
//! privileged invalidation is the sole remedy, never self-healing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use bigdecimal::RoundingMode;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::core::AggregateRef;
use crate::core::AggregateType;
use crate::core::AuditDraft;
use crate::core::Identity;
use crate::core::JudgeEvaluation;
use crate::core::LeaderboardEntry;
use crate::core::LeaderboardSnapshot;
use crate::core::NewLeaderboardEntry;
use crate::core::NewSnapshot;
use crate::core::Participant;
use crate::core::PublicationMode;
use crate::core::Role;
use crate::core::RubricVersion;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::SessionState;
use crate::core::Side;
use crate::core::Slot;
use crate::core::SnapshotId;
use crate::core::Timestamp;
use crate::core::actions;
use crate::core::checksum::sha256_hex;
use crate::core::identity::Actor;
use crate::core::leaderboard::canonical_row;
use crate::core::leaderboard::compute_checksum;
use crate::engine::error::EngineError;
use crate::engine::locks::AggregateLocks;
use crate::interfaces::EvaluationStore;
use crate::interfaces::EventLog;
use crate::interfaces::LeaderboardStore;
use crate::interfaces::ParticipantStore;
use crate::interfaces::RubricStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A leaderboard freeze request.
#[derive(Debug, Clone)]
pub struct FreezeRequest {
    /// Session to freeze.
    pub session_id: SessionId,
    /// Acting faculty identity.
    pub identity: Identity,
    /// Caller IP for the audit row.
    pub ip_address: Option<String>,
    /// Request timestamp.
    pub now: Timestamp,
}

/// A publication request.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Snapshot to publish.
    pub snapshot_id: SnapshotId,
    /// Acting identity.
    pub identity: Identity,
    /// Publication mode; SCHEDULED requires a date.
    pub mode: PublicationMode,
    /// Visibility date for SCHEDULED mode.
    pub publication_date: Option<Timestamp>,
    /// Request timestamp.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Leaderboard Engine
// ============================================================================

/// Immutable leaderboard freeze and governance engine.
pub struct LeaderboardEngine<S> {
    /// Backing store.
    store: S,
    /// Per-snapshot serialization.
    locks: AggregateLocks,
}

impl<S> LeaderboardEngine<S>
where
    S: SessionStore
        + ParticipantStore
        + EvaluationStore
        + RubricStore
        + LeaderboardStore
        + EventLog,
{
    /// Creates a leaderboard engine over a store.
    pub const fn new(store: S, locks: AggregateLocks) -> Self {
        Self { store, locks }
    }

    /// Freezes a session's ranking into an immutable snapshot.
    ///
    /// Never retried internally: a second attempt is the caller's decision
    /// and answers `ALREADY_FROZEN`.
    ///
    /// # Errors
    ///
    /// Returns `PRECONDITION_FAILED` before COMPLETED,
    /// `INCOMPLETE_TOURNAMENT` when any speaker lacks a finalized evaluation,
    /// `ALREADY_FROZEN` on a duplicate freeze.
    pub fn freeze(
        &self,
        request: &FreezeRequest,
    ) -> Result<(LeaderboardSnapshot, Vec<LeaderboardEntry>), EngineError> {
        let session = self.load_scoped_session(request.session_id, &request.identity)?;
        if !request.identity.role.has_faculty_authority() {
            return Err(EngineError::Forbidden {
                reason: "freezing a leaderboard requires faculty authorization".to_owned(),
            });
        }
        if session.state != SessionState::Completed {
            return Err(EngineError::PreconditionFailed {
                reason: format!(
                    "session must be COMPLETED to freeze (state: {})",
                    session.state.as_str()
                ),
            });
        }

        let session_ref = AggregateRef::new(AggregateType::Session, session.id.get());
        self.locks.with_lock(session_ref, || self.freeze_locked(&session, request))
    }

    /// Freeze flow run under the session lock.
    fn freeze_locked(
        &self,
        session: &Session,
        request: &FreezeRequest,
    ) -> Result<(LeaderboardSnapshot, Vec<LeaderboardEntry>), EngineError> {
        if self.store.snapshot_for_session(session.id)?.is_some() {
            return Err(EngineError::AlreadyFrozen { session_id: session.id });
        }

        let roster = self.store.roster(session.id)?;
        let speakers: Vec<&Participant> =
            roster.iter().filter(|participant| participant.is_speaker()).collect();
        let finalized = self.store.finalized_for_session(session.id)?;

        let mut groups: Vec<(&Participant, Vec<&JudgeEvaluation>)> = Vec::new();
        let mut missing: Vec<u64> = Vec::new();
        for speaker in &speakers {
            let group: Vec<&JudgeEvaluation> = finalized
                .iter()
                .filter(|evaluation| evaluation.target.participant_id == speaker.id)
                .collect();
            if group.is_empty() {
                missing.push(speaker.id.get());
            } else {
                groups.push((speaker, group));
            }
        }
        if speakers.is_empty() || !missing.is_empty() {
            return Err(EngineError::IncompleteTournament {
                detail: if speakers.is_empty() {
                    "no speaking participants to rank".to_owned()
                } else {
                    let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
                    format!("participants without finalized evaluations: {}", ids.join(", "))
                },
            });
        }

        let rubric = self.single_rubric(&finalized)?;

        let mut computed: Vec<NewLeaderboardEntry> = groups
            .iter()
            .map(|(speaker, group)| score_participant(speaker, group, &rubric))
            .collect();

        // Deterministic order: total desc, tie-breaker desc, participant asc.
        computed.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| b.tie_breaker_score.cmp(&a.tie_breaker_score))
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        assign_dense_ranks(&mut computed);

        let rows: Vec<String> = computed
            .iter()
            .map(|entry| {
                canonical_row(
                    entry.rank,
                    entry.participant_id,
                    &entry.total_score,
                    &entry.tie_breaker_score,
                )
            })
            .collect();
        let checksum = sha256_hex(rows.join(";").as_bytes());

        let total_participants = u32::try_from(computed.len()).unwrap_or(u32::MAX);
        let new = NewSnapshot {
            session_id: session.id,
            institution_id: session.institution_id,
            frozen_at: request.now,
            frozen_by: request.identity.user_id,
            rubric_version_id: rubric.id,
            total_participants,
            checksum_hash: checksum.clone(),
        };
        let audit = AuditDraft::success(
            actions::LEADERBOARD_FROZEN,
            Actor::User(request.identity.user_id),
            request.now,
        )
        .with_payload(json!({
            "checksum": checksum,
            "total_participants": total_participants,
        }))
        .with_ip(request.ip_address.clone());

        match self.store.insert_snapshot(new, computed, audit) {
            Ok((snapshot, entries)) => {
                info!(
                    snapshot_id = snapshot.id.get(),
                    session_id = session.id.get(),
                    participants = total_participants,
                    "leaderboard frozen"
                );
                Ok((snapshot, entries))
            }
            Err(StoreError::UniqueViolation { .. }) => {
                Err(EngineError::AlreadyFrozen { session_id: session.id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Faculty submits a draft snapshot for approval.
    ///
    /// # Errors
    ///
    /// Returns `PRECONDITION_FAILED` outside DRAFT, `FORBIDDEN` without
    /// faculty authority.
    pub fn submit_for_approval(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<LeaderboardSnapshot, EngineError> {
        self.governance_step(snapshot_id, identity, now, |snapshot, identity| {
            if !identity.role.has_faculty_authority() {
                return Err(EngineError::Forbidden {
                    reason: "submitting for approval requires faculty authorization".to_owned(),
                });
            }
            if snapshot.is_invalidated
                || snapshot.is_finalized
                || snapshot.is_published
                || snapshot.is_pending_approval
            {
                return Err(EngineError::PreconditionFailed {
                    reason: "snapshot must be in draft".to_owned(),
                });
            }
            let mut updated = snapshot.clone();
            updated.is_pending_approval = true;
            Ok((updated, actions::SNAPSHOT_SUBMITTED))
        })
    }

    /// An approver finalizes a pending snapshot.
    ///
    /// # Errors
    ///
    /// Returns `FORBIDDEN` without the approver capability,
    /// `PRECONDITION_FAILED` outside PENDING_APPROVAL.
    pub fn finalize_snapshot(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<LeaderboardSnapshot, EngineError> {
        self.governance_step(snapshot_id, identity, now, |snapshot, identity| {
            if !matches!(identity.role, Role::Admin | Role::SuperAdmin) {
                return Err(EngineError::Forbidden {
                    reason: "finalizing requires the approver capability".to_owned(),
                });
            }
            if snapshot.is_invalidated || !snapshot.is_pending_approval || snapshot.is_finalized {
                return Err(EngineError::PreconditionFailed {
                    reason: "snapshot must be pending approval".to_owned(),
                });
            }
            let mut updated = snapshot.clone();
            updated.is_finalized = true;
            updated.finalized_at = Some(now);
            Ok((updated, actions::SNAPSHOT_FINALIZED))
        })
    }

    /// Publishes a finalized snapshot, immediately or on a schedule.
    ///
    /// # Errors
    ///
    /// Returns `PRECONDITION_FAILED` with reason `must be finalized` when the
    /// snapshot has not passed approval.
    pub fn publish(&self, request: &PublishRequest) -> Result<LeaderboardSnapshot, EngineError> {
        self.governance_step(
            request.snapshot_id,
            &request.identity,
            request.now,
            |snapshot, identity| {
                if !identity.role.has_faculty_authority() {
                    return Err(EngineError::Forbidden {
                        reason: "publishing requires faculty authorization".to_owned(),
                    });
                }
                if !snapshot.can_be_published() {
                    return Err(EngineError::PreconditionFailed {
                        reason: "must be finalized".to_owned(),
                    });
                }
                if request.mode == PublicationMode::Scheduled
                    && request.publication_date.is_none()
                {
                    return Err(EngineError::ValidationFailed {
                        detail: "scheduled publication requires a publication date".to_owned(),
                    });
                }
                let mut updated = snapshot.clone();
                updated.publication_mode = request.mode;
                updated.publication_date = request.publication_date;
                updated.is_published = true;
                updated.published_at = Some(request.now);
                updated.published_by = Some(identity.user_id);
                Ok((updated, actions::SNAPSHOT_PUBLISHED))
            },
        )
    }

    /// Soft-invalidates a snapshot; the row and entries remain.
    ///
    /// Idempotent: an already-invalidated snapshot returns unchanged.
    ///
    /// # Errors
    ///
    /// Returns `FORBIDDEN` without the privileged capability.
    pub fn invalidate(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
        reason: &str,
        now: Timestamp,
    ) -> Result<LeaderboardSnapshot, EngineError> {
        let snapshot = self.load_scoped_snapshot(snapshot_id, identity)?;
        if !matches!(identity.role, Role::Admin | Role::SuperAdmin) {
            return Err(EngineError::Forbidden {
                reason: "invalidation is a privileged operation".to_owned(),
            });
        }
        if snapshot.is_invalidated {
            return Ok(snapshot);
        }
        let reason_owned = reason.to_owned();
        self.governance_step(snapshot_id, identity, now, move |snapshot, identity| {
            let mut updated = snapshot.clone();
            updated.is_invalidated = true;
            updated.invalidated_reason = Some(reason_owned);
            updated.invalidated_at = Some(now);
            updated.invalidated_by = Some(identity.user_id);
            Ok((updated, actions::SNAPSHOT_INVALIDATED))
        })
    }

    /// Recomputes the canonical checksum from stored entries and compares it
    /// to the stored value. A mismatch is a tamper signal; the caller marks
    /// the snapshot invalidated via the privileged operation.
    ///
    /// # Errors
    ///
    /// Returns `CHECKSUM_MISMATCH` on a tamper signal.
    pub fn verify_checksum(&self, snapshot_id: SnapshotId) -> Result<String, EngineError> {
        let snapshot = match self.store.load_snapshot(snapshot_id) {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound { entity: "snapshot", id: snapshot_id.get() });
            }
            Err(err) => return Err(err.into()),
        };
        let entries = self.store.snapshot_entries(snapshot_id)?;
        let computed = compute_checksum(&entries);
        if computed != snapshot.checksum_hash {
            warn!(snapshot_id = snapshot_id.get(), "checksum mismatch detected");
            return Err(EngineError::ChecksumMismatch { snapshot_id });
        }
        Ok(computed)
    }

    /// Visibility predicate consumed by external read APIs.
    ///
    /// Students see published (and schedule-visible) snapshots; judges see
    /// snapshots for sessions they judged; faculty and admins see everything
    /// within their institution. Cross-institution reads always fail.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the store fails.
    pub fn can_view(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<bool, EngineError> {
        let snapshot = match self.store.load_snapshot(snapshot_id) {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound { entity: "snapshot", id: snapshot_id.get() });
            }
            Err(err) => return Err(err.into()),
        };
        if snapshot.institution_id != identity.institution_id {
            return Ok(false);
        }
        match identity.role {
            Role::Faculty | Role::Admin | Role::SuperAdmin => Ok(true),
            Role::Judge => Ok(self
                .store
                .judge_has_assignment_in_session(identity.user_id, snapshot.session_id)?),
            Role::Student => Ok(snapshot.is_visible_to_students(now)),
        }
    }

    /// Shared governance mutation flow: load, scope, apply, persist.
    fn governance_step(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
        now: Timestamp,
        apply: impl FnOnce(
            &LeaderboardSnapshot,
            &Identity,
        ) -> Result<(LeaderboardSnapshot, &'static str), EngineError>,
    ) -> Result<LeaderboardSnapshot, EngineError> {
        let snapshot_ref = AggregateRef::new(AggregateType::Snapshot, snapshot_id.get());
        self.locks.with_lock(snapshot_ref, || {
            let snapshot = self.load_scoped_snapshot(snapshot_id, identity)?;
            let (updated, action) = apply(&snapshot, identity)?;
            let draft = AuditDraft::success(action, Actor::User(identity.user_id), now)
                .with_payload(json!({
                    "governance_state": updated.governance_state(),
                }));
            let stored = self.store.update_snapshot_governance(&updated, draft)?;
            info!(
                snapshot_id = stored.id.get(),
                action = action,
                "snapshot governance step"
            );
            Ok(stored)
        })
    }

    /// Loads a snapshot and enforces institution scoping, failing closed.
    fn load_scoped_snapshot(
        &self,
        snapshot_id: SnapshotId,
        identity: &Identity,
    ) -> Result<LeaderboardSnapshot, EngineError> {
        let snapshot = match self.store.load_snapshot(snapshot_id) {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound { entity: "snapshot", id: snapshot_id.get() });
            }
            Err(err) => return Err(err.into()),
        };
        if snapshot.institution_id != identity.institution_id {
            return Err(EngineError::Forbidden {
                reason: "snapshot belongs to another institution".to_owned(),
            });
        }
        Ok(snapshot)
    }

    /// Loads a session and enforces institution scoping, failing closed.
    fn load_scoped_session(
        &self,
        session_id: SessionId,
        identity: &Identity,
    ) -> Result<Session, EngineError> {
        let session = match self.store.load_session(session_id) {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound { entity: "session", id: session_id.get() });
            }
            Err(err) => return Err(err.into()),
        };
        if session.institution_id != identity.institution_id {
            return Err(EngineError::Forbidden {
                reason: "session belongs to another institution".to_owned(),
            });
        }
        Ok(session)
    }

    /// Requires a single rubric version across all contributing evaluations.
    fn single_rubric(
        &self,
        finalized: &[JudgeEvaluation],
    ) -> Result<RubricVersion, EngineError> {
        let mut versions: Vec<_> =
            finalized.iter().map(|evaluation| evaluation.rubric_version_id).collect();
        versions.sort_unstable();
        versions.dedup();
        match versions.as_slice() {
            [single] => Ok(self.store.load_rubric(*single)?),
            [] => Err(EngineError::IncompleteTournament {
                detail: "no finalized evaluations".to_owned(),
            }),
            _ => Err(EngineError::ValidationFailed {
                detail: "finalized evaluations span multiple rubric versions".to_owned(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Scoring
// ============================================================================

/// Computes one participant's unranked entry from their finalized evaluations.
fn score_participant(
    speaker: &Participant,
    group: &[&JudgeEvaluation],
    rubric: &RubricVersion,
) -> NewLeaderboardEntry {
    let count = BigDecimal::from(u32::try_from(group.len()).unwrap_or(u32::MAX).max(1));
    let sum: BigDecimal = group.iter().map(|evaluation| evaluation.total_score.clone()).sum();
    let total_score = (sum / &count).with_scale_round(2, RoundingMode::HalfUp);

    // Per-criterion means, then the documented tie-breaker: the mean over
    // criteria of (criterion mean / criterion max), at four decimal places.
    let mut breakdown: BTreeMap<String, BigDecimal> = BTreeMap::new();
    let mut ratio_sum = BigDecimal::from(0u32);
    for criterion in &rubric.criteria {
        let criterion_sum: u64 = group
            .iter()
            .map(|evaluation| {
                u64::from(evaluation.scores.get(&criterion.key).copied().unwrap_or(0))
            })
            .sum();
        let mean = (BigDecimal::from(criterion_sum) / &count)
            .with_scale_round(2, RoundingMode::HalfUp);
        ratio_sum += &mean / BigDecimal::from(criterion.max_score.max(1));
        breakdown.insert(criterion.key.clone(), mean);
    }
    let criteria_count = BigDecimal::from(u32::try_from(rubric.criteria.len()).unwrap_or(1).max(1));
    let tie_breaker_score =
        (ratio_sum / criteria_count).with_scale_round(4, RoundingMode::HalfUp);

    let slot = speaker.slot.unwrap_or(Slot { side: Side::Petitioner, speaker_number: 0 });
    let mut evaluation_ids: Vec<_> = group.iter().map(|evaluation| evaluation.id).collect();
    evaluation_ids.sort_unstable();

    NewLeaderboardEntry {
        participant_id: speaker.id,
        side: slot.side,
        speaker_number: slot.speaker_number,
        total_score,
        tie_breaker_score,
        rank: 0,
        score_breakdown: breakdown,
        evaluation_ids,
    }
}

/// Assigns dense ranks: equal `(total, tie_breaker)` tuples share a rank and
/// the next rank skips by group size.
fn assign_dense_ranks(entries: &mut [NewLeaderboardEntry]) {
    let mut previous: Option<(BigDecimal, BigDecimal, u32)> = None;
    for index in 0..entries.len() {
        let position = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        let rank = match &previous {
            Some((total, tie, rank))
                if *total == entries[index].total_score
                    && *tie == entries[index].tie_breaker_score =>
            {
                *rank
            }
            _ => position,
        };
        entries[index].rank = rank;
        previous = Some((
            entries[index].total_score.clone(),
            entries[index].tie_breaker_score.clone(),
            rank,
        ));
    }
}
