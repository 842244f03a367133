// crates/juris-core/src/engine/assignment.rs
// ============================================================================
// Module: Juris Assignment Engine
// Description: Deterministic, race-safe participant assignment.
// Purpose: Decide where a joining student sits, with a full forensic trail.
// Dependencies: crate::{core, engine, interfaces}, serde_json, tracing
// ============================================================================

//! ## Overview
//! Assignment is a pure function of the join position: the first four student
//! joins take `(PETITIONER,1) (RESPONDENT,1) (PETITIONER,2) (RESPONDENT,2)` in
//! order. No randomness, no timestamp tie-breaking, no client influence. Joins
//! for one session serialize on the session lock; a slot uniqueness violation
//! that still slips through is a concurrency bug surfaced as `RACE_CONDITION`.
//! Every outcome, success or refusal, lands in the audit log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::core::AggregateRef;
use crate::core::AggregateType;
use crate::core::AssignmentOutcome;
use crate::core::AuditDraft;
use crate::core::Identity;
use crate::core::MAX_PARTICIPANTS;
use crate::core::NewParticipant;
use crate::core::Participant;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::Side;
use crate::core::Slot;
use crate::core::Timestamp;
use crate::core::actions;
use crate::core::identity::Actor;
use crate::core::participant::slot_for_position;
use crate::engine::error::EngineError;
use crate::engine::locks::AggregateLocks;
use crate::interfaces::EventLog;
use crate::interfaces::ParticipantStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A join request from the transport layer.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// Session to join.
    pub session_id: SessionId,
    /// Joining user's identity tuple.
    pub identity: Identity,
    /// Caller IP for the audit row.
    pub ip_address: Option<String>,
    /// Request timestamp.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Integrity Report
// ============================================================================

/// Result of a non-mutating assignment integrity sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Session checked.
    pub session_id: SessionId,
    /// Active speaking participants found.
    pub total_speakers: u32,
    /// Petitioner-side speakers.
    pub petitioners: u32,
    /// Respondent-side speakers.
    pub respondents: u32,
    /// True when no invariant is violated.
    pub is_valid: bool,
    /// Invariant violations.
    pub errors: Vec<String>,
    /// Oddities that are not violations.
    pub warnings: Vec<String>,
}

// ============================================================================
// SECTION: Assignment Engine
// ============================================================================

/// Deterministic participant assignment engine.
pub struct AssignmentEngine<S> {
    /// Backing store.
    store: S,
    /// Per-session join serialization.
    locks: AggregateLocks,
}

impl<S> AssignmentEngine<S>
where
    S: SessionStore + ParticipantStore + EventLog,
{
    /// Creates an assignment engine over a store.
    pub const fn new(store: S, locks: AggregateLocks) -> Self {
        Self { store, locks }
    }

    /// Assigns a joining student to a deterministic slot.
    ///
    /// Idempotent: a repeat join returns the existing slot with
    /// `is_new = false` and writes no new rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] per the stable taxonomy: `UNAUTHORIZED_ROLE`,
    /// `SESSION_NOT_JOINABLE`, `SESSION_FULL`, `FORBIDDEN`, `NOT_FOUND`, or
    /// `RACE_CONDITION` when a slot uniqueness race is detected.
    pub fn assign(&self, request: &JoinRequest) -> Result<AssignmentOutcome, EngineError> {
        let session_ref =
            AggregateRef::new(AggregateType::Session, request.session_id.get());
        info!(
            session_id = request.session_id.get(),
            user_id = request.identity.user_id.get(),
            "assignment start"
        );

        if !request.identity.role.is_student() {
            let err = EngineError::UnauthorizedRole;
            self.audit_rejection(session_ref, request, &err)?;
            return Err(err);
        }

        // Serialize joins per session; other sessions proceed in parallel.
        self.locks.with_lock(session_ref, || self.assign_locked(session_ref, request))
    }

    /// Join flow run under the session lock.
    fn assign_locked(
        &self,
        session_ref: AggregateRef,
        request: &JoinRequest,
    ) -> Result<AssignmentOutcome, EngineError> {
        let session = match self.load_scoped_session(request.session_id, &request.identity) {
            Ok(session) => session,
            Err(err) => {
                self.audit_rejection(session_ref, request, &err)?;
                return Err(err);
            }
        };

        if !session.state.is_joinable() {
            let err = EngineError::SessionNotJoinable {
                session_id: session.id,
                state: session.state.as_str(),
            };
            self.audit_rejection(session_ref, request, &err)?;
            return Err(err);
        }

        // Idempotency: an existing active membership is returned unchanged.
        if let Some(existing) =
            self.store.participant_for_user(session.id, request.identity.user_id)?
        {
            return existing_outcome(&existing);
        }

        let current_count = self.store.count_active_speakers(session.id)?;
        if current_count >= MAX_PARTICIPANTS {
            let err = EngineError::SessionFull { session_id: session.id, max: MAX_PARTICIPANTS };
            self.audit_rejection(session_ref, request, &err)?;
            return Err(err);
        }

        let position = current_count + 1;
        let Some(slot) = slot_for_position(position) else {
            let err = EngineError::ValidationFailed {
                detail: format!("position {position} has no slot mapping"),
            };
            self.audit_rejection(session_ref, request, &err)?;
            return Err(err);
        };

        info!(
            session_id = session.id.get(),
            user_id = request.identity.user_id.get(),
            side = slot.side.as_str(),
            speaker_number = slot.speaker_number,
            "assigning slot"
        );

        let audit = AuditDraft::success(
            actions::PARTICIPANT_ASSIGNED,
            Actor::User(request.identity.user_id),
            request.now,
        )
        .with_payload(json!({
            "side": slot.side.as_str(),
            "speaker_number": slot.speaker_number,
            "position": position,
        }))
        .with_ip(request.ip_address.clone());

        let new = NewParticipant {
            session_id: session.id,
            user_id: request.identity.user_id,
            slot: Some(slot),
            joined_at: request.now,
        };

        match self.store.insert_participant(new, audit) {
            Ok(participant) => Ok(AssignmentOutcome {
                session_id: session.id,
                user_id: participant.user_id,
                slot,
                position,
                is_new: true,
            }),
            Err(StoreError::UniqueViolation { constraint }) if constraint == "participant_user" => {
                // Lost a duplicate-join race; the winner's row answers.
                match self.store.participant_for_user(session.id, request.identity.user_id)? {
                    Some(existing) => existing_outcome(&existing),
                    None => Err(EngineError::Store(StoreError::Corrupt(
                        "duplicate join row vanished".to_owned(),
                    ))),
                }
            }
            Err(StoreError::UniqueViolation { constraint }) if constraint == "participant_slot" => {
                warn!(
                    session_id = session.id.get(),
                    side = slot.side.as_str(),
                    speaker_number = slot.speaker_number,
                    "slot race detected"
                );
                let err = EngineError::RaceCondition {
                    side: slot.side,
                    speaker_number: slot.speaker_number,
                };
                self.audit_rejection(session_ref, request, &err)?;
                Err(err)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Lists active participants in join order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is missing or out of scope.
    pub fn roster(
        &self,
        session_id: SessionId,
        identity: &Identity,
    ) -> Result<Vec<Participant>, EngineError> {
        let session = self.load_scoped_session(session_id, identity)?;
        Ok(self.store.roster(session.id)?)
    }

    /// Recomputes assignment invariants without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is missing or out of scope.
    pub fn verify_integrity(
        &self,
        session_id: SessionId,
        identity: &Identity,
    ) -> Result<IntegrityReport, EngineError> {
        let session = self.load_scoped_session(session_id, identity)?;
        let roster = self.store.roster(session.id)?;
        let speakers: Vec<&Participant> =
            roster.iter().filter(|participant| participant.is_speaker()).collect();

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let total = u32::try_from(speakers.len()).unwrap_or(u32::MAX);
        if total > MAX_PARTICIPANTS {
            errors.push(format!("too many speakers: {total} > {MAX_PARTICIPANTS}"));
        }

        let mut user_ids: Vec<u64> =
            roster.iter().map(|participant| participant.user_id.get()).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        if user_ids.len() != roster.len() {
            errors.push("duplicate user_id found".to_owned());
        }

        let mut slots: Vec<Slot> = speakers.iter().filter_map(|participant| participant.slot).collect();
        slots.sort_by_key(|slot| (slot.side, slot.speaker_number));
        let before = slots.len();
        slots.dedup();
        if slots.len() != before {
            errors.push("duplicate (side, speaker_number) slot found".to_owned());
        }

        let petitioners = count_side(&slots, Side::Petitioner);
        let respondents = count_side(&slots, Side::Respondent);
        if petitioners > 2 {
            errors.push(format!("too many petitioners: {petitioners}"));
        }
        if respondents > 2 {
            errors.push(format!("too many respondents: {respondents}"));
        }
        for slot in &slots {
            if slot.speaker_number != 1 && slot.speaker_number != 2 {
                warnings.push(format!(
                    "unusual speaker number {} on {}",
                    slot.speaker_number,
                    slot.side.as_str()
                ));
            }
        }

        Ok(IntegrityReport {
            session_id: session.id,
            total_speakers: total,
            petitioners,
            respondents,
            is_valid: errors.is_empty(),
            errors,
            warnings,
        })
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

    /// Writes the refused-attempt audit row.
    fn audit_rejection(
        &self,
        session_ref: AggregateRef,
        request: &JoinRequest,
        err: &EngineError,
    ) -> Result<(), EngineError> {
        warn!(
            session_id = request.session_id.get(),
            user_id = request.identity.user_id.get(),
            code = err.code().as_str(),
            "join rejected"
        );
        let draft = AuditDraft::failure(
            actions::JOIN_REJECTED,
            Actor::User(request.identity.user_id),
            request.now,
            &err.to_string(),
        )
        .with_payload(json!({ "code": err.code().as_str() }))
        .with_ip(request.ip_address.clone());
        self.store.append(session_ref, draft)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the idempotent outcome for an existing membership.
fn existing_outcome(existing: &Participant) -> Result<AssignmentOutcome, EngineError> {
    let Some(slot) = existing.slot else {
        return Err(EngineError::Forbidden {
            reason: "observer membership cannot take a speaking slot".to_owned(),
        });
    };
    Ok(AssignmentOutcome {
        session_id: existing.session_id,
        user_id: existing.user_id,
        slot,
        position: position_for_slot(slot),
        is_new: false,
    })
}

/// Inverse of the slot table: recovers the 1-based join position.
const fn position_for_slot(slot: Slot) -> u32 {
    match (slot.side, slot.speaker_number) {
        (Side::Petitioner, 1) => 1,
        (Side::Respondent, 1) => 2,
        (Side::Petitioner, _) => 3,
        (Side::Respondent, _) => 4,
    }
}

/// Counts slots on one side.
fn count_side(slots: &[Slot], side: Side) -> u32 {
    u32::try_from(slots.iter().filter(|slot| slot.side == side).count()).unwrap_or(u32::MAX)
}
