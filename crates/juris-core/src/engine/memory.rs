// crates/juris-core/src/engine/memory.rs
// ============================================================================
// Module: Juris In-Memory Store
// Description: Mutex-guarded implementation of every store interface.
// Purpose: Single-node persistence for tests and embedded deployments.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The in-memory store holds all state behind one mutex, which makes every
//! store method an atomic unit: the domain write and its audit row commit
//! together or not at all, exactly like a database transaction. Constraint
//! behavior mirrors the durable store: uniqueness violations, version
//! conflicts, and immutability rejections carry the same constraint names so
//! engines behave identically over either backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AggregateRef;
use crate::core::AggregateType;
use crate::core::AssignmentId;
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
use crate::core::PhaseTimer;
use crate::core::PublicationMode;
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
use crate::core::round_transition_rules;
use crate::core::session_transition_rules;
use crate::interfaces::EvaluationStore;
use crate::interfaces::EventLog;
use crate::interfaces::EventPage;
use crate::interfaces::LeaderboardStore;
use crate::interfaces::ParticipantStore;
use crate::interfaces::RoundStore;
use crate::interfaces::RubricStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: State
// ============================================================================

/// All rows behind the store mutex.
#[derive(Debug, Default)]
struct MemoryState {
    /// Session rows by raw id.
    sessions: BTreeMap<u64, Session>,
    /// Participant rows by raw id.
    participants: BTreeMap<u64, Participant>,
    /// Round rows by raw id.
    rounds: BTreeMap<u64, Round>,
    /// Turn rows by raw id.
    turns: BTreeMap<u64, Turn>,
    /// Rubric versions by raw id.
    rubrics: BTreeMap<u64, RubricVersion>,
    /// Judge assignments by raw id.
    assignments: BTreeMap<u64, JudgeAssignment>,
    /// Evaluations by raw id.
    evaluations: BTreeMap<u64, JudgeEvaluation>,
    /// Snapshots by raw id.
    snapshots: BTreeMap<u64, LeaderboardSnapshot>,
    /// Entry rows across snapshots.
    entries: Vec<LeaderboardEntry>,
    /// Append-only audit log in global order.
    events: Vec<AuditEvent>,
    /// Next raw id per table.
    next_id: BTreeMap<&'static str, u64>,
}

impl MemoryState {
    /// Allocates the next raw id for a table.
    fn allocate(&mut self, table: &'static str) -> u64 {
        let next = self.next_id.entry(table).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Latest per-aggregate sequence for an aggregate stream.
    fn latest_sequence(&self, aggregate: AggregateRef) -> u64 {
        self.events
            .iter()
            .filter(|event| event.aggregate == aggregate)
            .map(|event| event.sequence_number)
            .max()
            .unwrap_or(0)
    }

    /// Appends an event, assigning sequence numbers.
    fn push_event(&mut self, aggregate: AggregateRef, draft: AuditDraft) -> AuditEvent {
        let sequence_number = self.latest_sequence(aggregate) + 1;
        let global_seq = u64::try_from(self.events.len()).unwrap_or(u64::MAX).saturating_add(1);
        let event = AuditEvent {
            global_seq,
            aggregate,
            sequence_number,
            action: draft.action,
            actor: draft.actor,
            from_state: draft.from_state,
            to_state: draft.to_state,
            payload: draft.payload,
            ip_address: draft.ip_address,
            timestamp: draft.timestamp,
            is_successful: draft.is_successful,
            error_message: draft.error_message,
        };
        self.events.push(event.clone());
        event
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-process store backing every engine interface.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    /// Shared state guarded by one mutex (the "transaction").
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, failing closed on poisoning.
    fn locked(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Io("memory store mutex poisoned".to_owned()))
    }
}

/// Non-zero id constructor for store-allocated ids.
fn nonzero(raw: u64) -> Result<std::num::NonZeroU64, StoreError> {
    std::num::NonZeroU64::new(raw)
        .ok_or_else(|| StoreError::Invalid("allocated id was zero".to_owned()))
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

impl EventLog for InMemoryStore {
    fn append(&self, aggregate: AggregateRef, draft: AuditDraft) -> Result<AuditEvent, StoreError> {
        let mut state = self.locked()?;
        Ok(state.push_event(aggregate, draft))
    }

    fn append_after(
        &self,
        aggregate: AggregateRef,
        draft: AuditDraft,
        expected_previous: u64,
    ) -> Result<AuditEvent, StoreError> {
        let mut state = self.locked()?;
        let latest = state.latest_sequence(aggregate);
        if latest != expected_previous {
            return Err(StoreError::SequenceConflict { expected: expected_previous, found: latest });
        }
        Ok(state.push_event(aggregate, draft))
    }

    fn replay(
        &self,
        aggregate: AggregateRef,
        from_sequence: u64,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .events
            .iter()
            .filter(|event| {
                event.aggregate == aggregate && event.sequence_number >= from_sequence
            })
            .cloned()
            .collect())
    }

    fn since(&self, cursor: EventCursor, limit: usize) -> Result<EventPage, StoreError> {
        let state = self.locked()?;
        let events: Vec<AuditEvent> = state
            .events
            .iter()
            .filter(|event| event.global_seq > cursor.position())
            .take(limit)
            .cloned()
            .collect();
        let next_cursor =
            events.last().map_or(cursor, |event| EventCursor::new(event.global_seq));
        Ok(EventPage { events, next_cursor })
    }
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

impl SessionStore for InMemoryStore {
    fn create_session(&self, new: NewSession, audit: AuditDraft) -> Result<Session, StoreError> {
        let mut state = self.locked()?;
        if state
            .sessions
            .values()
            .any(|session| session.session_code == new.session_code)
        {
            return Err(StoreError::UniqueViolation { constraint: "session_code".to_owned() });
        }
        if state.sessions.values().any(|session| {
            session.faculty_id == new.faculty_id && !session.state.is_terminal()
        }) {
            return Err(StoreError::UniqueViolation {
                constraint: "faculty_active_session".to_owned(),
            });
        }
        let raw = state.allocate("sessions");
        let session = Session {
            id: SessionId::new(nonzero(raw)?),
            institution_id: new.institution_id,
            faculty_id: new.faculty_id,
            session_code: new.session_code,
            state: SessionState::Created,
            previous_state: None,
            timer: PhaseTimer::default(),
            version: 1,
            created_at: new.created_at,
            state_updated_at: new.created_at,
            completed_at: None,
            cancelled_at: None,
            is_active: true,
        };
        state.sessions.insert(raw, session.clone());
        state.push_event(AggregateRef::new(AggregateType::Session, raw), audit);
        Ok(session)
    }

    fn load_session(&self, id: SessionId) -> Result<Session, StoreError> {
        let state = self.locked()?;
        state
            .sessions
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    fn find_session_by_code(&self, code: &SessionCode) -> Result<Option<Session>, StoreError> {
        let state = self.locked()?;
        Ok(state.sessions.values().find(|session| &session.session_code == code).cloned())
    }

    fn update_session(
        &self,
        session: &Session,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Session, StoreError> {
        let mut state = self.locked()?;
        let raw = session.id.get();
        let stored = state
            .sessions
            .get(&raw)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }
        state.sessions.insert(raw, session.clone());
        state.push_event(AggregateRef::new(AggregateType::Session, raw), audit);
        Ok(session.clone())
    }

    fn session_rules(&self) -> Result<Vec<TransitionRule<SessionState>>, StoreError> {
        Ok(session_transition_rules())
    }
}

// ============================================================================
// SECTION: Participant Store
// ============================================================================

impl ParticipantStore for InMemoryStore {
    fn insert_participant(
        &self,
        new: NewParticipant,
        audit: AuditDraft,
    ) -> Result<Participant, StoreError> {
        let mut state = self.locked()?;
        if !state.sessions.contains_key(&new.session_id.get()) {
            return Err(StoreError::NotFound(format!("session {}", new.session_id)));
        }
        let duplicate_user = state.participants.values().any(|participant| {
            participant.session_id == new.session_id
                && participant.user_id == new.user_id
                && participant.is_active
        });
        if duplicate_user {
            return Err(StoreError::UniqueViolation {
                constraint: "participant_user".to_owned(),
            });
        }
        if let Some(slot) = new.slot {
            let duplicate_slot = state.participants.values().any(|participant| {
                participant.session_id == new.session_id
                    && participant.is_active
                    && participant.slot == Some(slot)
            });
            if duplicate_slot {
                return Err(StoreError::UniqueViolation {
                    constraint: "participant_slot".to_owned(),
                });
            }
        }
        let raw = state.allocate("participants");
        let participant = Participant {
            id: ParticipantId::new(nonzero(raw)?),
            session_id: new.session_id,
            user_id: new.user_id,
            slot: new.slot,
            joined_at: new.joined_at,
            is_active: true,
            connection: ConnectionStatus::Connected,
            last_seen_at: new.joined_at,
        };
        state.participants.insert(raw, participant.clone());
        // Join audit rows live on the owning session's stream.
        state.push_event(
            AggregateRef::new(AggregateType::Session, new.session_id.get()),
            audit,
        );
        Ok(participant)
    }

    fn load_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        let state = self.locked()?;
        state
            .participants
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))
    }

    fn participant_for_user(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .participants
            .values()
            .find(|participant| {
                participant.session_id == session_id
                    && participant.user_id == user_id
                    && participant.is_active
            })
            .cloned())
    }

    fn count_active_speakers(&self, session_id: SessionId) -> Result<u32, StoreError> {
        let state = self.locked()?;
        let count = state
            .participants
            .values()
            .filter(|participant| {
                participant.session_id == session_id
                    && participant.is_active
                    && participant.slot.is_some()
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn roster(&self, session_id: SessionId) -> Result<Vec<Participant>, StoreError> {
        let state = self.locked()?;
        let mut roster: Vec<Participant> = state
            .participants
            .values()
            .filter(|participant| participant.session_id == session_id && participant.is_active)
            .cloned()
            .collect();
        roster.sort_by_key(|participant| (participant.joined_at, participant.id));
        Ok(roster)
    }

    fn update_connection(
        &self,
        id: ParticipantId,
        status: ConnectionStatus,
        last_seen_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.locked()?;
        let participant = state
            .participants
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))?;
        participant.connection = status;
        participant.last_seen_at = last_seen_at;
        Ok(())
    }
}

// ============================================================================
// SECTION: Round Store
// ============================================================================

impl RoundStore for InMemoryStore {
    fn create_round(
        &self,
        new: NewRound,
        turns: Vec<NewTurn>,
        audit: AuditDraft,
    ) -> Result<(Round, Vec<Turn>), StoreError> {
        let mut state = self.locked()?;
        if !state.sessions.contains_key(&new.session_id.get()) {
            return Err(StoreError::NotFound(format!("session {}", new.session_id)));
        }
        let raw = state.allocate("rounds");
        let round = Round {
            id: RoundId::new(nonzero(raw)?),
            session_id: new.session_id,
            round_number: new.round_number,
            petitioner: new.petitioner,
            respondent: new.respondent,
            judge: new.judge,
            state: RoundState::Waiting,
            previous_state: None,
            timer: PhaseTimer::default(),
            version: 1,
            created_at: new.created_at,
            ended_at: None,
        };
        state.rounds.insert(raw, round.clone());
        let mut stored_turns = Vec::with_capacity(turns.len());
        for new_turn in turns {
            let turn_raw = state.allocate("turns");
            let turn = Turn {
                id: TurnId::new(nonzero(turn_raw)?),
                round_id: round.id,
                participant_id: new_turn.participant_id,
                turn_order: new_turn.turn_order,
                allowed_seconds: new_turn.allowed_seconds,
                started_at: None,
                submitted_at: None,
                transcript: String::new(),
                word_count: 0,
                is_submitted: false,
                auto_submitted: false,
            };
            state.turns.insert(turn_raw, turn.clone());
            stored_turns.push(turn);
        }
        state.push_event(AggregateRef::new(AggregateType::Round, raw), audit);
        Ok((round, stored_turns))
    }

    fn load_round(&self, id: RoundId) -> Result<Round, StoreError> {
        let state = self.locked()?;
        state
            .rounds
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("round {id}")))
    }

    fn rounds_for_session(&self, session_id: SessionId) -> Result<Vec<Round>, StoreError> {
        let state = self.locked()?;
        let mut rounds: Vec<Round> = state
            .rounds
            .values()
            .filter(|round| round.session_id == session_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|round| round.round_number);
        Ok(rounds)
    }

    fn update_round(
        &self,
        round: &Round,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Round, StoreError> {
        let mut state = self.locked()?;
        let raw = round.id.get();
        let stored = state
            .rounds
            .get(&raw)
            .ok_or_else(|| StoreError::NotFound(format!("round {}", round.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }
        state.rounds.insert(raw, round.clone());
        state.push_event(AggregateRef::new(AggregateType::Round, raw), audit);
        Ok(round.clone())
    }

    fn round_rules(&self) -> Result<Vec<TransitionRule<RoundState>>, StoreError> {
        Ok(round_transition_rules())
    }

    fn load_turn(&self, id: TurnId) -> Result<Turn, StoreError> {
        let state = self.locked()?;
        state
            .turns
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("turn {id}")))
    }

    fn turns_for_round(&self, round_id: RoundId) -> Result<Vec<Turn>, StoreError> {
        let state = self.locked()?;
        let mut turns: Vec<Turn> = state
            .turns
            .values()
            .filter(|turn| turn.round_id == round_id)
            .cloned()
            .collect();
        turns.sort_by_key(|turn| turn.turn_order);
        Ok(turns)
    }

    fn update_turn(&self, turn: &Turn, audit: AuditDraft) -> Result<Turn, StoreError> {
        let mut state = self.locked()?;
        let raw = turn.id.get();
        let stored = state
            .turns
            .get(&raw)
            .ok_or_else(|| StoreError::NotFound(format!("turn {}", turn.id)))?;
        if stored.is_submitted {
            return Err(StoreError::Immutable("turn already submitted".to_owned()));
        }
        state.turns.insert(raw, turn.clone());
        state.push_event(AggregateRef::new(AggregateType::Turn, raw), audit);
        Ok(turn.clone())
    }
}

// ============================================================================
// SECTION: Rubric Store
// ============================================================================

impl RubricStore for InMemoryStore {
    fn put_rubric(&self, rubric: RubricVersion) -> Result<(), StoreError> {
        let mut state = self.locked()?;
        let raw = rubric.id.get();
        if state.rubrics.contains_key(&raw) {
            return Err(StoreError::UniqueViolation { constraint: "rubric_version".to_owned() });
        }
        state.rubrics.insert(raw, rubric);
        Ok(())
    }

    fn load_rubric(&self, id: RubricVersionId) -> Result<RubricVersion, StoreError> {
        let state = self.locked()?;
        state
            .rubrics
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rubric version {id}")))
    }
}

// ============================================================================
// SECTION: Evaluation Store
// ============================================================================

impl EvaluationStore for InMemoryStore {
    fn put_assignment(&self, new: NewJudgeAssignment) -> Result<JudgeAssignment, StoreError> {
        let mut state = self.locked()?;
        let duplicate = state.assignments.values().any(|assignment| {
            assignment.judge_id == new.judge_id && assignment.target == new.target
        });
        if duplicate {
            return Err(StoreError::UniqueViolation {
                constraint: "assignment_judge_target".to_owned(),
            });
        }
        let raw = state.allocate("assignments");
        let assignment = JudgeAssignment {
            id: AssignmentId::new(nonzero(raw)?),
            judge_id: new.judge_id,
            target: new.target,
            is_blind: new.is_blind,
        };
        state.assignments.insert(raw, assignment);
        Ok(assignment)
    }

    fn assignment_for(
        &self,
        judge_id: UserId,
        target: EvaluationTarget,
    ) -> Result<Option<JudgeAssignment>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .assignments
            .values()
            .find(|assignment| assignment.judge_id == judge_id && assignment.target == target)
            .copied())
    }

    fn insert_evaluation(
        &self,
        new: NewJudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError> {
        let mut state = self.locked()?;
        let duplicate = state.evaluations.values().any(|evaluation| {
            evaluation.target == new.target && evaluation.judge_id == new.judge_id
        });
        if duplicate {
            return Err(StoreError::UniqueViolation {
                constraint: "evaluation_target_judge".to_owned(),
            });
        }
        let raw = state.allocate("evaluations");
        let evaluation = JudgeEvaluation {
            id: EvaluationId::new(nonzero(raw)?),
            target: new.target,
            judge_id: new.judge_id,
            rubric_version_id: new.rubric_version_id,
            scores: new.scores,
            total_score: new.total_score,
            remarks: new.remarks,
            is_draft: true,
            is_final: false,
            finalized_at: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        state.evaluations.insert(raw, evaluation.clone());
        state.push_event(AggregateRef::new(AggregateType::Evaluation, raw), audit);
        Ok(evaluation)
    }

    fn update_evaluation(
        &self,
        evaluation: &JudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError> {
        let mut state = self.locked()?;
        let raw = evaluation.id.get();
        let stored = state
            .evaluations
            .get(&raw)
            .ok_or_else(|| StoreError::NotFound(format!("evaluation {}", evaluation.id)))?;
        if stored.is_final {
            return Err(StoreError::Immutable("evaluation is finalized".to_owned()));
        }
        state.evaluations.insert(raw, evaluation.clone());
        state.push_event(AggregateRef::new(AggregateType::Evaluation, raw), audit);
        Ok(evaluation.clone())
    }

    fn load_evaluation(&self, id: EvaluationId) -> Result<JudgeEvaluation, StoreError> {
        let state = self.locked()?;
        state
            .evaluations
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("evaluation {id}")))
    }

    fn evaluation_for(
        &self,
        target: EvaluationTarget,
        judge_id: UserId,
    ) -> Result<Option<JudgeEvaluation>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .evaluations
            .values()
            .find(|evaluation| evaluation.target == target && evaluation.judge_id == judge_id)
            .cloned())
    }

    fn finalized_for_target(
        &self,
        target: EvaluationTarget,
    ) -> Result<Vec<JudgeEvaluation>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .evaluations
            .values()
            .filter(|evaluation| evaluation.target == target && evaluation.is_final)
            .cloned()
            .collect())
    }

    fn finalized_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<JudgeEvaluation>, StoreError> {
        let state = self.locked()?;
        let round_ids: Vec<RoundId> = state
            .rounds
            .values()
            .filter(|round| round.session_id == session_id)
            .map(|round| round.id)
            .collect();
        Ok(state
            .evaluations
            .values()
            .filter(|evaluation| {
                evaluation.is_final && round_ids.contains(&evaluation.target.round_id)
            })
            .cloned()
            .collect())
    }

    fn judge_has_assignment_in_session(
        &self,
        judge_id: UserId,
        session_id: SessionId,
    ) -> Result<bool, StoreError> {
        let state = self.locked()?;
        let round_ids: Vec<RoundId> = state
            .rounds
            .values()
            .filter(|round| round.session_id == session_id)
            .map(|round| round.id)
            .collect();
        Ok(state.assignments.values().any(|assignment| {
            assignment.judge_id == judge_id && round_ids.contains(&assignment.target.round_id)
        }))
    }
}

// ============================================================================
// SECTION: Leaderboard Store
// ============================================================================

impl LeaderboardStore for InMemoryStore {
    fn insert_snapshot(
        &self,
        new: NewSnapshot,
        entries: Vec<NewLeaderboardEntry>,
        audit: AuditDraft,
    ) -> Result<(LeaderboardSnapshot, Vec<LeaderboardEntry>), StoreError> {
        let mut state = self.locked()?;
        let duplicate =
            state.snapshots.values().any(|snapshot| snapshot.session_id == new.session_id);
        if duplicate {
            return Err(StoreError::UniqueViolation {
                constraint: "snapshot_session".to_owned(),
            });
        }
        let raw = state.allocate("snapshots");
        let snapshot = LeaderboardSnapshot {
            id: SnapshotId::new(nonzero(raw)?),
            session_id: new.session_id,
            institution_id: new.institution_id,
            frozen_at: new.frozen_at,
            frozen_by: new.frozen_by,
            rubric_version_id: new.rubric_version_id,
            total_participants: new.total_participants,
            checksum_hash: new.checksum_hash,
            is_pending_approval: false,
            is_finalized: false,
            finalized_at: None,
            publication_mode: PublicationMode::Draft,
            publication_date: None,
            is_published: false,
            published_at: None,
            published_by: None,
            is_invalidated: false,
            invalidated_reason: None,
            invalidated_at: None,
            invalidated_by: None,
        };
        let stored_entries: Vec<LeaderboardEntry> = entries
            .into_iter()
            .map(|entry| LeaderboardEntry {
                snapshot_id: snapshot.id,
                participant_id: entry.participant_id,
                side: entry.side,
                speaker_number: entry.speaker_number,
                total_score: entry.total_score,
                tie_breaker_score: entry.tie_breaker_score,
                rank: entry.rank,
                score_breakdown: entry.score_breakdown,
                evaluation_ids: entry.evaluation_ids,
            })
            .collect();
        state.snapshots.insert(raw, snapshot.clone());
        state.entries.extend(stored_entries.iter().cloned());
        state.push_event(AggregateRef::new(AggregateType::Snapshot, raw), audit);
        Ok((snapshot, stored_entries))
    }

    fn load_snapshot(&self, id: SnapshotId) -> Result<LeaderboardSnapshot, StoreError> {
        let state = self.locked()?;
        state
            .snapshots
            .get(&id.get())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("snapshot {id}")))
    }

    fn snapshot_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LeaderboardSnapshot>, StoreError> {
        let state = self.locked()?;
        Ok(state
            .snapshots
            .values()
            .find(|snapshot| snapshot.session_id == session_id)
            .cloned())
    }

    fn snapshot_entries(&self, id: SnapshotId) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let state = self.locked()?;
        let mut entries: Vec<LeaderboardEntry> = state
            .entries
            .iter()
            .filter(|entry| entry.snapshot_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.rank, entry.participant_id));
        Ok(entries)
    }

    fn update_snapshot_governance(
        &self,
        snapshot: &LeaderboardSnapshot,
        audit: AuditDraft,
    ) -> Result<LeaderboardSnapshot, StoreError> {
        let mut state = self.locked()?;
        let raw = snapshot.id.get();
        let stored = state
            .snapshots
            .get(&raw)
            .ok_or_else(|| StoreError::NotFound(format!("snapshot {}", snapshot.id)))?;
        let frozen_fields_differ = stored.session_id != snapshot.session_id
            || stored.institution_id != snapshot.institution_id
            || stored.frozen_at != snapshot.frozen_at
            || stored.frozen_by != snapshot.frozen_by
            || stored.rubric_version_id != snapshot.rubric_version_id
            || stored.total_participants != snapshot.total_participants
            || stored.checksum_hash != snapshot.checksum_hash;
        if frozen_fields_differ {
            return Err(StoreError::Immutable(
                "snapshot freeze metadata cannot change".to_owned(),
            ));
        }
        state.snapshots.insert(raw, snapshot.clone());
        state.push_event(AggregateRef::new(AggregateType::Snapshot, raw), audit);
        Ok(snapshot.clone())
    }
}
