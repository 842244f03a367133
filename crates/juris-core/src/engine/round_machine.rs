// crates/juris-core/src/engine/round_machine.rs
// ============================================================================
// Module: Juris Round & Turn Engine
// Description: Round lifecycle, deterministic turn order, and timers.
// Purpose: Enforce server-authoritative speaking order and phase timing.
// Dependencies: crate::{core, engine, interfaces}, serde_json, tracing
// ============================================================================

//! ## Overview
//! Rounds share the session's table-driven transition discipline and add the
//! turn engine: turn rows are created up-front in roster order, speakers start
//! and submit strictly in that order, and the timer is a pure function of
//! stored fields plus a supplied now. Any reader that observes an expired open
//! turn issues the force-submit before returning; races between a late manual
//! submit and the timer resolve at the store, which lets exactly one
//! submission win.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::core::AggregateRef;
use crate::core::AggregateType;
use crate::core::AuditDraft;
use crate::core::Identity;
use crate::core::NewRound;
use crate::core::NewTurn;
use crate::core::PhaseTimer;
use crate::core::Round;
use crate::core::RoundId;
use crate::core::RoundState;
use crate::core::SeatRef;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::Timestamp;
use crate::core::TransitionRule;
use crate::core::TriggerType;
use crate::core::Turn;
use crate::core::TurnId;
use crate::core::actions;
use crate::core::identity::Actor;
use crate::core::turn::word_count;
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::locks::AggregateLocks;
use crate::engine::locks::with_retry;
use crate::interfaces::EventLog;
use crate::interfaces::ParticipantStore;
use crate::interfaces::RoundStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A round creation request.
#[derive(Debug, Clone)]
pub struct CreateRoundRequest {
    /// Owning session.
    pub session_id: SessionId,
    /// 1-based round number within the session.
    pub round_number: u32,
    /// Petitioner seat.
    pub petitioner: SeatRef,
    /// Respondent seat.
    pub respondent: SeatRef,
    /// Judge seat, when a judge is attached.
    pub judge: Option<SeatRef>,
    /// Acting faculty identity.
    pub identity: Identity,
    /// Per-turn speaking seconds; engine default when absent.
    pub turn_seconds: Option<i64>,
    /// Request timestamp.
    pub now: Timestamp,
}

/// A round transition request.
#[derive(Debug, Clone)]
pub struct RoundTransitionRequest {
    /// Round to transition.
    pub round_id: RoundId,
    /// Requested target state.
    pub target_state: RoundState,
    /// Acting identity; `None` for internal system triggers.
    pub identity: Option<Identity>,
    /// Version the caller last observed, for optimistic checking.
    pub expected_version: Option<u64>,
    /// Faculty override: bypass the table lookup only.
    pub forced: bool,
    /// Optional human-readable reason.
    pub reason: Option<String>,
    /// Caller IP for the audit row.
    pub ip_address: Option<String>,
    /// Request timestamp.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Timer View
// ============================================================================

/// Authoritative timer read for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerView {
    /// Round observed.
    pub round_id: RoundId,
    /// Current phase.
    pub phase: RoundState,
    /// When the governing window started, if timed.
    pub started_at: Option<Timestamp>,
    /// Remaining seconds, clamped to zero; `None` for untimed phases.
    pub remaining_seconds: Option<i64>,
}

// ============================================================================
// SECTION: Round Machine
// ============================================================================

/// Round lifecycle and turn engine.
pub struct RoundMachine<S> {
    /// Backing store.
    store: S,
    /// Per-round serialization.
    locks: AggregateLocks,
    /// Engine tunables.
    config: EngineConfig,
}

impl<S> RoundMachine<S>
where
    S: RoundStore + SessionStore + ParticipantStore + EventLog,
{
    /// Creates a round machine over a store.
    pub const fn new(store: S, locks: AggregateLocks, config: EngineConfig) -> Self {
        Self { store, locks, config }
    }

    /// Creates a round with its up-front turn order from the roster.
    ///
    /// Turn order is `(PET_1, RES_1, PET_2, RES_2)` restricted to the slots
    /// actually filled by real users.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is missing, out of scope, or
    /// the actor lacks faculty authority.
    pub fn create_round(&self, request: &CreateRoundRequest) -> Result<(Round, Vec<Turn>), EngineError> {
        let session = self.load_scoped_session(request.session_id, Some(&request.identity))?;
        if !request.identity.role.has_faculty_authority() {
            return Err(EngineError::Forbidden {
                reason: "round creation requires faculty authorization".to_owned(),
            });
        }

        let roster = self.store.roster(session.id)?;
        let mut speakers: Vec<_> = roster
            .iter()
            .filter_map(|participant| {
                participant.slot.map(|slot| (slot, participant.id))
            })
            .collect();
        speakers.sort_by_key(|(slot, _)| (slot.speaker_number, slot.side));

        let allowed_seconds = request.turn_seconds.unwrap_or(self.config.default_turn_seconds);
        let turns: Vec<NewTurn> = speakers
            .iter()
            .enumerate()
            .map(|(index, (_, participant_id))| NewTurn {
                participant_id: *participant_id,
                turn_order: u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1),
                allowed_seconds,
            })
            .collect();

        let audit = AuditDraft::success(
            actions::ROUND_CREATED,
            Actor::User(request.identity.user_id),
            request.now,
        )
        .with_payload(json!({
            "round_number": request.round_number,
            "turns": turns.len(),
        }));

        let new = NewRound {
            session_id: session.id,
            round_number: request.round_number,
            petitioner: request.petitioner,
            respondent: request.respondent,
            judge: request.judge,
            created_at: request.now,
        };
        let (round, turns) = self.store.create_round(new, turns, audit)?;
        info!(
            round_id = round.id.get(),
            session_id = session.id.get(),
            turns = turns.len(),
            "round created"
        );
        Ok((round, turns))
    }

    /// Transitions a round to a target state under the table rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] per the stable taxonomy.
    pub fn transition(&self, request: &RoundTransitionRequest) -> Result<Round, EngineError> {
        let round_ref = AggregateRef::new(AggregateType::Round, request.round_id.get());
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(round_ref, || self.transition_locked(round_ref, request))
        })
    }

    /// Transition flow run under the round lock.
    fn transition_locked(
        &self,
        round_ref: AggregateRef,
        request: &RoundTransitionRequest,
    ) -> Result<Round, EngineError> {
        let round = self.load_round_checked(request.round_id)?;
        let session = self.load_scoped_session(round.session_id, request.identity.as_ref())?;
        let from_state = round.state;
        let to_state = request.target_state;

        if let Some(expected) = request.expected_version {
            if round.version != expected {
                let err =
                    EngineError::ConcurrentModification { expected, found: round.version };
                self.audit_round_refusal(round_ref, request, from_state, &err)?;
                return Err(err);
            }
        }

        if from_state == to_state {
            let draft = round_audit_base(request, from_state, to_state, true, None)
                .with_payload(json!({ "no_op": true, "forced": request.forced }));
            self.store.append(round_ref, draft)?;
            return Ok(round);
        }

        let rules = self.store.round_rules()?;
        let rule = resolve_round_rule(&rules, &round, to_state);
        let authorized = round_authority(request.identity.as_ref(), &session, &round);

        let rule = match rule {
            Some(rule) => Some(rule),
            None if request.forced => None,
            None => {
                let allowed = allowed_round_labels(&rules, &round);
                let err = EngineError::InvalidTransition {
                    from_state: from_state.as_str().to_owned(),
                    to_state: to_state.as_str().to_owned(),
                    allowed,
                };
                self.audit_round_refusal(round_ref, request, from_state, &err)?;
                return Err(err);
            }
        };

        // Faculty-gated rows accept the round judge as well; system actors
        // never take them. Ungated rows are open to system triggers.
        let requires_authority = request.forced || rule.is_some_and(|rule| rule.requires_faculty);
        if requires_authority && !authorized {
            let reason = if request.identity.is_some() {
                format!(
                    "transition {} -> {} requires faculty or judge authorization",
                    from_state.as_str(),
                    to_state.as_str()
                )
            } else {
                "system actor cannot take a faculty-gated transition".to_owned()
            };
            let err = EngineError::Forbidden { reason };
            self.audit_round_refusal(round_ref, request, from_state, &err)?;
            return Err(err);
        }

        let updated = apply_round_transition(&round, to_state, request.now, &self.config);
        let action = if request.forced {
            actions::FORCE_STATE_CHANGE
        } else {
            actions::STATE_TRANSITION
        };
        let draft = AuditDraft::success(action, round_actor(request), request.now)
            .with_states(
                Some(from_state.as_str().to_owned()),
                Some(to_state.as_str().to_owned()),
            )
            .with_payload(json!({
                "forced": request.forced,
                "trigger": rule.map(|rule| rule.trigger.as_str()),
                "reason": request.reason,
            }))
            .with_ip(request.ip_address.clone());

        let stored = match self.store.update_round(&updated, round.version, draft) {
            Ok(stored) => stored,
            Err(StoreError::VersionConflict { expected, found }) => {
                return Err(EngineError::ConcurrentModification { expected, found });
            }
            Err(err) => return Err(err.into()),
        };

        if to_state == RoundState::Completed {
            // Supervisors tail this event to propose session advances.
            let completed = AuditDraft::success(actions::ROUND_COMPLETED, Actor::System, request.now)
                .with_payload(json!({
                    "session_id": session.id.get(),
                    "round_number": stored.round_number,
                }));
            self.store.append(round_ref, completed)?;
        }

        info!(
            round_id = stored.id.get(),
            from = from_state.as_str(),
            to = to_state.as_str(),
            version = stored.version,
            "round transition success"
        );
        Ok(stored)
    }

    /// Starts a turn for its speaker.
    ///
    /// # Errors
    ///
    /// Returns `NOT_CURRENT_SPEAKER` out of order, `TURN_ALREADY_SUBMITTED`
    /// for terminal turns, `TIME_EXPIRED` after the phase window lapses.
    pub fn start_turn(
        &self,
        round_id: RoundId,
        turn_id: TurnId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<Turn, EngineError> {
        let round_ref = AggregateRef::new(AggregateType::Round, round_id.get());
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(round_ref, || self.start_turn_locked(round_id, turn_id, identity, now))
        })
    }

    /// Start flow run under the round lock.
    fn start_turn_locked(
        &self,
        round_id: RoundId,
        turn_id: TurnId,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<Turn, EngineError> {
        let round = self.load_round_checked(round_id)?;
        self.load_scoped_session(round.session_id, Some(identity))?;

        if !round.state.is_argument_phase() {
            return Err(EngineError::PreconditionFailed {
                reason: format!("round is not in an argument phase (state: {})", round.state.as_str()),
            });
        }
        if round.timer.is_expired(now) {
            return Err(EngineError::TimeExpired);
        }

        let turns = self.store.turns_for_round(round.id)?;
        let turn = find_turn(&turns, turn_id)?;
        if turn.is_submitted {
            return Err(EngineError::TurnAlreadySubmitted { turn_id });
        }
        if !is_current(&turns, turn) {
            return Err(EngineError::NotCurrentSpeaker { turn_id });
        }

        let participant = self.store.load_participant(turn.participant_id)?;
        if participant.user_id != identity.user_id {
            return Err(EngineError::Forbidden {
                reason: "only the assigned speaker may start this turn".to_owned(),
            });
        }

        if turn.started_at.is_some() {
            // Idempotent: the current speaker re-entering their open turn.
            return Ok(turn.clone());
        }

        let mut updated = turn.clone();
        updated.started_at = Some(now);
        let draft = AuditDraft::success(actions::TURN_STARTED, Actor::User(identity.user_id), now)
            .with_payload(json!({
                "turn_order": turn.turn_order,
                "allowed_seconds": turn.allowed_seconds,
            }));
        let stored = self.update_turn_mapped(&updated, draft, turn_id)?;
        info!(round_id = round.id.get(), turn_id = turn_id.get(), "turn started");
        Ok(stored)
    }

    /// Submits a turn with its transcript.
    ///
    /// A submit that reaches the store before the timer's force-submit wins,
    /// even past the allowed ceiling; once any submission commits, later
    /// submits fail `TURN_ALREADY_SUBMITTED`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] per the stable taxonomy.
    pub fn submit_turn(
        &self,
        round_id: RoundId,
        turn_id: TurnId,
        identity: &Identity,
        transcript: &str,
        now: Timestamp,
    ) -> Result<Turn, EngineError> {
        let round_ref = AggregateRef::new(AggregateType::Round, round_id.get());
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(round_ref, || {
                self.submit_turn_locked(round_id, turn_id, Some(identity), transcript, false, now)
            })
        })
    }

    /// Timer-driven submission on the speaker's behalf.
    ///
    /// Transcript may be empty; the row records `auto_submitted = true`.
    /// Multiple racing processes resolve at the store: exactly one wins.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] per the stable taxonomy.
    pub fn force_submit(
        &self,
        round_id: RoundId,
        turn_id: TurnId,
        now: Timestamp,
    ) -> Result<Turn, EngineError> {
        let round_ref = AggregateRef::new(AggregateType::Round, round_id.get());
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(round_ref, || {
                self.submit_turn_locked(round_id, turn_id, None, "", true, now)
            })
        })
    }

    /// Submission flow run under the round lock.
    fn submit_turn_locked(
        &self,
        round_id: RoundId,
        turn_id: TurnId,
        identity: Option<&Identity>,
        transcript: &str,
        auto: bool,
        now: Timestamp,
    ) -> Result<Turn, EngineError> {
        let round = self.load_round_checked(round_id)?;
        self.load_scoped_session(round.session_id, identity)?;

        let turns = self.store.turns_for_round(round.id)?;
        let turn = find_turn(&turns, turn_id)?;
        if turn.is_submitted {
            return Err(EngineError::TurnAlreadySubmitted { turn_id });
        }
        if turn.started_at.is_none() {
            return Err(EngineError::TurnNotStarted { turn_id });
        }
        if transcript.len() > self.config.max_transcript_bytes {
            return Err(EngineError::ValidationFailed {
                detail: format!(
                    "transcript exceeds {} bytes",
                    self.config.max_transcript_bytes
                ),
            });
        }
        if let Some(identity) = identity {
            let participant = self.store.load_participant(turn.participant_id)?;
            if participant.user_id != identity.user_id {
                return Err(EngineError::Forbidden {
                    reason: "only the assigned speaker may submit this turn".to_owned(),
                });
            }
        }

        let mut updated = turn.clone();
        updated.submitted_at = Some(now);
        updated.transcript = transcript.to_owned();
        updated.word_count = word_count(transcript);
        updated.is_submitted = true;
        updated.auto_submitted = auto;

        let action = if auto { actions::AUTO_SUBMIT } else { actions::TURN_SUBMITTED };
        let actor = identity.map_or(Actor::System, |identity| Actor::User(identity.user_id));
        let draft = AuditDraft::success(action, actor, now).with_payload(json!({
            "turn_order": turn.turn_order,
            "auto_submitted": auto,
            "elapsed_seconds": updated.duration_seconds(),
            "word_count": updated.word_count,
        }));
        let stored = self.update_turn_mapped(&updated, draft, turn_id)?;
        info!(
            round_id = round.id.get(),
            turn_id = turn_id.get(),
            auto_submitted = auto,
            "turn submitted"
        );

        // Last turn of the phase enqueues the round's advance; failures here
        // are advisory and the supervisor or the next reader retries.
        let all_submitted =
            turns.iter().all(|other| other.id == turn_id || other.is_submitted);
        if all_submitted {
            if let Some(next) = next_phase(round.state) {
                let advance = RoundTransitionRequest {
                    round_id: round.id,
                    target_state: next,
                    identity: None,
                    expected_version: Some(round.version),
                    forced: false,
                    reason: Some("all turns submitted".to_owned()),
                    ip_address: None,
                    now,
                };
                if let Err(err) = self.transition_locked(
                    AggregateRef::new(AggregateType::Round, round.id.get()),
                    &advance,
                ) {
                    warn!(
                        round_id = round.id.get(),
                        code = err.code().as_str(),
                        "auto-advance deferred"
                    );
                }
            }
        }
        Ok(stored)
    }

    /// Authoritative timer read; issues the force-submit when an open turn has
    /// expired, before returning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the round is missing or the store fails.
    pub fn get_timer(&self, round_id: RoundId, now: Timestamp) -> Result<TimerView, EngineError> {
        let round = self.load_round_checked(round_id)?;
        let turns = self.store.turns_for_round(round.id)?;

        if let Some(open) = turns.iter().find(|turn| turn.is_open()) {
            let started = open.started_at.unwrap_or(now);
            let remaining =
                open.allowed_seconds.saturating_sub(now.seconds_since(started)).max(0);
            if remaining == 0 {
                match self.force_submit(round.id, open.id, now) {
                    Ok(_) | Err(EngineError::TurnAlreadySubmitted { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            return Ok(TimerView {
                round_id: round.id,
                phase: round.state,
                started_at: Some(started),
                remaining_seconds: Some(remaining),
            });
        }

        Ok(TimerView {
            round_id: round.id,
            phase: round.state,
            started_at: round.timer.window.map(|window| window.started_at),
            remaining_seconds: round.timer.remaining_seconds(now),
        })
    }

    /// Force-submits every expired open turn; the optional poller calls this.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the round is missing or the store fails.
    pub fn expire_due(&self, round_id: RoundId, now: Timestamp) -> Result<Vec<TurnId>, EngineError> {
        let round = self.load_round_checked(round_id)?;
        let turns = self.store.turns_for_round(round.id)?;
        let mut expired = Vec::new();
        for turn in turns.iter().filter(|turn| turn.is_open()) {
            let started = turn.started_at.unwrap_or(now);
            if now.seconds_since(started) >= turn.allowed_seconds {
                match self.force_submit(round.id, turn.id, now) {
                    Ok(_) => expired.push(turn.id),
                    Err(EngineError::TurnAlreadySubmitted { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(expired)
    }

    /// Extends the current phase window (faculty or judge only).
    ///
    /// # Errors
    ///
    /// Returns `FORBIDDEN` without authority, `PRECONDITION_FAILED` when the
    /// phase is untimed.
    pub fn extend_time(
        &self,
        round_id: RoundId,
        identity: &Identity,
        additional_seconds: i64,
        now: Timestamp,
    ) -> Result<Round, EngineError> {
        let round_ref = AggregateRef::new(AggregateType::Round, round_id.get());
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(round_ref, || {
                let round = self.load_round_checked(round_id)?;
                let session = self.load_scoped_session(round.session_id, Some(identity))?;
                if !round_authority(Some(identity), &session, &round) {
                    return Err(EngineError::Forbidden {
                        reason: "extending time requires faculty or judge authorization"
                            .to_owned(),
                    });
                }
                if round.timer.window.is_none() {
                    return Err(EngineError::PreconditionFailed {
                        reason: "current phase is untimed".to_owned(),
                    });
                }
                let mut updated = round.clone();
                updated.timer = round.timer.extended(additional_seconds);
                updated.version = round.version.saturating_add(1);
                let draft = AuditDraft::success(
                    actions::TIME_EXTENDED,
                    Actor::User(identity.user_id),
                    now,
                )
                .with_payload(json!({ "additional_seconds": additional_seconds }));
                match self.store.update_round(&updated, round.version, draft) {
                    Ok(stored) => Ok(stored),
                    Err(StoreError::VersionConflict { expected, found }) => {
                        Err(EngineError::ConcurrentModification { expected, found })
                    }
                    Err(err) => Err(err.into()),
                }
            })
        })
    }

    /// Loads a round, mapping absence to the stable code.
    fn load_round_checked(&self, round_id: RoundId) -> Result<Round, EngineError> {
        match self.store.load_round(round_id) {
            Ok(round) => Ok(round),
            Err(StoreError::NotFound(_)) => {
                Err(EngineError::NotFound { entity: "round", id: round_id.get() })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Loads the owning session and enforces institution scoping.
    fn load_scoped_session(
        &self,
        session_id: SessionId,
        identity: Option<&Identity>,
    ) -> Result<Session, EngineError> {
        let session = match self.store.load_session(session_id) {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound { entity: "session", id: session_id.get() });
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(identity) = identity {
            if session.institution_id != identity.institution_id {
                return Err(EngineError::Forbidden {
                    reason: "session belongs to another institution".to_owned(),
                });
            }
        }
        Ok(session)
    }

    /// Writes an updated turn, mapping store immutability to the stable code.
    fn update_turn_mapped(
        &self,
        turn: &Turn,
        draft: AuditDraft,
        turn_id: TurnId,
    ) -> Result<Turn, EngineError> {
        match self.store.update_turn(turn, draft) {
            Ok(stored) => Ok(stored),
            Err(StoreError::Immutable(_)) => Err(EngineError::TurnAlreadySubmitted { turn_id }),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the refused-attempt audit row for a round transition.
    fn audit_round_refusal(
        &self,
        round_ref: AggregateRef,
        request: &RoundTransitionRequest,
        from_state: RoundState,
        err: &EngineError,
    ) -> Result<(), EngineError> {
        warn!(
            round_id = request.round_id.get(),
            from = from_state.as_str(),
            to = request.target_state.as_str(),
            code = err.code().as_str(),
            "round transition blocked"
        );
        let draft =
            round_audit_base(request, from_state, request.target_state, false, Some(&err.to_string()))
                .with_payload(json!({ "code": err.code().as_str(), "forced": request.forced }));
        self.store.append(round_ref, draft)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Pure Transition Application
// ============================================================================

/// Applies a validated transition to a round, returning the updated copy.
fn apply_round_transition(
    round: &Round,
    to_state: RoundState,
    now: Timestamp,
    config: &EngineConfig,
) -> Round {
    let mut updated = round.clone();
    let from_state = round.state;
    updated.state = to_state;
    updated.version = round.version.saturating_add(1);

    match to_state {
        RoundState::Completed | RoundState::Cancelled => {
            updated.ended_at = Some(now);
            updated.timer = PhaseTimer::default();
        }
        RoundState::Paused => {
            updated.previous_state = Some(from_state);
            updated.timer = round.timer.paused(now);
        }
        _ if from_state == RoundState::Paused => {
            updated.previous_state = None;
            updated.timer = round.timer.resumed(now);
        }
        _ => {
            updated.previous_state = None;
            updated.timer = config
                .phase_durations
                .for_round_state(to_state)
                .map_or_else(PhaseTimer::default, |duration| PhaseTimer::started(now, duration));
        }
    }
    updated
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the applicable rule, honoring the PAUSED resume special case.
fn resolve_round_rule(
    rules: &[TransitionRule<RoundState>],
    round: &Round,
    to_state: RoundState,
) -> Option<TransitionRule<RoundState>> {
    if round.state == RoundState::Paused && round.previous_state == Some(to_state) {
        return Some(TransitionRule {
            from_state: RoundState::Paused,
            to_state,
            trigger: TriggerType::Faculty,
            requires_all_rounds_complete: false,
            requires_faculty: true,
        });
    }
    TransitionRule::find(rules, round.state, to_state)
}

/// Allowed next-state labels for an error message, resume target first.
fn allowed_round_labels(rules: &[TransitionRule<RoundState>], round: &Round) -> Vec<String> {
    let mut labels = Vec::new();
    if round.state == RoundState::Paused {
        if let Some(previous) = round.previous_state {
            labels.push(previous.as_str().to_owned());
        }
    }
    labels.extend(
        TransitionRule::allowed_targets(rules, round.state)
            .into_iter()
            .map(|state| state.as_str().to_owned()),
    );
    labels
}

/// True when the identity may drive faculty-gated round rows.
fn round_authority(identity: Option<&Identity>, session: &Session, round: &Round) -> bool {
    identity.is_some_and(|identity| {
        if identity.role.has_faculty_authority() {
            return true;
        }
        session.faculty_id == identity.user_id
            || round
                .judge
                .and_then(SeatRef::user_id)
                .is_some_and(|judge_id| judge_id == identity.user_id)
    })
}

/// Actor attribution for a round request.
fn round_actor(request: &RoundTransitionRequest) -> Actor {
    request.identity.as_ref().map_or(Actor::System, |identity| Actor::User(identity.user_id))
}

/// Base audit draft for round transition rows.
fn round_audit_base(
    request: &RoundTransitionRequest,
    from_state: RoundState,
    to_state: RoundState,
    is_successful: bool,
    error_message: Option<&str>,
) -> AuditDraft {
    let action = if request.forced {
        actions::FORCE_STATE_CHANGE
    } else {
        actions::STATE_TRANSITION
    };
    let draft = if is_successful {
        AuditDraft::success(action, round_actor(request), request.now)
    } else {
        AuditDraft::failure(
            action,
            round_actor(request),
            request.now,
            error_message.unwrap_or("transition refused"),
        )
    };
    draft
        .with_states(Some(from_state.as_str().to_owned()), Some(to_state.as_str().to_owned()))
        .with_ip(request.ip_address.clone())
}

/// Finds a turn within its round, checking ownership.
fn find_turn(turns: &[Turn], turn_id: TurnId) -> Result<&Turn, EngineError> {
    turns
        .iter()
        .find(|turn| turn.id == turn_id)
        .ok_or(EngineError::NotFound { entity: "turn", id: turn_id.get() })
}

/// True when the turn is the next unsubmitted slot in speaking order.
fn is_current(turns: &[Turn], turn: &Turn) -> bool {
    turns
        .iter()
        .filter(|other| !other.is_submitted)
        .min_by_key(|other| other.turn_order)
        .is_some_and(|current| current.id == turn.id)
}

/// Next argument-flow phase after all turns of the current phase submit.
const fn next_phase(state: RoundState) -> Option<RoundState> {
    match state {
        RoundState::ArgumentPetitioner => Some(RoundState::ArgumentRespondent),
        RoundState::ArgumentRespondent => Some(RoundState::Rebuttal),
        RoundState::Rebuttal | RoundState::SurRebuttal => Some(RoundState::JudgeQuestions),
        _ => None,
    }
}
