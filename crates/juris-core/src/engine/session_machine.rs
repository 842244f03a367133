// crates/juris-core/src/engine/session_machine.rs
// ============================================================================
// Module: Juris Session State Machine
// Description: Data-driven session lifecycle transitions with audit pairing.
// Purpose: Advance sessions under strict table rules, preconditions, and locks.
// Dependencies: crate::{core, engine, interfaces}, serde_json, tracing
// ============================================================================

//! ## Overview
//! Session transitions are rows in a table, not code paths. The machine locks
//! the aggregate, checks the optimistic version, treats `current == target` as
//! an audited no-op, looks the transition up in the store-resident table, and
//! enforces the row's preconditions before writing. Forced transitions bypass
//! only the table lookup; they still require faculty and still audit with
//! `forced = true`. Resume from PAUSED targets the recorded previous state,
//! the one transition a static table cannot express.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::core::AggregateRef;
use crate::core::AggregateType;
use crate::core::AuditDraft;
use crate::core::AuditEvent;
use crate::core::Identity;
use crate::core::NewSession;
use crate::core::PhaseTimer;
use crate::core::Session;
use crate::core::SessionCode;
use crate::core::SessionId;
use crate::core::SessionState;
use crate::core::Timestamp;
use crate::core::TransitionRule;
use crate::core::TriggerType;
use crate::core::actions;
use crate::core::identity::Actor;
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::locks::AggregateLocks;
use crate::engine::locks::with_retry;
use crate::interfaces::EventLog;
use crate::interfaces::RoundStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A session transition request.
#[derive(Debug, Clone)]
pub struct SessionTransitionRequest {
    /// Session to transition.
    pub session_id: SessionId,
    /// Requested target state.
    pub target_state: SessionState,
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
// SECTION: Session Machine
// ============================================================================

/// Data-driven session lifecycle machine.
pub struct SessionMachine<S> {
    /// Backing store.
    store: S,
    /// Per-session serialization.
    locks: AggregateLocks,
    /// Engine tunables (phase durations).
    config: EngineConfig,
}

impl<S> SessionMachine<S>
where
    S: SessionStore + RoundStore + EventLog,
{
    /// Creates a session machine over a store.
    pub const fn new(store: S, locks: AggregateLocks, config: EngineConfig) -> Self {
        Self { store, locks, config }
    }

    /// Creates a session in CREATED with a fresh CSPRNG join code.
    ///
    /// Code clashes are resolved by regeneration; the one-active-session rule
    /// per faculty is enforced by the store's partial uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `FORBIDDEN` without faculty authority, `PRECONDITION_FAILED`
    /// when the faculty already owns a non-terminal session.
    pub fn create_session(
        &self,
        identity: &Identity,
        now: Timestamp,
    ) -> Result<Session, EngineError> {
        if !identity.role.has_faculty_authority() {
            return Err(EngineError::Forbidden {
                reason: "session creation requires faculty authorization".to_owned(),
            });
        }
        // A handful of attempts is overwhelming odds against 36^6 codes.
        for _ in 0..5 {
            let session_code = SessionCode::generate();
            let audit = AuditDraft::success(
                actions::SESSION_CREATED,
                Actor::User(identity.user_id),
                now,
            )
            .with_payload(json!({ "session_code": session_code.as_str() }));
            let new = NewSession {
                institution_id: identity.institution_id,
                faculty_id: identity.user_id,
                session_code,
                created_at: now,
            };
            match self.store.create_session(new, audit) {
                Ok(session) => {
                    info!(session_id = session.id.get(), "session created");
                    return Ok(session);
                }
                Err(StoreError::UniqueViolation { constraint })
                    if constraint == "session_code" => {}
                Err(StoreError::UniqueViolation { constraint })
                    if constraint == "faculty_active_session" =>
                {
                    return Err(EngineError::PreconditionFailed {
                        reason: "faculty already owns an active session".to_owned(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(EngineError::Store(StoreError::Io(
            "session code generation kept clashing".to_owned(),
        )))
    }

    /// Transitions a session to a target state under the table rules.
    ///
    /// Idempotent: when the session is already in the target state, a no-op
    /// audit row is written and the unchanged session returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] per the stable taxonomy: `INVALID_TRANSITION`,
    /// `FORBIDDEN`, `PRECONDITION_FAILED`, `CONCURRENT_MODIFICATION`,
    /// `NOT_FOUND`.
    pub fn transition(&self, request: &SessionTransitionRequest) -> Result<Session, EngineError> {
        let session_ref = AggregateRef::new(AggregateType::Session, request.session_id.get());
        info!(
            session_id = request.session_id.get(),
            target = request.target_state.as_str(),
            forced = request.forced,
            "session transition attempt"
        );
        with_retry(&self.config.retry_backoff_ms, || {
            self.locks.with_lock(session_ref, || self.transition_locked(session_ref, request))
        })
    }

    /// Transition flow run under the session lock.
    fn transition_locked(
        &self,
        session_ref: AggregateRef,
        request: &SessionTransitionRequest,
    ) -> Result<Session, EngineError> {
        let session = self.load_scoped(request.session_id, request.identity.as_ref())?;
        let from_state = session.state;
        let to_state = request.target_state;

        if let Some(expected) = request.expected_version {
            if session.version != expected {
                let err = EngineError::ConcurrentModification {
                    expected,
                    found: session.version,
                };
                self.audit_refusal(session_ref, request, from_state, &err)?;
                return Err(err);
            }
        }

        // Idempotency: already in the target state is a logged no-op.
        if from_state == to_state {
            info!(session_id = session.id.get(), state = to_state.as_str(), "transition no-op");
            let draft = audit_base(request, from_state, to_state, true, None)
                .with_payload(json!({ "no_op": true, "forced": request.forced }));
            self.store.append(session_ref, draft)?;
            return Ok(session);
        }

        let rules = self.store.session_rules()?;
        let rule = resolve_rule(&rules, &session, to_state);
        let is_faculty = request
            .identity
            .as_ref()
            .is_some_and(|identity| identity.role.has_faculty_authority());

        let rule = match rule {
            Some(rule) => Some(rule),
            None if request.forced => None,
            None => {
                let allowed = allowed_labels(&rules, &session);
                let err = EngineError::InvalidTransition {
                    from_state: from_state.as_str().to_owned(),
                    to_state: to_state.as_str().to_owned(),
                    allowed,
                };
                self.audit_refusal(session_ref, request, from_state, &err)?;
                return Err(err);
            }
        };

        // Forced transitions bypass the table only; faculty is still required.
        let requires_faculty = request.forced || rule.is_some_and(|rule| rule.requires_faculty);
        if requires_faculty && !is_faculty {
            let err = EngineError::Forbidden {
                reason: format!(
                    "transition {} -> {} requires faculty authorization",
                    from_state.as_str(),
                    to_state.as_str()
                ),
            };
            self.audit_refusal(session_ref, request, from_state, &err)?;
            return Err(err);
        }

        if rule.is_some_and(|rule| rule.requires_all_rounds_complete) {
            let rounds = self.store.rounds_for_session(session.id)?;
            let incomplete =
                rounds.iter().filter(|round| !round.state.is_terminal()).count();
            if incomplete > 0 {
                let err = EngineError::PreconditionFailed {
                    reason: format!(
                        "all rounds must be completed before this transition \
                         ({incomplete} incomplete)"
                    ),
                };
                self.audit_refusal(session_ref, request, from_state, &err)?;
                return Err(err);
            }
        }

        let updated = apply_session_transition(&session, to_state, request.now, &self.config);
        let action = if request.forced {
            actions::FORCE_STATE_CHANGE
        } else {
            actions::STATE_TRANSITION
        };
        let draft = AuditDraft::success(action, actor_of(request), request.now)
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

        let stored = match self.store.update_session(&updated, session.version, draft) {
            Ok(stored) => stored,
            Err(StoreError::VersionConflict { expected, found }) => {
                return Err(EngineError::ConcurrentModification { expected, found });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            session_id = stored.id.get(),
            from = from_state.as_str(),
            to = to_state.as_str(),
            version = stored.version,
            "session transition success"
        );
        Ok(stored)
    }

    /// Lists the allowed next states for a session, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is missing or out of scope.
    pub fn allowed_transitions(
        &self,
        session_id: SessionId,
        identity: &Identity,
    ) -> Result<Vec<SessionState>, EngineError> {
        let session = self.load_scoped(session_id, Some(identity))?;
        let rules = self.store.session_rules()?;
        let mut targets = Vec::new();
        if session.state == SessionState::Paused {
            if let Some(previous) = session.previous_state {
                targets.push(previous);
            }
        }
        targets.extend(TransitionRule::allowed_targets(&rules, session.state));
        Ok(targets)
    }

    /// Returns the audit-backed transition history, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session is missing or out of scope.
    pub fn history(
        &self,
        session_id: SessionId,
        identity: &Identity,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, EngineError> {
        let session = self.load_scoped(session_id, Some(identity))?;
        let session_ref = AggregateRef::new(AggregateType::Session, session.id.get());
        let mut events = self.store.replay(session_ref, 1)?;
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    /// Loads a session and enforces institution scoping, failing closed.
    fn load_scoped(
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

    /// Writes the refused-attempt audit row.
    fn audit_refusal(
        &self,
        session_ref: AggregateRef,
        request: &SessionTransitionRequest,
        from_state: SessionState,
        err: &EngineError,
    ) -> Result<(), EngineError> {
        warn!(
            session_id = request.session_id.get(),
            from = from_state.as_str(),
            to = request.target_state.as_str(),
            code = err.code().as_str(),
            "session transition blocked"
        );
        let draft =
            audit_base(request, from_state, request.target_state, false, Some(&err.to_string()))
                .with_payload(json!({ "code": err.code().as_str(), "forced": request.forced }));
        self.store.append(session_ref, draft)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Pure Transition Application
// ============================================================================

/// Applies a validated transition to a session, returning the updated copy.
fn apply_session_transition(
    session: &Session,
    to_state: SessionState,
    now: Timestamp,
    config: &EngineConfig,
) -> Session {
    let mut updated = session.clone();
    let from_state = session.state;
    updated.state = to_state;
    updated.version = session.version.saturating_add(1);
    updated.state_updated_at = now;

    match to_state {
        SessionState::Completed => {
            updated.completed_at = Some(now);
            updated.is_active = false;
            updated.timer = PhaseTimer::default();
        }
        SessionState::Cancelled => {
            updated.cancelled_at = Some(now);
            updated.is_active = false;
            updated.timer = PhaseTimer::default();
        }
        SessionState::Paused => {
            updated.previous_state = Some(from_state);
            updated.timer = session.timer.paused(now);
        }
        _ if from_state == SessionState::Paused => {
            updated.previous_state = None;
            updated.timer = session.timer.resumed(now);
        }
        _ => {
            updated.previous_state = None;
            updated.timer = config
                .phase_durations
                .for_session_state(to_state)
                .map_or_else(PhaseTimer::default, |duration| PhaseTimer::started(now, duration));
        }
    }
    updated
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the applicable rule, honoring the PAUSED resume special case.
fn resolve_rule(
    rules: &[TransitionRule<SessionState>],
    session: &Session,
    to_state: SessionState,
) -> Option<TransitionRule<SessionState>> {
    if session.state == SessionState::Paused && session.previous_state == Some(to_state) {
        // Resume: synthesize a faculty-gated row back to the prior state.
        return Some(TransitionRule {
            from_state: SessionState::Paused,
            to_state,
            trigger: TriggerType::Faculty,
            requires_all_rounds_complete: false,
            requires_faculty: true,
        });
    }
    TransitionRule::find(rules, session.state, to_state)
}

/// Base audit draft shared by success, no-op, and refusal rows.
fn audit_base(
    request: &SessionTransitionRequest,
    from_state: SessionState,
    to_state: SessionState,
    is_successful: bool,
    error_message: Option<&str>,
) -> AuditDraft {
    let action = if request.forced {
        actions::FORCE_STATE_CHANGE
    } else {
        actions::STATE_TRANSITION
    };
    let draft = if is_successful {
        AuditDraft::success(action, actor_of(request), request.now)
    } else {
        AuditDraft::failure(
            action,
            actor_of(request),
            request.now,
            error_message.unwrap_or("transition refused"),
        )
    };
    draft
        .with_states(Some(from_state.as_str().to_owned()), Some(to_state.as_str().to_owned()))
        .with_ip(request.ip_address.clone())
}

/// Actor attribution for a request.
fn actor_of(request: &SessionTransitionRequest) -> Actor {
    request.identity.as_ref().map_or(Actor::System, |identity| Actor::User(identity.user_id))
}

/// Allowed next-state labels for an error message, resume target first.
fn allowed_labels(rules: &[TransitionRule<SessionState>], session: &Session) -> Vec<String> {
    let mut labels = Vec::new();
    if session.state == SessionState::Paused {
        if let Some(previous) = session.previous_state {
            labels.push(previous.as_str().to_owned());
        }
    }
    labels.extend(
        TransitionRule::allowed_targets(rules, session.state)
            .into_iter()
            .map(|state| state.as_str().to_owned()),
    );
    labels
}
