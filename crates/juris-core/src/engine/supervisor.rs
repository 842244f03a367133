// crates/juris-core/src/engine/supervisor.rs
// ============================================================================
// Module: Juris Auto-Advance Supervisor
// Description: Event-log tailer translating round completions into candidates.
// Purpose: Propose session transitions when rounds complete, never bypassing rules.
// Dependencies: crate::{core, engine, interfaces}, tracing
// ============================================================================

//! ## Overview
//! The supervisor tails the global event stream for `ROUND_COMPLETED` rows and
//! proposes the corresponding session advance. Proposals go through the
//! ordinary session machine with a system actor: the transition table and its
//! preconditions still decide. A rejected candidate is a no-op, not an error:
//! another round may still be running, or faculty may already have advanced
//! the session. Correctness never depends on the supervisor running; it only
//! shortens the time until an unblocked transition happens.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::info;

use crate::core::AggregateType;
use crate::core::EventCursor;
use crate::core::RoundId;
use crate::core::SessionId;
use crate::core::SessionState;
use crate::core::Timestamp;
use crate::core::actions;
use crate::engine::error::EngineError;
use crate::engine::session_machine::SessionMachine;
use crate::engine::session_machine::SessionTransitionRequest;
use crate::interfaces::EventLog;
use crate::interfaces::RoundStore;
use crate::interfaces::SessionStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Poll Outcome
// ============================================================================

/// One candidate transition considered during a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOutcome {
    /// Session the candidate targeted.
    pub session_id: SessionId,
    /// Round whose completion produced the candidate.
    pub round_id: RoundId,
    /// Target state proposed.
    pub target_state: SessionState,
    /// True when the session machine accepted the candidate.
    pub applied: bool,
}

/// Result of one supervisor poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Candidates considered, in event order.
    pub candidates: Vec<CandidateOutcome>,
    /// Cursor to resume the next poll from.
    pub next_cursor: EventCursor,
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Event-driven auto-advance supervisor.
pub struct Supervisor<'machine, S> {
    /// Backing store (event stream reads).
    store: &'machine S,
    /// Session machine candidates are submitted to.
    machine: &'machine SessionMachine<S>,
}

impl<'machine, S> Supervisor<'machine, S>
where
    S: SessionStore + RoundStore + EventLog,
{
    /// Creates a supervisor over a store and session machine.
    pub const fn new(store: &'machine S, machine: &'machine SessionMachine<S>) -> Self {
        Self { store, machine }
    }

    /// Consumes `ROUND_COMPLETED` events after the cursor and submits the
    /// corresponding session-transition candidates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the event stream cannot be read;
    /// individual rejected candidates are recorded, not raised.
    pub fn poll(
        &self,
        cursor: EventCursor,
        limit: usize,
        now: Timestamp,
    ) -> Result<PollOutcome, EngineError> {
        let page = self.store.since(cursor, limit)?;
        let mut candidates = Vec::new();

        for event in &page.events {
            if event.action != actions::ROUND_COMPLETED || !event.is_successful {
                continue;
            }
            if event.aggregate.aggregate_type != AggregateType::Round {
                continue;
            }
            let Some(round_id) = RoundId::from_raw(event.aggregate.aggregate_id) else {
                continue;
            };
            let round = match self.store.load_round(round_id) {
                Ok(round) => round,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            let session = match self.store.load_session(round.session_id) {
                Ok(session) => session,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            let Some(target) = candidate_target(session.state) else {
                continue;
            };

            let request = SessionTransitionRequest {
                session_id: session.id,
                target_state: target,
                identity: None,
                expected_version: None,
                forced: false,
                reason: Some(format!("round {} completed", round.round_number)),
                ip_address: None,
                now,
            };
            let applied = match self.machine.transition(&request) {
                Ok(_) => true,
                // A rejected candidate is expected: rules still decide.
                Err(
                    EngineError::InvalidTransition { .. }
                    | EngineError::PreconditionFailed { .. }
                    | EngineError::Forbidden { .. }
                    | EngineError::ConcurrentModification { .. },
                ) => false,
                Err(err) => return Err(err),
            };
            info!(
                session_id = session.id.get(),
                round_id = round_id.get(),
                target = target.as_str(),
                applied,
                "round-completed candidate"
            );
            candidates.push(CandidateOutcome {
                session_id: session.id,
                round_id,
                target_state: target,
                applied,
            });
        }

        Ok(PollOutcome { candidates, next_cursor: page.next_cursor })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Session advance unblocked by a round completing in the given state.
const fn candidate_target(state: SessionState) -> Option<SessionState> {
    match state {
        SessionState::ArgumentPetitioner => Some(SessionState::ArgumentRespondent),
        SessionState::ArgumentRespondent => Some(SessionState::Rebuttal),
        _ => None,
    }
}
