// crates/juris-core/tests/session_transitions.rs
// ============================================================================
// Module: Session State Machine Unit Tests
// Description: Table-driven transitions, preconditions, pause math, and audit.
// Purpose: Validate the session lifecycle against the canonical rule set.
// ============================================================================

//! ## Overview
//! Covers the invalid-transition error shape with its allowed list, the
//! idempotent no-op law, forced transitions, faculty gating, the
//! all-rounds-complete precondition, optimistic version conflicts, and
//! pause/resume remaining-time arithmetic.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    missing_docs,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use juris_core::AggregateLocks;
use juris_core::AggregateRef;
use juris_core::AggregateType;
use juris_core::AssignmentEngine;
use juris_core::CreateRoundRequest;
use juris_core::EngineConfig;
use juris_core::EngineError;
use juris_core::ErrorCode;
use juris_core::Identity;
use juris_core::InMemoryStore;
use juris_core::JoinRequest;
use juris_core::Role;
use juris_core::RoundMachine;
use juris_core::RoundState;
use juris_core::RoundTransitionRequest;
use juris_core::SeatRef;
use juris_core::Session;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Timestamp;
use juris_core::UserId;
use juris_core::interfaces::EventLog;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn institution() -> juris_core::InstitutionId {
    juris_core::InstitutionId::from_raw(1).expect("nonzero institution")
}

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user")
}

fn faculty() -> Identity {
    Identity::new(user(100), Role::Faculty, institution())
}

fn student(raw: u64) -> Identity {
    Identity::new(user(raw), Role::Student, institution())
}

fn now(seconds: i64) -> Timestamp {
    Timestamp::from_unix_seconds(seconds)
}

fn machine(store: &InMemoryStore, locks: &AggregateLocks) -> SessionMachine<InMemoryStore> {
    SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default())
}

fn transition(
    machine: &SessionMachine<InMemoryStore>,
    session: &Session,
    target: SessionState,
    identity: Option<Identity>,
    at: i64,
) -> Result<Session, EngineError> {
    machine.transition(&SessionTransitionRequest {
        session_id: session.id,
        target_state: target,
        identity,
        expected_version: None,
        forced: false,
        reason: None,
        ip_address: None,
        now: now(at),
    })
}

// ============================================================================
// SECTION: Invalid Transitions
// ============================================================================

#[test]
fn created_to_judging_is_refused_with_allowed_list() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");

    let err = transition(&machine, &session, SessionState::Judging, Some(faculty()), 1)
        .expect_err("invalid transition");
    match &err {
        EngineError::InvalidTransition { allowed, .. } => {
            assert_eq!(allowed, &vec!["PREPARING".to_owned(), "CANCELLED".to_owned()]);
        }
        other => panic!("expected InvalidTransition, got {other}"),
    }
    assert_eq!(err.code(), ErrorCode::InvalidTransition);

    // No state change, and the refusal is audited.
    let reloaded = machine
        .allowed_transitions(session.id, &faculty())
        .expect("allowed transitions still queryable");
    assert_eq!(reloaded, vec![SessionState::Preparing, SessionState::Cancelled]);
    let events = store
        .replay(AggregateRef::new(AggregateType::Session, session.id.get()), 1)
        .expect("replay");
    let refusal = events.iter().rev().find(|event| !event.is_successful).expect("audited");
    assert_eq!(refusal.from_state.as_deref(), Some("CREATED"));
    assert_eq!(refusal.to_state.as_deref(), Some("JUDGING"));
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

#[test]
fn transition_to_current_state_is_a_logged_noop() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");

    let moved =
        transition(&machine, &session, SessionState::Preparing, Some(faculty()), 1).expect("move");
    assert_eq!(moved.version, session.version + 1);

    let again = transition(&machine, &moved, SessionState::Preparing, Some(faculty()), 2)
        .expect("no-op succeeds");
    assert_eq!(again.version, moved.version, "no-op must not bump the version");

    let events = store
        .replay(AggregateRef::new(AggregateType::Session, session.id.get()), 1)
        .expect("replay");
    let transitions: Vec<_> = events
        .iter()
        .filter(|event| event.action == "STATE_TRANSITION" && event.is_successful)
        .collect();
    // One real transition plus exactly one no-op row.
    assert_eq!(transitions.len(), 2);
    let noop = transitions.last().expect("noop row");
    assert_eq!(noop.payload.get("no_op").and_then(serde_json::Value::as_bool), Some(true));
}

// ============================================================================
// SECTION: Gating and Preconditions
// ============================================================================

#[test]
fn faculty_rows_refuse_students() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");

    let err = transition(&machine, &session, SessionState::Preparing, Some(student(1)), 1)
        .expect_err("student refused");
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[test]
fn forced_transitions_bypass_the_table_but_not_faculty() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");

    let err = machine
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Judging,
            identity: Some(student(1)),
            expected_version: None,
            forced: true,
            reason: None,
            ip_address: None,
            now: now(1),
        })
        .expect_err("student cannot force");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let forced = machine
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Judging,
            identity: Some(faculty()),
            expected_version: None,
            forced: true,
            reason: Some("demo override".to_owned()),
            ip_address: None,
            now: now(2),
        })
        .expect("faculty force succeeds");
    assert_eq!(forced.state, SessionState::Judging);

    let events = store
        .replay(AggregateRef::new(AggregateType::Session, session.id.get()), 1)
        .expect("replay");
    let force_row = events
        .iter()
        .rev()
        .find(|event| event.action == "FORCE_STATE_CHANGE" && event.is_successful)
        .expect("forced row audited");
    assert_eq!(
        force_row.payload.get("forced").and_then(serde_json::Value::as_bool),
        Some(true)
    );
}

#[test]
fn completion_requires_all_rounds_terminal() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");
    let session =
        transition(&machine, &session, SessionState::Preparing, Some(faculty()), 1).expect("prep");

    // Seat four students so a round can be created.
    let assignment = AssignmentEngine::new(store.clone(), locks.clone());
    for raw in 1..=4_u64 {
        assignment
            .assign(&JoinRequest {
                session_id: session.id,
                identity: student(raw),
                ip_address: None,
                now: now(2),
            })
            .expect("join");
    }
    let rounds = RoundMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let (round, _) = rounds
        .create_round(&CreateRoundRequest {
            session_id: session.id,
            round_number: 1,
            petitioner: SeatRef::User(user(1)),
            respondent: SeatRef::User(user(2)),
            judge: None,
            identity: faculty(),
            turn_seconds: None,
            now: now(3),
        })
        .expect("round");

    let session = machine
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Judging,
            identity: Some(faculty()),
            expected_version: None,
            forced: true,
            reason: None,
            ip_address: None,
            now: now(4),
        })
        .expect("force into judging");

    let err = transition(&machine, &session, SessionState::Completed, Some(faculty()), 5)
        .expect_err("round still open");
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);

    rounds
        .transition(&RoundTransitionRequest {
            round_id: round.id,
            target_state: RoundState::Cancelled,
            identity: Some(faculty()),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(6),
        })
        .expect("cancel round");

    let done = transition(&machine, &session, SessionState::Completed, Some(faculty()), 7)
        .expect("completion allowed once rounds are terminal");
    assert_eq!(done.state, SessionState::Completed);
    assert!(done.completed_at.is_some());
    assert!(!done.is_active);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn stale_version_is_a_concurrent_modification() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");

    let err = machine
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Preparing,
            identity: Some(faculty()),
            expected_version: Some(session.version + 7),
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1),
        })
        .expect_err("stale version");
    assert_eq!(err.code(), ErrorCode::ConcurrentModification);
}

// ============================================================================
// SECTION: Pause and Resume
// ============================================================================

#[test]
fn pause_freezes_the_clock_and_resume_restores_it() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");
    let session =
        transition(&machine, &session, SessionState::Preparing, Some(faculty()), 0).expect("prep");

    // Enter the timed petitioner phase at t = 1000 (600 second window).
    let session =
        transition(&machine, &session, SessionState::ArgumentPetitioner, Some(faculty()), 1_000)
            .expect("argument phase");
    assert_eq!(session.timer.remaining_seconds(now(1_100)), Some(500));

    let paused = transition(&machine, &session, SessionState::Paused, Some(faculty()), 1_100)
        .expect("pause");
    assert_eq!(paused.state, SessionState::Paused);
    assert_eq!(paused.previous_state, Some(SessionState::ArgumentPetitioner));
    // While paused the remaining time is frozen at the pause instant.
    assert_eq!(paused.timer.remaining_seconds(now(1_400)), Some(500));

    let resumed =
        transition(&machine, &paused, SessionState::ArgumentPetitioner, Some(faculty()), 1_250)
            .expect("resume");
    assert_eq!(resumed.state, SessionState::ArgumentPetitioner);
    assert_eq!(resumed.previous_state, None);
    assert_eq!(resumed.timer.pause_accumulated_seconds, 150);
    // remaining = 600 − (elapsed 300 − paused 150) = 450.
    assert_eq!(resumed.timer.remaining_seconds(now(1_300)), Some(450));
}

#[test]
fn resume_target_must_match_previous_state() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");
    let session =
        transition(&machine, &session, SessionState::Preparing, Some(faculty()), 0).expect("prep");
    let session =
        transition(&machine, &session, SessionState::ArgumentPetitioner, Some(faculty()), 1)
            .expect("argument phase");
    let paused =
        transition(&machine, &session, SessionState::Paused, Some(faculty()), 2).expect("pause");

    let err = transition(&machine, &paused, SessionState::Judging, Some(faculty()), 3)
        .expect_err("cannot resume into a different state");
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
}

// ============================================================================
// SECTION: History
// ============================================================================

#[test]
fn history_returns_newest_first() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine = machine(&store, &locks);
    let session = machine.create_session(&faculty(), now(0)).expect("create");
    let session =
        transition(&machine, &session, SessionState::Preparing, Some(faculty()), 1).expect("prep");
    transition(&machine, &session, SessionState::ArgumentPetitioner, Some(faculty()), 2)
        .expect("argue");

    let history = machine.history(session.id, &faculty(), 10).expect("history");
    assert!(history.len() >= 3);
    let mut sequences: Vec<u64> = history.iter().map(|event| event.sequence_number).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sequences, sorted, "history must be newest first");
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
    assert_eq!(sequences, expected, "per-aggregate sequences are contiguous from 1");
}
