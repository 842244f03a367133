// crates/juris-core/tests/assignment_unit.rs
// ============================================================================
// Module: Assignment Engine Unit Tests
// Description: Deterministic slot assignment, idempotency, and race behavior.
// Purpose: Validate the join flow against the fixed four-slot composition.
// ============================================================================

//! ## Overview
//! Covers the deterministic assignment table, the full-session boundary, the
//! duplicate-join idempotency law, role gating, audit rows for refusals, and
//! concurrent joins racing for the four slots.

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

use std::sync::Arc;
use std::thread;

use juris_core::AggregateLocks;
use juris_core::AggregateRef;
use juris_core::AggregateType;
use juris_core::AssignmentEngine;
use juris_core::EngineConfig;
use juris_core::EngineError;
use juris_core::ErrorCode;
use juris_core::Identity;
use juris_core::InMemoryStore;
use juris_core::JoinRequest;
use juris_core::Role;
use juris_core::Session;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Side;
use juris_core::Timestamp;
use juris_core::UserId;
use juris_core::interfaces::EventLog;
use juris_core::participant::slot_for_position;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn institution() -> juris_core::InstitutionId {
    juris_core::InstitutionId::from_raw(1).expect("nonzero institution")
}

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user")
}

fn student(raw: u64) -> Identity {
    Identity::new(user(raw), Role::Student, institution())
}

fn faculty(raw: u64) -> Identity {
    Identity::new(user(raw), Role::Faculty, institution())
}

fn now(seconds: i64) -> Timestamp {
    Timestamp::from_unix_seconds(seconds)
}

/// Creates a session owned by faculty 100 and moves it to PREPARING.
fn preparing_session(store: &InMemoryStore, locks: &AggregateLocks) -> Session {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let machine =
        SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let session = machine.create_session(&faculty(100), now(0)).expect("create session");
    machine
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Preparing,
            identity: Some(faculty(100)),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1),
        })
        .expect("move to preparing")
}

fn join(engine: &AssignmentEngine<InMemoryStore>, session: &Session, identity: Identity, at: i64)
    -> Result<juris_core::AssignmentOutcome, EngineError> {
    engine.assign(&JoinRequest {
        session_id: session.id,
        identity,
        ip_address: Some("198.51.100.7".to_owned()),
        now: now(at),
    })
}

// ============================================================================
// SECTION: Slot Table
// ============================================================================

#[test]
fn slot_table_is_the_fixed_mapping() {
    let expected = [
        (1, Side::Petitioner, 1),
        (2, Side::Respondent, 1),
        (3, Side::Petitioner, 2),
        (4, Side::Respondent, 2),
    ];
    for (position, side, speaker) in expected {
        let slot = slot_for_position(position).expect("mapped position");
        assert_eq!(slot.side, side);
        assert_eq!(slot.speaker_number, speaker);
    }
    assert!(slot_for_position(0).is_none());
    assert!(slot_for_position(5).is_none());
}

// ============================================================================
// SECTION: Deterministic Assignment
// ============================================================================

#[test]
fn four_joins_fill_the_composition_in_order() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let session = preparing_session(&store, &locks);
    let engine = AssignmentEngine::new(store.clone(), locks);

    let expected = [
        (1_u64, Side::Petitioner, 1_u8),
        (2, Side::Respondent, 1),
        (3, Side::Petitioner, 2),
        (4, Side::Respondent, 2),
    ];
    for (raw, side, speaker) in expected {
        let outcome = join(&engine, &session, student(raw), 10).expect("join succeeds");
        assert!(outcome.is_new);
        assert_eq!(outcome.slot.side, side);
        assert_eq!(outcome.slot.speaker_number, speaker);
        assert_eq!(outcome.position, u32::try_from(raw).unwrap());
    }

    let roster = engine.roster(session.id, &faculty(100)).expect("roster");
    assert_eq!(roster.len(), 4);

    let fifth = join(&engine, &session, student(5), 11);
    match fifth {
        Err(err) => assert_eq!(err.code(), ErrorCode::SessionFull),
        Ok(outcome) => panic!("fifth join unexpectedly succeeded: {outcome:?}"),
    }

    // The refusal is audited with is_successful = false.
    let events = store
        .replay(AggregateRef::new(AggregateType::Session, session.id.get()), 1)
        .expect("replay");
    let rejection = events
        .iter()
        .rev()
        .find(|event| event.action == "JOIN_REJECTED")
        .expect("rejection audited");
    assert!(!rejection.is_successful);
    assert!(rejection.error_message.as_deref().unwrap_or_default().contains("full"));
}

#[test]
fn repeat_join_is_idempotent() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let session = preparing_session(&store, &locks);
    let engine = AssignmentEngine::new(store.clone(), locks);

    let first = join(&engine, &session, student(1), 10).expect("first join");
    let second = join(&engine, &session, student(1), 20).expect("second join");
    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.slot, second.slot);
    assert_eq!(first.position, second.position);

    let roster = engine.roster(session.id, &faculty(100)).expect("roster");
    assert_eq!(roster.len(), 1);
}

// ============================================================================
// SECTION: Gating
// ============================================================================

#[test]
fn non_students_cannot_take_slots() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let session = preparing_session(&store, &locks);
    let engine = AssignmentEngine::new(store, locks);

    let err = join(&engine, &session, faculty(100), 10).expect_err("faculty refused");
    assert_eq!(err.code(), ErrorCode::UnauthorizedRole);
}

#[test]
fn joins_outside_preparing_are_refused() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let machine =
        SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let session = machine.create_session(&faculty(100), now(0)).expect("create session");
    let engine = AssignmentEngine::new(store, locks);

    let err = join(&engine, &session, student(1), 10).expect_err("created is not joinable");
    assert_eq!(err.code(), ErrorCode::SessionNotJoinable);
}

#[test]
fn cross_institution_joins_fail_closed() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let session = preparing_session(&store, &locks);
    let engine = AssignmentEngine::new(store, locks);

    let other = Identity::new(
        user(9),
        Role::Student,
        juris_core::InstitutionId::from_raw(2).expect("nonzero institution"),
    );
    let err = join(&engine, &session, other, 10).expect_err("foreign institution refused");
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn concurrent_joins_fill_exactly_four_slots() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let session = preparing_session(&store, &locks);
    let engine = Arc::new(AssignmentEngine::new(store, locks));

    let mut handles = Vec::new();
    for raw in 1..=8_u64 {
        let engine = Arc::clone(&engine);
        let session_id = session.id;
        handles.push(thread::spawn(move || {
            engine.assign(&JoinRequest {
                session_id,
                identity: student(raw),
                ip_address: None,
                now: now(10),
            })
        }));
    }

    let mut successes = 0;
    let mut full = 0;
    for handle in handles {
        match handle.join().expect("thread join") {
            Ok(_) => successes += 1,
            Err(err) if err.code() == ErrorCode::SessionFull => full += 1,
            Err(err) => panic!("unexpected join failure: {err}"),
        }
    }
    assert_eq!(successes, 4);
    assert_eq!(full, 4);

    let report = engine.verify_integrity(session.id, &faculty(100)).expect("integrity");
    assert!(report.is_valid, "violations: {:?}", report.errors);
    assert_eq!(report.total_speakers, 4);
    assert_eq!(report.petitioners, 2);
    assert_eq!(report.respondents, 2);
}
