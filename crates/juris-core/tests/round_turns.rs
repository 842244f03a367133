// crates/juris-core/tests/round_turns.rs
// ============================================================================
// Module: Round & Turn Engine Unit Tests
// Description: Turn ordering, server-side timers, and auto-advance behavior.
// Purpose: Validate the speaking order and the reader-triggered expiry design.
// ============================================================================

//! ## Overview
//! Covers turn order creation from the roster, out-of-order and wrong-speaker
//! refusals, transcript capping, the timer-expiry auto-submit with exactly one
//! AUTO_SUBMIT row, the phase advance after the final turn, time extension
//! authority, and independent round pause.

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
use juris_core::ErrorCode;
use juris_core::Identity;
use juris_core::InMemoryStore;
use juris_core::JoinRequest;
use juris_core::Role;
use juris_core::Round;
use juris_core::RoundMachine;
use juris_core::RoundState;
use juris_core::RoundTransitionRequest;
use juris_core::SeatRef;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Timestamp;
use juris_core::Turn;
use juris_core::UserId;
use juris_core::interfaces::EventLog;
use juris_core::interfaces::SessionStore;

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

/// Builds a session with four joined students and one round in
/// ARGUMENT_PETITIONER, with 300-second turns started at t = 1000.
fn argument_round(
    store: &InMemoryStore,
    locks: &AggregateLocks,
) -> (RoundMachine<InMemoryStore>, Round, Vec<Turn>) {
    let sessions = SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let session = sessions.create_session(&faculty(), now(0)).expect("create session");
    let session = sessions
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Preparing,
            identity: Some(faculty()),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1),
        })
        .expect("preparing");

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
    let (round, turns) = rounds
        .create_round(&CreateRoundRequest {
            session_id: session.id,
            round_number: 1,
            petitioner: SeatRef::User(user(1)),
            respondent: SeatRef::User(user(2)),
            judge: Some(SeatRef::User(user(50))),
            identity: faculty(),
            turn_seconds: Some(300),
            now: now(3),
        })
        .expect("create round");

    let round = rounds
        .transition(&RoundTransitionRequest {
            round_id: round.id,
            target_state: RoundState::ArgumentPetitioner,
            identity: None,
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1_000),
        })
        .expect("enter argument phase");

    (rounds, round, turns)
}

// ============================================================================
// SECTION: Turn Order
// ============================================================================

#[test]
fn turn_order_follows_the_roster_composition() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (_, _, turns) = argument_round(&store, &locks);

    assert_eq!(turns.len(), 4);
    let orders: Vec<u32> = turns.iter().map(|turn| turn.turn_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);
    assert!(turns.iter().all(|turn| turn.allowed_seconds == 300));
    assert!(turns.iter().all(|turn| !turn.is_submitted));
}

#[test]
fn only_the_current_speaker_may_start() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    // Turn 2 is out of order while turn 1 is unsubmitted.
    let err = rounds
        .start_turn(round.id, turns[1].id, &student(2), now(1_001))
        .expect_err("not current");
    assert_eq!(err.code(), ErrorCode::NotCurrentSpeaker);

    // The right slot, the wrong person.
    let err = rounds
        .start_turn(round.id, turns[0].id, &student(2), now(1_001))
        .expect_err("wrong speaker");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let started = rounds
        .start_turn(round.id, turns[0].id, &student(1), now(1_001))
        .expect("current speaker starts");
    assert_eq!(started.started_at, Some(now(1_001)));
}

#[test]
fn submit_requires_a_started_turn_and_freezes_after() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    let err = rounds
        .submit_turn(round.id, turns[0].id, &student(1), "early words", now(1_001))
        .expect_err("not started yet");
    assert_eq!(err.code(), ErrorCode::TurnNotStarted);

    rounds.start_turn(round.id, turns[0].id, &student(1), now(1_001)).expect("start");
    let submitted = rounds
        .submit_turn(round.id, turns[0].id, &student(1), "may it please the court", now(1_050))
        .expect("submit");
    assert!(submitted.is_submitted);
    assert!(!submitted.auto_submitted);
    assert_eq!(submitted.word_count, 5);
    assert_eq!(submitted.duration_seconds(), Some(49));

    let err = rounds
        .submit_turn(round.id, turns[0].id, &student(1), "again", now(1_051))
        .expect_err("already submitted");
    assert_eq!(err.code(), ErrorCode::TurnAlreadySubmitted);
}

#[test]
fn oversized_transcripts_are_refused() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    rounds.start_turn(round.id, turns[0].id, &student(1), now(1_001)).expect("start");
    let oversized = "a".repeat(65_537);
    let err = rounds
        .submit_turn(round.id, turns[0].id, &student(1), &oversized, now(1_010))
        .expect_err("transcript too large");
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
}

// ============================================================================
// SECTION: Timer Expiry
// ============================================================================

#[test]
fn expired_open_turn_is_auto_submitted_by_any_reader() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    rounds.start_turn(round.id, turns[0].id, &student(1), now(1_000)).expect("start");

    // One second past the 300-second ceiling: the read observes zero time
    // remaining and issues the force-submit before returning.
    let view = rounds.get_timer(round.id, now(1_301)).expect("timer read");
    assert_eq!(view.remaining_seconds, Some(0));

    let err = rounds
        .submit_turn(round.id, turns[0].id, &student(1), "too late", now(1_302))
        .expect_err("force submit already won");
    assert_eq!(err.code(), ErrorCode::TurnAlreadySubmitted);

    let events = store
        .replay(AggregateRef::new(AggregateType::Turn, turns[0].id.get()), 1)
        .expect("replay turn stream");
    let auto: Vec<_> = events.iter().filter(|event| event.action == "AUTO_SUBMIT").collect();
    assert_eq!(auto.len(), 1, "exactly one AUTO_SUBMIT row");
    assert_eq!(
        auto[0].payload.get("auto_submitted").and_then(serde_json::Value::as_bool),
        Some(true)
    );
}

#[test]
fn expire_due_sweeps_only_expired_turns() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    rounds.start_turn(round.id, turns[0].id, &student(1), now(1_000)).expect("start");

    let untouched = rounds.expire_due(round.id, now(1_100)).expect("nothing due");
    assert!(untouched.is_empty());

    let expired = rounds.expire_due(round.id, now(1_300)).expect("sweep");
    assert_eq!(expired, vec![turns[0].id]);
}

#[test]
fn last_turn_submission_advances_the_phase() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, turns) = argument_round(&store, &locks);

    let speakers = [student(1), student(2), student(3), student(4)];
    let mut at = 1_001;
    for (turn, speaker) in turns.iter().zip(speakers.iter()) {
        rounds.start_turn(round.id, turn.id, speaker, now(at)).expect("start");
        rounds
            .submit_turn(round.id, turn.id, speaker, "argument delivered", now(at + 10))
            .expect("submit");
        at += 20;
    }

    let view = rounds.get_timer(round.id, now(at)).expect("timer");
    assert_eq!(view.phase, RoundState::ArgumentRespondent, "phase advanced after final turn");
}

// ============================================================================
// SECTION: Time Extension and Pause
// ============================================================================

#[test]
fn extension_requires_faculty_or_judge() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, _) = argument_round(&store, &locks);

    let err = rounds
        .extend_time(round.id, &student(1), 60, now(1_010))
        .expect_err("students cannot extend");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let judge = Identity::new(user(50), Role::Judge, institution());
    let extended = rounds.extend_time(round.id, &judge, 60, now(1_010)).expect("judge extends");
    assert_eq!(extended.timer.remaining_seconds(now(1_010)), Some(650));

    let events = store
        .replay(AggregateRef::new(AggregateType::Round, round.id.get()), 1)
        .expect("replay");
    assert!(events.iter().any(|event| event.action == "TIME_EXTENDED"));
}

#[test]
fn round_pause_does_not_touch_the_session() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (rounds, round, _) = argument_round(&store, &locks);

    let paused = rounds
        .transition(&RoundTransitionRequest {
            round_id: round.id,
            target_state: RoundState::Paused,
            identity: Some(faculty()),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1_050),
        })
        .expect("pause round");
    assert_eq!(paused.state, RoundState::Paused);
    assert_eq!(paused.previous_state, Some(RoundState::ArgumentPetitioner));

    // The owning session keeps its own, independent state machine.
    let session = store.load_session(round.session_id).expect("session");
    assert_eq!(session.state, SessionState::Preparing);

    let resumed = rounds
        .transition(&RoundTransitionRequest {
            round_id: round.id,
            target_state: RoundState::ArgumentPetitioner,
            identity: Some(faculty()),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1_110),
        })
        .expect("resume round");
    assert_eq!(resumed.state, RoundState::ArgumentPetitioner);
    assert_eq!(resumed.timer.pause_accumulated_seconds, 60);
}
