// crates/juris-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Integrity Unit Tests
// Description: Schema-enforced constraints, audit integrity, and engine smoke.
// Purpose: Validate that the durable store behaves like the engines assume.
// ============================================================================

//! ## Overview
//! Unit-level tests for the durable store's invariants:
//! - Uniqueness constraints surfaced with their engine-facing names
//! - Contiguous per-aggregate audit sequences and the append-after race
//! - Submitted-turn and finalized-evaluation immutability
//! - One snapshot per session and frozen freeze metadata
//! - Payload-hash verification failing closed on tampered rows
//! - The assignment engine running unchanged over SQLite

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

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use juris_core::AggregateLocks;
use juris_core::AggregateRef;
use juris_core::AggregateType;
use juris_core::AssignmentEngine;
use juris_core::AuditDraft;
use juris_core::EngineConfig;
use juris_core::ErrorCode;
use juris_core::Identity;
use juris_core::JoinRequest;
use juris_core::NewJudgeEvaluation;
use juris_core::NewLeaderboardEntry;
use juris_core::NewParticipant;
use juris_core::NewRound;
use juris_core::NewSession;
use juris_core::NewSnapshot;
use juris_core::NewTurn;
use juris_core::Role;
use juris_core::RubricCriterion;
use juris_core::RubricVersion;
use juris_core::SeatRef;
use juris_core::Session;
use juris_core::SessionCode;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Side;
use juris_core::Slot;
use juris_core::Timestamp;
use juris_core::UserId;
use juris_core::identity::Actor;
use juris_core::interfaces::EvaluationStore;
use juris_core::interfaces::EventLog;
use juris_core::interfaces::LeaderboardStore;
use juris_core::interfaces::ParticipantStore;
use juris_core::interfaces::RoundStore;
use juris_core::interfaces::RubricStore;
use juris_core::interfaces::SessionStore;
use juris_core::interfaces::StoreError;
use juris_store_sqlite::SqliteStore;
use juris_store_sqlite::SqliteStoreConfig;
use juris_store_sqlite::SqliteStoreMode;
use juris_store_sqlite::SqliteSyncMode;
use proptest::prelude::*;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn institution() -> juris_core::InstitutionId {
    juris_core::InstitutionId::from_raw(1).expect("nonzero institution")
}

fn user(raw: u64) -> UserId {
    UserId::from_raw(raw).expect("nonzero user")
}

fn now(seconds: i64) -> Timestamp {
    Timestamp::from_unix_seconds(seconds)
}

fn code(suffix: &str) -> SessionCode {
    SessionCode::parse(format!("JURIS-{suffix}")).expect("canonical code")
}

fn audit(action: &str) -> AuditDraft {
    AuditDraft::success(action, Actor::System, now(0))
}

fn create_session(store: &SqliteStore, faculty_raw: u64, suffix: &str) -> Session {
    store
        .create_session(
            NewSession {
                institution_id: institution(),
                faculty_id: user(faculty_raw),
                session_code: code(suffix),
                created_at: now(0),
            },
            audit("SESSION_CREATED"),
        )
        .expect("session created")
}

fn speaker(store: &SqliteStore, session: &Session, raw: u64, slot: Slot) -> juris_core::Participant {
    store
        .insert_participant(
            NewParticipant {
                session_id: session.id,
                user_id: user(raw),
                slot: Some(slot),
                joined_at: now(1),
            },
            audit("PARTICIPANT_ASSIGNED"),
        )
        .expect("participant inserted")
}

fn petitioner_one() -> Slot {
    Slot { side: Side::Petitioner, speaker_number: 1 }
}

// ============================================================================
// SECTION: Uniqueness Constraints
// ============================================================================

#[test]
fn session_codes_are_globally_unique() {
    let store = SqliteStore::open_in_memory().expect("store");
    create_session(&store, 100, "AAAAAA");

    let err = store
        .create_session(
            NewSession {
                institution_id: institution(),
                faculty_id: user(101),
                session_code: code("AAAAAA"),
                created_at: now(0),
            },
            audit("SESSION_CREATED"),
        )
        .expect_err("duplicate code");
    match err {
        StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "session_code"),
        other => panic!("expected unique violation, got {other}"),
    }
}

#[test]
fn one_active_session_per_faculty() {
    let store = SqliteStore::open_in_memory().expect("store");
    create_session(&store, 100, "AAAAAA");

    let err = store
        .create_session(
            NewSession {
                institution_id: institution(),
                faculty_id: user(100),
                session_code: code("BBBBBB"),
                created_at: now(0),
            },
            audit("SESSION_CREATED"),
        )
        .expect_err("second active session");
    match err {
        StoreError::UniqueViolation { constraint } => {
            assert_eq!(constraint, "faculty_active_session");
        }
        other => panic!("expected unique violation, got {other}"),
    }
}

#[test]
fn slot_and_user_uniqueness_carry_engine_names() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    speaker(&store, &session, 1, petitioner_one());

    let err = store
        .insert_participant(
            NewParticipant {
                session_id: session.id,
                user_id: user(2),
                slot: Some(petitioner_one()),
                joined_at: now(2),
            },
            audit("PARTICIPANT_ASSIGNED"),
        )
        .expect_err("slot taken");
    match err {
        StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "participant_slot"),
        other => panic!("expected slot violation, got {other}"),
    }

    let err = store
        .insert_participant(
            NewParticipant {
                session_id: session.id,
                user_id: user(1),
                slot: Some(Slot { side: Side::Respondent, speaker_number: 1 }),
                joined_at: now(2),
            },
            audit("PARTICIPANT_ASSIGNED"),
        )
        .expect_err("user already joined");
    match err {
        StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "participant_user"),
        other => panic!("expected user violation, got {other}"),
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

#[test]
fn sequences_are_contiguous_per_aggregate() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let aggregate = AggregateRef::new(AggregateType::Session, session.id.get());

    for index in 0..5 {
        store.append(aggregate, audit(&format!("ACTION_{index}"))).expect("append");
    }
    let events = store.replay(aggregate, 1).expect("replay");
    // SESSION_CREATED plus the five appends, numbered 1..=6.
    let sequences: Vec<u64> = events.iter().map(|event| event.sequence_number).collect();
    assert_eq!(sequences, (1..=6).collect::<Vec<u64>>());

    let page = store
        .since(juris_core::EventCursor::START, 100)
        .expect("since");
    assert_eq!(page.events.len(), 6);
    assert_eq!(page.next_cursor.position(), 6);
}

#[test]
fn append_after_rejects_sequence_races() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let aggregate = AggregateRef::new(AggregateType::Session, session.id.get());

    // SESSION_CREATED already holds sequence 1.
    store.append_after(aggregate, audit("CHAINED"), 1).expect("expected previous matches");
    let err = store.append_after(aggregate, audit("STALE"), 1).expect_err("stale chain");
    match err {
        StoreError::SequenceConflict { expected, found } => {
            assert_eq!(expected, 1);
            assert_eq!(found, 2);
        }
        other => panic!("expected sequence conflict, got {other}"),
    }
}

#[test]
fn tampered_payloads_fail_closed_on_replay() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("juris.db");
    let store = SqliteStore::new(&SqliteStoreConfig {
        path: path.clone(),
        busy_timeout_ms: 1_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    })
    .expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let aggregate = AggregateRef::new(AggregateType::Session, session.id.get());
    drop(store);

    let connection = Connection::open(&path).expect("raw connection");
    connection
        .execute(
            "UPDATE audit_events SET payload_json = '{\"forged\":true}'",
            params![],
        )
        .expect("tamper");
    drop(connection);

    let store = SqliteStore::new(&SqliteStoreConfig {
        path,
        busy_timeout_ms: 1_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    })
    .expect("reopen");
    let err = store.replay(aggregate, 1).expect_err("tampered row detected");
    match err {
        StoreError::Corrupt(message) => assert!(message.contains("hash")),
        other => panic!("expected corruption, got {other}"),
    }
}

// ============================================================================
// SECTION: Immutability
// ============================================================================

#[test]
fn submitted_turns_accept_exactly_one_submission() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let participant = speaker(&store, &session, 1, petitioner_one());
    let (_, turns) = store
        .create_round(
            NewRound {
                session_id: session.id,
                round_number: 1,
                petitioner: SeatRef::User(user(1)),
                respondent: SeatRef::Synthetic,
                judge: None,
                created_at: now(2),
            },
            vec![NewTurn { participant_id: participant.id, turn_order: 1, allowed_seconds: 300 }],
            audit("ROUND_CREATED"),
        )
        .expect("round");

    let mut submitted = turns[0].clone();
    submitted.started_at = Some(now(10));
    submitted.submitted_at = Some(now(40));
    submitted.transcript = "as the record reflects".to_owned();
    submitted.word_count = 4;
    submitted.is_submitted = true;
    store.update_turn(&submitted, audit("TURN_SUBMITTED")).expect("first submission");

    let err = store.update_turn(&submitted, audit("TURN_SUBMITTED")).expect_err("second write");
    assert!(matches!(err, StoreError::Immutable(_)));
}

#[test]
fn finalized_evaluations_reject_every_later_write() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let participant = speaker(&store, &session, 1, petitioner_one());
    let (round, _) = store
        .create_round(
            NewRound {
                session_id: session.id,
                round_number: 1,
                petitioner: SeatRef::User(user(1)),
                respondent: SeatRef::Synthetic,
                judge: None,
                created_at: now(2),
            },
            Vec::new(),
            audit("ROUND_CREATED"),
        )
        .expect("round");
    store
        .put_rubric(RubricVersion {
            id: juris_core::RubricVersionId::from_raw(1).expect("nonzero"),
            institution_id: institution(),
            criteria: vec![RubricCriterion {
                key: "framing".to_owned(),
                label: "Issue framing".to_owned(),
                max_score: 10,
                weight: None,
            }],
            created_at: now(0),
        })
        .expect("rubric");

    let mut scores = BTreeMap::new();
    scores.insert("framing".to_owned(), 8_u32);
    let evaluation = store
        .insert_evaluation(
            NewJudgeEvaluation {
                target: juris_core::EvaluationTarget {
                    round_id: round.id,
                    participant_id: participant.id,
                },
                judge_id: user(50),
                rubric_version_id: juris_core::RubricVersionId::from_raw(1).expect("nonzero"),
                scores,
                total_score: BigDecimal::from_str("8.00").expect("decimal"),
                remarks: None,
                created_at: now(5),
            },
            audit("EVALUATION_CREATED"),
        )
        .expect("draft");

    let mut finalized = evaluation.clone();
    finalized.is_draft = false;
    finalized.is_final = true;
    finalized.finalized_at = Some(now(6));
    store.update_evaluation(&finalized, audit("EVALUATION_FINALIZED")).expect("finalize");

    let err = store
        .update_evaluation(&finalized, audit("EVALUATION_UPDATED"))
        .expect_err("locked row");
    assert!(matches!(err, StoreError::Immutable(_)));
}

#[test]
fn snapshots_are_unique_and_their_freeze_metadata_is_frozen() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session = create_session(&store, 100, "AAAAAA");
    let participant = speaker(&store, &session, 1, petitioner_one());
    store
        .put_rubric(RubricVersion {
            id: juris_core::RubricVersionId::from_raw(1).expect("nonzero"),
            institution_id: institution(),
            criteria: Vec::new(),
            created_at: now(0),
        })
        .expect("rubric");

    let entry = NewLeaderboardEntry {
        participant_id: participant.id,
        side: Side::Petitioner,
        speaker_number: 1,
        total_score: BigDecimal::from_str("87.50").expect("decimal"),
        tie_breaker_score: BigDecimal::from_str("0.8700").expect("decimal"),
        rank: 1,
        score_breakdown: BTreeMap::new(),
        evaluation_ids: Vec::new(),
    };
    let new_snapshot = NewSnapshot {
        session_id: session.id,
        institution_id: institution(),
        frozen_at: now(30),
        frozen_by: user(100),
        rubric_version_id: juris_core::RubricVersionId::from_raw(1).expect("nonzero"),
        total_participants: 1,
        checksum_hash: "ab".repeat(32),
    };
    let (snapshot, entries) = store
        .insert_snapshot(new_snapshot.clone(), vec![entry], audit("LEADERBOARD_FROZEN"))
        .expect("freeze");
    assert_eq!(entries.len(), 1);

    let err = store
        .insert_snapshot(new_snapshot, Vec::new(), audit("LEADERBOARD_FROZEN"))
        .expect_err("one snapshot per session");
    match err {
        StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "snapshot_session"),
        other => panic!("expected unique violation, got {other}"),
    }

    let mut tampered = snapshot.clone();
    tampered.checksum_hash = "cd".repeat(32);
    let err = store
        .update_snapshot_governance(&tampered, audit("SNAPSHOT_SUBMITTED"))
        .expect_err("checksum is frozen");
    assert!(matches!(err, StoreError::Immutable(_)));

    let mut pending = snapshot;
    pending.is_pending_approval = true;
    let stored = store
        .update_snapshot_governance(&pending, audit("SNAPSHOT_SUBMITTED"))
        .expect("governance flags may move");
    assert!(stored.is_pending_approval);
}

// ============================================================================
// SECTION: Seeded Rules
// ============================================================================

#[test]
fn transition_tables_are_seeded_from_the_canonical_rules() {
    let store = SqliteStore::open_in_memory().expect("store");
    let session_rules = store.session_rules().expect("session rules");
    assert_eq!(session_rules, juris_core::session_transition_rules());
    let round_rules = store.round_rules().expect("round rules");
    assert_eq!(round_rules, juris_core::round_transition_rules());
}

// ============================================================================
// SECTION: Engine Smoke Over SQLite
// ============================================================================

#[test]
fn assignment_engine_runs_unchanged_over_sqlite() {
    let store = SqliteStore::open_in_memory().expect("store");
    let locks = AggregateLocks::new();
    let faculty = Identity::new(user(100), Role::Faculty, institution());
    let sessions = SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let session = sessions.create_session(&faculty, now(0)).expect("create");
    let session = sessions
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Preparing,
            identity: Some(faculty),
            expected_version: None,
            forced: false,
            reason: None,
            ip_address: None,
            now: now(1),
        })
        .expect("preparing");

    let engine = AssignmentEngine::new(store.clone(), locks);
    let expected = [
        (1_u64, Side::Petitioner, 1_u8),
        (2, Side::Respondent, 1),
        (3, Side::Petitioner, 2),
        (4, Side::Respondent, 2),
    ];
    for (raw, side, speaker_number) in expected {
        let outcome = engine
            .assign(&JoinRequest {
                session_id: session.id,
                identity: Identity::new(user(raw), Role::Student, institution()),
                ip_address: None,
                now: now(2),
            })
            .expect("join over sqlite");
        assert_eq!(outcome.slot.side, side);
        assert_eq!(outcome.slot.speaker_number, speaker_number);
    }

    let err = engine
        .assign(&JoinRequest {
            session_id: session.id,
            identity: Identity::new(user(5), Role::Student, institution()),
            ip_address: None,
            now: now(3),
        })
        .expect_err("fifth join");
    assert_eq!(err.code(), ErrorCode::SessionFull);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn appended_sequences_stay_contiguous(count in 1_usize..20) {
        let store = SqliteStore::open_in_memory().expect("store");
        let session = create_session(&store, 100, "AAAAAA");
        let aggregate = AggregateRef::new(AggregateType::Session, session.id.get());
        for _ in 0..count {
            store.append(aggregate, audit("TICK")).expect("append");
        }
        let events = store.replay(aggregate, 1).expect("replay");
        let sequences: Vec<u64> = events.iter().map(|event| event.sequence_number).collect();
        let expected: Vec<u64> = (1..=(count as u64 + 1)).collect();
        prop_assert_eq!(sequences, expected);
    }
}
