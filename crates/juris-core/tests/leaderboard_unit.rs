// crates/juris-core/tests/leaderboard_unit.rs
// ============================================================================
// Module: Leaderboard Engine Unit Tests
// Description: Freeze flow, canonical checksum, governance, and visibility.
// Purpose: Validate the immutable snapshot contract end to end.
// ============================================================================

//! ## Overview
//! Covers the freeze preconditions, the exact canonical byte encoding and its
//! SHA-256 checksum, duplicate-freeze refusal, the governance lattice with the
//! literal `must be finalized` refusal, soft invalidation, checksum
//! verification, and the role-based visibility predicate.

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
use juris_core::AssignmentEngine;
use juris_core::CreateRoundRequest;
use juris_core::EngineConfig;
use juris_core::ErrorCode;
use juris_core::EvaluationEngine;
use juris_core::EvaluationTarget;
use juris_core::EvaluationUpsertRequest;
use juris_core::FreezeRequest;
use juris_core::GovernanceState;
use juris_core::Identity;
use juris_core::InMemoryStore;
use juris_core::JoinRequest;
use juris_core::LeaderboardEngine;
use juris_core::LeaderboardEntry;
use juris_core::NewJudgeAssignment;
use juris_core::Participant;
use juris_core::PublicationMode;
use juris_core::PublishRequest;
use juris_core::Role;
use juris_core::RubricCriterion;
use juris_core::RubricVersion;
use juris_core::RubricVersionId;
use juris_core::ScoreMap;
use juris_core::SeatRef;
use juris_core::Session;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Side;
use juris_core::Timestamp;
use juris_core::UserId;
use juris_core::canonical_entry_bytes;
use juris_core::compute_checksum;
use juris_core::interfaces::EvaluationStore;
use juris_core::interfaces::RubricStore;
use juris_core::sha256_hex;

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

fn admin() -> Identity {
    Identity::new(user(200), Role::Admin, institution())
}

fn judge() -> Identity {
    Identity::new(user(50), Role::Judge, institution())
}

fn student(raw: u64) -> Identity {
    Identity::new(user(raw), Role::Student, institution())
}

fn now(seconds: i64) -> Timestamp {
    Timestamp::from_unix_seconds(seconds)
}

fn rubric_id() -> RubricVersionId {
    RubricVersionId::from_raw(1).expect("nonzero rubric id")
}

fn scores(framing: u32, reasoning: u32) -> ScoreMap {
    let mut map = BTreeMap::new();
    map.insert("framing".to_owned(), framing);
    map.insert("reasoning".to_owned(), reasoning);
    map
}

/// Drives a session to COMPLETED with finalized evaluations for every speaker.
///
/// Per-speaker scores are supplied as `(framing, reasoning)` pairs in roster
/// order; `skip_last` leaves the fourth speaker unevaluated.
fn completed_fixture(
    store: &InMemoryStore,
    locks: &AggregateLocks,
    per_speaker: &[(u32, u32); 4],
    skip_last: bool,
) -> (Session, Vec<Participant>) {
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
    let roster = juris_core::interfaces::ParticipantStore::roster(store, session.id)
        .expect("roster");

    let rounds =
        juris_core::RoundMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let (round, _) = rounds
        .create_round(&CreateRoundRequest {
            session_id: session.id,
            round_number: 1,
            petitioner: SeatRef::User(user(1)),
            respondent: SeatRef::User(user(2)),
            judge: Some(SeatRef::User(user(50))),
            identity: faculty(),
            turn_seconds: None,
            now: now(3),
        })
        .expect("round");
    rounds
        .transition(&juris_core::RoundTransitionRequest {
            round_id: round.id,
            target_state: juris_core::RoundState::Cancelled,
            identity: Some(faculty()),
            expected_version: None,
            forced: false,
            reason: Some("fixture shortcut".to_owned()),
            ip_address: None,
            now: now(4),
        })
        .expect("terminal round");

    store
        .put_rubric(RubricVersion {
            id: rubric_id(),
            institution_id: institution(),
            criteria: vec![
                RubricCriterion {
                    key: "framing".to_owned(),
                    label: "Issue framing".to_owned(),
                    max_score: 10,
                    weight: None,
                },
                RubricCriterion {
                    key: "reasoning".to_owned(),
                    label: "Legal reasoning".to_owned(),
                    max_score: 20,
                    weight: None,
                },
            ],
            created_at: now(0),
        })
        .expect("rubric stored");

    let evaluations = EvaluationEngine::new(store.clone(), locks.clone());
    let limit = if skip_last { 3 } else { 4 };
    for (index, (framing, reasoning)) in per_speaker.iter().enumerate().take(limit) {
        let target = EvaluationTarget { round_id: round.id, participant_id: roster[index].id };
        store
            .put_assignment(NewJudgeAssignment { judge_id: user(50), target, is_blind: false })
            .expect("assignment");
        let draft = evaluations
            .create_or_update(&EvaluationUpsertRequest {
                target,
                identity: judge(),
                rubric_version_id: rubric_id(),
                scores: scores(*framing, *reasoning),
                remarks: None,
                ip_address: None,
                now: now(10),
            })
            .expect("draft");
        evaluations.finalize(draft.id, &judge(), now(11)).expect("finalize");
    }

    let session = sessions
        .transition(&SessionTransitionRequest {
            session_id: session.id,
            target_state: SessionState::Completed,
            identity: Some(faculty()),
            expected_version: None,
            forced: true,
            reason: Some("fixture shortcut".to_owned()),
            ip_address: None,
            now: now(20),
        })
        .expect("completed");

    (session, roster)
}

fn engine(store: &InMemoryStore, locks: &AggregateLocks) -> LeaderboardEngine<InMemoryStore> {
    LeaderboardEngine::new(store.clone(), locks.clone())
}

// ============================================================================
// SECTION: Canonical Checksum
// ============================================================================

#[test]
fn canonical_bytes_match_the_documented_encoding() {
    let entries = vec![
        LeaderboardEntry {
            snapshot_id: juris_core::SnapshotId::from_raw(1).expect("nonzero"),
            participant_id: juris_core::ParticipantId::from_raw(1).expect("nonzero"),
            side: Side::Petitioner,
            speaker_number: 1,
            total_score: BigDecimal::from_str("87.5").expect("decimal"),
            tie_breaker_score: BigDecimal::from_str("0.87").expect("decimal"),
            rank: 1,
            score_breakdown: BTreeMap::new(),
            evaluation_ids: Vec::new(),
        },
        LeaderboardEntry {
            snapshot_id: juris_core::SnapshotId::from_raw(1).expect("nonzero"),
            participant_id: juris_core::ParticipantId::from_raw(2).expect("nonzero"),
            side: Side::Respondent,
            speaker_number: 1,
            total_score: BigDecimal::from_str("85").expect("decimal"),
            tie_breaker_score: BigDecimal::from_str("0.85").expect("decimal"),
            rank: 2,
            score_breakdown: BTreeMap::new(),
            evaluation_ids: Vec::new(),
        },
    ];

    // Fixed separators and fixed 2/4-decimal rendering, in rank order.
    let bytes = canonical_entry_bytes(&entries);
    assert_eq!(bytes, b"1|1|87.50|0.8700;2|2|85.00|0.8500".to_vec());
    assert_eq!(compute_checksum(&entries), sha256_hex(b"1|1|87.50|0.8700;2|2|85.00|0.8500"));
    assert_eq!(compute_checksum(&entries).len(), 64);
}

// ============================================================================
// SECTION: Freeze
// ============================================================================

#[test]
fn freeze_requires_a_completed_session() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let sessions = SessionMachine::new(store.clone(), locks.clone(), EngineConfig::default());
    let session = sessions.create_session(&faculty(), now(0)).expect("create");

    let err = engine(&store, &locks)
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(1),
        })
        .expect_err("not completed");
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);
}

#[test]
fn freeze_refuses_unevaluated_speakers() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (session, _) =
        completed_fixture(&store, &locks, &[(8, 18), (7, 17), (6, 16), (5, 15)], true);

    let err = engine(&store, &locks)
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect_err("missing evaluations");
    assert_eq!(err.code(), ErrorCode::IncompleteTournament);
}

#[test]
fn freeze_ranks_checksums_and_refuses_repeats() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (session, roster) =
        completed_fixture(&store, &locks, &[(8, 18), (9, 19), (6, 16), (5, 15)], false);
    let leaderboards = engine(&store, &locks);

    let (snapshot, entries) = leaderboards
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect("freeze");

    assert_eq!(snapshot.total_participants, 4);
    assert_eq!(snapshot.governance_state(), GovernanceState::Draft);
    assert_eq!(entries.len(), 4);
    // Totals 28, 26, 22, 20 → speaker 2 first.
    assert_eq!(entries[0].participant_id, roster[1].id);
    assert_eq!(entries[0].rank, 1);
    assert_eq!(entries[0].total_score, BigDecimal::from_str("28.00").expect("decimal"));
    assert_eq!(entries[3].rank, 4);
    assert_eq!(snapshot.checksum_hash, compute_checksum(&entries));
    assert_eq!(
        leaderboards.verify_checksum(snapshot.id).expect("verify"),
        snapshot.checksum_hash
    );

    let err = leaderboards
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(31),
        })
        .expect_err("second freeze");
    assert_eq!(err.code(), ErrorCode::AlreadyFrozen);
}

#[test]
fn equal_tuples_share_a_rank_and_skip_the_next() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    // Two identical score lines produce an exact (total, tie-breaker) tie.
    let (session, _) =
        completed_fixture(&store, &locks, &[(8, 18), (8, 18), (6, 16), (5, 15)], false);

    let (_, entries) = engine(&store, &locks)
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect("freeze");

    let ranks: Vec<u32> = entries.iter().map(|entry| entry.rank).collect();
    assert_eq!(ranks, vec![1, 1, 3, 4]);
    // Remaining ties break by ascending participant id.
    assert!(entries[0].participant_id < entries[1].participant_id);
}

// ============================================================================
// SECTION: Governance
// ============================================================================

#[test]
fn governance_lattice_enforces_the_documented_order() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (session, _) =
        completed_fixture(&store, &locks, &[(8, 18), (7, 17), (6, 16), (5, 15)], false);
    let leaderboards = engine(&store, &locks);
    let (snapshot, _) = leaderboards
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect("freeze");

    // DRAFT cannot be published directly.
    let err = leaderboards
        .publish(&PublishRequest {
            snapshot_id: snapshot.id,
            identity: faculty(),
            mode: PublicationMode::Published,
            publication_date: None,
            now: now(31),
        })
        .expect_err("draft publish refused");
    match &err {
        juris_core::EngineError::PreconditionFailed { reason } => {
            assert_eq!(reason, "must be finalized");
        }
        other => panic!("expected PreconditionFailed, got {other}"),
    }

    let pending = leaderboards
        .submit_for_approval(snapshot.id, &faculty(), now(32))
        .expect("submit for approval");
    assert_eq!(pending.governance_state(), GovernanceState::PendingApproval);

    // Faculty lacks the approver capability.
    let err = leaderboards
        .finalize_snapshot(snapshot.id, &faculty(), now(33))
        .expect_err("faculty cannot approve");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let finalized =
        leaderboards.finalize_snapshot(snapshot.id, &admin(), now(34)).expect("approve");
    assert_eq!(finalized.governance_state(), GovernanceState::Finalized);
    assert_eq!(finalized.finalized_at, Some(now(34)));

    let published = leaderboards
        .publish(&PublishRequest {
            snapshot_id: snapshot.id,
            identity: faculty(),
            mode: PublicationMode::Published,
            publication_date: None,
            now: now(35),
        })
        .expect("publish");
    assert!(published.is_published);
    assert_eq!(published.published_at, Some(now(35)));
    assert_eq!(published.governance_state(), GovernanceState::Published);
}

#[test]
fn invalidation_is_soft_and_preserves_entries() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (session, _) =
        completed_fixture(&store, &locks, &[(8, 18), (7, 17), (6, 16), (5, 15)], false);
    let leaderboards = engine(&store, &locks);
    let (snapshot, entries) = leaderboards
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect("freeze");

    let err = leaderboards
        .invalidate(snapshot.id, &faculty(), "tamper signal", now(31))
        .expect_err("invalidation is privileged");
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let invalidated = leaderboards
        .invalidate(snapshot.id, &admin(), "tamper signal", now(32))
        .expect("invalidate");
    assert!(invalidated.is_invalidated);
    assert_eq!(invalidated.invalidated_reason.as_deref(), Some("tamper signal"));
    assert_eq!(invalidated.governance_state(), GovernanceState::Invalidated);

    // Idempotent repeat and intact entries.
    let again = leaderboards
        .invalidate(snapshot.id, &admin(), "second attempt", now(33))
        .expect("idempotent");
    assert_eq!(again.invalidated_reason.as_deref(), Some("tamper signal"));
    let stored = juris_core::interfaces::LeaderboardStore::snapshot_entries(&store, snapshot.id)
        .expect("entries remain");
    assert_eq!(stored.len(), entries.len());
}

// ============================================================================
// SECTION: Visibility
// ============================================================================

#[test]
fn visibility_follows_role_and_publication() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (session, _) =
        completed_fixture(&store, &locks, &[(8, 18), (7, 17), (6, 16), (5, 15)], false);
    let leaderboards = engine(&store, &locks);
    let (snapshot, _) = leaderboards
        .freeze(&FreezeRequest {
            session_id: session.id,
            identity: faculty(),
            ip_address: None,
            now: now(30),
        })
        .expect("freeze");

    // Draft snapshots are invisible to students, visible to faculty, and
    // visible to the judge who sat the session.
    assert!(!leaderboards.can_view(snapshot.id, &student(1), now(40)).expect("student"));
    assert!(leaderboards.can_view(snapshot.id, &faculty(), now(40)).expect("faculty"));
    assert!(leaderboards.can_view(snapshot.id, &judge(), now(40)).expect("judge"));
    let other_judge = Identity::new(user(51), Role::Judge, institution());
    assert!(!leaderboards.can_view(snapshot.id, &other_judge, now(40)).expect("other judge"));

    // Cross-institution reads always fail.
    let foreign = Identity::new(
        user(7),
        Role::Faculty,
        juris_core::InstitutionId::from_raw(2).expect("nonzero"),
    );
    assert!(!leaderboards.can_view(snapshot.id, &foreign, now(40)).expect("foreign"));

    // Scheduled publication becomes student-visible at the date.
    leaderboards.submit_for_approval(snapshot.id, &faculty(), now(41)).expect("submit");
    leaderboards.finalize_snapshot(snapshot.id, &admin(), now(42)).expect("approve");
    leaderboards
        .publish(&PublishRequest {
            snapshot_id: snapshot.id,
            identity: faculty(),
            mode: PublicationMode::Scheduled,
            publication_date: Some(now(100)),
            now: now(43),
        })
        .expect("schedule");
    assert!(!leaderboards.can_view(snapshot.id, &student(1), now(50)).expect("before date"));
    assert!(leaderboards.can_view(snapshot.id, &student(1), now(100)).expect("at date"));
}
