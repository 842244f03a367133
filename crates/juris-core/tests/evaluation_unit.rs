// crates/juris-core/tests/evaluation_unit.rs
// ============================================================================
// Module: Evaluation Engine Unit Tests
// Description: Blind projection, score validation, finalize immutability.
// Purpose: Validate scoring as a deterministic function of stored integers.
// ============================================================================

//! ## Overview
//! Covers the blind projection as the only judge-facing view, full-coverage
//! score validation with bounds and excess-key rejection, weighted and
//! unweighted totals, the finalize idempotency law, post-finalize lockout,
//! and finalized-only aggregation with competition ranking.

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
use juris_core::CreateRoundRequest;
use juris_core::EngineConfig;
use juris_core::ErrorCode;
use juris_core::EvaluationEngine;
use juris_core::EvaluationSubject;
use juris_core::EvaluationTarget;
use juris_core::EvaluationUpsertRequest;
use juris_core::Identity;
use juris_core::InMemoryStore;
use juris_core::JoinRequest;
use juris_core::JudgeAssignment;
use juris_core::NewJudgeAssignment;
use juris_core::Participant;
use juris_core::Role;
use juris_core::Round;
use juris_core::RubricCriterion;
use juris_core::RubricVersion;
use juris_core::RubricVersionId;
use juris_core::ScoreMap;
use juris_core::SeatRef;
use juris_core::SessionMachine;
use juris_core::SessionState;
use juris_core::SessionTransitionRequest;
use juris_core::Timestamp;
use juris_core::UserId;
use juris_core::interfaces::EvaluationStore;
use juris_core::interfaces::EventLog;
use juris_core::interfaces::ParticipantStore;
use juris_core::interfaces::RubricStore;
use juris_core::prepare_blind_view;

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

fn judge(raw: u64) -> Identity {
    Identity::new(user(raw), Role::Judge, institution())
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

fn standard_rubric() -> RubricVersion {
    RubricVersion {
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
    }
}

fn scores(framing: u32, reasoning: u32) -> ScoreMap {
    let mut map = BTreeMap::new();
    map.insert("framing".to_owned(), framing);
    map.insert("reasoning".to_owned(), reasoning);
    map
}

/// Seats four students in a round and registers judge assignments for all of
/// them; returns the engine, the round, and the roster.
fn judging_fixture(
    store: &InMemoryStore,
    locks: &AggregateLocks,
    judges: &[u64],
) -> (EvaluationEngine<InMemoryStore>, Round, Vec<Participant>) {
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
    let roster = store.roster(session.id).expect("roster");

    let rounds = juris_core::RoundMachine::new(store.clone(), locks.clone(), EngineConfig::default());
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

    store.put_rubric(standard_rubric()).expect("rubric stored");
    for judge_raw in judges {
        for participant in &roster {
            store
                .put_assignment(NewJudgeAssignment {
                    judge_id: user(*judge_raw),
                    target: EvaluationTarget {
                        round_id: round.id,
                        participant_id: participant.id,
                    },
                    is_blind: true,
                })
                .expect("assignment");
        }
    }

    (EvaluationEngine::new(store.clone(), locks.clone()), round, roster)
}

fn upsert(
    engine: &EvaluationEngine<InMemoryStore>,
    target: EvaluationTarget,
    judge_identity: Identity,
    score_map: ScoreMap,
    at: i64,
) -> Result<juris_core::JudgeEvaluation, juris_core::EngineError> {
    engine.create_or_update(&EvaluationUpsertRequest {
        target,
        identity: judge_identity,
        rubric_version_id: rubric_id(),
        scores: score_map,
        remarks: Some("well argued".to_owned()),
        ip_address: None,
        now: now(at),
    })
}

// ============================================================================
// SECTION: Blind Projection
// ============================================================================

#[test]
fn blind_assignments_strip_identity() {
    let assignment = JudgeAssignment {
        id: juris_core::AssignmentId::from_raw(1).expect("nonzero"),
        judge_id: user(50),
        target: EvaluationTarget {
            round_id: juris_core::RoundId::from_raw(1).expect("nonzero"),
            participant_id: juris_core::ParticipantId::from_raw(42).expect("nonzero"),
        },
        is_blind: true,
    };
    let subject = EvaluationSubject {
        participant_id: juris_core::ParticipantId::from_raw(42).expect("nonzero"),
        participant_name: "Ada Counsel".to_owned(),
        team_name: Some("Team Certiorari".to_owned()),
        email: Some("ada@example.edu".to_owned()),
        title: Some("In re Example".to_owned()),
        content: "The record shows...".to_owned(),
    };

    let view = prepare_blind_view(&assignment, &subject, true);
    assert_eq!(view.handle, "Participant #42");
    assert_eq!(view.title, None);
    assert_eq!(view.content, subject.content);
    assert!(!view.blind_warnings.is_empty());
    let rendered = serde_json::to_string(&view).expect("serializable");
    assert!(!rendered.contains("Ada Counsel"));
    assert!(!rendered.contains("Team Certiorari"));
    assert!(!rendered.contains("ada@example.edu"));
}

#[test]
fn open_assignments_pass_identity_through() {
    let assignment = JudgeAssignment {
        id: juris_core::AssignmentId::from_raw(1).expect("nonzero"),
        judge_id: user(50),
        target: EvaluationTarget {
            round_id: juris_core::RoundId::from_raw(1).expect("nonzero"),
            participant_id: juris_core::ParticipantId::from_raw(42).expect("nonzero"),
        },
        is_blind: false,
    };
    let subject = EvaluationSubject {
        participant_id: juris_core::ParticipantId::from_raw(42).expect("nonzero"),
        participant_name: "Ada Counsel".to_owned(),
        team_name: None,
        email: None,
        title: Some("In re Example".to_owned()),
        content: "The record shows...".to_owned(),
    };
    let view = prepare_blind_view(&assignment, &subject, false);
    assert_eq!(view.handle, "Ada Counsel");
    assert_eq!(view.title.as_deref(), Some("In re Example"));
    assert!(view.blind_warnings.is_empty());
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn scores_must_cover_the_rubric_exactly() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (engine, round, roster) = judging_fixture(&store, &locks, &[50]);
    let target = EvaluationTarget { round_id: round.id, participant_id: roster[0].id };

    // Above the criterion max.
    let err = upsert(&engine, target, judge(50), scores(11, 5), 10).expect_err("above max");
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    // Missing criterion.
    let mut partial = ScoreMap::new();
    partial.insert("framing".to_owned(), 5);
    let err = engine
        .create_or_update(&EvaluationUpsertRequest {
            target,
            identity: judge(50),
            rubric_version_id: rubric_id(),
            scores: partial,
            remarks: None,
            ip_address: None,
            now: now(11),
        })
        .expect_err("missing criterion");
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    // Excess key outside the rubric.
    let mut excess = scores(5, 5);
    excess.insert("style".to_owned(), 3);
    let err = engine
        .create_or_update(&EvaluationUpsertRequest {
            target,
            identity: judge(50),
            rubric_version_id: rubric_id(),
            scores: excess,
            remarks: None,
            ip_address: None,
            now: now(12),
        })
        .expect_err("excess key");
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
}

#[test]
fn judges_need_an_assignment() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (engine, round, roster) = judging_fixture(&store, &locks, &[50]);
    let target = EvaluationTarget { round_id: round.id, participant_id: roster[0].id };

    let err = upsert(&engine, target, judge(51), scores(5, 5), 10).expect_err("no assignment");
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

// ============================================================================
// SECTION: Totals
// ============================================================================

#[test]
fn unweighted_totals_are_simple_sums() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (engine, round, roster) = judging_fixture(&store, &locks, &[50]);
    let target = EvaluationTarget { round_id: round.id, participant_id: roster[0].id };

    let evaluation = upsert(&engine, target, judge(50), scores(8, 18), 10).expect("draft");
    assert!(evaluation.is_draft);
    assert_eq!(evaluation.total_score, BigDecimal::from_str("26.00").expect("decimal"));
}

#[test]
fn weighted_rubrics_normalize_over_the_weight_sum() {
    let rubric = RubricVersion {
        id: rubric_id(),
        institution_id: institution(),
        criteria: vec![
            RubricCriterion {
                key: "framing".to_owned(),
                label: "Issue framing".to_owned(),
                max_score: 10,
                weight: Some(60),
            },
            RubricCriterion {
                key: "reasoning".to_owned(),
                label: "Legal reasoning".to_owned(),
                max_score: 20,
                weight: Some(40),
            },
        ],
        created_at: now(0),
    };
    // (8/10)·60 + (10/20)·40 = 68, normalized over 100 → 0.68.
    let total = rubric.total_score(&scores(8, 10));
    assert_eq!(total, BigDecimal::from_str("0.68").expect("decimal"));
}

// ============================================================================
// SECTION: Finalization
// ============================================================================

#[test]
fn finalize_is_idempotent_and_locks_the_row() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (engine, round, roster) = judging_fixture(&store, &locks, &[50]);
    let target = EvaluationTarget { round_id: round.id, participant_id: roster[0].id };

    let draft = upsert(&engine, target, judge(50), scores(8, 18), 10).expect("draft");
    let finalized = engine.finalize(draft.id, &judge(50), now(20)).expect("finalize");
    assert!(finalized.is_final);
    assert!(!finalized.is_draft);
    assert_eq!(finalized.finalized_at, Some(now(20)));

    // Second finalize: success, unchanged finalized_at, no second event.
    let again = engine.finalize(draft.id, &judge(50), now(30)).expect("idempotent finalize");
    assert_eq!(again.finalized_at, Some(now(20)));
    let events = store
        .replay(AggregateRef::new(AggregateType::Evaluation, draft.id.get()), 1)
        .expect("replay");
    let finalize_rows: Vec<_> =
        events.iter().filter(|event| event.action == "EVALUATION_FINALIZED").collect();
    assert_eq!(finalize_rows.len(), 1);

    // Scenario: any later write answers EVALUATION_LOCKED and the row keeps
    // its total of 26.
    let err = upsert(&engine, target, judge(50), scores(1, 1), 40).expect_err("locked");
    assert_eq!(err.code(), ErrorCode::EvaluationLocked);
    let stored = store.evaluation_for(target, user(50)).expect("load").expect("present");
    assert_eq!(stored.total_score, BigDecimal::from_str("26.00").expect("decimal"));
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

#[test]
fn aggregation_reads_finalized_rows_with_competition_ranking() {
    let store = InMemoryStore::new();
    let locks = AggregateLocks::new();
    let (engine, round, roster) = judging_fixture(&store, &locks, &[50, 51]);

    // Mean totals per participant: 28, 25, 25, 20 → ranks 1, 2, 2, 4.
    let plan: [(usize, (u32, u32), (u32, u32)); 4] = [
        (0, (10, 18), (10, 18)),
        (1, (7, 18), (7, 18)),
        (2, (9, 16), (9, 16)),
        (3, (5, 15), (5, 15)),
    ];
    for (index, first, second) in plan {
        let target = EvaluationTarget { round_id: round.id, participant_id: roster[index].id };
        let draft =
            upsert(&engine, target, judge(50), scores(first.0, first.1), 10).expect("draft");
        engine.finalize(draft.id, &judge(50), now(20)).expect("finalize");
        let draft =
            upsert(&engine, target, judge(51), scores(second.0, second.1), 11).expect("draft");
        engine.finalize(draft.id, &judge(51), now(21)).expect("finalize");
    }

    // A lingering draft must not contribute.
    let target = EvaluationTarget { round_id: round.id, participant_id: roster[3].id };
    store
        .put_assignment(NewJudgeAssignment {
            judge_id: user(52),
            target,
            is_blind: false,
        })
        .expect("assignment");
    upsert(&engine, target, judge(52), scores(10, 20), 30).expect("unfinalized draft");

    let rows = engine.aggregate_session(round.session_id).expect("aggregate");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].participant_id, roster[0].id);
    assert_eq!(rows[0].rank, 1);
    assert_eq!(rows[1].rank, 2);
    assert_eq!(rows[2].rank, 2);
    assert_eq!(rows[3].rank, 4);
    assert_eq!(rows[3].evaluation_count, 2, "draft rows are excluded");
    assert_eq!(
        rows[0].mean_total_score,
        BigDecimal::from_str("28.00").expect("decimal")
    );
}
