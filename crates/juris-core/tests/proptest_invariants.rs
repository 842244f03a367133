// crates/juris-core/tests/proptest_invariants.rs
// ============================================================================
// Module: Core Invariant Property Tests
// Description: Randomized checks of the quantified invariants.
// Purpose: Validate slot determinism, ranking laws, timer math, and formats.
// ============================================================================

//! ## Overview
//! Property tests over the contract-level invariants: the slot table is a
//! bijection over 1..=4, canonical score rendering always carries fixed
//! decimals, remaining time is never negative and pause/resume accounting
//! never loses time, and session codes round-trip their canonical shape.

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

use bigdecimal::BigDecimal;
use juris_core::PhaseTimer;
use juris_core::SessionCode;
use juris_core::Timestamp;
use juris_core::format_tie_breaker;
use juris_core::format_total_score;
use juris_core::participant::slot_for_position;
use proptest::prelude::*;

// ============================================================================
// SECTION: Slot Table
// ============================================================================

proptest! {
    #[test]
    fn slot_table_is_a_bijection(position in 1_u32..=4) {
        let slot = slot_for_position(position).expect("mapped");
        // No two positions share a slot.
        for other in 1_u32..=4 {
            let other_slot = slot_for_position(other).expect("mapped");
            prop_assert_eq!(position == other, slot == other_slot);
        }
    }

    #[test]
    fn positions_outside_the_table_are_unmapped(position in proptest::num::u32::ANY) {
        prop_assume!(position == 0 || position > 4);
        prop_assert!(slot_for_position(position).is_none());
    }
}

// ============================================================================
// SECTION: Canonical Formatting
// ============================================================================

proptest! {
    #[test]
    fn totals_always_render_two_decimals(cents in 0_i64..10_000_000) {
        let value = BigDecimal::new(cents.into(), 2);
        let rendered = format_total_score(&value);
        let (_, fraction) = rendered.split_once('.').expect("decimal point");
        prop_assert_eq!(fraction.len(), 2);
    }

    #[test]
    fn tie_breakers_always_render_four_decimals(basis in 0_i64..100_000_000) {
        let value = BigDecimal::new(basis.into(), 4);
        let rendered = format_tie_breaker(&value);
        let (_, fraction) = rendered.split_once('.').expect("decimal point");
        prop_assert_eq!(fraction.len(), 4);
    }
}

// ============================================================================
// SECTION: Timer Arithmetic
// ============================================================================

proptest! {
    #[test]
    fn remaining_time_is_never_negative(
        start in 0_i64..1_000_000,
        duration in 1_i64..100_000,
        elapsed in 0_i64..1_000_000,
    ) {
        let timer = PhaseTimer::started(Timestamp::from_unix_seconds(start), duration);
        let remaining = timer
            .remaining_seconds(Timestamp::from_unix_seconds(start + elapsed))
            .expect("timed phase");
        prop_assert!(remaining >= 0);
        prop_assert!(remaining <= duration);
    }

    #[test]
    fn pause_accounting_never_loses_time(
        start in 0_i64..100_000,
        duration in 10_i64..10_000,
        run in 0_i64..5_000,
        paused_for in 0_i64..5_000,
    ) {
        let t0 = Timestamp::from_unix_seconds(start);
        let timer = PhaseTimer::started(t0, duration);
        let pause_at = Timestamp::from_unix_seconds(start + run);
        let resume_at = Timestamp::from_unix_seconds(start + run + paused_for);

        let before = timer.remaining_seconds(pause_at).expect("timed");
        let paused = timer.paused(pause_at);
        // Frozen while paused, regardless of how far the clock moves.
        prop_assert_eq!(paused.remaining_seconds(resume_at), Some(before));

        let resumed = paused.resumed(resume_at);
        // Immediately after resume the remaining time equals the frozen value.
        prop_assert_eq!(resumed.remaining_seconds(resume_at), Some(before));
    }
}

// ============================================================================
// SECTION: Session Codes
// ============================================================================

proptest! {
    #[test]
    fn generated_codes_always_parse(_seed in 0_u8..8) {
        let code = SessionCode::generate();
        let reparsed = SessionCode::parse(code.as_str()).expect("canonical shape");
        prop_assert_eq!(code, reparsed);
    }

    #[test]
    fn only_canonical_suffixes_parse(suffix in "[a-z0-9]{0,8}") {
        let candidate = format!("JURIS-{suffix}");
        let canonical = suffix.len() == 6
            && suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        prop_assert_eq!(SessionCode::parse(candidate).is_ok(), canonical);
    }
}
