// crates/juris-core/src/core/transitions.rs
// ============================================================================
// Module: Juris Transition Tables
// Description: Data-driven transition rules for sessions and rounds.
// Purpose: Make every allowed state change a row in a table, not code.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Both state machines are driven by transition tables with the shape
//! `(from_state, to_state, trigger_type, requires_all_rounds_complete,
//! requires_faculty)`. The canonical row sets live here; durable stores seed
//! their transition tables from these and serve them back to the machines.
//! Resume from PAUSED is the one rule the table cannot express (the target is
//! the recorded `previous_state`) and is validated by the machines directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::round::RoundState;
use crate::core::session::SessionState;

// ============================================================================
// SECTION: Triggers
// ============================================================================

/// What kind of actor or event drives a transition row.
///
/// # Invariants
/// - Variants are stable for serialization and table seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Explicit faculty action.
    Faculty,
    /// Fired when a round completes.
    RoundCompleted,
    /// Fired when every evaluation is finalized.
    AllEvaluationsComplete,
    /// Internal engine trigger (turn completion, timer expiry).
    System,
}

impl TriggerType {
    /// Returns the stable label used by durable transition tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Faculty => "faculty",
            Self::RoundCompleted => "round_completed",
            Self::AllEvaluationsComplete => "all_evaluations_complete",
            Self::System => "system",
        }
    }

    /// Parses the stable label used by durable transition tables.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "faculty" => Some(Self::Faculty),
            "round_completed" => Some(Self::RoundCompleted),
            "all_evaluations_complete" => Some(Self::AllEvaluationsComplete),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Transition Rules
// ============================================================================

/// One row of a transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule<S> {
    /// Source state.
    pub from_state: S,
    /// Target state.
    pub to_state: S,
    /// Trigger kind that normally drives the row.
    pub trigger: TriggerType,
    /// Every round must be terminal before this row applies.
    pub requires_all_rounds_complete: bool,
    /// Only faculty-authority actors may take this row.
    pub requires_faculty: bool,
}

impl<S: Copy + PartialEq> TransitionRule<S> {
    /// Finds the rule for a `(from, to)` pair in a rule slice.
    #[must_use]
    pub fn find(rules: &[Self], from_state: S, to_state: S) -> Option<Self> {
        rules
            .iter()
            .find(|rule| rule.from_state == from_state && rule.to_state == to_state)
            .copied()
    }

    /// Lists the allowed target states from `from_state`, in table order.
    #[must_use]
    pub fn allowed_targets(rules: &[Self], from_state: S) -> Vec<S> {
        rules.iter().filter(|rule| rule.from_state == from_state).map(|rule| rule.to_state).collect()
    }
}

// ============================================================================
// SECTION: Canonical Session Rules
// ============================================================================

/// Shorthand constructor for a session rule row.
const fn session_rule(
    from_state: SessionState,
    to_state: SessionState,
    trigger: TriggerType,
    requires_all_rounds_complete: bool,
    requires_faculty: bool,
) -> TransitionRule<SessionState> {
    TransitionRule { from_state, to_state, trigger, requires_all_rounds_complete, requires_faculty }
}

/// Canonical session transition table.
///
/// Forward rows first, then pause rows, then cancellation rows, so allowed
/// lists render in a stable, readable order.
#[must_use]
pub fn session_transition_rules() -> Vec<TransitionRule<SessionState>> {
    use SessionState as S;
    use TriggerType as T;
    vec![
        session_rule(S::Created, S::Preparing, T::Faculty, false, true),
        session_rule(S::Preparing, S::ArgumentPetitioner, T::Faculty, false, true),
        session_rule(S::ArgumentPetitioner, S::ArgumentRespondent, T::RoundCompleted, false, false),
        session_rule(S::ArgumentRespondent, S::Rebuttal, T::RoundCompleted, false, false),
        session_rule(S::Rebuttal, S::SurRebuttal, T::Faculty, false, true),
        session_rule(S::Rebuttal, S::Judging, T::Faculty, false, true),
        session_rule(S::SurRebuttal, S::Judging, T::Faculty, false, true),
        session_rule(S::Judging, S::Completed, T::AllEvaluationsComplete, true, true),
        session_rule(S::Preparing, S::Paused, T::Faculty, false, true),
        session_rule(S::ArgumentPetitioner, S::Paused, T::Faculty, false, true),
        session_rule(S::ArgumentRespondent, S::Paused, T::Faculty, false, true),
        session_rule(S::Rebuttal, S::Paused, T::Faculty, false, true),
        session_rule(S::SurRebuttal, S::Paused, T::Faculty, false, true),
        session_rule(S::Judging, S::Paused, T::Faculty, false, true),
        session_rule(S::Created, S::Cancelled, T::Faculty, false, true),
        session_rule(S::Preparing, S::Cancelled, T::Faculty, false, true),
        session_rule(S::ArgumentPetitioner, S::Cancelled, T::Faculty, false, true),
        session_rule(S::ArgumentRespondent, S::Cancelled, T::Faculty, false, true),
        session_rule(S::Rebuttal, S::Cancelled, T::Faculty, false, true),
        session_rule(S::SurRebuttal, S::Cancelled, T::Faculty, false, true),
        session_rule(S::Judging, S::Cancelled, T::Faculty, false, true),
        session_rule(S::Paused, S::Cancelled, T::Faculty, false, true),
    ]
}

// ============================================================================
// SECTION: Canonical Round Rules
// ============================================================================

/// Shorthand constructor for a round rule row.
const fn round_rule(
    from_state: RoundState,
    to_state: RoundState,
    trigger: TriggerType,
    requires_faculty: bool,
) -> TransitionRule<RoundState> {
    TransitionRule {
        from_state,
        to_state,
        trigger,
        requires_all_rounds_complete: false,
        requires_faculty,
    }
}

/// Canonical round transition table.
#[must_use]
pub fn round_transition_rules() -> Vec<TransitionRule<RoundState>> {
    use RoundState as R;
    use TriggerType as T;
    vec![
        round_rule(R::Waiting, R::ArgumentPetitioner, T::System, false),
        round_rule(R::ArgumentPetitioner, R::ArgumentRespondent, T::System, false),
        round_rule(R::ArgumentRespondent, R::Rebuttal, T::System, false),
        round_rule(R::Rebuttal, R::SurRebuttal, T::System, false),
        round_rule(R::Rebuttal, R::JudgeQuestions, T::System, false),
        round_rule(R::SurRebuttal, R::JudgeQuestions, T::System, false),
        round_rule(R::JudgeQuestions, R::Scoring, T::System, false),
        round_rule(R::Scoring, R::Completed, T::System, false),
        round_rule(R::ArgumentPetitioner, R::Paused, T::Faculty, true),
        round_rule(R::ArgumentRespondent, R::Paused, T::Faculty, true),
        round_rule(R::Rebuttal, R::Paused, T::Faculty, true),
        round_rule(R::SurRebuttal, R::Paused, T::Faculty, true),
        round_rule(R::JudgeQuestions, R::Paused, T::Faculty, true),
        round_rule(R::Scoring, R::Paused, T::Faculty, true),
        round_rule(R::Waiting, R::Cancelled, T::Faculty, true),
        round_rule(R::ArgumentPetitioner, R::Cancelled, T::Faculty, true),
        round_rule(R::ArgumentRespondent, R::Cancelled, T::Faculty, true),
        round_rule(R::Rebuttal, R::Cancelled, T::Faculty, true),
        round_rule(R::SurRebuttal, R::Cancelled, T::Faculty, true),
        round_rule(R::JudgeQuestions, R::Cancelled, T::Faculty, true),
        round_rule(R::Scoring, R::Cancelled, T::Faculty, true),
        round_rule(R::Paused, R::Cancelled, T::Faculty, true),
    ]
}
