// crates/juris-core/src/engine/config.rs
// ============================================================================
// Module: Juris Engine Configuration
// Description: Phase durations, transcript caps, and retry schedules.
// Purpose: Centralize the tunable facts the engines consult.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Engine configuration is a plain deserializable struct with serde defaults,
//! consumed from the host. Defaults mirror the production classroom values:
//! ten-minute arguments, three-minute rebuttals, five minutes for judge
//! questions and scoring, and the 50/150/300 ms conflict backoff schedule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;

use crate::core::RoundState;
use crate::core::SessionState;
use crate::core::turn::MAX_TRANSCRIPT_BYTES;

// ============================================================================
// SECTION: Phase Durations
// ============================================================================

/// Default seconds for each timed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PhaseDurations {
    /// Petitioner argument seconds.
    #[serde(default = "default_argument_seconds")]
    pub argument_petitioner: i64,
    /// Respondent argument seconds.
    #[serde(default = "default_argument_seconds")]
    pub argument_respondent: i64,
    /// Rebuttal seconds.
    #[serde(default = "default_rebuttal_seconds")]
    pub rebuttal: i64,
    /// Sur-rebuttal seconds.
    #[serde(default = "default_rebuttal_seconds")]
    pub sur_rebuttal: i64,
    /// Judge questioning seconds.
    #[serde(default = "default_questions_seconds")]
    pub judge_questions: i64,
    /// Scoring seconds.
    #[serde(default = "default_questions_seconds")]
    pub scoring: i64,
}

/// Default argument phase seconds (10 minutes).
const fn default_argument_seconds() -> i64 {
    600
}

/// Default rebuttal phase seconds (3 minutes).
const fn default_rebuttal_seconds() -> i64 {
    180
}

/// Default judge-questions and scoring seconds (5 minutes).
const fn default_questions_seconds() -> i64 {
    300
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            argument_petitioner: default_argument_seconds(),
            argument_respondent: default_argument_seconds(),
            rebuttal: default_rebuttal_seconds(),
            sur_rebuttal: default_rebuttal_seconds(),
            judge_questions: default_questions_seconds(),
            scoring: default_questions_seconds(),
        }
    }
}

impl PhaseDurations {
    /// Seconds for a timed round state; `None` for untimed states.
    #[must_use]
    pub const fn for_round_state(&self, state: RoundState) -> Option<i64> {
        match state {
            RoundState::ArgumentPetitioner => Some(self.argument_petitioner),
            RoundState::ArgumentRespondent => Some(self.argument_respondent),
            RoundState::Rebuttal => Some(self.rebuttal),
            RoundState::SurRebuttal => Some(self.sur_rebuttal),
            RoundState::JudgeQuestions => Some(self.judge_questions),
            RoundState::Scoring => Some(self.scoring),
            RoundState::Waiting
            | RoundState::Completed
            | RoundState::Cancelled
            | RoundState::Paused => None,
        }
    }

    /// Seconds for a timed session state; `None` for untimed states.
    #[must_use]
    pub const fn for_session_state(&self, state: SessionState) -> Option<i64> {
        match state {
            SessionState::ArgumentPetitioner => Some(self.argument_petitioner),
            SessionState::ArgumentRespondent => Some(self.argument_respondent),
            SessionState::Rebuttal => Some(self.rebuttal),
            SessionState::SurRebuttal => Some(self.sur_rebuttal),
            SessionState::Created
            | SessionState::Preparing
            | SessionState::Judging
            | SessionState::Completed
            | SessionState::Cancelled
            | SessionState::Paused => None,
        }
    }
}

// ============================================================================
// SECTION: Engine Configuration
// ============================================================================

/// Tunable facts consulted by the engines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Default seconds per timed phase.
    #[serde(default)]
    pub phase_durations: PhaseDurations,
    /// Default speaking seconds per turn.
    #[serde(default = "default_turn_seconds")]
    pub default_turn_seconds: i64,
    /// Maximum transcript size in bytes.
    #[serde(default = "default_max_transcript_bytes")]
    pub max_transcript_bytes: usize,
    /// Bounded backoff schedule (milliseconds) for concurrency conflicts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,
}

/// Default speaking seconds per turn (5 minutes).
const fn default_turn_seconds() -> i64 {
    300
}

/// Default transcript cap.
const fn default_max_transcript_bytes() -> usize {
    MAX_TRANSCRIPT_BYTES
}

/// Default conflict backoff schedule.
fn default_retry_backoff_ms() -> Vec<u64> {
    vec![50, 150, 300]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            phase_durations: PhaseDurations::default(),
            default_turn_seconds: default_turn_seconds(),
            max_transcript_bytes: default_max_transcript_bytes(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}
