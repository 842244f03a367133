// crates/juris-core/src/core/rubric.rs
// ============================================================================
// Module: Juris Rubrics
// Description: Frozen rubric versions and score validation against them.
// Purpose: Guarantee every score is reproducible under the rubric that judged it.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! A rubric version is an immutable, ordered list of criteria. Evaluations
//! reference the version id so a score can always be re-validated against the
//! exact document that produced it. Score payloads are typed maps keyed by
//! criterion code and validated on every ingress: full coverage, integer
//! values in `[0, max]`, no excess keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstitutionId;
use crate::core::identifiers::RubricVersionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Rubric Types
// ============================================================================

/// One scoring criterion within a rubric version.
///
/// # Invariants
/// - `key` is unique within its rubric version.
/// - `max_score` >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricCriterion {
    /// Stable criterion code (e.g. `framing`).
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Maximum integer score for the criterion.
    pub max_score: u32,
    /// Optional weight; when any criterion carries one, totals are weighted.
    pub weight: Option<u32>,
}

/// Frozen rubric document referenced by every evaluation.
///
/// # Invariants
/// - Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricVersion {
    /// Rubric version identifier.
    pub id: RubricVersionId,
    /// Institution scope.
    pub institution_id: InstitutionId,
    /// Ordered criteria.
    pub criteria: Vec<RubricCriterion>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Typed score payload: criterion code to integer score.
pub type ScoreMap = BTreeMap<String, u32>;

impl RubricVersion {
    /// Returns true when any criterion declares a weight.
    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.criteria.iter().any(|criterion| criterion.weight.is_some())
    }

    /// Validates a score map against this rubric.
    ///
    /// Every criterion must be present with a score in `[0, max_score]`, and
    /// no key outside the rubric is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreValidationError`] naming the first offending criterion.
    pub fn validate_scores(&self, scores: &ScoreMap) -> Result<(), ScoreValidationError> {
        for criterion in &self.criteria {
            match scores.get(&criterion.key) {
                None => {
                    return Err(ScoreValidationError::MissingCriterion {
                        key: criterion.key.clone(),
                    });
                }
                Some(&score) if score > criterion.max_score => {
                    return Err(ScoreValidationError::ScoreAboveMax {
                        key: criterion.key.clone(),
                        score,
                        max_score: criterion.max_score,
                    });
                }
                Some(_) => {}
            }
        }
        for key in scores.keys() {
            if !self.criteria.iter().any(|criterion| &criterion.key == key) {
                return Err(ScoreValidationError::UnknownCriterion { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Computes the total for a validated score map.
    ///
    /// Unweighted rubrics total by simple sum. Weighted rubrics total by
    /// `Σ (score/max)·weight` normalized over the weight sum, scaled to two
    /// decimal places.
    #[must_use]
    pub fn total_score(&self, scores: &ScoreMap) -> BigDecimal {
        if self.is_weighted() {
            let mut weighted = BigDecimal::from(0u32);
            let mut weight_sum = BigDecimal::from(0u32);
            for criterion in &self.criteria {
                let score = scores.get(&criterion.key).copied().unwrap_or(0);
                let weight = criterion.weight.unwrap_or(0);
                let ratio = BigDecimal::from(score) / BigDecimal::from(criterion.max_score.max(1));
                weighted += ratio * BigDecimal::from(weight);
                weight_sum += BigDecimal::from(weight);
            }
            if weight_sum == BigDecimal::from(0u32) {
                return BigDecimal::from(0u32).with_scale(2);
            }
            (weighted / weight_sum).with_scale_round(2, bigdecimal::RoundingMode::HalfUp)
        } else {
            let sum: u64 = self
                .criteria
                .iter()
                .map(|criterion| u64::from(scores.get(&criterion.key).copied().unwrap_or(0)))
                .sum();
            BigDecimal::from(sum).with_scale(2)
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when validating score payloads.
#[derive(Debug, thiserror::Error)]
pub enum ScoreValidationError {
    /// A rubric criterion has no score.
    #[error("missing score for criterion '{key}'")]
    MissingCriterion {
        /// Criterion code lacking a score.
        key: String,
    },
    /// A score exceeds the criterion maximum.
    #[error("score {score} for criterion '{key}' exceeds max {max_score}")]
    ScoreAboveMax {
        /// Criterion code.
        key: String,
        /// Offending score.
        score: u32,
        /// Allowed maximum.
        max_score: u32,
    },
    /// The payload carries a key outside the rubric.
    #[error("unknown criterion '{key}' not present in rubric")]
    UnknownCriterion {
        /// Unexpected criterion code.
        key: String,
    },
}
