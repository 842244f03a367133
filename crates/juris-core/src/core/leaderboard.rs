// crates/juris-core/src/core/leaderboard.rs
// ============================================================================
// Module: Juris Leaderboards
// Description: Frozen snapshot and entry rows with tamper-evident checksums.
// Purpose: Model the immutable, governed outcome of a completed session.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! A snapshot freezes a session's ranking at a moment in time. Entry rows are
//! written once, in rank order, inside a single transaction; the snapshot's
//! checksum is SHA-256 over a fixed canonical encoding of those rows and is
//! never recomputed in place. After creation only the governance flags move,
//! and they move monotonically: DRAFT → PENDING_APPROVAL → FINALIZED →
//! PUBLISHED, with soft INVALIDATED as the sole sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use bigdecimal::RoundingMode;
use serde::Deserialize;
use serde::Serialize;

use crate::core::checksum::sha256_hex;
use crate::core::identifiers::EvaluationId;
use crate::core::identifiers::InstitutionId;
use crate::core::identifiers::ParticipantId;
use crate::core::identifiers::RubricVersionId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::SnapshotId;
use crate::core::identifiers::UserId;
use crate::core::participant::Side;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Publication Mode
// ============================================================================

/// Publication mode controlling student visibility.
///
/// # Invariants
/// - Variants are stable for serialization and governance checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationMode {
    /// Not yet slated for publication.
    #[default]
    Draft,
    /// Becomes visible automatically at `publication_date`.
    Scheduled,
    /// Published and visible.
    Published,
}

impl PublicationMode {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Published => "PUBLISHED",
        }
    }

    /// Parses the canonical uppercase label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(Self::Draft),
            "SCHEDULED" => Some(Self::Scheduled),
            "PUBLISHED" => Some(Self::Published),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Governance State
// ============================================================================

/// Governance position of a snapshot, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceState {
    /// Freshly frozen, not yet submitted for approval.
    Draft,
    /// Submitted by faculty, awaiting an approver.
    PendingApproval,
    /// Approved; eligible for publication.
    Finalized,
    /// Published to its audience.
    Published,
    /// Soft-invalidated; row retained with reason.
    Invalidated,
}

// ============================================================================
// SECTION: Snapshot Rows
// ============================================================================

/// Immutable snapshot of a session leaderboard at freeze time.
///
/// # Invariants
/// - One snapshot per session.
/// - `checksum_hash` is written once and never recomputed in place.
/// - Rows are soft-invalidated only; never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    /// Snapshot identifier.
    pub id: SnapshotId,
    /// Frozen session.
    pub session_id: SessionId,
    /// Institution scope.
    pub institution_id: InstitutionId,
    /// Freeze timestamp.
    pub frozen_at: Timestamp,
    /// Faculty member who froze the leaderboard.
    pub frozen_by: UserId,
    /// Rubric version every contributing evaluation referenced.
    pub rubric_version_id: RubricVersionId,
    /// Number of ranked participants.
    pub total_participants: u32,
    /// SHA-256 hex of the canonical entry rows.
    pub checksum_hash: String,
    /// Governance: submitted for approval.
    pub is_pending_approval: bool,
    /// Governance: approved by an approver capability.
    pub is_finalized: bool,
    /// Set at finalization.
    pub finalized_at: Option<Timestamp>,
    /// Publication mode.
    pub publication_mode: PublicationMode,
    /// Visibility date for SCHEDULED mode.
    pub publication_date: Option<Timestamp>,
    /// Governance: published.
    pub is_published: bool,
    /// Set at publication.
    pub published_at: Option<Timestamp>,
    /// Who published.
    pub published_by: Option<UserId>,
    /// Soft-invalidation flag.
    pub is_invalidated: bool,
    /// Reason recorded at invalidation.
    pub invalidated_reason: Option<String>,
    /// Set at invalidation.
    pub invalidated_at: Option<Timestamp>,
    /// Who invalidated.
    pub invalidated_by: Option<UserId>,
}

impl LeaderboardSnapshot {
    /// Returns the derived governance position.
    #[must_use]
    pub const fn governance_state(&self) -> GovernanceState {
        if self.is_invalidated {
            GovernanceState::Invalidated
        } else if self.is_published {
            GovernanceState::Published
        } else if self.is_finalized {
            GovernanceState::Finalized
        } else if self.is_pending_approval {
            GovernanceState::PendingApproval
        } else {
            GovernanceState::Draft
        }
    }

    /// Returns true when the snapshot meets the publication preconditions.
    #[must_use]
    pub const fn can_be_published(&self) -> bool {
        self.is_finalized && !self.is_invalidated && !self.is_published
    }

    /// Returns true when students may view this snapshot at `now`.
    #[must_use]
    pub fn is_visible_to_students(&self, now: Timestamp) -> bool {
        if !self.is_published || self.is_invalidated {
            return false;
        }
        match self.publication_mode {
            PublicationMode::Scheduled => {
                self.publication_date.is_some_and(|date| date <= now)
            }
            PublicationMode::Draft | PublicationMode::Published => true,
        }
    }
}

// ============================================================================
// SECTION: Entry Rows
// ============================================================================

/// Single participant entry in a frozen leaderboard.
///
/// # Invariants
/// - `(snapshot_id, participant_id)` and `(snapshot_id, rank, participant_id)`
///   are unique.
/// - Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Owning snapshot.
    pub snapshot_id: SnapshotId,
    /// Ranked participant.
    pub participant_id: ParticipantId,
    /// Participant side at freeze time.
    pub side: Side,
    /// Speaker number at freeze time.
    pub speaker_number: u8,
    /// Mean total score across finalized evaluations (two decimal places).
    pub total_score: BigDecimal,
    /// Deterministic tie-breaker (four decimal places).
    pub tie_breaker_score: BigDecimal,
    /// Dense rank (equal tuples share a rank; next rank skipped by group size).
    pub rank: u32,
    /// Per-criterion average breakdown.
    pub score_breakdown: BTreeMap<String, BigDecimal>,
    /// Evaluations that contributed to this entry.
    pub evaluation_ids: Vec<EvaluationId>,
}

// ============================================================================
// SECTION: New Rows
// ============================================================================

/// New snapshot row handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    /// Frozen session.
    pub session_id: SessionId,
    /// Institution scope.
    pub institution_id: InstitutionId,
    /// Freeze timestamp.
    pub frozen_at: Timestamp,
    /// Faculty member who froze the leaderboard.
    pub frozen_by: UserId,
    /// Rubric version every contributing evaluation referenced.
    pub rubric_version_id: RubricVersionId,
    /// Number of ranked participants.
    pub total_participants: u32,
    /// SHA-256 hex of the canonical entry rows.
    pub checksum_hash: String,
}

/// New entry row handed to the store alongside its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLeaderboardEntry {
    /// Ranked participant.
    pub participant_id: ParticipantId,
    /// Participant side at freeze time.
    pub side: Side,
    /// Speaker number at freeze time.
    pub speaker_number: u8,
    /// Mean total score across finalized evaluations (two decimal places).
    pub total_score: BigDecimal,
    /// Deterministic tie-breaker (four decimal places).
    pub tie_breaker_score: BigDecimal,
    /// Dense rank.
    pub rank: u32,
    /// Per-criterion average breakdown.
    pub score_breakdown: BTreeMap<String, BigDecimal>,
    /// Evaluations that contributed to this entry.
    pub evaluation_ids: Vec<EvaluationId>,
}

// ============================================================================
// SECTION: Canonical Checksum
// ============================================================================

/// Renders a score at the fixed two-decimal contract scale.
#[must_use]
pub fn format_total_score(value: &BigDecimal) -> String {
    value.with_scale_round(2, RoundingMode::HalfUp).to_string()
}

/// Renders a tie-breaker at the fixed four-decimal contract scale.
#[must_use]
pub fn format_tie_breaker(value: &BigDecimal) -> String {
    value.with_scale_round(4, RoundingMode::HalfUp).to_string()
}

/// Renders one canonical checksum row:
/// `rank|participant_id|total_score|tie_breaker_score`.
#[must_use]
pub fn canonical_row(
    rank: u32,
    participant_id: ParticipantId,
    total_score: &BigDecimal,
    tie_breaker_score: &BigDecimal,
) -> String {
    format!(
        "{rank}|{participant_id}|{total}|{tie}",
        total = format_total_score(total_score),
        tie = format_tie_breaker(tie_breaker_score),
    )
}

/// Produces the canonical byte sequence hashed into the snapshot checksum.
///
/// Entries must be supplied in rank order. Each row renders per
/// [`canonical_row`] and rows join with `;`, e.g.
/// `1|A|87.50|0.8700;2|B|85.00|0.8500`.
#[must_use]
pub fn canonical_entry_bytes(entries: &[LeaderboardEntry]) -> Vec<u8> {
    let rows: Vec<String> = entries
        .iter()
        .map(|entry| {
            canonical_row(
                entry.rank,
                entry.participant_id,
                &entry.total_score,
                &entry.tie_breaker_score,
            )
        })
        .collect();
    rows.join(";").into_bytes()
}

/// Computes the snapshot checksum over the canonical entry bytes.
#[must_use]
pub fn compute_checksum(entries: &[LeaderboardEntry]) -> String {
    sha256_hex(&canonical_entry_bytes(entries))
}
