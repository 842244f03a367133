// crates/juris-core/src/core/audit.rs
// ============================================================================
// Module: Juris Audit Events
// Description: Append-only audit rows keyed by (aggregate, sequence).
// Purpose: Capture the linearized forensic record of every state change.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every state-changing operation writes an audit row in the same transaction
//! as the mutation it describes; failed attempts write a row too, flagged
//! unsuccessful with the refusal reason. Rows are never updated or deleted.
//! Per-aggregate sequence numbers are contiguous and start at 1; a global
//! cursor orders rows across aggregates for live delivery fan-out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::checksum::HashError;
use crate::core::checksum::hash_canonical_json;
use crate::core::identity::Actor;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Aggregate References
// ============================================================================

/// Kinds of aggregates recorded in the audit log.
///
/// # Invariants
/// - Variants are stable for serialization and log partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    /// Session aggregate.
    Session,
    /// Participant membership row.
    Participant,
    /// Round aggregate.
    Round,
    /// Turn row.
    Turn,
    /// Judge evaluation row.
    Evaluation,
    /// Leaderboard snapshot.
    Snapshot,
}

impl AggregateType {
    /// Returns the stable label used by durable stores.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Participant => "participant",
            Self::Round => "round",
            Self::Turn => "turn",
            Self::Evaluation => "evaluation",
            Self::Snapshot => "snapshot",
        }
    }

    /// Parses the stable label used by durable stores.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "session" => Some(Self::Session),
            "participant" => Some(Self::Participant),
            "round" => Some(Self::Round),
            "turn" => Some(Self::Turn),
            "evaluation" => Some(Self::Evaluation),
            "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Reference to one aggregate's audit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    /// Aggregate kind.
    pub aggregate_type: AggregateType,
    /// Raw aggregate identifier.
    pub aggregate_id: u64,
}

impl AggregateRef {
    /// Creates an aggregate reference.
    #[must_use]
    pub const fn new(aggregate_type: AggregateType, aggregate_id: u64) -> Self {
        Self { aggregate_type, aggregate_id }
    }
}

// ============================================================================
// SECTION: Action Labels
// ============================================================================

/// Stable audit action labels.
pub mod actions {
    /// Session created with a fresh join code.
    pub const SESSION_CREATED: &str = "SESSION_CREATED";
    /// Participant joined and received a slot.
    pub const PARTICIPANT_ASSIGNED: &str = "PARTICIPANT_ASSIGNED";
    /// Join attempt refused.
    pub const JOIN_REJECTED: &str = "JOIN_REJECTED";
    /// Session or round state transition.
    pub const STATE_TRANSITION: &str = "STATE_TRANSITION";
    /// Faculty override transition.
    pub const FORCE_STATE_CHANGE: &str = "FORCE_STATE_CHANGE";
    /// Round created with its turn order.
    pub const ROUND_CREATED: &str = "ROUND_CREATED";
    /// Round reached COMPLETED.
    pub const ROUND_COMPLETED: &str = "ROUND_COMPLETED";
    /// Speaker started a turn.
    pub const TURN_STARTED: &str = "TURN_STARTED";
    /// Speaker submitted a turn.
    pub const TURN_SUBMITTED: &str = "TURN_SUBMITTED";
    /// Timer submitted a turn on the speaker's behalf.
    pub const AUTO_SUBMIT: &str = "AUTO_SUBMIT";
    /// Phase time extended.
    pub const TIME_EXTENDED: &str = "TIME_EXTENDED";
    /// Evaluation draft created.
    pub const EVALUATION_CREATED: &str = "EVALUATION_CREATED";
    /// Evaluation draft updated.
    pub const EVALUATION_UPDATED: &str = "EVALUATION_UPDATED";
    /// Evaluation finalized; row immutable from here.
    pub const EVALUATION_FINALIZED: &str = "EVALUATION_FINALIZED";
    /// Leaderboard frozen.
    pub const LEADERBOARD_FROZEN: &str = "LEADERBOARD_FROZEN";
    /// Snapshot submitted for approval.
    pub const SNAPSHOT_SUBMITTED: &str = "SNAPSHOT_SUBMITTED";
    /// Snapshot finalized by an approver.
    pub const SNAPSHOT_FINALIZED: &str = "SNAPSHOT_FINALIZED";
    /// Snapshot published.
    pub const SNAPSHOT_PUBLISHED: &str = "SNAPSHOT_PUBLISHED";
    /// Snapshot soft-invalidated.
    pub const SNAPSHOT_INVALIDATED: &str = "SNAPSHOT_INVALIDATED";
}

// ============================================================================
// SECTION: Audit Rows
// ============================================================================

/// Append-only audit log row.
///
/// # Invariants
/// - `(aggregate, sequence_number)` is unique; sequences start at 1 and are
///   contiguous per aggregate.
/// - Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Global cursor position assigned by the store.
    pub global_seq: u64,
    /// Aggregate this row belongs to.
    pub aggregate: AggregateRef,
    /// Per-aggregate monotonic sequence, starting at 1.
    pub sequence_number: u64,
    /// Stable action label.
    pub action: String,
    /// Acting user, or system.
    pub actor: Actor,
    /// State before the mutation, when applicable.
    pub from_state: Option<String>,
    /// State after the mutation, when applicable.
    pub to_state: Option<String>,
    /// Opaque JSON payload.
    pub payload: Value,
    /// Caller IP, when supplied by the transport.
    pub ip_address: Option<String>,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// False for refused attempts.
    pub is_successful: bool,
    /// Refusal reason for unsuccessful rows.
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Digest of the payload over RFC 8785 canonical JSON, for integrity
    /// columns in durable stores.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the payload cannot be canonicalized.
    pub fn payload_digest(&self) -> Result<String, HashError> {
        hash_canonical_json(&self.payload)
    }
}

/// Audit row content supplied by engines; the store assigns sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    /// Stable action label.
    pub action: String,
    /// Acting user, or system.
    pub actor: Actor,
    /// State before the mutation, when applicable.
    pub from_state: Option<String>,
    /// State after the mutation, when applicable.
    pub to_state: Option<String>,
    /// Opaque JSON payload.
    pub payload: Value,
    /// Caller IP, when supplied by the transport.
    pub ip_address: Option<String>,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// False for refused attempts.
    pub is_successful: bool,
    /// Refusal reason for unsuccessful rows.
    pub error_message: Option<String>,
}

impl AuditDraft {
    /// Creates a successful audit draft.
    #[must_use]
    pub fn success(action: &str, actor: Actor, timestamp: Timestamp) -> Self {
        Self {
            action: action.to_owned(),
            actor,
            from_state: None,
            to_state: None,
            payload: Value::Null,
            ip_address: None,
            timestamp,
            is_successful: true,
            error_message: None,
        }
    }

    /// Creates a refused-attempt audit draft carrying the refusal reason.
    #[must_use]
    pub fn failure(action: &str, actor: Actor, timestamp: Timestamp, error_message: &str) -> Self {
        Self {
            action: action.to_owned(),
            actor,
            from_state: None,
            to_state: None,
            payload: Value::Null,
            ip_address: None,
            timestamp,
            is_successful: false,
            error_message: Some(error_message.to_owned()),
        }
    }

    /// Attaches from/to states.
    #[must_use]
    pub fn with_states(mut self, from_state: Option<String>, to_state: Option<String>) -> Self {
        self.from_state = from_state;
        self.to_state = to_state;
        self
    }

    /// Attaches a JSON payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attaches the caller IP.
    #[must_use]
    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

// ============================================================================
// SECTION: Event Cursor
// ============================================================================

/// Cursor over the global event stream, for reconnecting delivery layers.
///
/// # Invariants
/// - `0` is the beginning of the stream; cursors only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EventCursor(u64);

impl EventCursor {
    /// Cursor pointing before the first event.
    pub const START: Self = Self(0);

    /// Creates a cursor from a raw position.
    #[must_use]
    pub const fn new(position: u64) -> Self {
        Self(position)
    }

    /// Returns the raw position.
    #[must_use]
    pub const fn position(self) -> u64 {
        self.0
    }
}
