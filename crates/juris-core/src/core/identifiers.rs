// crates/juris-core/src/core/identifiers.rs
// ============================================================================
// Module: Juris Identifiers
// Description: Canonical opaque identifiers for Juris aggregates and actors.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Juris.
//! Numeric identifiers serialize as numbers on the wire and enforce non-zero,
//! 1-based invariants at construction boundaries. The session code is the one
//! human-typeable identifier; it is validated against its fixed shape on every
//! construction and generated from a CSPRNG.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use rand::Rng;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Numeric Identifier Types
// ============================================================================

/// Institution identifier scoping every Juris aggregate.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstitutionId(NonZeroU64);

impl InstitutionId {
    /// Creates a new institution identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates an institution identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// User identifier consumed from the identity collaborator.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(NonZeroU64);

impl UserId {
    /// Creates a new user identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a user identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Session identifier for the top-level moot-court aggregate.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    /// Creates a new session identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a session identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Participant identifier for a user's membership in a session.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(NonZeroU64);

impl ParticipantId {
    /// Creates a new participant identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a participant identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Round identifier for a single bout within a session.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(NonZeroU64);

impl RoundId {
    /// Creates a new round identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a round identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Turn identifier for a single speaking slot within a round.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(NonZeroU64);

impl TurnId {
    /// Creates a new turn identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a turn identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Rubric version identifier referenced by every evaluation.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RubricVersionId(NonZeroU64);

impl RubricVersionId {
    /// Creates a new rubric version identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a rubric version identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RubricVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Judge assignment identifier linking a judge to an evaluation target.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(NonZeroU64);

impl AssignmentId {
    /// Creates a new assignment identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates an assignment identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Evaluation identifier for an individual judge's scoring record.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationId(NonZeroU64);

impl EvaluationId {
    /// Creates a new evaluation identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates an evaluation identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Leaderboard snapshot identifier for a session's frozen ranking.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(NonZeroU64);

impl SnapshotId {
    /// Creates a new snapshot identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a snapshot identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Session Code
// ============================================================================

/// Alphabet used for the random portion of a session code.
const SESSION_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed prefix of every session code.
const SESSION_CODE_PREFIX: &str = "JURIS-";

/// Length of the random suffix of a session code.
const SESSION_CODE_SUFFIX_LEN: usize = 6;

/// Human-typeable session join code.
///
/// # Invariants
/// - Wire form is exactly `JURIS-XXXXXX` with X in `[A-Z0-9]`.
/// - Validated on every construction; malformed codes never enter the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Parses a session code, rejecting any value outside the canonical shape.
    ///
    /// # Errors
    ///
    /// Returns [`SessionCodeError`] when the value does not match
    /// `JURIS-XXXXXX` with uppercase alphanumeric X.
    pub fn parse(value: impl Into<String>) -> Result<Self, SessionCodeError> {
        let value = value.into();
        let Some(suffix) = value.strip_prefix(SESSION_CODE_PREFIX) else {
            return Err(SessionCodeError::Malformed(value));
        };
        if suffix.len() != SESSION_CODE_SUFFIX_LEN {
            return Err(SessionCodeError::Malformed(value));
        }
        if !suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return Err(SessionCodeError::Malformed(value));
        }
        Ok(Self(value))
    }

    /// Generates a fresh session code from the operating-system CSPRNG.
    ///
    /// Uniqueness is a store concern; callers regenerate on clash.
    #[must_use]
    pub fn generate() -> Self {
        let mut code = String::with_capacity(SESSION_CODE_PREFIX.len() + SESSION_CODE_SUFFIX_LEN);
        code.push_str(SESSION_CODE_PREFIX);
        for _ in 0..SESSION_CODE_SUFFIX_LEN {
            let index = OsRng.gen_range(0..SESSION_CODE_ALPHABET.len());
            code.push(SESSION_CODE_ALPHABET[index] as char);
        }
        Self(code)
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = SessionCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

/// Errors raised when parsing session codes.
#[derive(Debug, thiserror::Error)]
pub enum SessionCodeError {
    /// Value did not match the canonical `JURIS-XXXXXX` shape.
    #[error("invalid session code format (expected JURIS-XXXXXX): {0}")]
    Malformed(String),
}
