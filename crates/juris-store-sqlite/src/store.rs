// crates/juris-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Session Store
// Description: Durable implementation of the Juris store interfaces.
// Purpose: Persist sessions, rounds, scores, and audit rows with SQLite WAL.
// Dependencies: juris-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One mutex-guarded connection serves every interface; each store method is
//! a single transaction, so a domain write and its audit row commit together
//! or not at all. Uniqueness lands in the schema, with partial indexes for
//! the active-row constraints, and constraint violations are translated into
//! named conflicts the engines expect. Loads verify audit payload hashes and
//! fail closed on corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use bigdecimal::BigDecimal;
use juris_core::AggregateRef;
use juris_core::AggregateType;
use juris_core::AssignmentId;
use juris_core::AuditDraft;
use juris_core::AuditEvent;
use juris_core::ConnectionStatus;
use juris_core::EvaluationId;
use juris_core::EvaluationTarget;
use juris_core::EventCursor;
use juris_core::InstitutionId;
use juris_core::JudgeAssignment;
use juris_core::JudgeEvaluation;
use juris_core::LeaderboardEntry;
use juris_core::LeaderboardSnapshot;
use juris_core::NewJudgeAssignment;
use juris_core::NewJudgeEvaluation;
use juris_core::NewLeaderboardEntry;
use juris_core::NewParticipant;
use juris_core::NewRound;
use juris_core::NewSession;
use juris_core::NewSnapshot;
use juris_core::NewTurn;
use juris_core::Participant;
use juris_core::ParticipantId;
use juris_core::PhaseTimer;
use juris_core::PhaseWindow;
use juris_core::PublicationMode;
use juris_core::Round;
use juris_core::RoundId;
use juris_core::RoundState;
use juris_core::RubricCriterion;
use juris_core::RubricVersion;
use juris_core::RubricVersionId;
use juris_core::SeatRef;
use juris_core::Session;
use juris_core::SessionCode;
use juris_core::SessionId;
use juris_core::SessionState;
use juris_core::Side;
use juris_core::Slot;
use juris_core::SnapshotId;
use juris_core::Timestamp;
use juris_core::TransitionRule;
use juris_core::TriggerType;
use juris_core::Turn;
use juris_core::TurnId;
use juris_core::UserId;
use juris_core::hash_canonical_json;
use juris_core::identity::Actor;
use juris_core::interfaces::EvaluationStore;
use juris_core::interfaces::EventLog;
use juris_core::interfaces::EventPage;
use juris_core::interfaces::LeaderboardStore;
use juris_core::interfaces::ParticipantStore;
use juris_core::interfaces::RoundStore;
use juris_core::interfaces::RubricStore;
use juris_core::interfaces::SessionStore;
use juris_core::interfaces::StoreError;
use juris_core::round_transition_rules;
use juris_core::session_transition_rules;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Named uniqueness conflict.
    #[error("sqlite store unique violation on {0}")]
    Unique(String),
    /// Optimistic version conflict.
    #[error("sqlite store version conflict: expected {expected}, found {found}")]
    Version {
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },
    /// Append-after sequence conflict.
    #[error("sqlite store sequence conflict: expected previous {expected}, found {found}")]
    Sequence {
        /// Sequence the caller expected.
        expected: u64,
        /// Sequence actually stored.
        found: u64,
    },
    /// The target row is immutable.
    #[error("sqlite store immutable row: {0}")]
    Immutable(String),
    /// Referenced row does not exist.
    #[error("sqlite store not found: {0}")]
    NotFound(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    SchemaMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::SchemaMismatch(message) => {
                Self::Io(message)
            }
            SqliteStoreError::Unique(constraint) => Self::UniqueViolation { constraint },
            SqliteStoreError::Version { expected, found } => {
                Self::VersionConflict { expected, found }
            }
            SqliteStoreError::Sequence { expected, found } => {
                Self::SequenceConflict { expected, found }
            }
            SqliteStoreError::Immutable(message) => Self::Immutable(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Internal result alias.
type SqlResult<T> = Result<T, SqliteStoreError>;

/// Translates a rusqlite error, naming violated unique constraints.
fn db_err(error: &rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = error {
        if failure.code == ErrorCode::ConstraintViolation {
            let message = message.clone().unwrap_or_default();
            return SqliteStoreError::Unique(constraint_name(&message));
        }
    }
    SqliteStoreError::Db(error.to_string())
}

/// Maps a `SQLite` constraint message to the engine-facing constraint name.
fn constraint_name(message: &str) -> String {
    const NAMES: &[(&str, &str)] = &[
        ("uq_participant_user", "participant_user"),
        ("participants.session_id, participants.user_id", "participant_user"),
        ("uq_participant_slot", "participant_slot"),
        ("participants.session_id, participants.side", "participant_slot"),
        ("sessions.session_code", "session_code"),
        ("uq_sessions_faculty_active", "faculty_active_session"),
        ("sessions.faculty_id", "faculty_active_session"),
        ("snapshots.session_id", "snapshot_session"),
        ("uq_evaluation_target_judge", "evaluation_target_judge"),
        ("evaluations.round_id", "evaluation_target_judge"),
        ("uq_assignment_judge_target", "assignment_judge_target"),
        ("judge_assignments.judge_id", "assignment_judge_target"),
        ("turns.round_id", "turn_uniqueness"),
        ("snapshot_entries.snapshot_id", "snapshot_entry_uniqueness"),
        ("rubric_versions", "rubric_version"),
        ("audit_events", "audit_sequence"),
    ];
    for (needle, name) in NAMES {
        if message.contains(needle) {
            return (*name).to_owned();
        }
    }
    message.to_owned()
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed Juris store with WAL support.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens an `SQLite`-backed store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> SqlResult<Self> {
        ensure_parent_dir(&config.path)?;
        let connection =
            Connection::open(&config.path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Self::from_connection(connection, config)
    }

    /// Opens a private in-memory store (tests, ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> SqlResult<Self> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        let config = SqliteStoreConfig {
            path: PathBuf::from(":memory:"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Delete,
            sync_mode: SqliteSyncMode::Normal,
        };
        Self::from_connection(connection, &config)
    }

    /// Applies pragmas and initializes the schema on a fresh connection.
    fn from_connection(mut connection: Connection, config: &SqliteStoreConfig) -> SqlResult<Self> {
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Locks the connection, failing closed on poisoning.
    fn locked(&self) -> SqlResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_owned()))
    }

    /// Runs `body` inside a transaction, committing on success.
    fn transact<T>(&self, body: impl FnOnce(&Transaction<'_>) -> SqlResult<T>) -> SqlResult<T> {
        let mut guard = self.locked()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        let value = body(&tx)?;
        tx.commit().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Ok(value)
    }
}

/// Creates the parent directory of the database path when missing.
fn ensure_parent_dir(path: &Path) -> SqlResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates tables, indexes, and seeds the transition rule tables.
fn initialize_schema(connection: &mut Connection) -> SqlResult<()> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution_id INTEGER NOT NULL,
            faculty_id INTEGER NOT NULL,
            session_code TEXT NOT NULL UNIQUE,
            state TEXT NOT NULL,
            previous_state TEXT,
            phase_started_at INTEGER,
            phase_duration_seconds INTEGER,
            pause_accumulated_seconds INTEGER NOT NULL DEFAULT 0,
            paused_at INTEGER,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            state_updated_at INTEGER NOT NULL,
            completed_at INTEGER,
            cancelled_at INTEGER,
            is_active INTEGER NOT NULL,
            CHECK ((phase_started_at IS NULL) = (phase_duration_seconds IS NULL))
         );
         CREATE UNIQUE INDEX IF NOT EXISTS uq_sessions_faculty_active
            ON sessions(faculty_id)
            WHERE state NOT IN ('COMPLETED', 'CANCELLED');
         CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE RESTRICT,
            user_id INTEGER NOT NULL,
            side TEXT,
            speaker_number INTEGER,
            joined_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL,
            connection TEXT NOT NULL,
            last_seen_at INTEGER NOT NULL,
            CHECK ((side IS NULL) = (speaker_number IS NULL))
         );
         CREATE UNIQUE INDEX IF NOT EXISTS uq_participant_user
            ON participants(session_id, user_id)
            WHERE is_active = 1;
         CREATE UNIQUE INDEX IF NOT EXISTS uq_participant_slot
            ON participants(session_id, side, speaker_number)
            WHERE is_active = 1 AND side IS NOT NULL;
         CREATE TABLE IF NOT EXISTS rounds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE RESTRICT,
            round_number INTEGER NOT NULL,
            petitioner_kind TEXT NOT NULL,
            petitioner_user INTEGER,
            respondent_kind TEXT NOT NULL,
            respondent_user INTEGER,
            judge_kind TEXT,
            judge_user INTEGER,
            state TEXT NOT NULL,
            previous_state TEXT,
            phase_started_at INTEGER,
            phase_duration_seconds INTEGER,
            pause_accumulated_seconds INTEGER NOT NULL DEFAULT 0,
            paused_at INTEGER,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            ended_at INTEGER,
            CHECK ((phase_started_at IS NULL) = (phase_duration_seconds IS NULL))
         );
         CREATE TABLE IF NOT EXISTS turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            round_id INTEGER NOT NULL REFERENCES rounds(id) ON DELETE RESTRICT,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE RESTRICT,
            turn_order INTEGER NOT NULL,
            allowed_seconds INTEGER NOT NULL,
            started_at INTEGER,
            submitted_at INTEGER,
            transcript TEXT NOT NULL DEFAULT '',
            word_count INTEGER NOT NULL DEFAULT 0,
            is_submitted INTEGER NOT NULL DEFAULT 0,
            auto_submitted INTEGER NOT NULL DEFAULT 0,
            UNIQUE (round_id, turn_order),
            UNIQUE (round_id, participant_id)
         );
         CREATE TABLE IF NOT EXISTS rubric_versions (
            id INTEGER PRIMARY KEY,
            institution_id INTEGER NOT NULL,
            criteria_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS judge_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            judge_id INTEGER NOT NULL,
            round_id INTEGER NOT NULL REFERENCES rounds(id) ON DELETE RESTRICT,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE RESTRICT,
            is_blind INTEGER NOT NULL DEFAULT 0
         );
         CREATE UNIQUE INDEX IF NOT EXISTS uq_assignment_judge_target
            ON judge_assignments(judge_id, round_id, participant_id);
         CREATE TABLE IF NOT EXISTS evaluations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            round_id INTEGER NOT NULL REFERENCES rounds(id) ON DELETE RESTRICT,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE RESTRICT,
            judge_id INTEGER NOT NULL,
            rubric_version_id INTEGER NOT NULL REFERENCES rubric_versions(id) ON DELETE RESTRICT,
            scores_json TEXT NOT NULL,
            total_score TEXT NOT NULL,
            remarks TEXT,
            is_draft INTEGER NOT NULL DEFAULT 1,
            is_final INTEGER NOT NULL DEFAULT 0,
            finalized_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
         );
         CREATE UNIQUE INDEX IF NOT EXISTS uq_evaluation_target_judge
            ON evaluations(round_id, participant_id, judge_id);
         CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE RESTRICT,
            institution_id INTEGER NOT NULL,
            frozen_at INTEGER NOT NULL,
            frozen_by INTEGER NOT NULL,
            rubric_version_id INTEGER NOT NULL REFERENCES rubric_versions(id) ON DELETE RESTRICT,
            total_participants INTEGER NOT NULL,
            checksum_hash TEXT NOT NULL,
            is_pending_approval INTEGER NOT NULL DEFAULT 0,
            is_finalized INTEGER NOT NULL DEFAULT 0,
            finalized_at INTEGER,
            publication_mode TEXT NOT NULL DEFAULT 'DRAFT',
            publication_date INTEGER,
            is_published INTEGER NOT NULL DEFAULT 0,
            published_at INTEGER,
            published_by INTEGER,
            is_invalidated INTEGER NOT NULL DEFAULT 0,
            invalidated_reason TEXT,
            invalidated_at INTEGER,
            invalidated_by INTEGER
         );
         CREATE TABLE IF NOT EXISTS snapshot_entries (
            snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE RESTRICT,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE RESTRICT,
            side TEXT NOT NULL,
            speaker_number INTEGER NOT NULL,
            total_score TEXT NOT NULL,
            tie_breaker_score TEXT NOT NULL,
            rank INTEGER NOT NULL,
            score_breakdown_json TEXT NOT NULL,
            evaluation_ids_json TEXT NOT NULL,
            UNIQUE (snapshot_id, participant_id),
            UNIQUE (snapshot_id, rank, participant_id)
         );
         CREATE TABLE IF NOT EXISTS audit_events (
            global_seq INTEGER PRIMARY KEY AUTOINCREMENT,
            aggregate_type TEXT NOT NULL,
            aggregate_id INTEGER NOT NULL,
            sequence_number INTEGER NOT NULL,
            action TEXT NOT NULL,
            actor_user_id INTEGER,
            from_state TEXT,
            to_state TEXT,
            payload_json TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            ip_address TEXT,
            timestamp INTEGER NOT NULL,
            is_successful INTEGER NOT NULL,
            error_message TEXT,
            UNIQUE (aggregate_type, aggregate_id, sequence_number)
         );
         CREATE INDEX IF NOT EXISTS idx_audit_aggregate
            ON audit_events(aggregate_type, aggregate_id, sequence_number);
         CREATE TABLE IF NOT EXISTS session_transition_rules (
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            requires_all_rounds_complete INTEGER NOT NULL,
            requires_faculty INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY (from_state, to_state)
         );
         CREATE TABLE IF NOT EXISTS round_transition_rules (
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            requires_all_rounds_complete INTEGER NOT NULL,
            requires_faculty INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY (from_state, to_state)
         );",
    )
    .map_err(|err| SqliteStoreError::Io(err.to_string()))?;

    let stored: Option<String> = tx
        .query_row("SELECT value FROM schema_meta WHERE key = 'schema_version'", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    match stored {
        None => {
            tx.execute(
                "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION.to_string() => {}
        Some(value) => {
            return Err(SqliteStoreError::SchemaMismatch(format!(
                "expected schema version {SCHEMA_VERSION}, found {value}"
            )));
        }
    }

    for (index, rule) in session_transition_rules().iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO session_transition_rules
                (from_state, to_state, trigger_type, requires_all_rounds_complete,
                 requires_faculty, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.from_state.as_str(),
                rule.to_state.as_str(),
                rule.trigger.as_str(),
                i64::from(rule.requires_all_rounds_complete),
                i64::from(rule.requires_faculty),
                i64::try_from(index).unwrap_or(i64::MAX),
            ],
        )
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    for (index, rule) in round_transition_rules().iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO round_transition_rules
                (from_state, to_state, trigger_type, requires_all_rounds_complete,
                 requires_faculty, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.from_state.as_str(),
                rule.to_state.as_str(),
                rule.trigger.as_str(),
                i64::from(rule.requires_all_rounds_complete),
                i64::from(rule.requires_faculty),
                i64::try_from(index).unwrap_or(i64::MAX),
            ],
        )
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }

    tx.commit().map_err(|err| SqliteStoreError::Io(err.to_string()))
}

// ============================================================================
// SECTION: Conversion Helpers
// ============================================================================

/// Converts a raw id for storage.
fn to_db_id(raw: u64) -> SqlResult<i64> {
    i64::try_from(raw).map_err(|_| SqliteStoreError::Invalid(format!("id {raw} out of range")))
}

/// Recovers a non-zero id from storage.
fn db_nonzero(raw: i64) -> SqlResult<NonZeroU64> {
    let raw = u64::try_from(raw)
        .map_err(|_| SqliteStoreError::Corrupt(format!("negative id {raw}")))?;
    NonZeroU64::new(raw).ok_or_else(|| SqliteStoreError::Corrupt("zero id".to_owned()))
}

/// Converts an optional user id for storage.
fn user_to_db(user: Option<UserId>) -> SqlResult<Option<i64>> {
    user.map(|user| to_db_id(user.get())).transpose()
}

/// Recovers an optional user id from storage.
fn user_from_db(raw: Option<i64>) -> SqlResult<Option<UserId>> {
    raw.map(|raw| db_nonzero(raw).map(UserId::new)).transpose()
}

/// Converts a version counter from storage.
fn version_from_db(raw: i64) -> SqlResult<u64> {
    u64::try_from(raw).map_err(|_| SqliteStoreError::Corrupt(format!("negative version {raw}")))
}

/// Encodes a seat reference for storage.
fn seat_to_db(seat: SeatRef) -> SqlResult<(&'static str, Option<i64>)> {
    match seat {
        SeatRef::User(user) => Ok(("user", Some(to_db_id(user.get())?))),
        SeatRef::Synthetic => Ok(("synthetic", None)),
    }
}

/// Decodes a seat reference from storage.
fn seat_from_db(kind: &str, user: Option<i64>) -> SqlResult<SeatRef> {
    match (kind, user) {
        ("user", Some(raw)) => Ok(SeatRef::User(UserId::new(db_nonzero(raw)?))),
        ("synthetic", None) => Ok(SeatRef::Synthetic),
        _ => Err(SqliteStoreError::Corrupt(format!("invalid seat encoding {kind}"))),
    }
}

/// Decodes phase timer columns.
fn timer_from_db(
    phase_started_at: Option<i64>,
    phase_duration_seconds: Option<i64>,
    pause_accumulated_seconds: i64,
    paused_at: Option<i64>,
) -> SqlResult<PhaseTimer> {
    let window = match (phase_started_at, phase_duration_seconds) {
        (Some(started), Some(duration)) => Some(PhaseWindow {
            started_at: Timestamp::from_unix_millis(started),
            duration_seconds: duration,
        }),
        (None, None) => None,
        _ => {
            return Err(SqliteStoreError::Corrupt(
                "phase timer columns must be both set or both null".to_owned(),
            ));
        }
    };
    Ok(PhaseTimer {
        window,
        pause_accumulated_seconds,
        paused_at: paused_at.map(Timestamp::from_unix_millis),
    })
}

/// Encodes phase timer columns.
const fn timer_to_db(timer: &PhaseTimer) -> (Option<i64>, Option<i64>, i64, Option<i64>) {
    let (started, duration) = match timer.window {
        Some(window) => (Some(window.started_at.unix_millis()), Some(window.duration_seconds)),
        None => (None, None),
    };
    let paused = match timer.paused_at {
        Some(at) => Some(at.unix_millis()),
        None => None,
    };
    (started, duration, timer.pause_accumulated_seconds, paused)
}

/// Parses a stored decimal, failing closed.
fn decimal_from_db(value: &str) -> SqlResult<BigDecimal> {
    BigDecimal::from_str(value)
        .map_err(|_| SqliteStoreError::Corrupt(format!("invalid decimal '{value}'")))
}

/// Parses a stored state label, failing closed.
fn session_state_from_db(value: &str) -> SqlResult<SessionState> {
    SessionState::parse(value)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown session state '{value}'")))
}

/// Parses a stored round state label, failing closed.
fn round_state_from_db(value: &str) -> SqlResult<RoundState> {
    RoundState::parse(value)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown round state '{value}'")))
}

/// Inserts an audit event inside the caller's transaction.
fn insert_event_tx(
    tx: &Transaction<'_>,
    aggregate: AggregateRef,
    draft: &AuditDraft,
) -> SqlResult<AuditEvent> {
    let latest: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM audit_events
             WHERE aggregate_type = ?1 AND aggregate_id = ?2",
            params![aggregate.aggregate_type.as_str(), to_db_id(aggregate.aggregate_id)?],
            |row| row.get(0),
        )
        .map_err(|err| db_err(&err))?;
    let sequence_number = version_from_db(latest)?.saturating_add(1);
    let payload_json = serde_json::to_string(&draft.payload)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let payload_hash = hash_canonical_json(&draft.payload)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    tx.execute(
        "INSERT INTO audit_events
            (aggregate_type, aggregate_id, sequence_number, action, actor_user_id,
             from_state, to_state, payload_json, payload_hash, ip_address, timestamp,
             is_successful, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            aggregate.aggregate_type.as_str(),
            to_db_id(aggregate.aggregate_id)?,
            to_db_id(sequence_number)?,
            draft.action,
            user_to_db(draft.actor.user_id())?,
            draft.from_state,
            draft.to_state,
            payload_json,
            payload_hash,
            draft.ip_address,
            draft.timestamp.unix_millis(),
            i64::from(draft.is_successful),
            draft.error_message,
        ],
    )
    .map_err(|err| db_err(&err))?;
    let global_seq: i64 = tx.last_insert_rowid();
    Ok(AuditEvent {
        global_seq: version_from_db(global_seq)?,
        aggregate,
        sequence_number,
        action: draft.action.clone(),
        actor: draft.actor,
        from_state: draft.from_state.clone(),
        to_state: draft.to_state.clone(),
        payload: draft.payload.clone(),
        ip_address: draft.ip_address.clone(),
        timestamp: draft.timestamp,
        is_successful: draft.is_successful,
        error_message: draft.error_message.clone(),
    })
}

/// Raw audit row as read from storage.
type AuditRow = (
    i64,
    String,
    i64,
    i64,
    String,
    Option<i64>,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
    i64,
    i64,
    Option<String>,
);

/// Builds an [`AuditEvent`] from a raw row, verifying the payload hash.
fn event_from_row(row: AuditRow) -> SqlResult<AuditEvent> {
    let (
        global_seq,
        aggregate_type,
        aggregate_id,
        sequence_number,
        action,
        actor_user_id,
        from_state,
        to_state,
        payload_json,
        payload_hash,
        ip_address,
        timestamp,
        is_successful,
        error_message,
    ) = row;
    let aggregate_type = AggregateType::parse(&aggregate_type).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("unknown aggregate type '{aggregate_type}'"))
    })?;
    let payload: serde_json::Value = serde_json::from_str(&payload_json)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    let expected = hash_canonical_json(&payload)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    if expected != payload_hash {
        return Err(SqliteStoreError::Corrupt("audit payload hash mismatch".to_owned()));
    }
    Ok(AuditEvent {
        global_seq: version_from_db(global_seq)?,
        aggregate: AggregateRef::new(aggregate_type, version_from_db(aggregate_id)?),
        sequence_number: version_from_db(sequence_number)?,
        action,
        actor: Actor::from(user_from_db(actor_user_id)?),
        from_state,
        to_state,
        payload,
        ip_address,
        timestamp: Timestamp::from_unix_millis(timestamp),
        is_successful: is_successful != 0,
        error_message,
    })
}

/// SQL column list shared by audit reads.
const AUDIT_COLUMNS: &str = "global_seq, aggregate_type, aggregate_id, sequence_number, action, \
                             actor_user_id, from_state, to_state, payload_json, payload_hash, \
                             ip_address, timestamp, is_successful, error_message";

/// Extracts an [`AuditRow`] from a rusqlite row.
fn audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

impl EventLog for SqliteStore {
    fn append(&self, aggregate: AggregateRef, draft: AuditDraft) -> Result<AuditEvent, StoreError> {
        Ok(self.transact(|tx| insert_event_tx(tx, aggregate, &draft))?)
    }

    fn append_after(
        &self,
        aggregate: AggregateRef,
        draft: AuditDraft,
        expected_previous: u64,
    ) -> Result<AuditEvent, StoreError> {
        Ok(self.transact(|tx| {
            let latest: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(sequence_number), 0) FROM audit_events
                     WHERE aggregate_type = ?1 AND aggregate_id = ?2",
                    params![
                        aggregate.aggregate_type.as_str(),
                        to_db_id(aggregate.aggregate_id)?
                    ],
                    |row| row.get(0),
                )
                .map_err(|err| db_err(&err))?;
            let latest = version_from_db(latest)?;
            if latest != expected_previous {
                return Err(SqliteStoreError::Sequence {
                    expected: expected_previous,
                    found: latest,
                });
            }
            insert_event_tx(tx, aggregate, &draft)
        })?)
    }

    fn replay(
        &self,
        aggregate: AggregateRef,
        from_sequence: u64,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_events
                     WHERE aggregate_type = ?1 AND aggregate_id = ?2
                       AND sequence_number >= ?3
                     ORDER BY sequence_number"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(
                    params![
                        aggregate.aggregate_type.as_str(),
                        to_db_id(aggregate.aggregate_id)?,
                        to_db_id(from_sequence)?
                    ],
                    audit_row,
                )
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<AuditRow>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(event_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn since(&self, cursor: EventCursor, limit: usize) -> Result<EventPage, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_events
                     WHERE global_seq > ?1
                     ORDER BY global_seq
                     LIMIT ?2"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(
                    params![
                        to_db_id(cursor.position())?,
                        i64::try_from(limit).unwrap_or(i64::MAX)
                    ],
                    audit_row,
                )
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<AuditRow>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        let events = rows.into_iter().map(event_from_row).collect::<SqlResult<Vec<_>>>()?;
        let next_cursor = events.last().map_or(cursor, |event| EventCursor::new(event.global_seq));
        Ok(EventPage { events, next_cursor })
    }
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Raw session row as read from storage.
type SessionRow = (
    i64,
    i64,
    i64,
    String,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
    i64,
    Option<i64>,
    i64,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    i64,
);

/// SQL column list shared by session reads.
const SESSION_COLUMNS: &str = "id, institution_id, faculty_id, session_code, state, \
                               previous_state, phase_started_at, phase_duration_seconds, \
                               pause_accumulated_seconds, paused_at, version, created_at, \
                               state_updated_at, completed_at, cancelled_at, is_active";

/// Extracts a [`SessionRow`] from a rusqlite row.
fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

/// Builds a [`Session`] from a raw row.
fn session_from_row(row: SessionRow) -> SqlResult<Session> {
    let (
        id,
        institution_id,
        faculty_id,
        session_code,
        state,
        previous_state,
        phase_started_at,
        phase_duration_seconds,
        pause_accumulated_seconds,
        paused_at,
        version,
        created_at,
        state_updated_at,
        completed_at,
        cancelled_at,
        is_active,
    ) = row;
    Ok(Session {
        id: SessionId::new(db_nonzero(id)?),
        institution_id: InstitutionId::new(db_nonzero(institution_id)?),
        faculty_id: UserId::new(db_nonzero(faculty_id)?),
        session_code: SessionCode::parse(session_code)
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?,
        state: session_state_from_db(&state)?,
        previous_state: previous_state.as_deref().map(session_state_from_db).transpose()?,
        timer: timer_from_db(
            phase_started_at,
            phase_duration_seconds,
            pause_accumulated_seconds,
            paused_at,
        )?,
        version: version_from_db(version)?,
        created_at: Timestamp::from_unix_millis(created_at),
        state_updated_at: Timestamp::from_unix_millis(state_updated_at),
        completed_at: completed_at.map(Timestamp::from_unix_millis),
        cancelled_at: cancelled_at.map(Timestamp::from_unix_millis),
        is_active: is_active != 0,
    })
}

impl SessionStore for SqliteStore {
    fn create_session(&self, new: NewSession, audit: AuditDraft) -> Result<Session, StoreError> {
        Ok(self.transact(|tx| {
            tx.execute(
                "INSERT INTO sessions
                    (institution_id, faculty_id, session_code, state, version, created_at,
                     state_updated_at, is_active)
                 VALUES (?1, ?2, ?3, 'CREATED', 1, ?4, ?4, 1)",
                params![
                    to_db_id(new.institution_id.get())?,
                    to_db_id(new.faculty_id.get())?,
                    new.session_code.as_str(),
                    new.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            let raw = tx.last_insert_rowid();
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Session, version_from_db(raw)?),
                &audit,
            )?;
            Ok(Session {
                id: SessionId::new(db_nonzero(raw)?),
                institution_id: new.institution_id,
                faculty_id: new.faculty_id,
                session_code: new.session_code,
                state: SessionState::Created,
                previous_state: None,
                timer: PhaseTimer::default(),
                version: 1,
                created_at: new.created_at,
                state_updated_at: new.created_at,
                completed_at: None,
                cancelled_at: None,
                is_active: true,
            })
        })?)
    }

    fn load_session(&self, id: SessionId) -> Result<Session, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![to_db_id(id.get())?],
                session_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row = row.ok_or_else(|| {
            StoreError::from(SqliteStoreError::NotFound(format!("session {id}")))
        })?;
        Ok(session_from_row(row)?)
    }

    fn find_session_by_code(&self, code: &SessionCode) -> Result<Option<Session>, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_code = ?1"),
                params![code.as_str()],
                session_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        Ok(row.map(session_from_row).transpose()?)
    }

    fn update_session(
        &self,
        session: &Session,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Session, StoreError> {
        Ok(self.transact(|tx| {
            let stored: Option<i64> = tx
                .query_row(
                    "SELECT version FROM sessions WHERE id = ?1",
                    params![to_db_id(session.id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let stored = stored.ok_or_else(|| {
                SqliteStoreError::NotFound(format!("session {}", session.id))
            })?;
            let stored = version_from_db(stored)?;
            if stored != expected_version {
                return Err(SqliteStoreError::Version {
                    expected: expected_version,
                    found: stored,
                });
            }
            let (phase_started_at, phase_duration_seconds, pause_accumulated, paused_at) =
                timer_to_db(&session.timer);
            tx.execute(
                "UPDATE sessions SET
                    state = ?2, previous_state = ?3, phase_started_at = ?4,
                    phase_duration_seconds = ?5, pause_accumulated_seconds = ?6,
                    paused_at = ?7, version = ?8, state_updated_at = ?9,
                    completed_at = ?10, cancelled_at = ?11, is_active = ?12
                 WHERE id = ?1",
                params![
                    to_db_id(session.id.get())?,
                    session.state.as_str(),
                    session.previous_state.map(SessionState::as_str),
                    phase_started_at,
                    phase_duration_seconds,
                    pause_accumulated,
                    paused_at,
                    to_db_id(session.version)?,
                    session.state_updated_at.unix_millis(),
                    session.completed_at.map(Timestamp::unix_millis),
                    session.cancelled_at.map(Timestamp::unix_millis),
                    i64::from(session.is_active),
                ],
            )
            .map_err(|err| db_err(&err))?;
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Session, session.id.get()),
                &audit,
            )?;
            Ok(session.clone())
        })?)
    }

    fn session_rules(&self) -> Result<Vec<TransitionRule<SessionState>>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(
                    "SELECT from_state, to_state, trigger_type,
                            requires_all_rounds_complete, requires_faculty
                     FROM session_transition_rules ORDER BY seq",
                )
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        let mut rules = Vec::with_capacity(rows.len());
        for (from_state, to_state, trigger, rounds_complete, faculty) in rows {
            rules.push(TransitionRule {
                from_state: session_state_from_db(&from_state)?,
                to_state: session_state_from_db(&to_state)?,
                trigger: TriggerType::parse(&trigger).ok_or_else(|| {
                    StoreError::from(SqliteStoreError::Corrupt(format!(
                        "unknown trigger '{trigger}'"
                    )))
                })?,
                requires_all_rounds_complete: rounds_complete != 0,
                requires_faculty: faculty != 0,
            });
        }
        Ok(rules)
    }
}

// ============================================================================
// SECTION: Participant Store
// ============================================================================

/// Raw participant row as read from storage.
type ParticipantRow =
    (i64, i64, i64, Option<String>, Option<i64>, i64, i64, String, i64);

/// SQL column list shared by participant reads.
const PARTICIPANT_COLUMNS: &str =
    "id, session_id, user_id, side, speaker_number, joined_at, is_active, connection, \
     last_seen_at";

/// Extracts a [`ParticipantRow`] from a rusqlite row.
fn participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Builds a [`Participant`] from a raw row.
fn participant_from_row(row: ParticipantRow) -> SqlResult<Participant> {
    let (id, session_id, user_id, side, speaker_number, joined_at, is_active, connection, last_seen) =
        row;
    let slot = match (side, speaker_number) {
        (Some(side), Some(speaker)) => {
            let side = Side::parse(&side)
                .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown side '{side}'")))?;
            let speaker = u8::try_from(speaker)
                .map_err(|_| SqliteStoreError::Corrupt("speaker number out of range".to_owned()))?;
            Some(Slot { side, speaker_number: speaker })
        }
        (None, None) => None,
        _ => {
            return Err(SqliteStoreError::Corrupt(
                "slot columns must be both set or both null".to_owned(),
            ));
        }
    };
    let connection = match connection.as_str() {
        "connected" => ConnectionStatus::Connected,
        "disconnected" => ConnectionStatus::Disconnected,
        other => {
            return Err(SqliteStoreError::Corrupt(format!(
                "unknown connection status '{other}'"
            )));
        }
    };
    Ok(Participant {
        id: ParticipantId::new(db_nonzero(id)?),
        session_id: SessionId::new(db_nonzero(session_id)?),
        user_id: UserId::new(db_nonzero(user_id)?),
        slot,
        joined_at: Timestamp::from_unix_millis(joined_at),
        is_active: is_active != 0,
        connection,
        last_seen_at: Timestamp::from_unix_millis(last_seen),
    })
}

impl ParticipantStore for SqliteStore {
    fn insert_participant(
        &self,
        new: NewParticipant,
        audit: AuditDraft,
    ) -> Result<Participant, StoreError> {
        Ok(self.transact(|tx| {
            let session_exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM sessions WHERE id = ?1",
                    params![to_db_id(new.session_id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            if session_exists.is_none() {
                return Err(SqliteStoreError::NotFound(format!("session {}", new.session_id)));
            }
            tx.execute(
                "INSERT INTO participants
                    (session_id, user_id, side, speaker_number, joined_at, is_active,
                     connection, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, 'connected', ?5)",
                params![
                    to_db_id(new.session_id.get())?,
                    to_db_id(new.user_id.get())?,
                    new.slot.map(|slot| slot.side.as_str()),
                    new.slot.map(|slot| i64::from(slot.speaker_number)),
                    new.joined_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            let raw = tx.last_insert_rowid();
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Session, new.session_id.get()),
                &audit,
            )?;
            Ok(Participant {
                id: ParticipantId::new(db_nonzero(raw)?),
                session_id: new.session_id,
                user_id: new.user_id,
                slot: new.slot,
                joined_at: new.joined_at,
                is_active: true,
                connection: ConnectionStatus::Connected,
                last_seen_at: new.joined_at,
            })
        })?)
    }

    fn load_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1"),
                params![to_db_id(id.get())?],
                participant_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row = row.ok_or_else(|| {
            StoreError::from(SqliteStoreError::NotFound(format!("participant {id}")))
        })?;
        Ok(participant_from_row(row)?)
    }

    fn participant_for_user(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants
                     WHERE session_id = ?1 AND user_id = ?2 AND is_active = 1"
                ),
                params![to_db_id(session_id.get())?, to_db_id(user_id.get())?],
                participant_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        Ok(row.map(participant_from_row).transpose()?)
    }

    fn count_active_speakers(&self, session_id: SessionId) -> Result<u32, StoreError> {
        let count = self.transact(|tx| {
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM participants
                     WHERE session_id = ?1 AND is_active = 1 AND side IS NOT NULL",
                    params![to_db_id(session_id.get())?],
                    |row| row.get(0),
                )
                .map_err(|err| db_err(&err))?;
            Ok(count)
        })?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn roster(&self, session_id: SessionId) -> Result<Vec<Participant>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants
                     WHERE session_id = ?1 AND is_active = 1
                     ORDER BY joined_at, id"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![to_db_id(session_id.get())?], participant_row)
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(participant_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn update_connection(
        &self,
        id: ParticipantId,
        status: ConnectionStatus,
        last_seen_at: Timestamp,
    ) -> Result<(), StoreError> {
        Ok(self.transact(|tx| {
            let label = match status {
                ConnectionStatus::Connected => "connected",
                ConnectionStatus::Disconnected => "disconnected",
            };
            let updated = tx
                .execute(
                    "UPDATE participants SET connection = ?2, last_seen_at = ?3 WHERE id = ?1",
                    params![to_db_id(id.get())?, label, last_seen_at.unix_millis()],
                )
                .map_err(|err| db_err(&err))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("participant {id}")));
            }
            Ok(())
        })?)
    }
}

// ============================================================================
// SECTION: Round Store
// ============================================================================

/// Raw round row as read from storage.
type RoundRow = (
    i64,
    i64,
    i64,
    String,
    Option<i64>,
    String,
    Option<i64>,
    Option<String>,
    Option<i64>,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
    i64,
    Option<i64>,
    i64,
    i64,
    Option<i64>,
);

/// SQL column list shared by round reads.
const ROUND_COLUMNS: &str =
    "id, session_id, round_number, petitioner_kind, petitioner_user, respondent_kind, \
     respondent_user, judge_kind, judge_user, state, previous_state, phase_started_at, \
     phase_duration_seconds, pause_accumulated_seconds, paused_at, version, created_at, \
     ended_at";

/// Extracts a [`RoundRow`] from a rusqlite row.
fn round_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoundRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
        row.get(16)?,
        row.get(17)?,
    ))
}

/// Builds a [`Round`] from a raw row.
fn round_from_row(row: RoundRow) -> SqlResult<Round> {
    let (
        id,
        session_id,
        round_number,
        petitioner_kind,
        petitioner_user,
        respondent_kind,
        respondent_user,
        judge_kind,
        judge_user,
        state,
        previous_state,
        phase_started_at,
        phase_duration_seconds,
        pause_accumulated_seconds,
        paused_at,
        version,
        created_at,
        ended_at,
    ) = row;
    let judge = match judge_kind {
        Some(kind) => Some(seat_from_db(&kind, judge_user)?),
        None => None,
    };
    Ok(Round {
        id: RoundId::new(db_nonzero(id)?),
        session_id: SessionId::new(db_nonzero(session_id)?),
        round_number: u32::try_from(round_number)
            .map_err(|_| SqliteStoreError::Corrupt("round number out of range".to_owned()))?,
        petitioner: seat_from_db(&petitioner_kind, petitioner_user)?,
        respondent: seat_from_db(&respondent_kind, respondent_user)?,
        judge,
        state: round_state_from_db(&state)?,
        previous_state: previous_state.as_deref().map(round_state_from_db).transpose()?,
        timer: timer_from_db(
            phase_started_at,
            phase_duration_seconds,
            pause_accumulated_seconds,
            paused_at,
        )?,
        version: version_from_db(version)?,
        created_at: Timestamp::from_unix_millis(created_at),
        ended_at: ended_at.map(Timestamp::from_unix_millis),
    })
}

/// Raw turn row as read from storage.
type TurnRow =
    (i64, i64, i64, i64, i64, Option<i64>, Option<i64>, String, i64, i64, i64);

/// SQL column list shared by turn reads.
const TURN_COLUMNS: &str = "id, round_id, participant_id, turn_order, allowed_seconds, \
                            started_at, submitted_at, transcript, word_count, is_submitted, \
                            auto_submitted";

/// Extracts a [`TurnRow`] from a rusqlite row.
fn turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TurnRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

/// Builds a [`Turn`] from a raw row.
fn turn_from_row(row: TurnRow) -> SqlResult<Turn> {
    let (
        id,
        round_id,
        participant_id,
        turn_order,
        allowed_seconds,
        started_at,
        submitted_at,
        transcript,
        count,
        is_submitted,
        auto_submitted,
    ) = row;
    Ok(Turn {
        id: TurnId::new(db_nonzero(id)?),
        round_id: RoundId::new(db_nonzero(round_id)?),
        participant_id: ParticipantId::new(db_nonzero(participant_id)?),
        turn_order: u32::try_from(turn_order)
            .map_err(|_| SqliteStoreError::Corrupt("turn order out of range".to_owned()))?,
        allowed_seconds,
        started_at: started_at.map(Timestamp::from_unix_millis),
        submitted_at: submitted_at.map(Timestamp::from_unix_millis),
        transcript,
        word_count: u32::try_from(count)
            .map_err(|_| SqliteStoreError::Corrupt("word count out of range".to_owned()))?,
        is_submitted: is_submitted != 0,
        auto_submitted: auto_submitted != 0,
    })
}

impl RoundStore for SqliteStore {
    fn create_round(
        &self,
        new: NewRound,
        turns: Vec<NewTurn>,
        audit: AuditDraft,
    ) -> Result<(Round, Vec<Turn>), StoreError> {
        Ok(self.transact(|tx| {
            let (petitioner_kind, petitioner_user) = seat_to_db(new.petitioner)?;
            let (respondent_kind, respondent_user) = seat_to_db(new.respondent)?;
            let (judge_kind, judge_user) = match new.judge {
                Some(judge) => {
                    let (kind, user) = seat_to_db(judge)?;
                    (Some(kind), user)
                }
                None => (None, None),
            };
            tx.execute(
                "INSERT INTO rounds
                    (session_id, round_number, petitioner_kind, petitioner_user,
                     respondent_kind, respondent_user, judge_kind, judge_user, state,
                     version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'WAITING', 1, ?9)",
                params![
                    to_db_id(new.session_id.get())?,
                    i64::from(new.round_number),
                    petitioner_kind,
                    petitioner_user,
                    respondent_kind,
                    respondent_user,
                    judge_kind,
                    judge_user,
                    new.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            let round_raw = tx.last_insert_rowid();
            let round = Round {
                id: RoundId::new(db_nonzero(round_raw)?),
                session_id: new.session_id,
                round_number: new.round_number,
                petitioner: new.petitioner,
                respondent: new.respondent,
                judge: new.judge,
                state: RoundState::Waiting,
                previous_state: None,
                timer: PhaseTimer::default(),
                version: 1,
                created_at: new.created_at,
                ended_at: None,
            };
            let mut stored_turns = Vec::with_capacity(turns.len());
            for turn in &turns {
                tx.execute(
                    "INSERT INTO turns
                        (round_id, participant_id, turn_order, allowed_seconds)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        round_raw,
                        to_db_id(turn.participant_id.get())?,
                        i64::from(turn.turn_order),
                        turn.allowed_seconds,
                    ],
                )
                .map_err(|err| db_err(&err))?;
                let turn_raw = tx.last_insert_rowid();
                stored_turns.push(Turn {
                    id: TurnId::new(db_nonzero(turn_raw)?),
                    round_id: round.id,
                    participant_id: turn.participant_id,
                    turn_order: turn.turn_order,
                    allowed_seconds: turn.allowed_seconds,
                    started_at: None,
                    submitted_at: None,
                    transcript: String::new(),
                    word_count: 0,
                    is_submitted: false,
                    auto_submitted: false,
                });
            }
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Round, round.id.get()),
                &audit,
            )?;
            Ok((round, stored_turns))
        })?)
    }

    fn load_round(&self, id: RoundId) -> Result<Round, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE id = ?1"),
                params![to_db_id(id.get())?],
                round_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row = row
            .ok_or_else(|| StoreError::from(SqliteStoreError::NotFound(format!("round {id}"))))?;
        Ok(round_from_row(row)?)
    }

    fn rounds_for_session(&self, session_id: SessionId) -> Result<Vec<Round>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {ROUND_COLUMNS} FROM rounds
                     WHERE session_id = ?1 ORDER BY round_number"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![to_db_id(session_id.get())?], round_row)
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(round_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn update_round(
        &self,
        round: &Round,
        expected_version: u64,
        audit: AuditDraft,
    ) -> Result<Round, StoreError> {
        Ok(self.transact(|tx| {
            let stored: Option<i64> = tx
                .query_row(
                    "SELECT version FROM rounds WHERE id = ?1",
                    params![to_db_id(round.id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let stored = stored
                .ok_or_else(|| SqliteStoreError::NotFound(format!("round {}", round.id)))?;
            let stored = version_from_db(stored)?;
            if stored != expected_version {
                return Err(SqliteStoreError::Version {
                    expected: expected_version,
                    found: stored,
                });
            }
            let (phase_started_at, phase_duration_seconds, pause_accumulated, paused_at) =
                timer_to_db(&round.timer);
            tx.execute(
                "UPDATE rounds SET
                    state = ?2, previous_state = ?3, phase_started_at = ?4,
                    phase_duration_seconds = ?5, pause_accumulated_seconds = ?6,
                    paused_at = ?7, version = ?8, ended_at = ?9
                 WHERE id = ?1",
                params![
                    to_db_id(round.id.get())?,
                    round.state.as_str(),
                    round.previous_state.map(RoundState::as_str),
                    phase_started_at,
                    phase_duration_seconds,
                    pause_accumulated,
                    paused_at,
                    to_db_id(round.version)?,
                    round.ended_at.map(Timestamp::unix_millis),
                ],
            )
            .map_err(|err| db_err(&err))?;
            insert_event_tx(tx, AggregateRef::new(AggregateType::Round, round.id.get()), &audit)?;
            Ok(round.clone())
        })?)
    }

    fn round_rules(&self) -> Result<Vec<TransitionRule<RoundState>>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(
                    "SELECT from_state, to_state, trigger_type,
                            requires_all_rounds_complete, requires_faculty
                     FROM round_transition_rules ORDER BY seq",
                )
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        let mut rules = Vec::with_capacity(rows.len());
        for (from_state, to_state, trigger, rounds_complete, faculty) in rows {
            rules.push(TransitionRule {
                from_state: round_state_from_db(&from_state)?,
                to_state: round_state_from_db(&to_state)?,
                trigger: TriggerType::parse(&trigger).ok_or_else(|| {
                    StoreError::from(SqliteStoreError::Corrupt(format!(
                        "unknown trigger '{trigger}'"
                    )))
                })?,
                requires_all_rounds_complete: rounds_complete != 0,
                requires_faculty: faculty != 0,
            });
        }
        Ok(rules)
    }

    fn load_turn(&self, id: TurnId) -> Result<Turn, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {TURN_COLUMNS} FROM turns WHERE id = ?1"),
                params![to_db_id(id.get())?],
                turn_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row =
            row.ok_or_else(|| StoreError::from(SqliteStoreError::NotFound(format!("turn {id}"))))?;
        Ok(turn_from_row(row)?)
    }

    fn turns_for_round(&self, round_id: RoundId) -> Result<Vec<Turn>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {TURN_COLUMNS} FROM turns WHERE round_id = ?1 ORDER BY turn_order"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![to_db_id(round_id.get())?], turn_row)
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(turn_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn update_turn(&self, turn: &Turn, audit: AuditDraft) -> Result<Turn, StoreError> {
        Ok(self.transact(|tx| {
            let submitted: Option<i64> = tx
                .query_row(
                    "SELECT is_submitted FROM turns WHERE id = ?1",
                    params![to_db_id(turn.id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let submitted =
                submitted.ok_or_else(|| SqliteStoreError::NotFound(format!("turn {}", turn.id)))?;
            if submitted != 0 {
                return Err(SqliteStoreError::Immutable("turn already submitted".to_owned()));
            }
            tx.execute(
                "UPDATE turns SET
                    started_at = ?2, submitted_at = ?3, transcript = ?4, word_count = ?5,
                    is_submitted = ?6, auto_submitted = ?7
                 WHERE id = ?1",
                params![
                    to_db_id(turn.id.get())?,
                    turn.started_at.map(Timestamp::unix_millis),
                    turn.submitted_at.map(Timestamp::unix_millis),
                    turn.transcript,
                    i64::from(turn.word_count),
                    i64::from(turn.is_submitted),
                    i64::from(turn.auto_submitted),
                ],
            )
            .map_err(|err| db_err(&err))?;
            insert_event_tx(tx, AggregateRef::new(AggregateType::Turn, turn.id.get()), &audit)?;
            Ok(turn.clone())
        })?)
    }
}

// ============================================================================
// SECTION: Rubric Store
// ============================================================================

impl RubricStore for SqliteStore {
    fn put_rubric(&self, rubric: RubricVersion) -> Result<(), StoreError> {
        Ok(self.transact(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM rubric_versions WHERE id = ?1",
                    params![to_db_id(rubric.id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            if existing.is_some() {
                return Err(SqliteStoreError::Unique("rubric_version".to_owned()));
            }
            let criteria_json = serde_json::to_string(&rubric.criteria)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT INTO rubric_versions (id, institution_id, criteria_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_db_id(rubric.id.get())?,
                    to_db_id(rubric.institution_id.get())?,
                    criteria_json,
                    rubric.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            Ok(())
        })?)
    }

    fn load_rubric(&self, id: RubricVersionId) -> Result<RubricVersion, StoreError> {
        let row: Option<(i64, String, i64)> = self.transact(|tx| {
            tx.query_row(
                "SELECT institution_id, criteria_json, created_at
                 FROM rubric_versions WHERE id = ?1",
                params![to_db_id(id.get())?],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let (institution_id, criteria_json, created_at) = row.ok_or_else(|| {
            StoreError::from(SqliteStoreError::NotFound(format!("rubric version {id}")))
        })?;
        let criteria: Vec<RubricCriterion> = serde_json::from_str(&criteria_json)
            .map_err(|err| StoreError::from(SqliteStoreError::Corrupt(err.to_string())))?;
        Ok(RubricVersion {
            id,
            institution_id: InstitutionId::new(
                db_nonzero(institution_id).map_err(StoreError::from)?,
            ),
            criteria,
            created_at: Timestamp::from_unix_millis(created_at),
        })
    }
}

// ============================================================================
// SECTION: Evaluation Store
// ============================================================================

/// Raw evaluation row as read from storage.
type EvaluationRow = (
    i64,
    i64,
    i64,
    i64,
    i64,
    String,
    String,
    Option<String>,
    i64,
    i64,
    Option<i64>,
    i64,
    i64,
);

/// SQL column list shared by evaluation reads.
const EVALUATION_COLUMNS: &str =
    "id, round_id, participant_id, judge_id, rubric_version_id, scores_json, total_score, \
     remarks, is_draft, is_final, finalized_at, created_at, updated_at";

/// Extracts an [`EvaluationRow`] from a rusqlite row.
fn evaluation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvaluationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

/// Builds a [`JudgeEvaluation`] from a raw row.
fn evaluation_from_row(row: EvaluationRow) -> SqlResult<JudgeEvaluation> {
    let (
        id,
        round_id,
        participant_id,
        judge_id,
        rubric_version_id,
        scores_json,
        total_score,
        remarks,
        is_draft,
        is_final,
        finalized_at,
        created_at,
        updated_at,
    ) = row;
    let scores: BTreeMap<String, u32> = serde_json::from_str(&scores_json)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    Ok(JudgeEvaluation {
        id: EvaluationId::new(db_nonzero(id)?),
        target: EvaluationTarget {
            round_id: RoundId::new(db_nonzero(round_id)?),
            participant_id: ParticipantId::new(db_nonzero(participant_id)?),
        },
        judge_id: UserId::new(db_nonzero(judge_id)?),
        rubric_version_id: RubricVersionId::new(db_nonzero(rubric_version_id)?),
        scores,
        total_score: decimal_from_db(&total_score)?,
        remarks,
        is_draft: is_draft != 0,
        is_final: is_final != 0,
        finalized_at: finalized_at.map(Timestamp::from_unix_millis),
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
    })
}

impl EvaluationStore for SqliteStore {
    fn put_assignment(&self, new: NewJudgeAssignment) -> Result<JudgeAssignment, StoreError> {
        Ok(self.transact(|tx| {
            tx.execute(
                "INSERT INTO judge_assignments (judge_id, round_id, participant_id, is_blind)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_db_id(new.judge_id.get())?,
                    to_db_id(new.target.round_id.get())?,
                    to_db_id(new.target.participant_id.get())?,
                    i64::from(new.is_blind),
                ],
            )
            .map_err(|err| db_err(&err))?;
            let raw = tx.last_insert_rowid();
            Ok(JudgeAssignment {
                id: AssignmentId::new(db_nonzero(raw)?),
                judge_id: new.judge_id,
                target: new.target,
                is_blind: new.is_blind,
            })
        })?)
    }

    fn assignment_for(
        &self,
        judge_id: UserId,
        target: EvaluationTarget,
    ) -> Result<Option<JudgeAssignment>, StoreError> {
        let row: Option<(i64, i64)> = self.transact(|tx| {
            tx.query_row(
                "SELECT id, is_blind FROM judge_assignments
                 WHERE judge_id = ?1 AND round_id = ?2 AND participant_id = ?3",
                params![
                    to_db_id(judge_id.get())?,
                    to_db_id(target.round_id.get())?,
                    to_db_id(target.participant_id.get())?
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        row.map(|(id, is_blind)| {
            Ok(JudgeAssignment {
                id: AssignmentId::new(db_nonzero(id).map_err(StoreError::from)?),
                judge_id,
                target,
                is_blind: is_blind != 0,
            })
        })
        .transpose()
    }

    fn insert_evaluation(
        &self,
        new: NewJudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError> {
        Ok(self.transact(|tx| {
            let scores_json = serde_json::to_string(&new.scores)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT INTO evaluations
                    (round_id, participant_id, judge_id, rubric_version_id, scores_json,
                     total_score, remarks, is_draft, is_final, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8, ?8)",
                params![
                    to_db_id(new.target.round_id.get())?,
                    to_db_id(new.target.participant_id.get())?,
                    to_db_id(new.judge_id.get())?,
                    to_db_id(new.rubric_version_id.get())?,
                    scores_json,
                    new.total_score.to_string(),
                    new.remarks,
                    new.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            let raw = tx.last_insert_rowid();
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Evaluation, version_from_db(raw)?),
                &audit,
            )?;
            Ok(JudgeEvaluation {
                id: EvaluationId::new(db_nonzero(raw)?),
                target: new.target,
                judge_id: new.judge_id,
                rubric_version_id: new.rubric_version_id,
                scores: new.scores,
                total_score: new.total_score,
                remarks: new.remarks,
                is_draft: true,
                is_final: false,
                finalized_at: None,
                created_at: new.created_at,
                updated_at: new.created_at,
            })
        })?)
    }

    fn update_evaluation(
        &self,
        evaluation: &JudgeEvaluation,
        audit: AuditDraft,
    ) -> Result<JudgeEvaluation, StoreError> {
        Ok(self.transact(|tx| {
            let is_final: Option<i64> = tx
                .query_row(
                    "SELECT is_final FROM evaluations WHERE id = ?1",
                    params![to_db_id(evaluation.id.get())?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let is_final = is_final.ok_or_else(|| {
                SqliteStoreError::NotFound(format!("evaluation {}", evaluation.id))
            })?;
            if is_final != 0 {
                return Err(SqliteStoreError::Immutable("evaluation is finalized".to_owned()));
            }
            let scores_json = serde_json::to_string(&evaluation.scores)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "UPDATE evaluations SET
                    rubric_version_id = ?2, scores_json = ?3, total_score = ?4, remarks = ?5,
                    is_draft = ?6, is_final = ?7, finalized_at = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    to_db_id(evaluation.id.get())?,
                    to_db_id(evaluation.rubric_version_id.get())?,
                    scores_json,
                    evaluation.total_score.to_string(),
                    evaluation.remarks,
                    i64::from(evaluation.is_draft),
                    i64::from(evaluation.is_final),
                    evaluation.finalized_at.map(Timestamp::unix_millis),
                    evaluation.updated_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Evaluation, evaluation.id.get()),
                &audit,
            )?;
            Ok(evaluation.clone())
        })?)
    }

    fn load_evaluation(&self, id: EvaluationId) -> Result<JudgeEvaluation, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = ?1"),
                params![to_db_id(id.get())?],
                evaluation_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row = row.ok_or_else(|| {
            StoreError::from(SqliteStoreError::NotFound(format!("evaluation {id}")))
        })?;
        Ok(evaluation_from_row(row)?)
    }

    fn evaluation_for(
        &self,
        target: EvaluationTarget,
        judge_id: UserId,
    ) -> Result<Option<JudgeEvaluation>, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!(
                    "SELECT {EVALUATION_COLUMNS} FROM evaluations
                     WHERE round_id = ?1 AND participant_id = ?2 AND judge_id = ?3"
                ),
                params![
                    to_db_id(target.round_id.get())?,
                    to_db_id(target.participant_id.get())?,
                    to_db_id(judge_id.get())?
                ],
                evaluation_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        Ok(row.map(evaluation_from_row).transpose()?)
    }

    fn finalized_for_target(
        &self,
        target: EvaluationTarget,
    ) -> Result<Vec<JudgeEvaluation>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {EVALUATION_COLUMNS} FROM evaluations
                     WHERE round_id = ?1 AND participant_id = ?2 AND is_final = 1
                     ORDER BY id"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(
                    params![
                        to_db_id(target.round_id.get())?,
                        to_db_id(target.participant_id.get())?
                    ],
                    evaluation_row,
                )
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(evaluation_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn finalized_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<JudgeEvaluation>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {EVALUATION_COLUMNS} FROM evaluations
                     WHERE is_final = 1 AND round_id IN
                        (SELECT id FROM rounds WHERE session_id = ?1)
                     ORDER BY id"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![to_db_id(session_id.get())?], evaluation_row)
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(evaluation_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn judge_has_assignment_in_session(
        &self,
        judge_id: UserId,
        session_id: SessionId,
    ) -> Result<bool, StoreError> {
        let count = self.transact(|tx| {
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM judge_assignments
                     WHERE judge_id = ?1 AND round_id IN
                        (SELECT id FROM rounds WHERE session_id = ?2)",
                    params![to_db_id(judge_id.get())?, to_db_id(session_id.get())?],
                    |row| row.get(0),
                )
                .map_err(|err| db_err(&err))?;
            Ok(count)
        })?;
        Ok(count > 0)
    }
}

// ============================================================================
// SECTION: Leaderboard Store
// ============================================================================

/// Raw snapshot row as read from storage.
type SnapshotRow = (
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    String,
    i64,
    i64,
    Option<i64>,
    String,
    Option<i64>,
    i64,
    Option<i64>,
    Option<i64>,
    i64,
    Option<String>,
    Option<i64>,
    Option<i64>,
);

/// SQL column list shared by snapshot reads.
const SNAPSHOT_COLUMNS: &str =
    "id, session_id, institution_id, frozen_at, frozen_by, rubric_version_id, \
     total_participants, checksum_hash, is_pending_approval, is_finalized, finalized_at, \
     publication_mode, publication_date, is_published, published_at, published_by, \
     is_invalidated, invalidated_reason, invalidated_at, invalidated_by";

/// Extracts a [`SnapshotRow`] from a rusqlite row.
fn snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
        row.get(16)?,
        row.get(17)?,
        row.get(18)?,
        row.get(19)?,
    ))
}

/// Builds a [`LeaderboardSnapshot`] from a raw row.
fn snapshot_from_row(row: SnapshotRow) -> SqlResult<LeaderboardSnapshot> {
    let (
        id,
        session_id,
        institution_id,
        frozen_at,
        frozen_by,
        rubric_version_id,
        total_participants,
        checksum_hash,
        is_pending_approval,
        is_finalized,
        finalized_at,
        publication_mode,
        publication_date,
        is_published,
        published_at,
        published_by,
        is_invalidated,
        invalidated_reason,
        invalidated_at,
        invalidated_by,
    ) = row;
    Ok(LeaderboardSnapshot {
        id: SnapshotId::new(db_nonzero(id)?),
        session_id: SessionId::new(db_nonzero(session_id)?),
        institution_id: InstitutionId::new(db_nonzero(institution_id)?),
        frozen_at: Timestamp::from_unix_millis(frozen_at),
        frozen_by: UserId::new(db_nonzero(frozen_by)?),
        rubric_version_id: RubricVersionId::new(db_nonzero(rubric_version_id)?),
        total_participants: u32::try_from(total_participants)
            .map_err(|_| SqliteStoreError::Corrupt("participant count out of range".to_owned()))?,
        checksum_hash,
        is_pending_approval: is_pending_approval != 0,
        is_finalized: is_finalized != 0,
        finalized_at: finalized_at.map(Timestamp::from_unix_millis),
        publication_mode: PublicationMode::parse(&publication_mode).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown publication mode '{publication_mode}'"))
        })?,
        publication_date: publication_date.map(Timestamp::from_unix_millis),
        is_published: is_published != 0,
        published_at: published_at.map(Timestamp::from_unix_millis),
        published_by: user_from_db(published_by)?,
        is_invalidated: is_invalidated != 0,
        invalidated_reason,
        invalidated_at: invalidated_at.map(Timestamp::from_unix_millis),
        invalidated_by: user_from_db(invalidated_by)?,
    })
}

/// Raw entry row as read from storage.
type EntryRow = (i64, i64, String, i64, String, String, i64, String, String);

/// SQL column list shared by entry reads.
const ENTRY_COLUMNS: &str = "snapshot_id, participant_id, side, speaker_number, total_score, \
                             tie_breaker_score, rank, score_breakdown_json, evaluation_ids_json";

/// Extracts an [`EntryRow`] from a rusqlite row.
fn entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Builds a [`LeaderboardEntry`] from a raw row.
fn entry_from_row(row: EntryRow) -> SqlResult<LeaderboardEntry> {
    let (
        snapshot_id,
        participant_id,
        side,
        speaker_number,
        total_score,
        tie_breaker_score,
        rank,
        breakdown_json,
        evaluation_ids_json,
    ) = row;
    let side = Side::parse(&side)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown side '{side}'")))?;
    let score_breakdown: BTreeMap<String, String> = serde_json::from_str(&breakdown_json)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    let score_breakdown = score_breakdown
        .into_iter()
        .map(|(key, value)| Ok((key, decimal_from_db(&value)?)))
        .collect::<SqlResult<BTreeMap<String, BigDecimal>>>()?;
    let evaluation_raw: Vec<u64> = serde_json::from_str(&evaluation_ids_json)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    let evaluation_ids = evaluation_raw
        .into_iter()
        .map(|raw| {
            NonZeroU64::new(raw)
                .map(EvaluationId::new)
                .ok_or_else(|| SqliteStoreError::Corrupt("zero evaluation id".to_owned()))
        })
        .collect::<SqlResult<Vec<_>>>()?;
    Ok(LeaderboardEntry {
        snapshot_id: SnapshotId::new(db_nonzero(snapshot_id)?),
        participant_id: ParticipantId::new(db_nonzero(participant_id)?),
        side,
        speaker_number: u8::try_from(speaker_number)
            .map_err(|_| SqliteStoreError::Corrupt("speaker number out of range".to_owned()))?,
        total_score: decimal_from_db(&total_score)?,
        tie_breaker_score: decimal_from_db(&tie_breaker_score)?,
        rank: u32::try_from(rank)
            .map_err(|_| SqliteStoreError::Corrupt("rank out of range".to_owned()))?,
        score_breakdown,
        evaluation_ids,
    })
}

impl LeaderboardStore for SqliteStore {
    fn insert_snapshot(
        &self,
        new: NewSnapshot,
        entries: Vec<NewLeaderboardEntry>,
        audit: AuditDraft,
    ) -> Result<(LeaderboardSnapshot, Vec<LeaderboardEntry>), StoreError> {
        Ok(self.transact(|tx| {
            tx.execute(
                "INSERT INTO snapshots
                    (session_id, institution_id, frozen_at, frozen_by, rubric_version_id,
                     total_participants, checksum_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    to_db_id(new.session_id.get())?,
                    to_db_id(new.institution_id.get())?,
                    new.frozen_at.unix_millis(),
                    to_db_id(new.frozen_by.get())?,
                    to_db_id(new.rubric_version_id.get())?,
                    i64::from(new.total_participants),
                    new.checksum_hash,
                ],
            )
            .map_err(|err| db_err(&err))?;
            let raw = tx.last_insert_rowid();
            let snapshot_id = SnapshotId::new(db_nonzero(raw)?);
            let mut stored_entries = Vec::with_capacity(entries.len());
            for entry in &entries {
                let breakdown: BTreeMap<String, String> = entry
                    .score_breakdown
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_string()))
                    .collect();
                let breakdown_json = serde_json::to_string(&breakdown)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
                let evaluation_ids: Vec<u64> =
                    entry.evaluation_ids.iter().map(|id| id.get()).collect();
                let evaluation_ids_json = serde_json::to_string(&evaluation_ids)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
                tx.execute(
                    "INSERT INTO snapshot_entries
                        (snapshot_id, participant_id, side, speaker_number, total_score,
                         tie_breaker_score, rank, score_breakdown_json, evaluation_ids_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        raw,
                        to_db_id(entry.participant_id.get())?,
                        entry.side.as_str(),
                        i64::from(entry.speaker_number),
                        entry.total_score.to_string(),
                        entry.tie_breaker_score.to_string(),
                        i64::from(entry.rank),
                        breakdown_json,
                        evaluation_ids_json,
                    ],
                )
                .map_err(|err| db_err(&err))?;
                stored_entries.push(LeaderboardEntry {
                    snapshot_id,
                    participant_id: entry.participant_id,
                    side: entry.side,
                    speaker_number: entry.speaker_number,
                    total_score: entry.total_score.clone(),
                    tie_breaker_score: entry.tie_breaker_score.clone(),
                    rank: entry.rank,
                    score_breakdown: entry.score_breakdown.clone(),
                    evaluation_ids: entry.evaluation_ids.clone(),
                });
            }
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Snapshot, snapshot_id.get()),
                &audit,
            )?;
            let snapshot = LeaderboardSnapshot {
                id: snapshot_id,
                session_id: new.session_id,
                institution_id: new.institution_id,
                frozen_at: new.frozen_at,
                frozen_by: new.frozen_by,
                rubric_version_id: new.rubric_version_id,
                total_participants: new.total_participants,
                checksum_hash: new.checksum_hash.clone(),
                is_pending_approval: false,
                is_finalized: false,
                finalized_at: None,
                publication_mode: PublicationMode::Draft,
                publication_date: None,
                is_published: false,
                published_at: None,
                published_by: None,
                is_invalidated: false,
                invalidated_reason: None,
                invalidated_at: None,
                invalidated_by: None,
            };
            Ok((snapshot, stored_entries))
        })?)
    }

    fn load_snapshot(&self, id: SnapshotId) -> Result<LeaderboardSnapshot, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
                params![to_db_id(id.get())?],
                snapshot_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        let row = row.ok_or_else(|| {
            StoreError::from(SqliteStoreError::NotFound(format!("snapshot {id}")))
        })?;
        Ok(snapshot_from_row(row)?)
    }

    fn snapshot_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LeaderboardSnapshot>, StoreError> {
        let row = self.transact(|tx| {
            tx.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE session_id = ?1"),
                params![to_db_id(session_id.get())?],
                snapshot_row,
            )
            .optional()
            .map_err(|err| db_err(&err))
        })?;
        Ok(row.map(snapshot_from_row).transpose()?)
    }

    fn snapshot_entries(&self, id: SnapshotId) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let rows = self.transact(|tx| {
            let mut statement = tx
                .prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM snapshot_entries
                     WHERE snapshot_id = ?1 ORDER BY rank, participant_id"
                ))
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![to_db_id(id.get())?], entry_row)
                .map_err(|err| db_err(&err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(entry_from_row).collect::<SqlResult<Vec<_>>>()?)
    }

    fn update_snapshot_governance(
        &self,
        snapshot: &LeaderboardSnapshot,
        audit: AuditDraft,
    ) -> Result<LeaderboardSnapshot, StoreError> {
        Ok(self.transact(|tx| {
            let stored = tx
                .query_row(
                    &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
                    params![to_db_id(snapshot.id.get())?],
                    snapshot_row,
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let stored = stored.ok_or_else(|| {
                SqliteStoreError::NotFound(format!("snapshot {}", snapshot.id))
            })?;
            let stored = snapshot_from_row(stored)?;
            let frozen_fields_differ = stored.session_id != snapshot.session_id
                || stored.institution_id != snapshot.institution_id
                || stored.frozen_at != snapshot.frozen_at
                || stored.frozen_by != snapshot.frozen_by
                || stored.rubric_version_id != snapshot.rubric_version_id
                || stored.total_participants != snapshot.total_participants
                || stored.checksum_hash != snapshot.checksum_hash;
            if frozen_fields_differ {
                return Err(SqliteStoreError::Immutable(
                    "snapshot freeze metadata cannot change".to_owned(),
                ));
            }
            tx.execute(
                "UPDATE snapshots SET
                    is_pending_approval = ?2, is_finalized = ?3, finalized_at = ?4,
                    publication_mode = ?5, publication_date = ?6, is_published = ?7,
                    published_at = ?8, published_by = ?9, is_invalidated = ?10,
                    invalidated_reason = ?11, invalidated_at = ?12, invalidated_by = ?13
                 WHERE id = ?1",
                params![
                    to_db_id(snapshot.id.get())?,
                    i64::from(snapshot.is_pending_approval),
                    i64::from(snapshot.is_finalized),
                    snapshot.finalized_at.map(Timestamp::unix_millis),
                    snapshot.publication_mode.as_str(),
                    snapshot.publication_date.map(Timestamp::unix_millis),
                    i64::from(snapshot.is_published),
                    snapshot.published_at.map(Timestamp::unix_millis),
                    user_to_db(snapshot.published_by)?,
                    i64::from(snapshot.is_invalidated),
                    snapshot.invalidated_reason,
                    snapshot.invalidated_at.map(Timestamp::unix_millis),
                    user_to_db(snapshot.invalidated_by)?,
                ],
            )
            .map_err(|err| db_err(&err))?;
            insert_event_tx(
                tx,
                AggregateRef::new(AggregateType::Snapshot, snapshot.id.get()),
                &audit,
            )?;
            Ok(snapshot.clone())
        })?)
    }
}
