// crates/juris-core/src/engine/locks.rs
// ============================================================================
// Module: Juris Aggregate Locks
// Description: In-process per-aggregate mutexes and bounded conflict retry.
// Purpose: Serialize mutating operations per aggregate on a single node.
// Dependencies: crate::{core, engine}
// ============================================================================

//! ## Overview
//! The store's row-level transaction is the only locking primitive Juris
//! depends on for correctness; the per-aggregate mutex map here is a
//! single-node optimization that serializes hot paths (joins, turn writes)
//! before they reach the store. Operations on different aggregates proceed in
//! parallel. Conflicts that slip through surface as retryable errors and run
//! through the bounded 50/150/300 ms backoff.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::core::AggregateRef;
use crate::engine::error::EngineError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Aggregate Locks
// ============================================================================

/// Map of per-aggregate mutexes, keyed by aggregate reference.
#[derive(Debug, Default, Clone)]
pub struct AggregateLocks {
    /// Lazily created locks, one per aggregate touched on this node.
    inner: Arc<Mutex<HashMap<AggregateRef, Arc<Mutex<()>>>>>,
}

impl AggregateLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` while holding the mutex for one aggregate, blocking other
    /// local writers to the same aggregate. Writers to other aggregates are
    /// unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when a mutex is poisoned, otherwise
    /// whatever `body` returns.
    pub fn with_lock<T>(
        &self,
        aggregate: AggregateRef,
        body: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| StoreError::Io("aggregate lock map poisoned".to_owned()))?;
            Arc::clone(map.entry(aggregate).or_default())
        };
        let _held = lock
            .lock()
            .map_err(|_| StoreError::Io("aggregate mutex poisoned".to_owned()))?;
        body()
    }
}

// ============================================================================
// SECTION: Bounded Retry
// ============================================================================

/// Runs `op`, retrying retryable conflicts on the bounded backoff schedule.
///
/// The final attempt's error surfaces unchanged once the schedule is spent.
///
/// # Errors
///
/// Returns the last [`EngineError`] when every attempt fails.
pub fn with_retry<T>(
    backoff_ms: &[u64],
    mut op: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut attempt = 0usize;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < backoff_ms.len() => {
                thread::sleep(Duration::from_millis(backoff_ms[attempt]));
                attempt += 1;
            }
            other => return other,
        }
    }
}
