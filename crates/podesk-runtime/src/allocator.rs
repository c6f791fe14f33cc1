//! SequenceAllocator: per-period order identifiers.
//!
//! The allocator owns no state. Uniqueness comes entirely from
//! [`SequenceStore::increment`] being one atomic read-modify-write; the
//! allocator only formats the result and retries transient conflicts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use podesk_db::{SequenceError, SequenceStore};
use podesk_schemas::{OrderId, YearMonth};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base backoff between conflict retries; attempt `n` waits `n * BASE`.
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn SequenceStore>,
    max_attempts: u32,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self::with_max_attempts(store, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(store: Arc<dyn SequenceStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Issue the next identifier for `period`.
    ///
    /// Conflicts are retried up to `max_attempts` times; any other store
    /// error, or exhaustion, is returned and no identifier is issued.
    pub async fn allocate(&self, period: YearMonth) -> Result<OrderId> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.increment(&period).await {
                Ok(n) if n > 0 => return Ok(OrderId::new(period, n)),
                Ok(n) => {
                    return Err(anyhow!(
                        "sequence store returned non-positive value {n} for {period}"
                    ))
                }
                Err(SequenceError::Conflict(msg)) if attempt < self.max_attempts => {
                    debug!(period = %period, attempt, error = %msg, "sequence conflict, retrying");
                    tokio::time::sleep(RETRY_BACKOFF_BASE * attempt).await;
                }
                Err(SequenceError::Conflict(msg)) => {
                    warn!(
                        period = %period,
                        attempts = attempt,
                        error = %msg,
                        "sequence allocation exhausted"
                    );
                    return Err(anyhow!(
                        "sequence allocation for {period} failed after {attempt} attempts: {msg}"
                    ));
                }
                Err(SequenceError::Store(e)) => return Err(e.context(format!("allocate {period}"))),
            }
        }
    }

    /// Same as [`allocate`](Self::allocate) for a `YYYY-MM` key.
    pub async fn allocate_key(&self, period: &str) -> Result<OrderId> {
        let period = YearMonth::parse(period)?;
        self.allocate(period).await
    }
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
