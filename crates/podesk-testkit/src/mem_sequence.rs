use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use podesk_db::{SequenceError, SequenceStore};
use podesk_schemas::YearMonth;
use tokio::sync::Mutex;

/// In-memory per-period counters.
///
/// `inject_conflicts(n)` makes the next `n` increments fail with
/// [`SequenceError::Conflict`] without touching the counter.
#[derive(Default)]
pub struct MemSequenceStore {
    counters: Mutex<HashMap<YearMonth, i64>>,
    pending_conflicts: AtomicU32,
    fail_hard: AtomicBool,
    calls: AtomicUsize,
}

impl MemSequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_hard(&self, fail: bool) {
        self.fail_hard.store(fail, Ordering::SeqCst);
    }

    /// Number of `increment` calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, period: YearMonth, value: i64) {
        self.counters.lock().await.insert(period, value);
    }
}

#[async_trait]
impl SequenceStore for MemSequenceStore {
    async fn increment(&self, period: &YearMonth) -> Result<i64, SequenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let conflicted = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Err(SequenceError::Conflict("injected serialization failure".to_string()));
        }
        if self.fail_hard.load(Ordering::SeqCst) {
            return Err(SequenceError::Store(anyhow!("injected store failure")));
        }

        tokio::task::yield_now().await;
        let mut counters = self.counters.lock().await;
        let n = counters.entry(*period).or_insert(0);
        *n += 1;
        Ok(*n)
    }

    async fn current(&self, period: &YearMonth) -> anyhow::Result<Option<i64>> {
        Ok(self.counters.lock().await.get(period).copied())
    }
}
