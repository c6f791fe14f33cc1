//! Storage seams consumed by the runtime.
//!
//! Two write disciplines coexist on an order row and never overlap:
//!
//! - [`OrderRepository::conditional_claim`] owns the three reminder flags and
//!   `delay_history`. It is a single conditional write
//!   (`set flag = true ... where flag = false`) and reports the number of
//!   rows it modified.
//! - [`OrderRepository::save_if_version`] persists lifecycle and payment
//!   state under an optimistic version check. It never writes the reminder
//!   flags or `delay_history`, so a concurrent claim cannot be overwritten
//!   by a stale lifecycle snapshot.

use anyhow::Result;
use chrono::{DateTime, Utc};
use podesk_schemas::{
    DelayRecord, Order, OrderId, OrderStatus, Payment, ReminderCategory, YearMonth,
};

// ---------------------------------------------------------------------------
// StalePredicate
// ---------------------------------------------------------------------------

/// Candidate filter for one escalation category.
///
/// | category | status    | extra condition                          |
/// |----------|-----------|------------------------------------------|
/// | admin    | Pending   |                                          |
/// | payment  | Validated | no payments, at least one proforma       |
/// | proforma | Validated | no proformas                             |
///
/// All categories also require: not deleted, `created_at <= created_before`,
/// and the category flag still unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePredicate {
    pub category: ReminderCategory,
    pub created_before: DateTime<Utc>,
}

impl StalePredicate {
    pub fn new(category: ReminderCategory, created_before: DateTime<Utc>) -> Self {
        Self {
            category,
            created_before,
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self.category {
            ReminderCategory::Admin => OrderStatus::Pending,
            ReminderCategory::Payment | ReminderCategory::Proforma => OrderStatus::Validated,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if order.deleted
            || order.created_at > self.created_before
            || order.status != self.status()
            || order.reminders.is_sent(self.category)
        {
            return false;
        }
        match self.category {
            ReminderCategory::Admin => true,
            ReminderCategory::Payment => order.payments.is_empty() && !order.proformas.is_empty(),
            ReminderCategory::Proforma => order.proformas.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderRepository
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a brand-new order. Fails if the id already exists.
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// All orders (including soft-deleted ones), optionally filtered by
    /// status, oldest first.
    async fn find_by_status(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;

    /// Orders matching `predicate`, oldest first.
    async fn find_candidates(&self, predicate: &StalePredicate) -> Result<Vec<Order>>;

    /// Atomically set the category flag and append `record` to
    /// `delay_history`, only if the flag is currently false.
    ///
    /// Returns the number of rows modified: `1` means the caller owns the
    /// escalation, `0` means someone else claimed it first (or the order
    /// does not exist).
    async fn conditional_claim(
        &self,
        order_id: &OrderId,
        category: ReminderCategory,
        record: &DelayRecord,
    ) -> Result<u64>;

    /// Persist lifecycle/payment state if the stored version still equals
    /// `expected_version`. On success the stored version becomes
    /// `expected_version + 1`. Returns `false` on a version mismatch.
    async fn save_if_version(&self, order: &Order, expected_version: i64) -> Result<bool>;

    /// Apply [`LifecycleEvent::RecordPayment`] to the locked row and persist
    /// it in a single write.
    ///
    /// Returns the updated order, or `None` if it does not exist. A rejected
    /// payment (for example one that overflows the paid total) comes back as
    /// an error carrying the `LifecycleError`, and nothing is written.
    ///
    /// [`LifecycleEvent::RecordPayment`]: podesk_lifecycle::LifecycleEvent::RecordPayment
    async fn append_payment(&self, order_id: &OrderId, payment: &Payment) -> Result<Option<Order>>;
}

// ---------------------------------------------------------------------------
// SequenceStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SequenceError {
    /// Transient write conflict (serialization failure, deadlock). Safe to retry.
    Conflict(String),
    Store(anyhow::Error),
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::Conflict(msg) => write!(f, "sequence write conflict: {msg}"),
            SequenceError::Store(e) => write!(f, "sequence store error: {e:#}"),
        }
    }
}

impl std::error::Error for SequenceError {}

/// Per-period counters backing order identifiers.
#[async_trait::async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomic read-modify-write: create the counter at 1 if absent,
    /// otherwise increment it. Returns the new value.
    async fn increment(&self, period: &YearMonth) -> std::result::Result<i64, SequenceError>;

    async fn current(&self, period: &YearMonth) -> Result<Option<i64>>;
}
