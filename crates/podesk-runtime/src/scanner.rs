//! DelayScanner: the claim protocol.
//!
//! For each category, per sweep:
//!
//! 1. query candidates ([`StalePredicate`]);
//! 2. for each candidate, issue the conditional claim write;
//! 3. `1` row modified: this sweep owns the escalation, so classify it and
//!    dispatch once;
//! 4. `0` rows: someone else owns it, skip (trace only);
//! 5. dispatch failure: log, keep the claim, no retry.
//!
//! The claim write is the only synchronization. Overlapping sweeps, in this
//! process or another, can therefore run without coordination.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use podesk_db::{OrderRepository, StalePredicate};
use podesk_schemas::{DelayRecord, Order, ReminderCategory};
use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use crate::clock::Clock;
use crate::dispatch::{Escalation, ReminderDispatcher};

pub const DEFAULT_STALE_AFTER_HOURS: i64 = 24;

/// Escalation sub-type for a claimed category.
///
/// Only the generic admin label is refined: an order without proformas is
/// escalated as `proforma`, one with proformas but no payments as
/// `payment`. Payment and proforma claims keep their own category.
pub fn escalation_kind(claimed: ReminderCategory, order: &Order) -> ReminderCategory {
    match claimed {
        ReminderCategory::Admin if order.proformas.is_empty() => ReminderCategory::Proforma,
        ReminderCategory::Admin if order.payments.is_empty() => ReminderCategory::Payment,
        other => other,
    }
}

// ---------------------------------------------------------------------------
// ScanReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub candidates: usize,
    pub claimed: usize,
    /// Claim matched zero rows.
    pub skipped: usize,
    pub dispatched: usize,
    pub dispatch_failed: usize,
    /// Store errors (candidate query or claim write).
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub at: DateTime<Utc>,
    pub admin: CategoryReport,
    pub payment: CategoryReport,
    pub proforma: CategoryReport,
}

impl ScanReport {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            admin: CategoryReport::default(),
            payment: CategoryReport::default(),
            proforma: CategoryReport::default(),
        }
    }

    pub fn category(&self, category: ReminderCategory) -> &CategoryReport {
        match category {
            ReminderCategory::Admin => &self.admin,
            ReminderCategory::Payment => &self.payment,
            ReminderCategory::Proforma => &self.proforma,
        }
    }

    fn category_mut(&mut self, category: ReminderCategory) -> &mut CategoryReport {
        match category {
            ReminderCategory::Admin => &mut self.admin,
            ReminderCategory::Payment => &mut self.payment,
            ReminderCategory::Proforma => &mut self.proforma,
        }
    }

    pub fn total_claimed(&self) -> usize {
        ReminderCategory::ALL
            .iter()
            .map(|c| self.category(*c).claimed)
            .sum()
    }

    pub fn total_dispatched(&self) -> usize {
        ReminderCategory::ALL
            .iter()
            .map(|c| self.category(*c).dispatched)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// DelayScanner
// ---------------------------------------------------------------------------

pub struct DelayScanner {
    repo: Arc<dyn OrderRepository>,
    dispatcher: Arc<dyn ReminderDispatcher>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl DelayScanner {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        dispatcher: Arc<dyn ReminderDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            clock,
            stale_after: Duration::hours(DEFAULT_STALE_AFTER_HOURS),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// One full sweep over all three categories at the clock's "now".
    pub async fn scan_once(&self) -> ScanReport {
        self.scan_at(self.clock.now()).await
    }

    /// One full sweep as of `now`.
    ///
    /// Never fails as a whole: per-candidate and per-category errors are
    /// logged, counted, and the sweep moves on.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::new(now);
        let cutoff = now - self.stale_after;

        for category in ReminderCategory::ALL {
            let predicate = StalePredicate::new(category, cutoff);
            let stats = report.category_mut(category);
            let swept = self.scan_category(&predicate, now, stats).await;
            if let Err(e) = swept {
                warn!(
                    category = category.as_str(),
                    error = %format!("{e:#}"),
                    "candidate query failed"
                );
                stats.errors += 1;
            }
        }

        info!(
            claimed = report.total_claimed(),
            dispatched = report.total_dispatched(),
            admin = ?report.admin,
            payment = ?report.payment,
            proforma = ?report.proforma,
            "delay scan complete"
        );
        report
    }

    async fn scan_category(
        &self,
        predicate: &StalePredicate,
        now: DateTime<Utc>,
        stats: &mut CategoryReport,
    ) -> Result<()> {
        let category = predicate.category;
        let candidates = self.repo.find_candidates(predicate).await?;
        stats.candidates = candidates.len();

        for order in candidates {
            let record = DelayRecord::for_category(category, now);
            let claimed = match self
                .repo
                .conditional_claim(&order.order_id, category, &record)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        order_id = %order.order_id,
                        category = category.as_str(),
                        error = %format!("{e:#}"),
                        "claim write failed"
                    );
                    stats.errors += 1;
                    continue;
                }
            };

            if claimed == 0 {
                trace!(
                    order_id = %order.order_id,
                    category = category.as_str(),
                    "claim lost, skipping"
                );
                stats.skipped += 1;
                continue;
            }
            stats.claimed += 1;

            let escalation = self.escalation(order, category, record, now);
            match self.dispatcher.dispatch(&escalation).await {
                Ok(()) => {
                    stats.dispatched += 1;
                    info!(
                        order_id = %escalation.order.order_id,
                        claimed = category.as_str(),
                        kind = escalation.kind.as_str(),
                        dispatcher = self.dispatcher.name(),
                        "escalation dispatched"
                    );
                }
                Err(e) => {
                    // The claim stays committed: at most one attempt per order and category.
                    stats.dispatch_failed += 1;
                    warn!(
                        order_id = %escalation.order.order_id,
                        claimed = category.as_str(),
                        dispatcher = self.dispatcher.name(),
                        error = %e,
                        "escalation dispatch failed"
                    );
                }
            }
        }
        Ok(())
    }

    fn escalation(
        &self,
        mut order: Order,
        claimed: ReminderCategory,
        record: DelayRecord,
        now: DateTime<Utc>,
    ) -> Escalation {
        order.reminders.mark_sent(claimed);
        order.delay_history.push(record);
        let kind = escalation_kind(claimed, &order);
        let ledger =
            (kind == ReminderCategory::Payment).then(|| podesk_ledger::recompute(&mut order));
        Escalation {
            order,
            claimed,
            kind,
            ledger,
            at: now,
        }
    }
}

impl std::fmt::Debug for DelayScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayScanner")
            .field("dispatcher", &self.dispatcher.name())
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}
