//! OrderDesk: order creation and lifecycle transitions.
//!
//! Every transition is read → [`podesk_lifecycle::apply`] → versioned save.
//! When the save loses the version race the desk re-reads and re-applies on
//! fresh state, so a losing concurrent `approve` observes the winner's
//! decision and returns [`Outcome::NoOp`] with `AlreadyProcessed`.

use std::sync::Arc;

use anyhow::{Context, Result};
use podesk_db::{OrderNotFound, OrderRepository};
use podesk_lifecycle::{
    validate_draft, validate_payment, IntakeError, LifecycleError, LifecycleEvent, ValidDraft,
};
use podesk_schemas::{Micros, Order, OrderDraft, OrderId, OrderStatus, Payment, Proforma};
use tracing::{debug, info, warn};

use crate::allocator::SequenceAllocator;
use crate::clock::{Calendar, Clock};

pub const DEFAULT_MAX_SAVE_ATTEMPTS: u32 = 8;

/// Result of a transition that can legitimately be a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// The stored state already decided the question; nothing was written.
    NoOp(LifecycleError),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(v) => Some(v),
            Outcome::NoOp(_) => None,
        }
    }
}

/// Marker error: the versioned save kept losing to concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContention {
    pub order_id: OrderId,
    pub attempts: u32,
}

impl std::fmt::Display for WriteContention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "order {} kept changing underneath {} save attempts",
            self.order_id, self.attempts
        )
    }
}

impl std::error::Error for WriteContention {}

pub struct OrderDesk {
    repo: Arc<dyn OrderRepository>,
    allocator: SequenceAllocator,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    max_save_attempts: u32,
}

impl OrderDesk {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        allocator: SequenceAllocator,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
    ) -> Self {
        Self {
            repo,
            allocator,
            clock,
            calendar,
            max_save_attempts: DEFAULT_MAX_SAVE_ATTEMPTS,
        }
    }

    pub fn with_max_save_attempts(mut self, n: u32) -> Self {
        self.max_save_attempts = n.max(1);
        self
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    // -----------------------------------------------------------------------
    // Intake
    // -----------------------------------------------------------------------

    /// Validate a draft against today's date in the desk calendar.
    pub fn validate(&self, draft: OrderDraft) -> Result<ValidDraft, Vec<IntakeError>> {
        validate_draft(draft, self.calendar.today(self.clock.now()))
    }

    /// Allocate an identifier and persist a new `Pending` order.
    ///
    /// If allocation fails nothing is persisted.
    pub async fn create_order(&self, draft: ValidDraft) -> Result<Order> {
        let now = self.clock.now();
        let period = self.calendar.period(now);
        let order_id = self
            .allocator
            .allocate(period)
            .await
            .context("order identifier allocation failed")?;

        let order = Order::from_draft(order_id, draft.draft(), now);
        self.repo.insert(&order).await?;
        info!(order_id = %order.order_id, team = %order.team, "order created");
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Load an order with its ledger freshly derived.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let mut order = self.repo.find_by_id(order_id).await?;
        if let Some(o) = order.as_mut() {
            podesk_ledger::recompute(o);
        }
        Ok(order)
    }

    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let mut orders = self.repo.find_by_status(status).await?;
        for o in orders.iter_mut() {
            podesk_ledger::recompute(o);
        }
        Ok(orders)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub async fn approve(&self, order_id: &OrderId, approver: &str) -> Result<Outcome<Order>> {
        self.transition(
            order_id,
            LifecycleEvent::Approve {
                approver: approver.to_string(),
            },
        )
        .await
    }

    pub async fn reject(
        &self,
        order_id: &OrderId,
        rejecter: &str,
        reason: &str,
    ) -> Result<Outcome<Order>> {
        self.transition(
            order_id,
            LifecycleEvent::Reject {
                rejecter: rejecter.to_string(),
                reason: reason.to_string(),
            },
        )
        .await
    }

    pub async fn soft_delete(
        &self,
        order_id: &OrderId,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<Order>> {
        self.transition(
            order_id,
            LifecycleEvent::SoftDelete {
                actor: actor.to_string(),
                reason: reason.to_string(),
            },
        )
        .await
    }

    pub async fn add_proforma(
        &self,
        order_id: &OrderId,
        vendor: &str,
        amount: Micros,
        currency: &str,
    ) -> Result<Outcome<Order>> {
        let proforma = Proforma {
            vendor: vendor.trim().to_string(),
            amount,
            currency: currency.trim().to_ascii_uppercase(),
            validated: false,
            added_at: self.clock.now(),
        };
        self.transition(order_id, LifecycleEvent::AddProforma { proforma })
            .await
    }

    pub async fn validate_proforma(
        &self,
        order_id: &OrderId,
        index: usize,
    ) -> Result<Outcome<Order>> {
        self.transition(order_id, LifecycleEvent::ValidateProforma { index })
            .await
    }

    pub async fn mark_paid(&self, order_id: &OrderId, actor: &str) -> Result<Outcome<Order>> {
        self.transition(
            order_id,
            LifecycleEvent::MarkPaid {
                actor: actor.to_string(),
            },
        )
        .await
    }

    /// Append a payment and recompute the ledger in one repository write.
    ///
    /// The field checks run here, before the store is touched; the
    /// repository applies [`LifecycleEvent::RecordPayment`] to the locked
    /// row, which adds the overflow guard.
    ///
    /// Payments are accepted in any status; they never change `status`.
    pub async fn record_payment(
        &self,
        order_id: &OrderId,
        amount: Micros,
        submitted_by: &str,
        reference: Option<String>,
        note: Option<String>,
    ) -> Result<Order> {
        let payment = Payment {
            amount,
            submitted_at: self.clock.now(),
            submitted_by: submitted_by.trim().to_string(),
            reference: reference.filter(|s| !s.trim().is_empty()),
            note: note.filter(|s| !s.trim().is_empty()),
        };
        validate_payment(&payment)?;

        let order = self
            .repo
            .append_payment(order_id, &payment)
            .await?
            .ok_or_else(|| anyhow::Error::new(OrderNotFound(order_id.to_string())))?;

        info!(
            order_id = %order_id,
            amount = %amount,
            remaining = %order.remaining_amount,
            payment_status = order.payment_status.as_str(),
            "payment recorded"
        );
        Ok(order)
    }

    /// Read → apply → versioned save, retried on a lost version race.
    ///
    /// Conflicts come back as `Ok(Outcome::NoOp)`. Validation failures of
    /// the event come back as `Err` carrying a [`LifecycleError`].
    pub async fn transition(
        &self,
        order_id: &OrderId,
        event: LifecycleEvent,
    ) -> Result<Outcome<Order>> {
        for attempt in 1..=self.max_save_attempts {
            let mut order = self
                .repo
                .find_by_id(order_id)
                .await?
                .ok_or_else(|| anyhow::Error::new(OrderNotFound(order_id.to_string())))?;
            let expected = order.version;

            match podesk_lifecycle::apply(&mut order, &event, self.clock.now()) {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {
                    debug!(
                        order_id = %order_id,
                        event = event.name(),
                        reason = %e,
                        "transition is a no-op"
                    );
                    return Ok(Outcome::NoOp(e));
                }
                Err(e) => return Err(e.into()),
            }

            if self.repo.save_if_version(&order, expected).await? {
                order.version = expected + 1;
                info!(
                    order_id = %order_id,
                    event = event.name(),
                    status = order.status.as_str(),
                    deleted = order.deleted,
                    "order updated"
                );
                return Ok(Outcome::Applied(order));
            }
            debug!(
                order_id = %order_id,
                event = event.name(),
                attempt,
                "version race lost, re-reading"
            );
        }

        warn!(
            order_id = %order_id,
            event = event.name(),
            attempts = self.max_save_attempts,
            "giving up on contended order"
        );
        Err(anyhow::Error::new(WriteContention {
            order_id: order_id.clone(),
            attempts: self.max_save_attempts,
        }))
    }
}

impl std::fmt::Debug for OrderDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderDesk")
            .field("allocator", &self.allocator)
            .field("calendar", &self.calendar)
            .field("max_save_attempts", &self.max_save_attempts)
            .finish_non_exhaustive()
    }
}
