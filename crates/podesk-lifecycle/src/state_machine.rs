//! Order lifecycle state machine.
//!
//! # Design
//!
//! Every change to an order's approval state, deletion state or payment
//! inputs is expressed as a [`LifecycleEvent`] and applied through
//! [`apply`]. `apply` is pure: it validates the event against the current
//! state, mutates the order in place on success and leaves it untouched on
//! error. Persisting the result (and detecting that someone else persisted
//! first) is the repository's job.
//!
//! # State diagram
//!
//! ```text
//!              Approve                      (terminal for approval)
//!   Pending ──────────────► Validated
//!      │
//!      │       Reject
//!      └──────────────────► Rejected
//!
//!   deleted: false ── SoftDelete ──► true      (any status, orthogonal)
//! ```
//!
//! `is_approved_once` is a one-way latch: once set it never clears, and any
//! further `Approve`/`Reject` returns [`LifecycleError::AlreadyProcessed`].
//!
//! Payment events (`RecordPayment`, `AddProforma`, `ValidateProforma`,
//! `MarkPaid`) never change `status`; each ends with a full ledger
//! recomputation.

use chrono::{DateTime, Utc};
use podesk_schemas::{
    Approval, Deletion, Micros, Order, OrderId, OrderStatus, Payment, Proforma, Rejection,
};

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Approve { approver: String },
    Reject { rejecter: String, reason: String },
    SoftDelete { actor: String, reason: String },
    RecordPayment { payment: Payment },
    AddProforma { proforma: Proforma },
    /// Make proforma `index` the single authoritative quote.
    ValidateProforma { index: usize },
    /// Manual "paid" override consumed by the ledger.
    MarkPaid { actor: String },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Approve { .. } => "approve",
            LifecycleEvent::Reject { .. } => "reject",
            LifecycleEvent::SoftDelete { .. } => "soft_delete",
            LifecycleEvent::RecordPayment { .. } => "record_payment",
            LifecycleEvent::AddProforma { .. } => "add_proforma",
            LifecycleEvent::ValidateProforma { .. } => "validate_proforma",
            LifecycleEvent::MarkPaid { .. } => "mark_paid",
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleError
// ---------------------------------------------------------------------------

/// Why an event could not be applied.
///
/// `AlreadyProcessed` and `AlreadyDeleted` are *conflicts*: the order's
/// current state is authoritative and the caller's request is a no-op.
/// The remaining variants are validation failures of the event itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    AlreadyProcessed { order_id: OrderId, status: OrderStatus },
    AlreadyDeleted { order_id: OrderId },
    NonPositiveAmount { amount: Micros },
    /// The payment would push the paid total past what `Micros` can hold.
    AmountOverflow { amount: Micros },
    UnknownProforma { index: usize, count: usize },
    MissingField(&'static str),
}

impl LifecycleError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LifecycleError::AlreadyProcessed { .. } | LifecycleError::AlreadyDeleted { .. }
        )
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            LifecycleError::AlreadyDeleted { .. } => "ALREADY_DELETED",
            LifecycleError::NonPositiveAmount { .. } => "NON_POSITIVE_AMOUNT",
            LifecycleError::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            LifecycleError::UnknownProforma { .. } => "UNKNOWN_PROFORMA",
            LifecycleError::MissingField(_) => "MISSING_FIELD",
        }
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::AlreadyProcessed { order_id, status } => {
                write!(f, "order {order_id} already processed (status {})", status.as_str())
            }
            LifecycleError::AlreadyDeleted { order_id } => {
                write!(f, "order {order_id} already deleted")
            }
            LifecycleError::NonPositiveAmount { amount } => {
                write!(f, "amount must be > 0, got {amount}")
            }
            LifecycleError::AmountOverflow { amount } => {
                write!(f, "payment of {amount} overflows the paid total")
            }
            LifecycleError::UnknownProforma { index, count } => {
                write!(f, "proforma index {index} out of range ({count} attached)")
            }
            LifecycleError::MissingField(name) => write!(f, "missing required field: {name}"),
        }
    }
}

impl std::error::Error for LifecycleError {}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Apply `event` to `order` at time `now`.
///
/// On success `order.date` is set to `now`. On error the order is unchanged.
/// The version is not touched here.
pub fn apply(
    order: &mut Order,
    event: &LifecycleEvent,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    match event {
        LifecycleEvent::Approve { approver } => {
            require("approver", approver)?;
            guard_undecided(order)?;
            order.status = OrderStatus::Validated;
            order.is_approved_once = true;
            order.approval = Some(Approval {
                by: approver.trim().to_string(),
                at: now,
            });
        }

        LifecycleEvent::Reject { rejecter, reason } => {
            require("rejecter", rejecter)?;
            require("reason", reason)?;
            guard_undecided(order)?;
            order.status = OrderStatus::Rejected;
            order.rejection = Some(Rejection {
                by: rejecter.trim().to_string(),
                at: now,
                reason: reason.trim().to_string(),
            });
        }

        LifecycleEvent::SoftDelete { actor, reason } => {
            require("actor", actor)?;
            require("reason", reason)?;
            if order.deleted {
                return Err(LifecycleError::AlreadyDeleted {
                    order_id: order.order_id.clone(),
                });
            }
            order.deleted = true;
            order.deletion = Some(Deletion {
                by: actor.trim().to_string(),
                at: now,
                reason: reason.trim().to_string(),
            });
        }

        LifecycleEvent::RecordPayment { payment } => {
            validate_payment(payment)?;
            podesk_ledger::total_paid(&order.payments)
                .and_then(|paid| paid.checked_add(payment.amount))
                .ok_or(LifecycleError::AmountOverflow {
                    amount: payment.amount,
                })?;
            order.payments.push(payment.clone());
            podesk_ledger::recompute(order);
        }

        LifecycleEvent::AddProforma { proforma } => {
            require("vendor", &proforma.vendor)?;
            require("currency", &proforma.currency)?;
            if !proforma.amount.is_positive() {
                return Err(LifecycleError::NonPositiveAmount {
                    amount: proforma.amount,
                });
            }
            order.proformas.push(proforma.clone());
            podesk_ledger::recompute(order);
        }

        LifecycleEvent::ValidateProforma { index } => {
            let count = order.proformas.len();
            if *index >= count {
                return Err(LifecycleError::UnknownProforma { index: *index, count });
            }
            let already_sole = order
                .proformas
                .iter()
                .enumerate()
                .all(|(i, p)| p.validated == (i == *index));
            if already_sole {
                return Err(LifecycleError::AlreadyProcessed {
                    order_id: order.order_id.clone(),
                    status: order.status,
                });
            }
            for (i, p) in order.proformas.iter_mut().enumerate() {
                p.validated = i == *index;
            }
            podesk_ledger::recompute(order);
        }

        LifecycleEvent::MarkPaid { actor } => {
            require("actor", actor)?;
            if order.manual_paid {
                return Err(LifecycleError::AlreadyProcessed {
                    order_id: order.order_id.clone(),
                    status: order.status,
                });
            }
            order.manual_paid = true;
            podesk_ledger::recompute(order);
        }
    }

    order.date = now;
    Ok(())
}

/// Order-independent checks on a payment, run before any store access.
pub fn validate_payment(payment: &Payment) -> Result<(), LifecycleError> {
    require("submitted_by", &payment.submitted_by)?;
    if !payment.amount.is_positive() {
        return Err(LifecycleError::NonPositiveAmount {
            amount: payment.amount,
        });
    }
    Ok(())
}

/// Approve/reject guard: the order must still be undecided.
fn guard_undecided(order: &Order) -> Result<(), LifecycleError> {
    if order.is_approved_once || order.status != OrderStatus::Pending {
        return Err(LifecycleError::AlreadyProcessed {
            order_id: order.order_id.clone(),
            status: order.status,
        });
    }
    Ok(())
}

fn require(name: &'static str, value: &str) -> Result<(), LifecycleError> {
    if value.trim().is_empty() {
        return Err(LifecycleError::MissingField(name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use podesk_schemas::{DraftArticle, OrderDraft, PaymentStatus, YearMonth};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, 0, 0).unwrap()
    }

    fn pending() -> Order {
        let draft = OrderDraft {
            title: "Laptop stands".to_string(),
            team: "Platform".to_string(),
            requested_by: "alice".to_string(),
            requested_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            articles: vec![DraftArticle {
                quantity: 3,
                unit: "pcs".to_string(),
                description: "stand".to_string(),
            }],
        };
        let id = OrderId::new(YearMonth::parse("2025-03").unwrap(), 1);
        Order::from_draft(id, &draft, t(8))
    }

    fn approve(by: &str) -> LifecycleEvent {
        LifecycleEvent::Approve {
            approver: by.to_string(),
        }
    }

    fn reject(by: &str) -> LifecycleEvent {
        LifecycleEvent::Reject {
            rejecter: by.to_string(),
            reason: "over budget".to_string(),
        }
    }

    fn pay(units: i64) -> LifecycleEvent {
        LifecycleEvent::RecordPayment {
            payment: Payment {
                amount: Micros::from_units(units),
                submitted_at: t(12),
                submitted_by: "treasury".to_string(),
                reference: Some("TX-1".to_string()),
                note: None,
            },
        }
    }

    fn quote(units: i64, validated: bool) -> LifecycleEvent {
        LifecycleEvent::AddProforma {
            proforma: Proforma {
                vendor: "ACME".to_string(),
                amount: Micros::from_units(units),
                currency: "EUR".to_string(),
                validated,
                added_at: t(9),
            },
        }
    }

    #[test]
    fn approve_sets_validated_and_latch() {
        let mut o = pending();
        apply(&mut o, &approve("bob"), t(10)).unwrap();
        assert_eq!(o.status, OrderStatus::Validated);
        assert!(o.is_approved_once);
        assert_eq!(o.approval.as_ref().map(|a| a.by.as_str()), Some("bob"));
        assert_eq!(o.date, t(10));
    }

    #[test]
    fn approval_is_irreversible() {
        let mut o = pending();
        apply(&mut o, &approve("bob"), t(10)).unwrap();

        let err = apply(&mut o, &approve("carol"), t(11)).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyProcessed { .. }));
        assert!(err.is_conflict());

        let err = apply(&mut o, &reject("carol"), t(11)).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyProcessed { .. }));

        assert_eq!(o.status, OrderStatus::Validated);
        assert!(o.is_approved_once);
        assert_eq!(o.date, t(10), "losing caller must not touch the order");
    }

    #[test]
    fn rejected_order_cannot_be_approved() {
        let mut o = pending();
        apply(&mut o, &reject("bob"), t(10)).unwrap();
        assert_eq!(o.status, OrderStatus::Rejected);
        assert_eq!(o.rejection.as_ref().map(|r| r.reason.as_str()), Some("over budget"));

        let err = apply(&mut o, &approve("bob"), t(11)).unwrap_err();
        assert_eq!(err.code(), "ALREADY_PROCESSED");
        assert!(!o.is_approved_once);
    }

    #[test]
    fn latch_guards_even_if_status_was_reset() {
        let mut o = pending();
        o.is_approved_once = true;
        assert!(apply(&mut o, &approve("bob"), t(10)).is_err());
    }

    #[test]
    fn soft_delete_keeps_status_and_is_once_only() {
        let mut o = pending();
        apply(&mut o, &approve("bob"), t(10)).unwrap();
        let del = LifecycleEvent::SoftDelete {
            actor: "admin".to_string(),
            reason: "duplicate".to_string(),
        };
        apply(&mut o, &del, t(11)).unwrap();
        assert!(o.deleted);
        assert_eq!(o.status, OrderStatus::Validated);

        let err = apply(&mut o, &del, t(12)).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyDeleted { .. }));
        assert_eq!(o.deletion.as_ref().map(|d| d.at), Some(t(11)));
    }

    #[test]
    fn payments_recompute_ledger_without_status_change() {
        let mut o = pending();
        apply(&mut o, &quote(1000, true), t(9)).unwrap();
        apply(&mut o, &pay(400), t(12)).unwrap();
        assert_eq!(o.status, OrderStatus::Pending);
        assert_eq!(o.amount_paid, Micros::from_units(400));
        assert_eq!(o.remaining_amount, Micros::from_units(600));
        assert_eq!(o.payment_status, PaymentStatus::PartiallyPaid);

        apply(&mut o, &pay(600), t(13)).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert!(podesk_ledger::is_consistent(&o));
    }

    #[test]
    fn non_positive_payment_is_rejected() {
        let mut o = pending();
        let err = apply(&mut o, &pay(0), t(12)).unwrap_err();
        assert!(matches!(err, LifecycleError::NonPositiveAmount { .. }));
        assert!(!err.is_conflict());
        assert!(o.payments.is_empty());
    }

    #[test]
    fn payment_overflowing_paid_total_leaves_order_untouched() {
        let mut o = pending();
        let big = |at| LifecycleEvent::RecordPayment {
            payment: Payment {
                amount: Micros::new(i64::MAX / 2 + 10),
                submitted_at: t(at),
                submitted_by: "treasury".to_string(),
                reference: None,
                note: None,
            },
        };
        apply(&mut o, &big(12), t(12)).unwrap();
        let before = o.clone();

        let err = apply(&mut o, &big(13), t(13)).unwrap_err();
        assert!(matches!(err, LifecycleError::AmountOverflow { .. }));
        assert_eq!(err.code(), "AMOUNT_OVERFLOW");
        assert_eq!(o, before);
        assert!(podesk_ledger::is_consistent(&o));
    }

    #[test]
    fn validate_proforma_makes_it_sole_authority() {
        let mut o = pending();
        apply(&mut o, &quote(1000, true), t(9)).unwrap();
        apply(&mut o, &quote(800, false), t(9)).unwrap();
        assert_eq!(o.total_amount, Micros::from_units(1000));

        let select = |index| LifecycleEvent::ValidateProforma { index };
        apply(&mut o, &select(1), t(10)).unwrap();
        assert_eq!(o.total_amount, Micros::from_units(800));
        assert!(!o.proformas[0].validated);

        let err = apply(&mut o, &select(1), t(11)).unwrap_err();
        assert!(err.is_conflict());
        let err = apply(&mut o, &select(7), t(11)).unwrap_err();
        assert_eq!(err, LifecycleError::UnknownProforma { index: 7, count: 2 });
    }

    #[test]
    fn mark_paid_is_idempotent_conflict() {
        let mut o = pending();
        let ev = LifecycleEvent::MarkPaid {
            actor: "treasury".to_string(),
        };
        apply(&mut o, &ev, t(10)).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert!(apply(&mut o, &ev, t(11)).unwrap_err().is_conflict());
    }

    #[test]
    fn blank_actor_is_a_validation_error() {
        let mut o = pending();
        let err = apply(&mut o, &approve("  "), t(10)).unwrap_err();
        assert_eq!(err, LifecycleError::MissingField("approver"));
        assert_eq!(o.status, OrderStatus::Pending);
    }
}
