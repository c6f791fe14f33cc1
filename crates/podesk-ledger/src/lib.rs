//! podesk-ledger
//!
//! Pure derivation of an order's payment totals and payment status from its
//! proformas and payments.
//!
//! # Single recomputation path
//! The derived fields stored on [`Order`] (`total_amount`, `amount_paid`,
//! `remaining_amount`, `payment_status`) are written **only** by
//! [`recompute`]. There are no incremental updates, so the stored copy can
//! never drift from its inputs: every payment append, proforma change or
//! manual override is followed by a full recomputation.
//!
//! # Determinism
//! No I/O, no clock, no randomness.

mod amount;

pub use amount::{parse_amount, AmountError};

use podesk_schemas::{Micros, Order, Payment, PaymentStatus, Proforma};
use serde::{Deserialize, Serialize};

/// Read-only view of the derived ledger state of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_amount: Micros,
    pub amount_paid: Micros,
    /// `total_amount - amount_paid`; negative when overpaid (not clamped).
    pub remaining_amount: Micros,
    pub payment_status: PaymentStatus,
}

/// The authoritative quote: first proforma with `validated = true`.
pub fn authoritative_proforma(proformas: &[Proforma]) -> Option<&Proforma> {
    proformas.iter().find(|p| p.validated)
}

/// Sum of all payment amounts, or `None` if it does not fit in an `i64`.
///
/// Appends are rejected when this would overflow, so a stored order always
/// has a representable total.
pub fn total_paid(payments: &[Payment]) -> Option<Micros> {
    payments
        .iter()
        .try_fold(Micros::ZERO, |acc, p| acc.checked_add(p.amount))
}

/// Derive the ledger summary from raw inputs.
pub fn derive(proformas: &[Proforma], payments: &[Payment], manual_paid: bool) -> LedgerSummary {
    let total_amount = authoritative_proforma(proformas)
        .map(|p| p.amount)
        .unwrap_or(Micros::ZERO);
    let amount_paid = total_paid(payments).unwrap_or(Micros::new(i64::MAX));
    let remaining_amount = total_amount - amount_paid;

    LedgerSummary {
        total_amount,
        amount_paid,
        remaining_amount,
        payment_status: payment_status(total_amount, amount_paid, manual_paid),
    }
}

/// `Paid` on manual override or full coverage of a positive total;
/// `PartiallyPaid` strictly between zero and the total; otherwise `Unpaid`.
pub fn payment_status(total: Micros, paid: Micros, manual_paid: bool) -> PaymentStatus {
    if manual_paid || (total.is_positive() && paid >= total) {
        PaymentStatus::Paid
    } else if paid.is_positive() && paid < total {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

/// Recompute and store the derived fields on `order`.
pub fn recompute(order: &mut Order) -> LedgerSummary {
    let s = derive(&order.proformas, &order.payments, order.manual_paid);
    order.total_amount = s.total_amount;
    order.amount_paid = s.amount_paid;
    order.remaining_amount = s.remaining_amount;
    order.payment_status = s.payment_status;
    s
}

/// Summary of an order without mutating it (used on every read).
pub fn summarize(order: &Order) -> LedgerSummary {
    derive(&order.proformas, &order.payments, order.manual_paid)
}

/// `true` when the stored derived fields equal a fresh derivation.
pub fn is_consistent(order: &Order) -> bool {
    let s = summarize(order);
    order.total_amount == s.total_amount
        && order.amount_paid == s.amount_paid
        && order.remaining_amount == s.remaining_amount
        && order.payment_status == s.payment_status
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn proforma(units: i64, validated: bool) -> Proforma {
        Proforma {
            vendor: "ACME".to_string(),
            amount: Micros::from_units(units),
            currency: "EUR".to_string(),
            validated,
            added_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    fn payment(units: i64) -> Payment {
        Payment {
            amount: Micros::from_units(units),
            submitted_at: Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap(),
            submitted_by: "treasury".to_string(),
            reference: None,
            note: None,
        }
    }

    #[test]
    fn total_is_first_validated_proforma() {
        let pf = [
            proforma(900, false),
            proforma(1000, true),
            proforma(1200, true),
        ];
        let s = derive(&pf, &[], false);
        assert_eq!(s.total_amount, Micros::from_units(1000));
        assert_eq!(s.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn no_validated_proforma_means_zero_total() {
        let s = derive(&[proforma(500, false)], &[payment(100)], false);
        assert_eq!(s.total_amount, Micros::ZERO);
        assert_eq!(s.remaining_amount, Micros::from_units(-100));
        // A positive payment against a zero total is neither partial nor paid.
        assert_eq!(s.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn partial_then_full_then_overpaid() {
        let pf = [proforma(1000, true)];
        let mut pays = vec![payment(400)];
        let s = derive(&pf, &pays, false);
        assert_eq!(s.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(s.remaining_amount, Micros::from_units(600));

        pays.push(payment(600));
        let s = derive(&pf, &pays, false);
        assert_eq!(s.payment_status, PaymentStatus::Paid);
        assert_eq!(s.remaining_amount, Micros::ZERO);

        pays.push(payment(50));
        let s = derive(&pf, &pays, false);
        assert_eq!(s.payment_status, PaymentStatus::Paid);
        assert_eq!(s.remaining_amount, Micros::from_units(-50), "overpayment is not clamped");
    }

    #[test]
    fn manual_override_forces_paid() {
        let s = derive(&[proforma(1000, true)], &[], true);
        assert_eq!(s.payment_status, PaymentStatus::Paid);
        assert_eq!(s.remaining_amount, Micros::from_units(1000));
    }

    #[test]
    fn remaining_tracks_every_append() {
        let pf = [proforma(750, true)];
        let mut pays = Vec::new();
        for units in [100, 250, 10, 500] {
            pays.push(payment(units));
            let s = derive(&pf, &pays, false);
            assert_eq!(s.remaining_amount, s.total_amount - s.amount_paid);
        }
    }

    #[test]
    fn total_paid_reports_overflow() {
        let mut big = payment(0);
        big.amount = Micros::new(i64::MAX / 2 + 10);
        assert_eq!(total_paid(&[big.clone()]), Some(big.amount));
        assert_eq!(total_paid(&[big.clone(), big]), None);
        assert_eq!(total_paid(&[]), Some(Micros::ZERO));
    }
}
