//! Scenario: proformas, payments and the manual paid override.
//!
//! # Invariants under test
//! - `remaining = total - paid` after every write.
//! - `total` comes from the single validated proforma.
//! - Payments never change `status`.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use podesk_ledger::is_consistent;
use podesk_lifecycle::LifecycleError;
use podesk_schemas::{Micros, OrderStatus, PaymentStatus};
use podesk_testkit::{draft, Harness};

#[tokio::test]
async fn payments_and_proformas_keep_the_ledger_consistent() {
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    let h = Harness::new(now);
    let valid = h
        .desk
        .validate(draft("Servers", NaiveDate::from_ymd_opt(2025, 6, 20).unwrap()))
        .unwrap();
    let order = h.desk.create_order(valid).await.unwrap();
    let id = order.order_id.clone();
    h.desk.approve(&id, "bob").await.unwrap();

    h.desk
        .add_proforma(&id, "Initech", Micros::from_units(1200), "eur")
        .await
        .unwrap();
    h.desk
        .add_proforma(&id, "Globex", Micros::from_units(1000), "EUR")
        .await
        .unwrap();

    // Nothing validated yet: total stays zero.
    let o = h.desk.get_order(&id).await.unwrap().unwrap();
    assert_eq!(o.total_amount, Micros::ZERO);
    assert_eq!(o.proformas[0].currency, "EUR");

    let o = h
        .desk
        .validate_proforma(&id, 1)
        .await
        .unwrap()
        .applied()
        .unwrap();
    assert_eq!(o.total_amount, Micros::from_units(1000));
    assert_eq!(o.remaining_amount, Micros::from_units(1000));

    h.clock.advance(Duration::hours(1));
    let o = h
        .desk
        .record_payment(
            &id,
            Micros::from_units(400),
            "treasury",
            Some("TX-1".to_string()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(o.amount_paid, Micros::from_units(400));
    assert_eq!(o.remaining_amount, Micros::from_units(600));
    assert_eq!(o.payment_status, PaymentStatus::PartiallyPaid);
    assert_eq!(o.status, OrderStatus::Validated);
    assert!(is_consistent(&o));

    // Switching the authoritative quote recomputes against existing payments.
    let o = h
        .desk
        .validate_proforma(&id, 0)
        .await
        .unwrap()
        .applied()
        .unwrap();
    assert!(!o.proformas[1].validated);
    assert_eq!(o.total_amount, Micros::from_units(1200));
    assert_eq!(o.remaining_amount, Micros::from_units(800));
    assert!(is_consistent(&o));

    let o = h
        .desk
        .record_payment(
            &id,
            Micros::from_units(800),
            "treasury",
            None,
            Some("final".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(o.remaining_amount, Micros::ZERO);
    assert_eq!(o.payment_status, PaymentStatus::Paid);
    assert_eq!(o.payments.len(), 2);
    assert!(is_consistent(&o));
}

#[tokio::test]
async fn invalid_payment_is_rejected_before_any_write() {
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    let h = Harness::new(now);
    let order = h
        .desk
        .create_order(h.desk.validate(draft("Cables", now.date_naive())).unwrap())
        .await
        .unwrap();

    let err = h
        .desk
        .record_payment(&order.order_id, Micros::ZERO, "treasury", None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LifecycleError>(),
        Some(LifecycleError::NonPositiveAmount { .. })
    ));

    let stored = h.desk.get_order(&order.order_id).await.unwrap().unwrap();
    assert!(stored.payments.is_empty());
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn manual_paid_override_is_idempotent() {
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    let h = Harness::new(now);
    let order = h
        .desk
        .create_order(h.desk.validate(draft("Paper", now.date_naive())).unwrap())
        .await
        .unwrap();

    let o = h
        .desk
        .mark_paid(&order.order_id, "treasury")
        .await
        .unwrap()
        .applied()
        .unwrap();
    assert_eq!(o.payment_status, PaymentStatus::Paid);
    assert_eq!(o.total_amount, Micros::ZERO);

    assert!(!h.desk.mark_paid(&order.order_id, "treasury").await.unwrap().is_applied());
}

#[tokio::test]
async fn validating_unknown_proforma_fails() {
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    let h = Harness::new(now);
    let order = h
        .desk
        .create_order(h.desk.validate(draft("Toner", now.date_naive())).unwrap())
        .await
        .unwrap();

    let err = h
        .desk
        .validate_proforma(&order.order_id, 0)
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<LifecycleError>(),
        Some(&LifecycleError::UnknownProforma { index: 0, count: 0 })
    );
}

#[tokio::test]
async fn payment_overflowing_the_paid_total_is_refused() {
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    let h = Harness::new(now);
    let order = h
        .desk
        .create_order(h.desk.validate(draft("Bullion", now.date_naive())).unwrap())
        .await
        .unwrap();
    let id = order.order_id.clone();
    let big = Micros::new(i64::MAX / 2 + 10);

    let first = h
        .desk
        .record_payment(&id, big, "treasury", None, None)
        .await
        .unwrap();
    assert_eq!(first.amount_paid, big);

    let err = h
        .desk
        .record_payment(&id, big, "treasury", None, None)
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<LifecycleError>(),
        Some(&LifecycleError::AmountOverflow { amount: big })
    );

    // The stored ledger still equals the true sum of its payments.
    let stored = h.desk.get_order(&id).await.unwrap().unwrap();
    assert_eq!(stored.payments.len(), 1);
    assert_eq!(stored.amount_paid, big);
    assert_eq!(stored.version, first.version);
    assert!(is_consistent(&stored));
}
