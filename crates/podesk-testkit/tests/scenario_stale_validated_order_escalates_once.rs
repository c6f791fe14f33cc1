//! Scenario: a validated order with no proforma, created 30h ago.
//!
//! Given `CMD/2025/03/0001`, Validated, no proformas, created 30h ago:
//! - the sweep classifies it `proforma`, claims it, dispatches once;
//! - `proforma_reminder_sent` is true and `delay_history` has one
//!   `proforma_reminder` entry;
//! - a second sweep one minute later dispatches nothing.

use chrono::{Duration, TimeZone, Utc};
use podesk_db::OrderRepository;
use podesk_schemas::{OrderEventKind, OrderId, OrderStatus, ReminderCategory, YearMonth};
use podesk_testkit::{order_at, Harness};

#[tokio::test]
async fn proforma_escalation_then_quiet_rescan() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    let order = order_at(p, 1, OrderStatus::Validated, now - Duration::hours(30));
    assert_eq!(order.order_id.as_str(), "CMD/2025/03/0001");
    h.repo.put(order).await;

    let first = h.scanner.scan_once().await;
    assert_eq!(first.proforma.candidates, 1);
    assert_eq!(first.proforma.claimed, 1);
    assert_eq!(first.proforma.dispatched, 1);
    assert_eq!(first.admin.candidates, 0);
    assert_eq!(first.payment.candidates, 0);

    let delivered = h.dispatcher.delivered().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].claimed, ReminderCategory::Proforma);
    assert_eq!(delivered[0].kind, ReminderCategory::Proforma);
    assert!(delivered[0].ledger.is_none());

    let id = OrderId::parse("CMD/2025/03/0001").unwrap();
    let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(stored.reminders.proforma_reminder_sent);
    assert_eq!(stored.delay_history.len(), 1);
    assert_eq!(stored.delay_history[0].kind, "proforma_reminder");
    assert_eq!(stored.delay_history[0].at, now);

    let escalated = h
        .repo
        .events()
        .await
        .into_iter()
        .filter(|e| e.kind == OrderEventKind::Escalated)
        .count();
    assert_eq!(escalated, 1);

    h.clock.advance(Duration::minutes(1));
    let second = h.scanner.scan_once().await;
    assert_eq!(second.total_claimed(), 0);
    assert_eq!(second.total_dispatched(), 0);
    assert_eq!(h.dispatcher.attempts(), 1);
}

#[tokio::test]
async fn young_order_is_not_escalated_until_threshold() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    h.repo
        .put(order_at(p, 2, OrderStatus::Pending, now - Duration::hours(23)))
        .await;

    assert_eq!(h.scanner.scan_once().await.total_claimed(), 0);

    h.clock.advance(Duration::hours(1));
    let report = h.scanner.scan_once().await;
    assert_eq!(report.admin.claimed, 1);
}

#[tokio::test]
async fn pending_order_admin_claim_is_reclassified() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    h.repo
        .put(order_at(p, 3, OrderStatus::Pending, now - Duration::hours(26)))
        .await;

    let report = h.scanner.scan_once().await;
    assert_eq!(report.admin.claimed, 1);

    let delivered = h.dispatcher.delivered().await;
    assert_eq!(delivered[0].claimed, ReminderCategory::Admin);
    assert_eq!(delivered[0].kind, ReminderCategory::Proforma, "no proformas yet");

    // The claimed flag is the admin one; the history records the claim.
    let id = &delivered[0].order.order_id;
    let stored = h.repo.find_by_id(id).await.unwrap().unwrap();
    assert!(stored.reminders.admin_reminder_sent);
    assert!(!stored.reminders.proforma_reminder_sent);
    assert_eq!(stored.delay_history[0].kind, "admin_reminder");
}

#[tokio::test]
async fn deleted_orders_are_never_escalated() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    let mut order = order_at(p, 4, OrderStatus::Pending, now - Duration::hours(72));
    order.deleted = true;
    h.repo.put(order).await;

    assert_eq!(h.scanner.scan_once().await.total_claimed(), 0);
    assert_eq!(h.dispatcher.attempts(), 0);
}
