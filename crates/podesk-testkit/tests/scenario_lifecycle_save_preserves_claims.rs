//! Scenario: a lifecycle save races the delay sweep.
//!
//! # Invariant under test
//! A transition that read the order before a claim committed must not
//! clear the claimed flag or drop the `delay_history` entry.

use chrono::{Duration, TimeZone, Utc};
use podesk_db::OrderRepository;
use podesk_schemas::{DelayRecord, Micros, OrderId, OrderStatus, ReminderCategory, YearMonth};
use podesk_testkit::{order_at, Harness};

#[tokio::test]
async fn stale_snapshot_save_keeps_claim() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    let id = OrderId::new(p, 7);
    let created = now - Duration::hours(30);
    h.repo
        .put(order_at(p, 7, OrderStatus::Validated, created))
        .await;

    // Snapshot taken before the sweep.
    let mut snapshot = h.repo.find_by_id(&id).await.unwrap().unwrap();
    let expected = snapshot.version;

    let claimed = h
        .repo
        .conditional_claim(
            &id,
            ReminderCategory::Proforma,
            &DelayRecord::for_category(ReminderCategory::Proforma, now),
        )
        .await
        .unwrap();
    assert_eq!(claimed, 1);

    snapshot.manual_paid = true;
    podesk_ledger::recompute(&mut snapshot);
    assert!(h.repo.save_if_version(&snapshot, expected).await.unwrap());

    let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(stored.manual_paid);
    assert!(stored.reminders.proforma_reminder_sent);
    assert_eq!(stored.delay_history.len(), 1);

    // Same expected version again: the write is refused.
    assert!(!h.repo.save_if_version(&snapshot, expected).await.unwrap());
}

#[tokio::test]
async fn desk_transitions_and_sweep_interleave_safely() {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
    let h = Harness::new(now);
    let p = YearMonth::new(2025, 3).unwrap();
    for seq in 1..=6 {
        h.repo
            .put(order_at(p, seq, OrderStatus::Validated, now - Duration::hours(48)))
            .await;
    }

    let mut tasks = Vec::new();
    for seq in 1..=6 {
        let desk = h.desk.clone();
        tasks.push(tokio::spawn(async move {
            let id = OrderId::new(p, seq);
            desk.add_proforma(&id, "Globex", Micros::from_units(10), "EUR")
                .await
        }));
    }
    let scanner = h.scanner.clone();
    let sweep = tokio::spawn(async move { scanner.scan_once().await });

    for t in tasks {
        assert!(t.await.unwrap().unwrap().is_applied());
    }
    let report = sweep.await.unwrap();

    for seq in 1..=6 {
        let id = OrderId::new(p, seq);
        let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.proformas.len(), 1, "transition kept");
        assert_eq!(
            stored.reminders.proforma_reminder_sent,
            stored.delay_history.len() == 1,
            "flag and history move together"
        );
    }
    assert_eq!(report.proforma.claimed, h.dispatcher.attempts());
}
