//! podesk-testkit
//!
//! In-memory doubles for the storage and dispatch seams, a manual clock, and
//! a [`Harness`] wiring them into a real `OrderDesk` and `DelayScanner`.
//! Cross-crate scenario tests live in `tests/`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use podesk_db::OrderRepository;
use podesk_runtime::{Calendar, Clock, DelayScanner, OrderDesk, SequenceAllocator};
use podesk_schemas::{DraftArticle, Order, OrderDraft, OrderId, OrderStatus, YearMonth};

mod dispatcher;
mod mem_repo;
mod mem_sequence;

pub use dispatcher::RecordingDispatcher;
pub use mem_repo::MemOrderRepository;
pub use mem_sequence::MemSequenceStore;

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A one-line draft requested for `date`.
pub fn draft(title: &str, date: NaiveDate) -> OrderDraft {
    OrderDraft {
        title: title.to_string(),
        team: "Operations".to_string(),
        requested_by: "alice".to_string(),
        requested_date: date,
        articles: vec![DraftArticle {
            quantity: 2,
            unit: "pcs".to_string(),
            description: format!("{title} item"),
        }],
    }
}

/// A stored order with an explicit id, status and creation time.
///
/// `Validated` orders get the approval latch set so they satisfy the same
/// invariants as orders approved through the desk.
pub fn order_at(
    period: YearMonth,
    seq: i64,
    status: OrderStatus,
    created_at: DateTime<Utc>,
) -> Order {
    let mut o = Order::from_draft(
        OrderId::new(period, seq),
        &draft("Fixture", created_at.date_naive()),
        created_at,
    );
    o.status = status;
    o.is_approved_once = status == OrderStatus::Validated;
    o
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Real desk and scanner over in-memory doubles.
pub struct Harness {
    pub repo: Arc<MemOrderRepository>,
    pub sequences: Arc<MemSequenceStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualClock>,
    pub desk: Arc<OrderDesk>,
    pub scanner: Arc<DelayScanner>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_calendar(now, Calendar::default())
    }

    pub fn with_calendar(now: DateTime<Utc>, calendar: Calendar) -> Self {
        let repo = Arc::new(MemOrderRepository::new());
        let sequences = Arc::new(MemSequenceStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(ManualClock::new(now));

        let repo_dyn: Arc<dyn OrderRepository> = repo.clone();
        let allocator = SequenceAllocator::new(sequences.clone());
        let desk = OrderDesk::new(repo_dyn.clone(), allocator, clock.clone(), calendar);
        let scanner = DelayScanner::new(repo_dyn, dispatcher.clone(), clock.clone());

        Self {
            repo,
            sequences,
            dispatcher,
            clock,
            desk: Arc::new(desk),
            scanner: Arc::new(scanner),
        }
    }
}
