//! In-memory [`OrderRepository`] with the same write disciplines as Postgres.
//!
//! Each trait method takes the map's write lock for its whole duration, so
//! every operation is one atomic step, exactly like the single-statement
//! conditional writes of the Postgres backend.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use podesk_db::{EventBus, OrderRepository, StalePredicate};
use podesk_lifecycle::LifecycleEvent;
use podesk_schemas::{
    DelayRecord, Order, OrderEvent, OrderEventKind, OrderId, OrderStatus, Payment, ReminderCategory,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemOrderRepository {
    orders: RwLock<BTreeMap<OrderId, Order>>,
    /// Outbox equivalent: every committed event, in commit order.
    events: RwLock<Vec<OrderEvent>>,
    bus: EventBus,
    fail_on_query: RwLock<bool>,
    fail_on_claim: RwLock<bool>,
}

impl MemOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            bus,
            ..Self::default()
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    pub async fn set_fail_on_claim(&self, fail: bool) {
        *self.fail_on_claim.write().await = fail;
    }

    /// Seed a stored order verbatim (no event, no checks).
    pub async fn put(&self, order: Order) {
        self.orders
            .write()
            .await
            .insert(order.order_id.clone(), order);
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    pub async fn events(&self) -> Vec<OrderEvent> {
        self.events.read().await.clone()
    }

    async fn commit_event(&self, event: OrderEvent) {
        self.events.write().await.push(event.clone());
        self.bus.publish(event);
    }
}

fn sorted_oldest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    orders
}

#[async_trait]
impl OrderRepository for MemOrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        {
            let mut map = self.orders.write().await;
            if map.contains_key(&order.order_id) {
                bail!("duplicate order id {}", order.order_id);
            }
            map.insert(order.order_id.clone(), order.clone());
        }
        self.commit_event(OrderEvent::for_order(
            OrderEventKind::Created,
            order,
            order.created_at,
        ))
        .await;
        Ok(())
    }

    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<Order>> {
        if *self.fail_on_query.read().await {
            bail!("injected query failure");
        }
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn find_by_status(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        if *self.fail_on_query.read().await {
            bail!("injected query failure");
        }
        let map = self.orders.read().await;
        Ok(sorted_oldest_first(
            map.values()
                .filter(|o| status.map_or(true, |s| o.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn find_candidates(&self, predicate: &StalePredicate) -> Result<Vec<Order>> {
        if *self.fail_on_query.read().await {
            bail!("injected query failure");
        }
        let map = self.orders.read().await;
        Ok(sorted_oldest_first(
            map.values()
                .filter(|o| predicate.matches(o))
                .cloned()
                .collect(),
        ))
    }

    async fn conditional_claim(
        &self,
        order_id: &OrderId,
        category: ReminderCategory,
        record: &DelayRecord,
    ) -> Result<u64> {
        if *self.fail_on_claim.read().await {
            bail!("injected claim failure");
        }
        // Interleave concurrent claimers before the atomic step.
        tokio::task::yield_now().await;

        let event = {
            let mut map = self.orders.write().await;
            let Some(order) = map.get_mut(order_id) else {
                return Ok(0);
            };
            if order.reminders.is_sent(category) {
                return Ok(0);
            }
            order.reminders.mark_sent(category);
            order.delay_history.push(record.clone());

            let mut event = OrderEvent::for_order(OrderEventKind::Escalated, order, record.at);
            event.category = Some(category);
            event
        };
        self.commit_event(event).await;
        Ok(1)
    }

    async fn save_if_version(&self, order: &Order, expected_version: i64) -> Result<bool> {
        tokio::task::yield_now().await;

        let event = {
            let mut map = self.orders.write().await;
            let Some(stored) = map.get_mut(&order.order_id) else {
                return Ok(false);
            };
            if stored.version != expected_version {
                return Ok(false);
            }
            if stored.is_approved_once && !order.is_approved_once {
                bail!("is_approved_once cannot be cleared (order {})", order.order_id);
            }

            let mut next = order.clone();
            // Claim-owned columns are never written by a lifecycle save.
            next.reminders = stored.reminders;
            next.delay_history = std::mem::take(&mut stored.delay_history);
            next.version = expected_version + 1;
            *stored = next;

            OrderEvent::for_order(OrderEventKind::Updated, stored, stored.date)
        };
        self.commit_event(event).await;
        Ok(true)
    }

    async fn append_payment(&self, order_id: &OrderId, payment: &Payment) -> Result<Option<Order>> {
        let updated = {
            let mut map = self.orders.write().await;
            let Some(order) = map.get_mut(order_id) else {
                return Ok(None);
            };
            let event = LifecycleEvent::RecordPayment {
                payment: payment.clone(),
            };
            podesk_lifecycle::apply(order, &event, payment.submitted_at)?;
            order.version += 1;
            order.clone()
        };
        self.commit_event(OrderEvent::for_order(
            OrderEventKind::Updated,
            &updated,
            updated.date,
        ))
        .await;
        Ok(Some(updated))
    }
}
