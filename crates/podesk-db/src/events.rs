use podesk_schemas::OrderEvent;
use tokio::sync::broadcast;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// In-process fan-out of committed order changes.
///
/// Publishing never blocks and never fails the write that produced the
/// event: with no subscribers the event is dropped, and a lagging
/// subscriber loses the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: OrderEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use podesk_schemas::{OrderEventKind, OrderId, OrderStatus, YearMonth};

    fn event() -> OrderEvent {
        OrderEvent {
            kind: OrderEventKind::Created,
            order_id: OrderId::new(YearMonth::new(2025, 3).unwrap(), 1),
            status: OrderStatus::Pending,
            deleted: false,
            version: 0,
            category: None,
            at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(event());
        let got = rx.recv().await.unwrap();
        assert_eq!(got.order_id.as_str(), "CMD/2025/03/0001");
    }
}
