//! Relays order events published by backend processes to socket rooms.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::{Channel, OrderBusEvent, Room, ServerEvent, StatusUpdate};
use crate::repositories::{resubscribe, Broker, BrokerMessage};
use crate::socket::rooms::RoomRegistry;

/// Frames a bus event turns into, with their target rooms.
pub fn route(event: OrderBusEvent) -> Vec<(Room, ServerEvent)> {
    match event {
        OrderBusEvent::NewOrder(order) => {
            vec![(Room::restaurant(&order.restaurant_id), ServerEvent::NewOrder(order))]
        }
        OrderBusEvent::StatusChange(change) => {
            let update = StatusUpdate {
                order_id: change.order_id.clone(),
                status: change.status,
                reason: change.reason,
                details: change.details,
                timestamp: chrono::Utc::now(),
            };
            let mut frames = Vec::with_capacity(2);
            if let Some(customer_id) = &change.customer_id {
                frames.push((Room::user(customer_id), ServerEvent::StatusUpdate(update.clone())));
            }
            frames.push((Room::order(&change.order_id), ServerEvent::StatusChanged(update)));
            frames
        }
        OrderBusEvent::RiderLocation(location) => {
            vec![(Room::order(&location.order_id), ServerEvent::DeliveryLocation(location))]
        }
    }
}

/// Deliver one bus message to local room members. Every node runs its own
/// bridge, so nothing is forwarded to the cluster fanout.
pub fn relay(rooms: &RoomRegistry, msg: &BrokerMessage) -> usize {
    let event = match OrderBusEvent::decode(&msg.channel, &msg.payload) {
        Ok(Some(event)) => event,
        Ok(None) => return 0,
        Err(e) => {
            warn!(channel = %msg.channel, error = %e, "dropping malformed order bus message");
            return 0;
        }
    };
    let mut delivered = 0;
    for (room, frame) in route(event) {
        match frame.encode() {
            Ok(text) => delivered += rooms.emit_local(&room.key(), &text),
            Err(e) => warn!(event = frame.name(), error = %e, "could not encode frame"),
        }
    }
    debug!(channel = %msg.channel, delivered, "order bus message relayed");
    delivered
}

/// Subscribe to the order bus, then relay in the background until the
/// handle is aborted. A subscription that ends is replaced.
pub async fn spawn(broker: Arc<dyn Broker>, rooms: Arc<RoomRegistry>) -> AppResult<JoinHandle<()>> {
    let channels: Vec<&'static str> = Channel::ORDER_BUS.iter().map(|c| c.as_str()).collect();
    let mut subscription = broker.subscribe(&channels).await?;
    info!(channels = ?channels, "order bus bridge subscribed");

    Ok(tokio::spawn(async move {
        loop {
            while let Some(msg) = subscription.recv().await {
                relay(&rooms, &msg);
            }
            warn!("order bus subscription ended, resubscribing");
            subscription = resubscribe(broker.as_ref(), &channels).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use crate::repositories::testing::DroppingBroker;
    use crate::repositories::MemoryRepository;
    use crate::services::Publisher;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn member(rooms: &RoomRegistry, id: &str, room: Room) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        rooms.register(id, tx);
        rooms.join(id, &room);
        rx
    }

    fn msg(channel: Channel, payload: Value) -> BrokerMessage {
        BrokerMessage {
            channel: channel.as_str().to_string(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn status_change_reaches_customer_and_order_room() {
        let rooms = RoomRegistry::new();
        let mut customer = member(&rooms, "c", Room::user("C1"));
        let mut watcher = member(&rooms, "w", Room::order("O1"));

        let delivered = relay(
            &rooms,
            &msg(
                Channel::OrderStatusUpdate,
                json!({ "orderId": "O1", "userId": "C1", "status": "out_for_delivery" }),
            ),
        );
        assert_eq!(delivered, 2);
        assert!(customer.try_recv().unwrap().contains("order:status_update"));
        assert!(watcher.try_recv().unwrap().contains("order:status_changed"));
    }

    #[test]
    fn status_change_without_customer_only_reaches_order_room() {
        let frames = route(OrderBusEvent::StatusChange(crate::models::OrderStatusChange {
            order_id: "O1".into(),
            customer_id: None,
            status: OrderStatus::Delivered,
            reason: None,
            details: None,
        }));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, Room::order("O1"));
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let rooms = RoomRegistry::new();
        let mut watcher = member(&rooms, "w", Room::order("O1"));
        let bad = BrokerMessage {
            channel: Channel::RiderLocation.as_str().to_string(),
            payload: "{oops".into(),
        };
        assert_eq!(relay(&rooms, &bad), 0);
        assert!(watcher.try_recv().is_err());
    }

    #[tokio::test]
    async fn published_new_order_reaches_restaurant_sockets() {
        let repo = Arc::new(MemoryRepository::new());
        let rooms = Arc::new(RoomRegistry::new());
        let mut restaurant = member(&rooms, "r", Room::restaurant("R1"));
        let task = spawn(repo.clone(), rooms.clone()).await.unwrap();

        let publisher = Publisher::new(repo.clone());
        publisher
            .publish(Channel::NewOrder, &json!({ "orderId": "O9", "restaurantId": "R1", "total": 30 }))
            .await;

        let frame = tokio::time::timeout(Duration::from_secs(1), restaurant.recv())
            .await
            .unwrap()
            .unwrap();
        let frame: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["event"], "order:new");
        assert_eq!(frame["data"]["orderId"], "O9");
        assert_eq!(frame["data"]["total"], 30);
        task.abort();
    }

    #[tokio::test]
    async fn bridge_survives_a_closed_subscription() {
        let repo = Arc::new(MemoryRepository::new());
        let broker = Arc::new(DroppingBroker::new(repo.clone()));
        let rooms = Arc::new(RoomRegistry::new());
        let mut restaurant = member(&rooms, "r", Room::restaurant("R1"));
        let task = spawn(broker.clone(), rooms.clone()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while repo.subscriber_count(Channel::NewOrder.as_str()).await == 0 {
            assert!(tokio::time::Instant::now() < deadline, "bridge never resubscribed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!task.is_finished());
        assert_eq!(broker.calls(), 2);

        Publisher::new(repo.clone())
            .publish(Channel::NewOrder, &json!({ "orderId": "O3", "restaurantId": "R1" }))
            .await;
        let frame = tokio::time::timeout(Duration::from_secs(1), restaurant.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(frame.contains("O3"));
        task.abort();
    }
}
