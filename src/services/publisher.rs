//! Best-effort publishing onto registered broker channels.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{Channel, DeliveryLocation, NewOrder, OrderStatusChange};
use crate::repositories::Broker;

/// Serializes payloads and writes them to the broker.
///
/// Publishing never fails the caller: notifications are a supplementary
/// signal and sit outside any business transaction. Errors are logged and
/// reported as `None`.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Publish `payload` as JSON on `channel`. Returns the subscriber count
    /// when the broker accepted the write.
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: Channel, payload: &T) -> Option<u64> {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(channel = %channel, error = %e, "could not serialize notification");
                return None;
            }
        };
        self.publish_raw(channel, &body).await
    }

    /// Publish an already serialized payload.
    pub async fn publish_raw(&self, channel: Channel, body: &str) -> Option<u64> {
        match self.broker.publish(channel.as_str(), body).await {
            Ok(count) => {
                debug!(channel = %channel, count, "notification published");
                Some(count)
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "notification publish failed");
                None
            }
        }
    }

    pub async fn order_created(&self, order: &NewOrder) -> Option<u64> {
        self.publish(Channel::NewOrder, order).await
    }

    pub async fn order_status_changed(&self, change: &OrderStatusChange) -> Option<u64> {
        self.publish(Channel::OrderStatusUpdate, change).await
    }

    pub async fn rider_moved(&self, location: &DeliveryLocation) -> Option<u64> {
        self.publish(Channel::RiderLocation, location).await
    }
}
